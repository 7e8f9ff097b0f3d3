//! File-based event log for tagstream
//!
//! Events are appended as length-prefixed JSON frames to numbered segment
//! files. An in-memory index keyed by sortable id is rebuilt from the
//! segments on open, so reads in sortable-id order and per-tag reads never
//! scan the whole log.
//!
//! Features:
//! - Sequential appends with size-based segment rotation
//! - Duplicate suppression by event id across restarts
//! - Torn tail recovery after a crash mid-append
//! - Append notification for push-based projection hosts

mod index;
mod store;

pub use store::{FileEventLog, FileEventLogConfig};
