//! Event log trait and types
//!
//! Defines the interface for event storage backends (file-based, in-memory, etc.)

use crate::error::Result;
use crate::types::{Event, SortableUniqueId, Tag, TagWriteOutcome};

/// Iterator over events
pub trait EventLogIterator: Iterator<Item = Result<Event>> + Send {}

impl<T: Iterator<Item = Result<Event>> + Send> EventLogIterator for T {}

/// Event log storage backend
///
/// An append-only store of immutable events, partitioned logically by tag.
/// Delivery to readers is at-least-once; projections tolerate duplicates
/// through their own idempotence rules.
pub trait EventLog: Send + Sync {
    /// Append a batch of stamped events.
    ///
    /// Events whose `id` is already stored are skipped so a retried append
    /// does not duplicate them. Returns one outcome per tag touched by the
    /// newly stored events.
    fn append(&self, events: &[Event]) -> Result<Vec<TagWriteOutcome>>;

    /// Read events strictly after `since`, in sortable-id order.
    ///
    /// When `tag` is set only events carrying that tag are returned. `max`
    /// bounds the number of events yielded.
    fn read_since(
        &self,
        tag: Option<&Tag>,
        since: Option<&SortableUniqueId>,
        max: Option<usize>,
    ) -> Result<Box<dyn EventLogIterator>>;

    /// Number of events strictly after `since` (all events when `None`).
    fn count(&self, since: Option<&SortableUniqueId>) -> Result<u64>;

    /// Latest sortable id written under `tag`.
    fn latest_for_tag(&self, tag: &Tag) -> Result<Option<SortableUniqueId>> {
        let mut last = None;
        for event in self.read_since(Some(tag), None, None)? {
            last = Some(event?.sortable_unique_id);
        }
        Ok(last)
    }

    /// Sync all writes to durable storage
    fn sync(&self) -> Result<()> {
        Ok(())
    }

    /// Get statistics about the event log
    fn stats(&self) -> Result<EventLogStats>;
}

/// Statistics about the event log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLogStats {
    /// Total number of events in storage
    pub event_count: u64,

    /// Smallest sortable id in storage
    pub oldest: Option<SortableUniqueId>,

    /// Largest sortable id in storage
    pub newest: Option<SortableUniqueId>,

    /// Number of distinct tags seen
    pub tag_count: usize,

    /// Total bytes used by event storage (0 for memory-only logs)
    pub total_bytes: u64,
}
