//! Tagstream: tag-partitioned event sourcing with windowed multi-projections
//!
//! Tagstream provides:
//! - **Event log**: append-only, ordered by sortable id, readable per tag
//! - **Tag reservations**: optimistic write locks scoped to one tag
//! - **Multi-projections**: safe/unsafe dual state that tolerates late,
//!   duplicated and out-of-order delivery
//! - **Snapshots**: compressed, version-gated projection state with blob
//!   offload for large payloads
//!
//! # Quick Start
//!
//! ```no_run
//! use tagstream::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let db = TagstreamDb::open("./data")?;
//!
//! // Append under a tag, expecting it to be new
//! let tag: Tag = "cart:7".parse()?;
//! let event = PendingEvent::raw("ItemAdded", serde_json::json!({ "sku": "A1" }), [tag.clone()])?;
//! db.writer().write(vec![event], &ConsistencyCheck::new().expect_latest(tag, None))?;
//!
//! // Fold the log into a projection
//! let mut host = db.host(EventTypeCountProjector);
//! host.catch_up()?;
//! # Ok(())
//! # }
//! ```

pub mod blob;
pub mod db;
pub mod memory;
pub mod prelude;
pub mod tag_state;
pub mod writer;

// Re-export core types
pub use tagstream_core::{
    clock::{Clock, ManualClock, SystemClock},
    config::{
        ErrorPolicy, ProjectionHostConfig, ReservationConfig, SnapshotConfig, TagstreamConfig,
    },
    error::{ProjectionError, Result, TagstreamError, ValidationError},
    event_log::{EventLog, EventLogIterator, EventLogStats},
    payload::{decode_payload, encode_payload, TypedPayload},
    traits::{BlobAccessor, ReservationSlot, ReservationStore, SnapshotStore},
    types::{
        DecodedEvent, Event, EventMetadata, OffloadRef, PendingEvent, Sequenced, SnapshotInfo,
        SnapshotRecord, SortableUniqueId, Tag, TagProjector, TagState, TagWriteOutcome,
        TagWriteReservation,
    },
    InMemoryReservationStore, TagReservations,
};

// Re-export projection machinery
pub use tagstream_projector::{
    decide, events_since_snapshot, load_snapshot, write_snapshot, ApplyOutcome, BuildContext, BuildDecision,
    BuildOptions, BuildOrigin, BuildResult, BuildStatus, EventTypeCountProjector, FailedEvent,
    HostStats, MultiProjection, MultiProjectionState, MultiProjector, ProjectionHost,
    ProjectionView, ProjectorDescriptor, ProjectorRegistry, SafeUnsafeProjectionState,
    SnapshotBuilder, TagCatalogProjector, TagMultiProjector, TagSummary,
};

// Re-export implementations
pub use tagstream_file_log::{FileEventLog, FileEventLogConfig};
pub use tagstream_sqlite::{
    SqliteConfig, SqliteReservationStore, SqliteSnapshotStore, SynchronousMode,
};

// Re-export main types from this crate
pub use blob::LocalBlobStorage;
pub use db::TagstreamDb;
pub use memory::{InMemoryBlobStorage, InMemoryEventLog, InMemorySnapshotStore};
pub use tag_state::load_tag_state;
pub use writer::{ConsistencyCheck, EventWriter, WriteResult};
