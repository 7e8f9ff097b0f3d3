//! Tagstream Core: types and traits for tag-partitioned event sourcing
//!
//! This crate defines the shared vocabulary of the tagstream workspace:
//! - Sortable ids: fixed-width, string-comparable ordering keys for events
//! - Tags: validated `group:content` consistency boundaries
//! - Events and typed payloads: closed sum types round-tripped by type name
//! - Tag write reservations: lease-based optimistic locks scoped to one tag
//! - Boundary traits: event log, reservation store, snapshot store, blob accessor
//!
//! Key features:
//! - Validation at construction: malformed tags and ids never reach the log
//! - Striped in-memory reservation table with atomic create-if-absent-or-expired
//! - Size-based snapshot offload helpers shared by every snapshot store
//! - Host-owned clock handle; nothing reads global time behind the caller's back

pub mod clock;
pub mod config;
pub mod error;
pub mod event_log;
pub mod observe;
pub mod offload;
pub mod payload;
pub mod reservation;
pub mod reservation_table;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ErrorPolicy, ProjectionHostConfig, ReservationConfig, SnapshotConfig, TagstreamConfig,
};
pub use error::{ProjectionError, Result, TagstreamError, ValidationError};
pub use event_log::{EventLog, EventLogIterator, EventLogStats};
pub use payload::{decode_payload, encode_payload, TypedPayload};
pub use reservation::TagReservations;
pub use reservation_table::InMemoryReservationStore;
pub use traits::{BlobAccessor, ReservationSlot, ReservationStore, SnapshotStore};
pub use types::{
    DecodedEvent, Event, EventMetadata, OffloadRef, PendingEvent, Sequenced, SnapshotInfo,
    SnapshotRecord, SortableUniqueId, Tag, TagProjector, TagState, TagWriteOutcome,
    TagWriteReservation,
};
