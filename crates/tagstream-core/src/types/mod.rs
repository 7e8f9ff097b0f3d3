pub mod event;
pub mod reservation;
pub mod snapshot;
pub mod sortable_id;
pub mod tag;
pub mod tag_state;

pub use event::{DecodedEvent, Event, EventMetadata, PendingEvent, Sequenced, TagWriteOutcome};
pub use reservation::TagWriteReservation;
pub use snapshot::{OffloadRef, SnapshotInfo, SnapshotRecord};
pub use sortable_id::{SortableUniqueId, SORTABLE_ID_LEN};
pub use tag::Tag;
pub use tag_state::{TagProjector, TagState};
