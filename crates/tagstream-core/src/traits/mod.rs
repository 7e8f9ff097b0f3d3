pub mod blob;
pub mod reservation_store;
pub mod snapshot_store;

pub use blob::BlobAccessor;
pub use reservation_store::{ReservationSlot, ReservationStore};
pub use snapshot_store::SnapshotStore;
