//! SQLite-backed stores for tagstream
//!
//! Key features:
//! - Snapshot table keyed by (projector name, version) with transparent
//!   blob offload for oversized payloads
//! - Reservation table whose create step is a single conditional upsert
//! - WAL mode for concurrent readers

pub mod reservation_store;
pub mod schema;
pub mod snapshot_store;

pub use reservation_store::SqliteReservationStore;
pub use schema::{SqliteConfig, SynchronousMode};
pub use snapshot_store::SqliteSnapshotStore;
