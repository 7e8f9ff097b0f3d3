use crate::error::Result;
use crate::types::{SnapshotInfo, SnapshotRecord};

/// Persistent store for projection snapshots, keyed by (name, version).
///
/// Implementations that support offload move `state_data` to blob storage
/// when it is larger than `offload_threshold` and resolve it again on read.
/// A row that points at a blob which cannot be read must surface
/// `TagstreamError::OffloadReadFailure`.
pub trait SnapshotStore: Send + Sync {
    fn get_latest(&self, projector_name: &str, projector_version: &str)
        -> Result<Option<SnapshotRecord>>;

    /// Most advanced snapshot for `projector_name` across all versions.
    fn get_latest_any_version(&self, projector_name: &str) -> Result<Option<SnapshotRecord>>;

    /// Insert or replace the row for the record's (name, version).
    fn upsert(&self, record: &SnapshotRecord, offload_threshold: usize) -> Result<SnapshotInfo>;

    fn list_all(&self) -> Result<Vec<SnapshotInfo>>;

    fn delete(&self, projector_name: &str, projector_version: &str) -> Result<bool>;
}
