use super::SortableUniqueId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where an offloaded snapshot payload lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffloadRef {
    pub key: String,
    pub provider: String,
}

/// A persisted projection snapshot.
///
/// `state_data` always holds the compressed payload on both sides of the
/// store boundary: the store decides whether to keep it inline or in blob
/// storage on write, and resolves it back on read. `offload` tells the
/// caller which happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub projector_name: String,
    pub projector_version: String,
    pub payload_type: String,
    pub last_sortable_unique_id: Option<SortableUniqueId>,
    pub last_event_id: Option<Uuid>,
    pub events_processed: u64,
    #[serde(skip)]
    pub state_data: Vec<u8>,
    pub offload: Option<OffloadRef>,
    pub original_size: u64,
    pub compressed_size: u64,
    pub safe_window_threshold: Option<SortableUniqueId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub build_source: String,
    pub build_host: String,
}

impl SnapshotRecord {
    pub fn info(&self) -> SnapshotInfo {
        SnapshotInfo {
            projector_name: self.projector_name.clone(),
            projector_version: self.projector_version.clone(),
            payload_type: self.payload_type.clone(),
            last_sortable_unique_id: self.last_sortable_unique_id.clone(),
            events_processed: self.events_processed,
            is_offloaded: self.offload.is_some(),
            offload_key: self.offload.as_ref().map(|o| o.key.clone()),
            original_size: self.original_size,
            compressed_size: self.compressed_size,
            safe_window_threshold: self.safe_window_threshold.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            build_source: self.build_source.clone(),
        }
    }
}

/// Snapshot row metadata without the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub projector_name: String,
    pub projector_version: String,
    pub payload_type: String,
    pub last_sortable_unique_id: Option<SortableUniqueId>,
    pub events_processed: u64,
    pub is_offloaded: bool,
    pub offload_key: Option<String>,
    pub original_size: u64,
    pub compressed_size: u64,
    pub safe_window_threshold: Option<SortableUniqueId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub build_source: String,
}

impl SnapshotInfo {
    /// Log position the snapshot accounts for: every event at or below it
    /// was either folded or ignored by the projector.
    pub fn log_position(&self) -> Option<&SortableUniqueId> {
        self.safe_window_threshold
            .as_ref()
            .or(self.last_sortable_unique_id.as_ref())
    }
}
