//! Snapshot codec and lifecycle
//!
//! A snapshot is the *safe* view of a multi-projection at a threshold,
//! written as a self-describing JSON document and zstd-compressed:
//!
//! ```text
//! { "v": 1, "projector_name", "projector_version", "threshold",
//!   "last_sortable_unique_id", "last_event_id", "version",
//!   "items":   [ { "key", "type", "payload", "last" } ],
//!   "retired": [ { "key", "last" } ] }
//! ```
//!
//! Each item names its own payload type so heterogeneous states round-trip;
//! items of a type the projector no longer knows are skipped on load.
//! `retired` keeps the last applied id of removed keys so late duplicates
//! cannot bring them back after a reload.

use crate::multi_projector::{MultiProjection, MultiProjector};
use crate::safe_unsafe::{SafeFrame, SafeUnsafeProjectionState};
use crate::state::MultiProjectionState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use tagstream_core::config::SnapshotConfig;
use tagstream_core::{
    observe, Result, SnapshotInfo, SnapshotRecord, SnapshotStore, SortableUniqueId,
    TagstreamError,
};
use uuid::Uuid;

/// Current document format.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Upper bound on a decompressed snapshot document.
const MAX_DECOMPRESSED_BYTES: u64 = 4 * 1024 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotDocument {
    v: u32,
    projector_name: String,
    projector_version: String,
    threshold: SortableUniqueId,
    #[serde(default)]
    last_sortable_unique_id: Option<SortableUniqueId>,
    #[serde(default)]
    last_event_id: Option<Uuid>,
    version: u64,
    items: Vec<SnapshotItem>,
    #[serde(default)]
    retired: Vec<RetiredKey>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotItem {
    key: String,
    #[serde(rename = "type")]
    type_name: String,
    payload: serde_json::Value,
    last: Option<SortableUniqueId>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RetiredKey {
    key: String,
    last: SortableUniqueId,
}

/// Output of [`serialize`].
#[derive(Debug, Clone)]
pub struct SerializedSnapshot {
    pub bytes: Vec<u8>,
    pub original_size: u64,
    pub compressed_size: u64,
    pub threshold: SortableUniqueId,
    pub last_sortable_unique_id: Option<SortableUniqueId>,
    pub last_event_id: Option<Uuid>,
    /// Events folded into the safe view.
    pub events_processed: u64,
}

/// Serialize and compress the safe view of `state` at `threshold`.
///
/// Unsafe state is never written; it is rebuilt from the event tail after
/// a reload.
pub fn serialize<M: MultiProjector>(
    state: &MultiProjectionState<M>,
    threshold: &SortableUniqueId,
    compression_level: i32,
) -> Result<SerializedSnapshot> {
    let projector = state.projector();
    let frame = state.payload().safe_frame(threshold);

    let mut items = Vec::with_capacity(frame.items.len());
    for (key, item) in &frame.items {
        let (type_name, payload) = projector.encode_state(item)?;
        items.push(SnapshotItem {
            key: key.to_string(),
            type_name,
            payload,
            last: frame.marks.get(key).cloned(),
        });
    }
    let retired = frame
        .marks
        .iter()
        .filter(|(key, _)| !frame.items.contains_key(*key))
        .map(|(key, last)| RetiredKey {
            key: key.to_string(),
            last: last.clone(),
        })
        .collect();

    let (last_sortable_unique_id, last_event_id) = match &frame.tip {
        Some((id, event_id)) => (Some(id.clone()), Some(*event_id)),
        None => (None, None),
    };
    let document = SnapshotDocument {
        v: SNAPSHOT_FORMAT_VERSION,
        projector_name: projector.name().to_string(),
        projector_version: projector.version().to_string(),
        threshold: threshold.clone(),
        last_sortable_unique_id: last_sortable_unique_id.clone(),
        last_event_id,
        version: frame.events,
        items,
        retired,
    };

    let raw = serde_json::to_vec(&document)?;
    let bytes = zstd::stream::encode_all(raw.as_slice(), compression_level)?;
    Ok(SerializedSnapshot {
        original_size: raw.len() as u64,
        compressed_size: bytes.len() as u64,
        bytes,
        threshold: threshold.clone(),
        last_sortable_unique_id,
        last_event_id,
        events_processed: frame.events,
    })
}

/// Rebuild a projection state from snapshot bytes.
///
/// The promoted cutover is the later of `threshold` and the threshold the
/// snapshot was written at.
///
/// # Errors
///
/// `VersionMismatch` if the snapshot was written by another projector
/// version (callers treat this as a cache miss), `Serialization` for a
/// corrupt document or a known item type with a malformed payload.
pub fn deserialize<M: MultiProjector>(
    projector: M,
    bytes: &[u8],
    threshold: Option<&SortableUniqueId>,
) -> Result<MultiProjectionState<M>> {
    let mut raw = Vec::new();
    zstd::stream::Decoder::new(bytes)?
        .take(MAX_DECOMPRESSED_BYTES)
        .read_to_end(&mut raw)?;
    let document: SnapshotDocument = serde_json::from_slice(&raw)?;

    if document.v != SNAPSHOT_FORMAT_VERSION {
        return Err(TagstreamError::Serialization(format!(
            "unsupported snapshot format {}",
            document.v
        )));
    }
    if document.projector_name != projector.name() {
        return Err(TagstreamError::InvalidState(format!(
            "snapshot belongs to projector {}, not {}",
            document.projector_name,
            projector.name()
        )));
    }
    if document.projector_version != projector.version() {
        return Err(TagstreamError::VersionMismatch {
            expected: projector.version().to_string(),
            found: document.projector_version,
        });
    }

    let mut items = BTreeMap::new();
    let mut marks = BTreeMap::new();
    for item in document.items {
        let key = parse_key::<M>(&item.key)?;
        match projector.decode_state(&key, &item.type_name, &item.payload) {
            None => {
                tracing::warn!(
                    projector = %document.projector_name,
                    key = %item.key,
                    type_name = %item.type_name,
                    "skipping snapshot entry of unknown type"
                );
            }
            Some(Err(e)) => return Err(e),
            Some(Ok(state)) => {
                if let Some(last) = item.last {
                    marks.insert(key.clone(), last);
                }
                items.insert(key, state);
            }
        }
    }
    for retired in document.retired {
        marks.insert(parse_key::<M>(&retired.key)?, retired.last);
    }

    let cutover = match threshold {
        Some(t) if *t > document.threshold => t.clone(),
        _ => document.threshold,
    };
    let tip = document
        .last_sortable_unique_id
        .clone()
        .zip(document.last_event_id);
    let frame = SafeFrame {
        items,
        marks,
        events: document.version,
        tip,
    };
    let container = SafeUnsafeProjectionState::from_safe_frame(frame, Some(cutover));
    Ok(MultiProjectionState::from_payload(
        MultiProjection::from_parts(projector, container),
        document.last_sortable_unique_id,
        document.last_event_id,
        document.version,
    ))
}

fn parse_key<M: MultiProjector>(raw: &str) -> Result<M::Key> {
    raw.parse::<M::Key>()
        .map_err(|_| TagstreamError::Serialization(format!("invalid snapshot key {raw:?}")))
}

/// Identifies who wrote a snapshot.
#[derive(Debug, Clone)]
pub struct BuildOrigin {
    pub source: String,
    pub host: String,
}

impl BuildOrigin {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            host: std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
        }
    }
}

/// Serialize `state` at `threshold` and upsert it into `store`.
pub fn write_snapshot<M: MultiProjector>(
    store: &dyn SnapshotStore,
    state: &MultiProjectionState<M>,
    threshold: &SortableUniqueId,
    config: &SnapshotConfig,
    origin: &BuildOrigin,
) -> Result<SnapshotInfo> {
    let serialized = serialize(state, threshold, config.compression_level)?;
    let now = chrono::Utc::now();
    let record = SnapshotRecord {
        projector_name: state.projector_name().to_string(),
        projector_version: state.projector_version().to_string(),
        payload_type: std::any::type_name::<M::State>().to_string(),
        last_sortable_unique_id: serialized.last_sortable_unique_id,
        last_event_id: serialized.last_event_id,
        events_processed: serialized.events_processed,
        state_data: serialized.bytes,
        offload: None,
        original_size: serialized.original_size,
        compressed_size: serialized.compressed_size,
        safe_window_threshold: Some(serialized.threshold),
        created_at: now,
        updated_at: now,
        build_source: origin.source.clone(),
        build_host: origin.host.clone(),
    };
    let info = store.upsert(&record, config.offload_threshold_bytes)?;
    tracing::info!(
        projector = %info.projector_name,
        version = %info.projector_version,
        events = info.events_processed,
        compressed = info.compressed_size,
        offloaded = info.is_offloaded,
        "wrote snapshot"
    );
    Ok(info)
}

/// Load the latest snapshot usable by `projector`.
///
/// Returns `Ok(None)` when there is nothing to reuse: no row, a row for
/// another version, or an unreadable inline payload (logged, then the caller
/// replays from the log). An unreadable offloaded payload is returned as an
/// error instead, since replaying past it would hide a storage fault.
pub fn load_snapshot<M: MultiProjector>(
    store: &dyn SnapshotStore,
    projector: &M,
    threshold: Option<&SortableUniqueId>,
) -> Result<Option<MultiProjectionState<M>>> {
    let record = match store.get_latest(projector.name(), projector.version()) {
        Ok(record) => record,
        Err(e) if e.is_fatal_snapshot_failure() => {
            observe::record_snapshot_load("failed");
            return Err(e);
        }
        Err(e) => {
            tracing::warn!(projector = %projector.name(), error = %e, "snapshot read failed, replaying from log");
            observe::record_snapshot_load("fallback");
            return Ok(None);
        }
    };

    let Some(record) = record else {
        // Metadata only: a row of another version is never fetched.
        let other = store
            .list_all()?
            .into_iter()
            .find(|s| s.projector_name == projector.name());
        if let Some(other) = other {
            tracing::info!(
                projector = %projector.name(),
                stored_version = %other.projector_version,
                wanted_version = %projector.version(),
                "ignoring snapshot from another projector version"
            );
        }
        observe::record_snapshot_load("miss");
        return Ok(None);
    };

    match deserialize(projector.clone(), &record.state_data, threshold) {
        Ok(state) => {
            tracing::debug!(
                projector = %projector.name(),
                events = state.version(),
                "loaded snapshot"
            );
            observe::record_snapshot_load("hit");
            Ok(Some(state))
        }
        Err(TagstreamError::VersionMismatch { .. }) => {
            observe::record_snapshot_load("miss");
            Ok(None)
        }
        Err(e) => {
            tracing::warn!(projector = %projector.name(), error = %e, "snapshot decode failed, replaying from log");
            observe::record_snapshot_load("fallback");
            Ok(None)
        }
    }
}
