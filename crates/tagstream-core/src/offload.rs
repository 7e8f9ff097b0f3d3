//! Storage-tier selection for snapshot payloads, shared by snapshot stores.

use crate::error::{Result, TagstreamError};
use crate::observe;
use crate::traits::BlobAccessor;
use crate::types::{OffloadRef, SnapshotRecord};

/// Blob key prefix for a projector's snapshots.
pub fn blob_key_prefix(projector_name: &str, projector_version: &str) -> String {
    format!("{projector_name}/{projector_version}")
}

/// Decide where the record's payload goes, writing it to blob storage if needed.
///
/// Payloads strictly larger than `offload_threshold` are offloaded when a
/// blob accessor is configured. Without one the payload stays inline and a
/// warning is logged.
pub fn place_payload(
    record: &SnapshotRecord,
    offload_threshold: usize,
    blobs: Option<&dyn BlobAccessor>,
) -> Result<Option<OffloadRef>> {
    let size = record.state_data.len();
    if size <= offload_threshold {
        observe::record_snapshot_write(size, false);
        return Ok(None);
    }
    let Some(blobs) = blobs else {
        tracing::warn!(
            projector = %record.projector_name,
            size,
            offload_threshold,
            "snapshot exceeds offload threshold but no blob storage is configured; storing inline"
        );
        observe::record_snapshot_write(size, false);
        return Ok(None);
    };
    let prefix = blob_key_prefix(&record.projector_name, &record.projector_version);
    let key = blobs.write(&record.state_data, &prefix)?;
    tracing::info!(
        projector = %record.projector_name,
        version = %record.projector_version,
        size,
        key = %key,
        "offloaded snapshot payload"
    );
    observe::record_snapshot_write(size, true);
    Ok(Some(OffloadRef {
        key,
        provider: blobs.provider_name().to_string(),
    }))
}

/// Read an offloaded payload back.
///
/// Every failure, including a missing accessor or a short read, is an
/// `OffloadReadFailure`.
pub fn fetch_payload(
    offload: &OffloadRef,
    expected_size: u64,
    blobs: Option<&dyn BlobAccessor>,
) -> Result<Vec<u8>> {
    let blobs = blobs.ok_or_else(|| TagstreamError::OffloadReadFailure {
        key: offload.key.clone(),
        reason: format!("no blob storage configured for provider {}", offload.provider),
    })?;
    let bytes = blobs
        .read(&offload.key)
        .map_err(|e| TagstreamError::OffloadReadFailure {
            key: offload.key.clone(),
            reason: e.to_string(),
        })?;
    if bytes.len() as u64 != expected_size {
        return Err(TagstreamError::OffloadReadFailure {
            key: offload.key.clone(),
            reason: format!("expected {} bytes, read {}", expected_size, bytes.len()),
        });
    }
    Ok(bytes)
}
