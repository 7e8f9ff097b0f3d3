//! In-memory adapters for every storage boundary.
//!
//! Useful for tests and for embedding tagstream in a process that keeps
//! its own durability elsewhere. Nothing here survives a restart.

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;
use std::time::Instant;
use tagstream_core::offload::{fetch_payload, place_payload};
use tagstream_core::{
    observe, BlobAccessor, Event, EventLog, EventLogIterator, EventLogStats, Result, SnapshotInfo,
    SnapshotRecord, SnapshotStore, SortableUniqueId, Tag, TagWriteOutcome, TagstreamError,
};
use tokio::sync::Notify;
use uuid::Uuid;

type Position = (SortableUniqueId, Uuid);

#[derive(Default)]
struct MemoryLogInner {
    events: BTreeMap<Position, Event>,
    by_tag: HashMap<Tag, Vec<Position>>,
    ids: HashSet<Uuid>,
}

/// Event log held in a sorted map.
#[derive(Default)]
pub struct InMemoryEventLog {
    inner: RwLock<MemoryLogInner>,
    notify: Arc<Notify>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notified after every append that stored at least one event.
    pub fn event_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn after(since: Option<&SortableUniqueId>) -> Bound<Position> {
    match since {
        Some(since) => Bound::Excluded((since.clone(), Uuid::from_u128(u128::MAX))),
        None => Bound::Unbounded,
    }
}

impl EventLog for InMemoryEventLog {
    fn append(&self, events: &[Event]) -> Result<Vec<TagWriteOutcome>> {
        let start = Instant::now();
        let mut stored = Vec::with_capacity(events.len());
        {
            let mut inner = self.inner.write();
            for event in events {
                if !inner.ids.insert(event.id) {
                    continue;
                }
                let position = (event.sortable_unique_id.clone(), event.id);
                for tag in &event.tags {
                    let positions = inner.by_tag.entry(tag.clone()).or_default();
                    let at = positions.partition_point(|p| p < &position);
                    positions.insert(at, position.clone());
                }
                inner.events.insert(position, event.clone());
                stored.push(event.clone());
            }
        }
        if !stored.is_empty() {
            observe::record_append(stored.len(), start.elapsed());
            self.notify.notify_waiters();
        }
        Ok(TagWriteOutcome::summarize(&stored))
    }

    fn read_since(
        &self,
        tag: Option<&Tag>,
        since: Option<&SortableUniqueId>,
        max: Option<usize>,
    ) -> Result<Box<dyn EventLogIterator>> {
        let inner = self.inner.read();
        let max = max.unwrap_or(usize::MAX);
        let events: Vec<Event> = match tag {
            None => inner
                .events
                .range((after(since), Bound::Unbounded))
                .take(max)
                .map(|(_, event)| event.clone())
                .collect(),
            Some(tag) => {
                let positions = inner.by_tag.get(tag).map(Vec::as_slice).unwrap_or_default();
                let first = match since {
                    Some(since) => positions.partition_point(|(id, _)| id <= since),
                    None => 0,
                };
                positions[first..]
                    .iter()
                    .take(max)
                    .filter_map(|position| inner.events.get(position).cloned())
                    .collect()
            }
        };
        Ok(Box::new(events.into_iter().map(Ok)))
    }

    fn count(&self, since: Option<&SortableUniqueId>) -> Result<u64> {
        Ok(self
            .inner
            .read()
            .events
            .range((after(since), Bound::Unbounded))
            .count() as u64)
    }

    fn latest_for_tag(&self, tag: &Tag) -> Result<Option<SortableUniqueId>> {
        Ok(self
            .inner
            .read()
            .by_tag
            .get(tag)
            .and_then(|positions| positions.last())
            .map(|(id, _)| id.clone()))
    }

    fn stats(&self) -> Result<EventLogStats> {
        let inner = self.inner.read();
        Ok(EventLogStats {
            event_count: inner.events.len() as u64,
            oldest: inner.events.keys().next().map(|(id, _)| id.clone()),
            newest: inner.events.keys().next_back().map(|(id, _)| id.clone()),
            tag_count: inner.by_tag.len(),
            total_bytes: 0,
        })
    }
}

/// Blob storage in a map, with keys `"{prefix}/{uuid}.snap"`.
#[derive(Default)]
pub struct InMemoryBlobStorage {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a blob, e.g. to simulate storage loss.
    pub fn remove(&self, key: &str) -> bool {
        self.blobs.write().remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobAccessor for InMemoryBlobStorage {
    fn provider_name(&self) -> &str {
        "memory"
    }

    fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| TagstreamError::NotFound(format!("blob {key}")))
    }

    fn write(&self, bytes: &[u8], key_prefix: &str) -> Result<String> {
        let key = format!("{key_prefix}/{}.snap", Uuid::new_v4());
        self.blobs.write().insert(key.clone(), bytes.to_vec());
        Ok(key)
    }
}

/// Snapshot rows in a map, with optional blob offload.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    rows: Mutex<BTreeMap<(String, String), SnapshotRecord>>,
    blobs: Option<Arc<dyn BlobAccessor>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob_storage(mut self, blobs: Arc<dyn BlobAccessor>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    fn resolve(&self, mut record: SnapshotRecord) -> Result<SnapshotRecord> {
        if let Some(offload) = &record.offload {
            record.state_data =
                fetch_payload(offload, record.compressed_size, self.blobs.as_deref())?;
        }
        Ok(record)
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn get_latest(
        &self,
        projector_name: &str,
        projector_version: &str,
    ) -> Result<Option<SnapshotRecord>> {
        let row = self
            .rows
            .lock()
            .get(&(projector_name.to_string(), projector_version.to_string()))
            .cloned();
        row.map(|record| self.resolve(record)).transpose()
    }

    fn get_latest_any_version(&self, projector_name: &str) -> Result<Option<SnapshotRecord>> {
        let row = self
            .rows
            .lock()
            .values()
            .filter(|r| r.projector_name == projector_name)
            .max_by(|a, b| {
                a.events_processed
                    .cmp(&b.events_processed)
                    .then(a.updated_at.cmp(&b.updated_at))
            })
            .cloned();
        row.map(|record| self.resolve(record)).transpose()
    }

    fn upsert(&self, record: &SnapshotRecord, offload_threshold: usize) -> Result<SnapshotInfo> {
        let offload = place_payload(record, offload_threshold, self.blobs.as_deref())?;
        let mut stored = record.clone();
        if offload.is_some() {
            stored.state_data = Vec::new();
        }
        stored.offload = offload;

        let key = (
            record.projector_name.clone(),
            record.projector_version.clone(),
        );
        let mut rows = self.rows.lock();
        if let Some(previous) = rows.get(&key) {
            stored.created_at = previous.created_at;
        }
        let info = stored.info();
        rows.insert(key, stored);
        Ok(info)
    }

    fn list_all(&self) -> Result<Vec<SnapshotInfo>> {
        Ok(self.rows.lock().values().map(SnapshotRecord::info).collect())
    }

    fn delete(&self, projector_name: &str, projector_version: &str) -> Result<bool> {
        Ok(self
            .rows
            .lock()
            .remove(&(projector_name.to_string(), projector_version.to_string()))
            .is_some())
    }
}
