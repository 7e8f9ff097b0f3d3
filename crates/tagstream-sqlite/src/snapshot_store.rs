use crate::schema::{self, db_err, format_time, parse_time, SqliteConfig};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;
use tagstream_core::offload::{fetch_payload, place_payload};
use tagstream_core::{
    BlobAccessor, OffloadRef, Result, SnapshotInfo, SnapshotRecord, SnapshotStore,
    SortableUniqueId, TagstreamError,
};
use uuid::Uuid;

const SELECT_COLUMNS: &str = "projector_name, projector_version, payload_type,
    last_sortable_unique_id, last_event_id, events_processed, state_data,
    offload_key, offload_provider, original_size, compressed_size,
    safe_window_threshold, created_at, updated_at, build_source, build_host";

/// Snapshot table in SQLite with optional blob offload for large payloads.
pub struct SqliteSnapshotStore {
    conn: Mutex<Connection>,
    blobs: Option<Arc<dyn BlobAccessor>>,
}

impl SqliteSnapshotStore {
    pub fn open(cfg: &SqliteConfig) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(schema::open(cfg)?),
            blobs: None,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(schema::open_in_memory()?),
            blobs: None,
        })
    }

    /// Offload payloads above the caller's threshold to `blobs`.
    pub fn with_blob_storage(mut self, blobs: Arc<dyn BlobAccessor>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    fn query_one(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Option<SnapshotRecord>> {
        let raw = {
            let conn = self.conn.lock();
            conn.query_row(sql, args, RawRow::read)
                .optional()
                .map_err(db_err)?
        };
        raw.map(|raw| self.resolve(raw)).transpose()
    }

    /// Turn a raw row into a record, reading offloaded bytes back.
    fn resolve(&self, raw: RawRow) -> Result<SnapshotRecord> {
        let mut record = raw.into_record()?;
        if let Some(offload) = &record.offload {
            record.state_data = fetch_payload(offload, record.compressed_size, self.blobs.as_deref())?;
        }
        Ok(record)
    }
}

/// Column values before parsing, so row mapping stays infallible.
struct RawRow {
    projector_name: String,
    projector_version: String,
    payload_type: String,
    last_sortable_unique_id: Option<String>,
    last_event_id: Option<String>,
    events_processed: i64,
    state_data: Option<Vec<u8>>,
    offload_key: Option<String>,
    offload_provider: Option<String>,
    original_size: i64,
    compressed_size: i64,
    safe_window_threshold: Option<String>,
    created_at: String,
    updated_at: String,
    build_source: String,
    build_host: String,
}

impl RawRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            projector_name: row.get(0)?,
            projector_version: row.get(1)?,
            payload_type: row.get(2)?,
            last_sortable_unique_id: row.get(3)?,
            last_event_id: row.get(4)?,
            events_processed: row.get(5)?,
            state_data: row.get(6)?,
            offload_key: row.get(7)?,
            offload_provider: row.get(8)?,
            original_size: row.get(9)?,
            compressed_size: row.get(10)?,
            safe_window_threshold: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
            build_source: row.get(14)?,
            build_host: row.get(15)?,
        })
    }

    fn into_record(self) -> Result<SnapshotRecord> {
        let offload = match (self.offload_key, self.offload_provider) {
            (Some(key), Some(provider)) => Some(OffloadRef { key, provider }),
            (Some(key), None) => Some(OffloadRef {
                key,
                provider: String::new(),
            }),
            _ => None,
        };
        Ok(SnapshotRecord {
            projector_name: self.projector_name,
            projector_version: self.projector_version,
            payload_type: self.payload_type,
            last_sortable_unique_id: parse_id(self.last_sortable_unique_id)?,
            last_event_id: self
                .last_event_id
                .map(|raw| {
                    Uuid::parse_str(&raw)
                        .map_err(|e| TagstreamError::Storage(format!("invalid event id {raw:?}: {e}")))
                })
                .transpose()?,
            events_processed: self.events_processed as u64,
            state_data: self.state_data.unwrap_or_default(),
            offload,
            original_size: self.original_size as u64,
            compressed_size: self.compressed_size as u64,
            safe_window_threshold: parse_id(self.safe_window_threshold)?,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
            build_source: self.build_source,
            build_host: self.build_host,
        })
    }
}

fn parse_id(raw: Option<String>) -> Result<Option<SortableUniqueId>> {
    raw.map(|raw| raw.parse().map_err(TagstreamError::from))
        .transpose()
}

impl SnapshotStore for SqliteSnapshotStore {
    fn get_latest(
        &self,
        projector_name: &str,
        projector_version: &str,
    ) -> Result<Option<SnapshotRecord>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM projection_snapshots
             WHERE projector_name = ?1 AND projector_version = ?2"
        );
        self.query_one(&sql, &[&projector_name, &projector_version])
    }

    fn get_latest_any_version(&self, projector_name: &str) -> Result<Option<SnapshotRecord>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM projection_snapshots
             WHERE projector_name = ?1
             ORDER BY events_processed DESC, updated_at DESC
             LIMIT 1"
        );
        self.query_one(&sql, &[&projector_name])
    }

    fn upsert(&self, record: &SnapshotRecord, offload_threshold: usize) -> Result<SnapshotInfo> {
        let offload = place_payload(record, offload_threshold, self.blobs.as_deref())?;
        let inline: Option<&[u8]> = match offload {
            Some(_) => None,
            None => Some(record.state_data.as_slice()),
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO projection_snapshots (
                projector_name, projector_version, payload_type,
                last_sortable_unique_id, last_event_id, events_processed, state_data,
                is_offloaded, offload_key, offload_provider, original_size, compressed_size,
                safe_window_threshold, created_at, updated_at, build_source, build_host
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             ON CONFLICT(projector_name, projector_version) DO UPDATE SET
                payload_type = excluded.payload_type,
                last_sortable_unique_id = excluded.last_sortable_unique_id,
                last_event_id = excluded.last_event_id,
                events_processed = excluded.events_processed,
                state_data = excluded.state_data,
                is_offloaded = excluded.is_offloaded,
                offload_key = excluded.offload_key,
                offload_provider = excluded.offload_provider,
                original_size = excluded.original_size,
                compressed_size = excluded.compressed_size,
                safe_window_threshold = excluded.safe_window_threshold,
                updated_at = excluded.updated_at,
                build_source = excluded.build_source,
                build_host = excluded.build_host",
            params![
                record.projector_name,
                record.projector_version,
                record.payload_type,
                record.last_sortable_unique_id.as_ref().map(|id| id.to_string()),
                record.last_event_id.map(|id| id.to_string()),
                record.events_processed as i64,
                inline,
                offload.is_some(),
                offload.as_ref().map(|o| o.key.as_str()),
                offload.as_ref().map(|o| o.provider.as_str()),
                record.original_size as i64,
                record.compressed_size as i64,
                record.safe_window_threshold.as_ref().map(|id| id.to_string()),
                format_time(&record.created_at),
                format_time(&record.updated_at),
                record.build_source,
                record.build_host,
            ],
        )
        .map_err(db_err)?;

        // created_at survives replacement, so read it back.
        let created_at: String = conn
            .query_row(
                "SELECT created_at FROM projection_snapshots
                 WHERE projector_name = ?1 AND projector_version = ?2",
                params![record.projector_name, record.projector_version],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        let mut info = record.info();
        info.created_at = parse_time(&created_at)?;
        info.is_offloaded = offload.is_some();
        info.offload_key = offload.map(|o| o.key);
        Ok(info)
    }

    fn list_all(&self) -> Result<Vec<SnapshotInfo>> {
        let conn = self.conn.lock();
        // Payload bytes are not needed for listing; blank them out in SQL.
        let sql = format!(
            "SELECT {} FROM projection_snapshots ORDER BY projector_name, projector_version",
            SELECT_COLUMNS.replace("state_data", "NULL")
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map([], RawRow::read)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        rows.into_iter()
            .map(|raw| raw.into_record().map(|record| record.info()))
            .collect()
    }

    fn delete(&self, projector_name: &str, projector_version: &str) -> Result<bool> {
        let removed = self
            .conn
            .lock()
            .execute(
                "DELETE FROM projection_snapshots WHERE projector_name = ?1 AND projector_version = ?2",
                params![projector_name, projector_version],
            )
            .map_err(db_err)?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapBlobs(Mutex<HashMap<String, Vec<u8>>>);

    impl BlobAccessor for MapBlobs {
        fn provider_name(&self) -> &str {
            "map"
        }

        fn read(&self, key: &str) -> Result<Vec<u8>> {
            self.0
                .lock()
                .get(key)
                .cloned()
                .ok_or_else(|| TagstreamError::NotFound(key.to_string()))
        }

        fn write(&self, bytes: &[u8], key_prefix: &str) -> Result<String> {
            let key = format!("{key_prefix}/{}.snap", Uuid::new_v4());
            self.0.lock().insert(key.clone(), bytes.to_vec());
            Ok(key)
        }
    }

    fn record(version: &str, events: u64, data: Vec<u8>) -> SnapshotRecord {
        let now = Utc::now();
        SnapshotRecord {
            projector_name: "orders".into(),
            projector_version: version.into(),
            payload_type: "Order".into(),
            last_sortable_unique_id: Some(SortableUniqueId::generate(now, 7)),
            last_event_id: Some(Uuid::new_v4()),
            events_processed: events,
            original_size: data.len() as u64 * 2,
            compressed_size: data.len() as u64,
            state_data: data,
            offload: None,
            safe_window_threshold: Some(SortableUniqueId::upper_bound(now)),
            created_at: now,
            updated_at: now,
            build_source: "test".into(),
            build_host: "localhost".into(),
        }
    }

    #[test]
    fn test_upsert_and_get_inline() {
        let store = SqliteSnapshotStore::open_in_memory().unwrap();
        let rec = record("1", 10, vec![1, 2, 3]);

        let info = store.upsert(&rec, 1024).unwrap();
        assert!(!info.is_offloaded);

        let loaded = store.get_latest("orders", "1").unwrap().unwrap();
        assert_eq!(loaded, rec);
        assert!(store.get_latest("orders", "2").unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces_but_keeps_created_at() {
        let store = SqliteSnapshotStore::open_in_memory().unwrap();
        let first = record("1", 10, vec![1]);
        store.upsert(&first, 1024).unwrap();

        let mut second = record("1", 20, vec![2]);
        second.created_at = first.created_at + Duration::seconds(60);
        second.updated_at = second.created_at;
        let info = store.upsert(&second, 1024).unwrap();
        assert_eq!(info.created_at, first.created_at);
        assert_eq!(info.events_processed, 20);

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].events_processed, 20);
    }

    #[test]
    fn test_large_payload_is_offloaded_and_read_back() {
        let blobs = Arc::new(MapBlobs::default());
        let store = SqliteSnapshotStore::open_in_memory()
            .unwrap()
            .with_blob_storage(blobs.clone());
        let rec = record("1", 5, vec![9u8; 4096]);

        let info = store.upsert(&rec, 1000).unwrap();
        assert!(info.is_offloaded);
        let key = info.offload_key.unwrap();
        assert!(key.starts_with("orders/1/"));

        let loaded = store.get_latest("orders", "1").unwrap().unwrap();
        assert_eq!(loaded.state_data, rec.state_data);
        assert_eq!(loaded.offload.unwrap().provider, "map");

        blobs.0.lock().clear();
        let err = store.get_latest("orders", "1").unwrap_err();
        assert!(err.is_fatal_snapshot_failure());
    }

    #[test]
    fn test_latest_any_version_prefers_most_events() {
        let store = SqliteSnapshotStore::open_in_memory().unwrap();
        store.upsert(&record("1", 500, vec![1]), 1024).unwrap();
        store.upsert(&record("2", 20, vec![2]), 1024).unwrap();

        let best = store.get_latest_any_version("orders").unwrap().unwrap();
        assert_eq!(best.projector_version, "1");

        assert!(store.delete("orders", "1").unwrap());
        assert!(!store.delete("orders", "1").unwrap());
        let best = store.get_latest_any_version("orders").unwrap().unwrap();
        assert_eq!(best.projector_version, "2");
    }
}
