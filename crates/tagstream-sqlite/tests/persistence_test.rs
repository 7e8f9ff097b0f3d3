use chrono::{Duration, Utc};
use tagstream_core::{
    ReservationSlot, ReservationStore, SnapshotRecord, SnapshotStore, SortableUniqueId, Tag,
    TagWriteReservation,
};
use tagstream_sqlite::{SqliteConfig, SqliteReservationStore, SqliteSnapshotStore};
use tempfile::TempDir;

fn record() -> SnapshotRecord {
    let now = Utc::now();
    SnapshotRecord {
        projector_name: "ledger".into(),
        projector_version: "3".into(),
        payload_type: "Balance".into(),
        last_sortable_unique_id: Some(SortableUniqueId::generate(now, 1)),
        last_event_id: None,
        events_processed: 42,
        state_data: b"compressed".to_vec(),
        offload: None,
        original_size: 100,
        compressed_size: 10,
        safe_window_threshold: None,
        created_at: now,
        updated_at: now,
        build_source: "test".into(),
        build_host: "ci".into(),
    }
}

#[test]
fn test_snapshot_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let cfg = SqliteConfig::new(dir.path().join("nested").join("snapshots.db"));
    let rec = record();
    {
        let store = SqliteSnapshotStore::open(&cfg).unwrap();
        store.upsert(&rec, 1_000_000).unwrap();
    }

    let store = SqliteSnapshotStore::open(&cfg).unwrap();
    assert_eq!(store.get_latest("ledger", "3").unwrap(), Some(rec));
    let listed = store.list_all().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].compressed_size, 10);
}

#[test]
fn test_two_connections_share_reservations() {
    let dir = TempDir::new().unwrap();
    let cfg = SqliteConfig::new(dir.path().join("snapshots.db"));
    let a = SqliteReservationStore::open(&cfg).unwrap();
    let b = SqliteReservationStore::open(&cfg).unwrap();
    let tag: Tag = "wallet:9".parse().unwrap();
    let now = Utc::now();

    let held = TagWriteReservation::issue(tag.clone(), now + Duration::seconds(30));
    assert_eq!(
        a.create_if_absent_or_expired(&held, now).unwrap(),
        ReservationSlot::Created
    );
    let rival = TagWriteReservation::issue(tag.clone(), now + Duration::seconds(30));
    assert!(matches!(
        b.create_if_absent_or_expired(&rival, now).unwrap(),
        ReservationSlot::Occupied(r) if r.reservation_code == held.reservation_code
    ));

    assert!(b.delete(&tag, &held.reservation_code).unwrap());
    assert_eq!(a.lookup(&tag).unwrap(), None);
}
