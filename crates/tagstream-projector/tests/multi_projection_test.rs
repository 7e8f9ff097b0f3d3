mod common;

use common::{raw_event, shop_event, sid, Item, ItemProjector, ShopEvent};
use serde_json::json;
use tagstream_core::TagstreamError;
use tagstream_projector::{deserialize, serialize, ApplyOutcome, MultiProjectionState};

fn added(ms: i64, id: u32, price: u64) -> tagstream_core::Event {
    shop_event(ms, ShopEvent::ItemAdded { id, price })
}

#[test]
fn test_current_and_safe_views_diverge_above_threshold() {
    let mut state = MultiProjectionState::new(ItemProjector::default());
    let e1 = added(1, 1, 100);
    let e2 = added(2, 2, 25);
    state.apply(&e1, None).unwrap();
    state.apply(&e2, None).unwrap();

    let current = state.to_current_view();
    assert_eq!(current.items.len(), 2);
    assert_eq!(current.version, 2);

    let safe = state.to_safe_view(&e1.sortable_unique_id);
    assert_eq!(safe.items.len(), 1);
    assert_eq!(safe.items[&1], Item { price: 100, updates: 1 });
    assert_eq!(safe.last_sortable_unique_id, Some(e1.sortable_unique_id.clone()));
    assert_eq!(safe.version, 1);
}

#[test]
fn test_promotion_moves_events_into_safe_state() {
    let mut state = MultiProjectionState::new(ItemProjector::default());
    let e1 = added(1, 1, 100);
    let e2 = shop_event(2, ShopEvent::PriceChanged { id: 1, price: 90 });
    state.apply(&e1, None).unwrap();
    state.apply(&e2, None).unwrap();
    assert!(!state.is_safe());
    assert!(state.payload().is_key_unsafe(&1));

    let promoted = state.promote(&e2.sortable_unique_id);
    assert_eq!(promoted, 2);
    assert!(state.is_safe());
    assert!(!state.payload().is_key_unsafe(&1));
    assert_eq!(
        state.to_safe_view(&e2.sortable_unique_id).items[&1],
        Item { price: 90, updates: 2 }
    );
}

#[test]
fn test_duplicate_and_stale_events_are_ignored() {
    let mut state = MultiProjectionState::new(ItemProjector::default());
    let e1 = added(1, 1, 100);
    let e2 = shop_event(5, ShopEvent::PriceChanged { id: 1, price: 120 });
    state.apply(&e1, None).unwrap();
    state.apply(&e2, None).unwrap();

    assert_eq!(state.apply(&e2, None).unwrap(), ApplyOutcome::Duplicate);
    // Older than the key's mark.
    let stale = shop_event(3, ShopEvent::PriceChanged { id: 1, price: 1 });
    assert_eq!(state.apply(&stale, None).unwrap(), ApplyOutcome::Duplicate);

    assert_eq!(state.version(), 2);
    assert_eq!(state.to_current_view().items[&1].price, 120);
}

#[test]
fn test_out_of_order_events_on_distinct_keys_are_accepted() {
    let mut state = MultiProjectionState::new(ItemProjector::default());
    state.apply(&added(10, 1, 100), None).unwrap();
    let late = added(4, 2, 7);
    assert!(state.apply(&late, None).unwrap().is_applied());
    assert_eq!(state.to_current_view().items.len(), 2);
    // Position never moves backwards.
    assert_eq!(state.last_sortable_unique_id(), Some(&sid(10)));
}

#[test]
fn test_foreign_event_is_filtered_but_advances_position() {
    let mut state = MultiProjectionState::new(ItemProjector::default());
    let foreign = raw_event(1, "UserRegistered", json!({"name": "ada"}));
    assert_eq!(state.apply(&foreign, None).unwrap(), ApplyOutcome::Filtered);
    assert_eq!(state.version(), 0);
    assert_eq!(state.last_sortable_unique_id(), Some(&foreign.sortable_unique_id));
}

#[test]
fn test_malformed_known_event_leaves_state_untouched() {
    let mut state = MultiProjectionState::new(ItemProjector::default());
    state.apply(&added(1, 1, 100), None).unwrap();
    let broken = raw_event(2, "PriceChanged", json!({"id": "not a number"}));

    let err = state.apply(&broken, None).unwrap_err();
    assert_eq!(err.projector, "items");
    assert_eq!(err.event_type, "PriceChanged");
    assert_eq!(state.version(), 1);
    assert_eq!(state.last_sortable_unique_id(), Some(&sid(1)));
}

#[test]
fn test_removed_key_stays_removed_for_late_duplicates() {
    let mut state = MultiProjectionState::new(ItemProjector::default());
    let add = added(1, 1, 100);
    state.apply(&add, None).unwrap();
    state
        .apply(&shop_event(2, ShopEvent::ItemRemoved { id: 1 }), None)
        .unwrap();
    assert!(state.to_current_view().items.is_empty());

    assert_eq!(state.apply(&add, None).unwrap(), ApplyOutcome::Duplicate);
    assert!(state.to_current_view().items.is_empty());
}

#[test]
fn test_snapshot_round_trip_restores_safe_view_and_tail_replays() {
    let events = vec![
        added(1, 1, 100),
        added(2, 2, 25),
        shop_event(3, ShopEvent::ItemRemoved { id: 2 }),
        shop_event(4, ShopEvent::PriceChanged { id: 1, price: 80 }),
        added(5, 3, 9),
    ];
    let threshold = sid(3);

    let mut original = MultiProjectionState::new(ItemProjector::default());
    for event in &events {
        original.apply(event, Some(&threshold)).unwrap();
    }

    let snapshot = serialize(&original, &threshold, 3).unwrap();
    assert_eq!(snapshot.events_processed, 3);
    assert_eq!(snapshot.last_sortable_unique_id, Some(sid(3)));
    assert!(snapshot.compressed_size > 0);

    let mut restored = deserialize(ItemProjector::default(), &snapshot.bytes, None).unwrap();
    assert_eq!(
        restored.to_safe_view(&threshold).items,
        original.to_safe_view(&threshold).items
    );
    assert_eq!(restored.version(), 3);

    // Replay the whole log; everything at or below the snapshot is a duplicate.
    for event in &events {
        restored.apply(event, Some(&threshold)).unwrap();
    }
    assert_eq!(restored.to_current_view().items, original.to_current_view().items);
    assert_eq!(restored.version(), original.version());
    // Removed key 2 did not come back from its replayed ItemAdded.
    assert!(!restored.to_current_view().items.contains_key(&2));
}

#[test]
fn test_deserialize_rejects_other_projector_version() {
    let mut state = MultiProjectionState::new(ItemProjector::default());
    state.apply(&added(1, 1, 100), Some(&sid(1))).unwrap();
    let snapshot = serialize(&state, &sid(1), 3).unwrap();

    let err = deserialize(ItemProjector { version: "2" }, &snapshot.bytes, None).unwrap_err();
    assert!(matches!(
        err,
        TagstreamError::VersionMismatch { ref expected, ref found } if expected == "2" && found == "1"
    ));
}

#[test]
fn test_deserialize_skips_unknown_item_types() {
    let document = json!({
        "v": 1,
        "projector_name": "items",
        "projector_version": "1",
        "threshold": sid(10).to_string(),
        "last_sortable_unique_id": sid(2).to_string(),
        "last_event_id": uuid::Uuid::new_v4(),
        "version": 2,
        "items": [
            {"key": "1", "type": "Item", "payload": {"price": 5, "updates": 1}, "last": sid(1).to_string()},
            {"key": "2", "type": "LegacyItem", "payload": {"cost": 3}, "last": sid(2).to_string()}
        ],
        "retired": []
    });
    let raw = serde_json::to_vec(&document).unwrap();
    let bytes = zstd::stream::encode_all(raw.as_slice(), 3).unwrap();

    let state = deserialize(ItemProjector::default(), &bytes, None).unwrap();
    let view = state.to_safe_view(&sid(10));
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[&1], Item { price: 5, updates: 1 });
}

#[test]
fn test_deserialize_rejects_corrupt_bytes() {
    let err = deserialize(ItemProjector::default(), b"definitely not zstd", None).unwrap_err();
    assert!(!matches!(err, TagstreamError::VersionMismatch { .. }));
}
