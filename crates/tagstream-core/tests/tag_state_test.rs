use chrono::Utc;
use serde::{Deserialize, Serialize};
use tagstream_core::{
    PendingEvent, SortableUniqueId, Tag, TagProjector, TagState, TagstreamError, TypedPayload,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
enum CartEvent {
    ItemAdded { sku: String, price: u64 },
    CartAbandoned,
}

impl TypedPayload for CartEvent {
    const TYPE_NAMES: &'static [&'static str] = &["ItemAdded", "CartAbandoned"];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
enum Cart {
    Open { total: u64, items: u32 },
    Abandoned,
}

impl TypedPayload for Cart {
    const TYPE_NAMES: &'static [&'static str] = &["Open", "Abandoned"];
}

struct CartProjector;

impl TagProjector for CartProjector {
    type Payload = Cart;
    type Event = CartEvent;

    const NAME: &'static str = "cart";
    const VERSION: &'static str = "1";
    const TAG_GROUP: &'static str = "cart";

    fn initial_payload() -> Cart {
        Cart::Open { total: 0, items: 0 }
    }

    fn project(payload: Cart, event: &CartEvent) -> Cart {
        match (payload, event) {
            (Cart::Open { total, items }, CartEvent::ItemAdded { price, .. }) => Cart::Open {
                total: total + price,
                items: items + 1,
            },
            (_, CartEvent::CartAbandoned) => Cart::Abandoned,
            (other, _) => other,
        }
    }

    fn is_retired(payload: &Cart) -> bool {
        matches!(payload, Cart::Abandoned)
    }
}

fn stamp(payload: &CartEvent, tag: &Tag, token: u64) -> tagstream_core::Event {
    let ts = Utc::now();
    PendingEvent::new(payload, [tag.clone()])
        .unwrap()
        .stamp(SortableUniqueId::generate(ts, token))
}

#[test]
fn folds_events_and_tracks_version() {
    let tag: Tag = "cart:c1".parse().unwrap();
    let mut state = TagState::empty::<CartProjector>(tag.clone());

    let e1 = stamp(&CartEvent::ItemAdded { sku: "a".into(), price: 100 }, &tag, 1);
    let e2 = stamp(&CartEvent::ItemAdded { sku: "b".into(), price: 25 }, &tag, 2);
    assert!(state.apply::<CartProjector>(&e1).unwrap());
    assert!(state.apply::<CartProjector>(&e2).unwrap());

    assert_eq!(state.payload, Cart::Open { total: 125, items: 2 });
    assert_eq!(state.version, 2);
    assert_eq!(state.last_sortable_unique_id.as_ref(), Some(&e2.sortable_unique_id));
    assert_eq!(state.projector_name, "cart");
}

#[test]
fn replayed_event_is_ignored() {
    let tag: Tag = "cart:c2".parse().unwrap();
    let mut state = TagState::empty::<CartProjector>(tag.clone());
    let e1 = stamp(&CartEvent::ItemAdded { sku: "a".into(), price: 10 }, &tag, 1);
    state.apply::<CartProjector>(&e1).unwrap();
    let before = state.clone();
    assert!(!state.apply::<CartProjector>(&e1).unwrap());
    assert_eq!(state, before);
}

#[test]
fn foreign_and_untagged_events_are_ignored() {
    let tag: Tag = "cart:c3".parse().unwrap();
    let other: Tag = "cart:c4".parse().unwrap();
    let mut state = TagState::empty::<CartProjector>(tag.clone());

    let foreign = PendingEvent::raw("InvoiceSent", serde_json::json!({}), [tag.clone()])
        .unwrap()
        .stamp(SortableUniqueId::generate(Utc::now(), 1));
    assert!(!state.apply::<CartProjector>(&foreign).unwrap());

    let elsewhere = stamp(&CartEvent::CartAbandoned, &other, 2);
    assert!(!state.apply::<CartProjector>(&elsewhere).unwrap());
    assert_eq!(state.version, 0);
}

#[test]
fn malformed_payload_is_projection_error() {
    let tag: Tag = "cart:c5".parse().unwrap();
    let mut state = TagState::empty::<CartProjector>(tag.clone());
    let bad = PendingEvent::raw("ItemAdded", serde_json::json!({ "sku": 1 }), [tag.clone()])
        .unwrap()
        .stamp(SortableUniqueId::generate(Utc::now(), 1));
    let err = state.apply::<CartProjector>(&bad).unwrap_err();
    assert!(matches!(err, TagstreamError::Projection(_)));
    assert_eq!(state.version, 0);
}

#[test]
fn retired_payload_is_reported() {
    let tag: Tag = "cart:c6".parse().unwrap();
    let mut state = TagState::empty::<CartProjector>(tag.clone());
    state
        .apply::<CartProjector>(&stamp(&CartEvent::CartAbandoned, &tag, 1))
        .unwrap();
    assert!(state.is_retired::<CartProjector>());
}
