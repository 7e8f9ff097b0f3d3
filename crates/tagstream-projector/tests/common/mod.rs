#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tagstream_core::{
    DecodedEvent, Event, EventLog, EventLogIterator, EventLogStats, PendingEvent, Result,
    SortableUniqueId, Tag, TagWriteOutcome, TagstreamError, TypedPayload,
};
use tagstream_projector::MultiProjector;

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

pub fn sid(ms: i64) -> SortableUniqueId {
    SortableUniqueId::generate(base_time() + Duration::milliseconds(ms), 0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ShopEvent {
    ItemAdded { id: u32, price: u64 },
    PriceChanged { id: u32, price: u64 },
    ItemRemoved { id: u32 },
}

impl TypedPayload for ShopEvent {
    const TYPE_NAMES: &'static [&'static str] = &["ItemAdded", "PriceChanged", "ItemRemoved"];
}

pub fn shop_event(ms: i64, payload: ShopEvent) -> Event {
    let tag: Tag = "shop:main".parse().unwrap();
    PendingEvent::new(&payload, [tag]).unwrap().stamp(sid(ms))
}

pub fn raw_event(ms: i64, event_type: &str, payload: Value) -> Event {
    PendingEvent::raw(event_type, payload, Vec::<Tag>::new())
        .unwrap()
        .stamp(sid(ms))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub price: u64,
    pub updates: u32,
}

/// Items keyed by id.
#[derive(Debug, Clone)]
pub struct ItemProjector {
    pub version: &'static str,
}

impl Default for ItemProjector {
    fn default() -> Self {
        Self { version: "1" }
    }
}

impl MultiProjector for ItemProjector {
    type Key = u32;
    type State = Item;
    type Payload = ShopEvent;

    fn name(&self) -> &str {
        "items"
    }

    fn version(&self) -> &str {
        self.version
    }

    fn decode(&self, event: &Event) -> std::result::Result<Option<ShopEvent>, String> {
        match event.decode::<ShopEvent>() {
            None => Ok(None),
            Some(Ok(payload)) => Ok(Some(payload)),
            Some(Err(e)) => Err(e.to_string()),
        }
    }

    fn affected_keys(&self, event: &DecodedEvent<ShopEvent>) -> Vec<u32> {
        match &event.payload {
            ShopEvent::ItemAdded { id, .. }
            | ShopEvent::PriceChanged { id, .. }
            | ShopEvent::ItemRemoved { id } => vec![*id],
        }
    }

    fn project_item(
        &self,
        _key: &u32,
        state: Option<&Item>,
        event: &DecodedEvent<ShopEvent>,
    ) -> Option<Item> {
        match &event.payload {
            ShopEvent::ItemAdded { price, .. } => Some(Item {
                price: *price,
                updates: state.map_or(0, |s| s.updates) + 1,
            }),
            ShopEvent::PriceChanged { price, .. } => state.map(|s| Item {
                price: *price,
                updates: s.updates + 1,
            }),
            ShopEvent::ItemRemoved { .. } => None,
        }
    }

    fn encode_state(&self, state: &Item) -> Result<(String, Value)> {
        Ok(("Item".to_string(), serde_json::to_value(state)?))
    }

    fn decode_state(&self, _key: &u32, type_name: &str, payload: &Value) -> Option<Result<Item>> {
        (type_name == "Item").then(|| serde_json::from_value(payload.clone()).map_err(Into::into))
    }
}

/// Event log backed by a vector, for host tests.
#[derive(Default)]
pub struct VecLog(pub Mutex<Vec<Event>>);

impl VecLog {
    pub fn push(&self, event: Event) {
        self.0.lock().push(event);
    }
}

impl EventLog for VecLog {
    fn append(&self, events: &[Event]) -> Result<Vec<TagWriteOutcome>> {
        self.0.lock().extend_from_slice(events);
        Ok(TagWriteOutcome::summarize(events))
    }

    fn read_since(
        &self,
        tag: Option<&Tag>,
        since: Option<&SortableUniqueId>,
        max: Option<usize>,
    ) -> Result<Box<dyn EventLogIterator>> {
        let mut events: Vec<Event> = self
            .0
            .lock()
            .iter()
            .filter(|e| tag.map_or(true, |t| e.has_tag(t)))
            .filter(|e| since.map_or(true, |s| &e.sortable_unique_id > s))
            .cloned()
            .collect();
        events.sort_by(|a, b| a.sortable_unique_id.cmp(&b.sortable_unique_id));
        events.truncate(max.unwrap_or(usize::MAX));
        Ok(Box::new(events.into_iter().map(Ok)))
    }

    fn count(&self, since: Option<&SortableUniqueId>) -> Result<u64> {
        Ok(self.read_since(None, since, None)?.count() as u64)
    }

    fn stats(&self) -> Result<EventLogStats> {
        Err(TagstreamError::InvalidState("not tracked".into()))
    }
}
