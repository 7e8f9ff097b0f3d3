//! Projectors that work on any log, without domain payload types.

use crate::multi_projector::MultiProjector;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tagstream_core::{DecodedEvent, Event, Result, SortableUniqueId, Tag};

const TAG_SUMMARY_TYPE: &str = "TagSummary";
const EVENT_TYPE_COUNT_TYPE: &str = "EventTypeCount";

/// Per-tag event count and span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSummary {
    pub events: u64,
    pub first: SortableUniqueId,
    pub last: SortableUniqueId,
    pub last_event_type: String,
}

/// Catalog of every tag seen in the log.
#[derive(Debug, Clone, Default)]
pub struct TagCatalogProjector;

impl TagCatalogProjector {
    pub const NAME: &'static str = "tag-catalog";
    pub const VERSION: &'static str = "1";
}

impl MultiProjector for TagCatalogProjector {
    type Key = Tag;
    type State = TagSummary;
    type Payload = ();

    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> &str {
        Self::VERSION
    }

    fn decode(&self, _event: &Event) -> std::result::Result<Option<()>, String> {
        Ok(Some(()))
    }

    fn affected_keys(&self, event: &DecodedEvent<()>) -> Vec<Tag> {
        event.tags.clone()
    }

    fn project_item(
        &self,
        _key: &Tag,
        state: Option<&TagSummary>,
        event: &DecodedEvent<()>,
    ) -> Option<TagSummary> {
        Some(match state {
            Some(summary) => TagSummary {
                events: summary.events + 1,
                first: summary.first.clone(),
                last: event.sortable_unique_id.clone(),
                last_event_type: event.event_type.clone(),
            },
            None => TagSummary {
                events: 1,
                first: event.sortable_unique_id.clone(),
                last: event.sortable_unique_id.clone(),
                last_event_type: event.event_type.clone(),
            },
        })
    }

    fn encode_state(&self, state: &TagSummary) -> Result<(String, Value)> {
        Ok((TAG_SUMMARY_TYPE.to_string(), serde_json::to_value(state)?))
    }

    fn decode_state(&self, _key: &Tag, type_name: &str, payload: &Value) -> Option<Result<TagSummary>> {
        (type_name == TAG_SUMMARY_TYPE)
            .then(|| serde_json::from_value(payload.clone()).map_err(Into::into))
    }
}

/// Number of events per event type.
#[derive(Debug, Clone, Default)]
pub struct EventTypeCountProjector;

impl EventTypeCountProjector {
    pub const NAME: &'static str = "event-type-count";
    pub const VERSION: &'static str = "1";
}

impl MultiProjector for EventTypeCountProjector {
    type Key = String;
    type State = u64;
    type Payload = ();

    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> &str {
        Self::VERSION
    }

    fn decode(&self, _event: &Event) -> std::result::Result<Option<()>, String> {
        Ok(Some(()))
    }

    fn affected_keys(&self, event: &DecodedEvent<()>) -> Vec<String> {
        vec![event.event_type.clone()]
    }

    fn project_item(&self, _key: &String, state: Option<&u64>, _event: &DecodedEvent<()>) -> Option<u64> {
        Some(state.copied().unwrap_or(0) + 1)
    }

    fn encode_state(&self, state: &u64) -> Result<(String, Value)> {
        Ok((EVENT_TYPE_COUNT_TYPE.to_string(), Value::from(*state)))
    }

    fn decode_state(&self, _key: &String, type_name: &str, payload: &Value) -> Option<Result<u64>> {
        (type_name == EVENT_TYPE_COUNT_TYPE).then(|| {
            payload.as_u64().ok_or_else(|| {
                tagstream_core::TagstreamError::Serialization(format!(
                    "event type count must be an integer, got {payload}"
                ))
            })
        })
    }
}
