use super::{SortableUniqueId, Tag};
use crate::error::{Result, ValidationError};
use crate::payload::{decode_payload, encode_payload, TypedPayload};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Immutable record in the event log.
///
/// Ordering is by `sortable_unique_id`, never by insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub sortable_unique_id: SortableUniqueId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub metadata: EventMetadata,
}

/// Event metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_user: Option<String>,

    /// Custom fields
    #[serde(flatten)]
    pub custom: HashMap<String, serde_json::Value>,
}

impl Event {
    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }

    pub fn tags_in_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a Tag> + 'a {
        self.tags.iter().filter(move |t| t.is_in_group(group))
    }

    /// Decode the payload as `P`. `None` if the event type is not one of `P`'s variants.
    pub fn decode<P: TypedPayload>(&self) -> Option<Result<P>> {
        decode_payload(&self.event_type, &self.payload)
    }
}

/// An event a writer intends to append. The writer assigns the id and
/// sortable id when it commits.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
    pub tags: Vec<Tag>,
    pub metadata: EventMetadata,
}

impl PendingEvent {
    /// Build from a typed payload. Duplicate tags are collapsed.
    pub fn new<P: TypedPayload>(payload: &P, tags: impl IntoIterator<Item = Tag>) -> Result<Self> {
        let (event_type, payload) = encode_payload(payload)?;
        Self::raw(event_type, payload, tags)
    }

    /// Build from an already encoded payload.
    pub fn raw(
        event_type: impl Into<String>,
        payload: serde_json::Value,
        tags: impl IntoIterator<Item = Tag>,
    ) -> Result<Self> {
        let event_type = event_type.into();
        if event_type.trim().is_empty() {
            return Err(ValidationError::EmptyEventType.into());
        }
        let mut tags: Vec<Tag> = tags.into_iter().collect();
        tags.sort();
        tags.dedup();
        Ok(Self {
            event_type,
            payload,
            tags,
            metadata: EventMetadata::default(),
        })
    }

    pub fn with_causation_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.causation_id = Some(id.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.correlation_id = Some(id.into());
        self
    }

    pub fn with_executed_user(mut self, user: impl Into<String>) -> Self {
        self.metadata.executed_user = Some(user.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.custom.insert(key.into(), value);
        self
    }

    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }

    /// Assign identity and position.
    pub fn stamp(self, sortable_unique_id: SortableUniqueId) -> Event {
        Event {
            id: Uuid::new_v4(),
            sortable_unique_id,
            event_type: self.event_type,
            payload: self.payload,
            tags: self.tags,
            metadata: self.metadata,
        }
    }
}

/// An event whose payload has been decoded into a projector's closed sum type.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent<P> {
    pub id: Uuid,
    pub sortable_unique_id: SortableUniqueId,
    pub event_type: String,
    pub tags: Vec<Tag>,
    pub payload: P,
}

impl<P> DecodedEvent<P> {
    pub fn from_event(event: &Event, payload: P) -> Self {
        Self {
            id: event.id,
            sortable_unique_id: event.sortable_unique_id.clone(),
            event_type: event.event_type.clone(),
            tags: event.tags.clone(),
            payload,
        }
    }
}

/// Anything with a position in the event stream.
pub trait Sequenced {
    fn sortable_unique_id(&self) -> &SortableUniqueId;
    fn event_id(&self) -> Uuid;
}

impl Sequenced for Event {
    fn sortable_unique_id(&self) -> &SortableUniqueId {
        &self.sortable_unique_id
    }

    fn event_id(&self) -> Uuid {
        self.id
    }
}

impl<P> Sequenced for DecodedEvent<P> {
    fn sortable_unique_id(&self) -> &SortableUniqueId {
        &self.sortable_unique_id
    }

    fn event_id(&self) -> Uuid {
        self.id
    }
}

/// Per-tag result of an append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagWriteOutcome {
    pub tag: Tag,
    pub events_written: usize,
    pub last_sortable_unique_id: SortableUniqueId,
}

impl TagWriteOutcome {
    /// Summarize an appended batch per tag, sorted by tag.
    pub fn summarize(events: &[Event]) -> Vec<TagWriteOutcome> {
        let mut by_tag: std::collections::BTreeMap<&Tag, (usize, &SortableUniqueId)> =
            std::collections::BTreeMap::new();
        for event in events {
            for tag in &event.tags {
                let entry = by_tag.entry(tag).or_insert((0, &event.sortable_unique_id));
                entry.0 += 1;
                if event.sortable_unique_id > *entry.1 {
                    entry.1 = &event.sortable_unique_id;
                }
            }
        }
        by_tag
            .into_iter()
            .map(|(tag, (count, last))| TagWriteOutcome {
                tag: tag.clone(),
                events_written: count,
                last_sortable_unique_id: last.clone(),
            })
            .collect()
    }
}
