//! Multi-projection of every tag in one group through a [`TagProjector`].

use crate::multi_projector::MultiProjector;
use serde_json::{json, Value};
use std::fmt;
use std::marker::PhantomData;
use tagstream_core::{
    decode_payload, encode_payload, DecodedEvent, Event, Result, Tag, TagProjector, TagState,
    TagstreamError,
};

/// Folds every tag of `P::TAG_GROUP` into a [`TagState`], keyed by tag.
///
/// A payload for which `P::is_retired` holds removes the tag from the view.
pub struct TagMultiProjector<P> {
    name: String,
    _projector: PhantomData<fn() -> P>,
}

impl<P: TagProjector> TagMultiProjector<P> {
    pub fn new() -> Self {
        Self {
            name: format!("{}.{}", P::NAME, P::TAG_GROUP),
            _projector: PhantomData,
        }
    }
}

impl<P: TagProjector> Default for TagMultiProjector<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Clone for TagMultiProjector<P> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _projector: PhantomData,
        }
    }
}

impl<P> fmt::Debug for TagMultiProjector<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagMultiProjector")
            .field("name", &self.name)
            .finish()
    }
}

impl<P: TagProjector> MultiProjector for TagMultiProjector<P> {
    type Key = Tag;
    type State = TagState<P::Payload>;
    type Payload = P::Event;

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        P::VERSION
    }

    fn decode(&self, event: &Event) -> std::result::Result<Option<P::Event>, String> {
        if event.tags_in_group(P::TAG_GROUP).next().is_none() {
            return Ok(None);
        }
        match event.decode::<P::Event>() {
            None => Ok(None),
            Some(Ok(payload)) => Ok(Some(payload)),
            Some(Err(e)) => Err(e.to_string()),
        }
    }

    fn affected_keys(&self, event: &DecodedEvent<P::Event>) -> Vec<Tag> {
        event
            .tags
            .iter()
            .filter(|t| t.is_in_group(P::TAG_GROUP))
            .cloned()
            .collect()
    }

    fn project_item(
        &self,
        key: &Tag,
        state: Option<&TagState<P::Payload>>,
        event: &DecodedEvent<P::Event>,
    ) -> Option<TagState<P::Payload>> {
        let mut next = state
            .cloned()
            .unwrap_or_else(|| TagState::empty::<P>(key.clone()));
        next.apply_decoded::<P>(&event.sortable_unique_id, &event.payload);
        if P::is_retired(&next.payload) {
            None
        } else {
            Some(next)
        }
    }

    fn encode_state(&self, state: &TagState<P::Payload>) -> Result<(String, Value)> {
        let (type_name, data) = encode_payload(&state.payload)?;
        Ok((
            type_name,
            json!({
                "version": state.version,
                "last": state.last_sortable_unique_id,
                "data": data,
            }),
        ))
    }

    fn decode_state(
        &self,
        key: &Tag,
        type_name: &str,
        payload: &Value,
    ) -> Option<Result<TagState<P::Payload>>> {
        let data = payload.get("data").unwrap_or(&Value::Null);
        let decoded = decode_payload::<P::Payload>(type_name, data)?;
        Some(decoded.and_then(|decoded| {
            let version = payload
                .get("version")
                .and_then(Value::as_u64)
                .ok_or_else(|| {
                    TagstreamError::Serialization(format!("tag state for {key} has no version"))
                })?;
            let last = match payload.get("last") {
                None | Some(Value::Null) => None,
                Some(v) => Some(serde_json::from_value(v.clone())?),
            };
            Ok(TagState {
                tag: key.clone(),
                projector_name: P::NAME.to_string(),
                payload: decoded,
                version,
                last_sortable_unique_id: last,
            })
        }))
    }
}
