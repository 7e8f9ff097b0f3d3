use super::{Event, SortableUniqueId, Tag};
use crate::error::{ProjectionError, Result};
use crate::payload::TypedPayload;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Folds the events of a single tag into a typed payload.
///
/// `Payload` and `Event` are closed sum types; events of any other type are
/// ignored. A projector marks a tag as gone by returning a payload for which
/// [`TagProjector::is_retired`] is true.
pub trait TagProjector: Send + Sync + 'static {
    type Payload: TypedPayload + Clone + Debug + PartialEq + Send + Sync;
    type Event: TypedPayload + Clone + Debug + Send + Sync;

    /// Stable projector name.
    const NAME: &'static str;
    /// Bump when the payload shape changes.
    const VERSION: &'static str;
    /// Tag group this projector folds.
    const TAG_GROUP: &'static str;

    fn initial_payload() -> Self::Payload;

    fn project(payload: Self::Payload, event: &Self::Event) -> Self::Payload;

    fn is_retired(_payload: &Self::Payload) -> bool {
        false
    }
}

/// Folded state of one tag under one projector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagState<P> {
    pub tag: Tag,
    pub projector_name: String,
    pub payload: P,
    pub version: u64,
    pub last_sortable_unique_id: Option<SortableUniqueId>,
}

impl<P: Clone> TagState<P> {
    pub fn empty<T: TagProjector<Payload = P>>(tag: Tag) -> Self {
        Self {
            tag,
            projector_name: T::NAME.to_string(),
            payload: T::initial_payload(),
            version: 0,
            last_sortable_unique_id: None,
        }
    }

    /// Fold one event already decoded for this projector.
    ///
    /// Returns `false` without touching the state if the event is not newer
    /// than the last one applied.
    pub fn apply_decoded<T: TagProjector<Payload = P>>(
        &mut self,
        sortable_unique_id: &SortableUniqueId,
        event: &T::Event,
    ) -> bool {
        if self
            .last_sortable_unique_id
            .as_ref()
            .is_some_and(|last| sortable_unique_id <= last)
        {
            return false;
        }
        self.payload = T::project(self.payload.clone(), event);
        self.version += 1;
        self.last_sortable_unique_id = Some(sortable_unique_id.clone());
        true
    }

    /// Fold one raw event. Events that do not carry this tag, or whose type
    /// is foreign to the projector, leave the state untouched.
    pub fn apply<T: TagProjector<Payload = P>>(&mut self, event: &Event) -> Result<bool> {
        if !event.has_tag(&self.tag) {
            return Ok(false);
        }
        let decoded = match event.decode::<T::Event>() {
            None => return Ok(false),
            Some(Ok(decoded)) => decoded,
            Some(Err(e)) => {
                return Err(ProjectionError {
                    projector: T::NAME.to_string(),
                    event_id: event.id,
                    event_type: event.event_type.clone(),
                    sortable_unique_id: event.sortable_unique_id.clone(),
                    reason: e.to_string(),
                }
                .into())
            }
        };
        Ok(self.apply_decoded::<T>(&event.sortable_unique_id, &decoded))
    }

    pub fn is_retired<T: TagProjector<Payload = P>>(&self) -> bool {
        T::is_retired(&self.payload)
    }
}
