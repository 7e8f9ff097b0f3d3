//! Multi-projection contract and its composition with the windowed container.

use crate::safe_unsafe::{ApplyOutcome, SafeFrame, SafeUnsafeProjectionState};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use std::str::FromStr;
use tagstream_core::{DecodedEvent, Event, ProjectionError, Result, SortableUniqueId};
use uuid::Uuid;

/// Per projection type logic.
///
/// A projector supplies plain functions; the windowed bookkeeping lives in
/// [`MultiProjection`]. `Payload` is the projector's closed set of event
/// payloads. Events of any other type are filtered out by `decode` before
/// they reach `project_item`.
pub trait MultiProjector: Clone + Send + Sync + 'static {
    type Key: Ord + Clone + Debug + Display + FromStr + Send + Sync;
    type State: Clone + Debug + Send + Sync;
    type Payload: Clone + Debug + Send + Sync;

    fn name(&self) -> &str;

    /// Changing the version invalidates every stored snapshot.
    fn version(&self) -> &str;

    /// `Ok(None)` for events this projector does not handle. An `Err` carries
    /// the reason a handled event type could not be decoded.
    fn decode(&self, event: &Event) -> std::result::Result<Option<Self::Payload>, String>;

    fn affected_keys(&self, event: &DecodedEvent<Self::Payload>) -> Vec<Self::Key>;

    /// `None` removes the key.
    fn project_item(
        &self,
        key: &Self::Key,
        state: Option<&Self::State>,
        event: &DecodedEvent<Self::Payload>,
    ) -> Option<Self::State>;

    /// Type name and body for one snapshot entry.
    fn encode_state(&self, state: &Self::State) -> Result<(String, Value)>;

    /// `None` if `type_name` is unknown to this projector.
    fn decode_state(
        &self,
        key: &Self::Key,
        type_name: &str,
        payload: &Value,
    ) -> Option<Result<Self::State>>;
}

pub type ProjectorContainer<M> = SafeUnsafeProjectionState<
    <M as MultiProjector>::Key,
    <M as MultiProjector>::State,
    DecodedEvent<<M as MultiProjector>::Payload>,
>;

/// Read-only view of a projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionView<K: Ord, S> {
    pub items: BTreeMap<K, S>,
    pub last_sortable_unique_id: Option<SortableUniqueId>,
    pub last_event_id: Option<Uuid>,
    pub version: u64,
}

/// A projector together with its windowed state.
#[derive(Debug, Clone)]
pub struct MultiProjection<M: MultiProjector> {
    projector: M,
    container: ProjectorContainer<M>,
}

impl<M: MultiProjector> MultiProjection<M> {
    pub fn initial(projector: M) -> Self {
        Self {
            projector,
            container: SafeUnsafeProjectionState::new(),
        }
    }

    pub(crate) fn from_parts(projector: M, container: ProjectorContainer<M>) -> Self {
        Self {
            projector,
            container,
        }
    }

    pub fn projector(&self) -> &M {
        &self.projector
    }

    pub fn container(&self) -> &ProjectorContainer<M> {
        &self.container
    }

    /// Fold one event, then promote `threshold` if one is given.
    ///
    /// Decoding happens before anything is touched, so an error leaves the
    /// projection exactly as it was.
    pub fn project(
        &mut self,
        event: &Event,
        threshold: Option<&SortableUniqueId>,
    ) -> std::result::Result<ApplyOutcome, ProjectionError> {
        let payload = self
            .projector
            .decode(event)
            .map_err(|reason| ProjectionError {
                projector: self.projector.name().to_string(),
                event_id: event.id,
                event_type: event.event_type.clone(),
                sortable_unique_id: event.sortable_unique_id.clone(),
                reason,
            })?;

        let outcome = match payload {
            None => ApplyOutcome::Filtered,
            Some(payload) => {
                let decoded = DecodedEvent::from_event(event, payload);
                let projector = &self.projector;
                self.container.apply(
                    decoded,
                    |e| projector.affected_keys(e),
                    |k, s, e| projector.project_item(k, s, e),
                )
            }
        };
        if let Some(threshold) = threshold {
            self.promote(threshold);
        }
        Ok(outcome)
    }

    /// Promote `threshold` without folding an event.
    pub fn promote(&mut self, threshold: &SortableUniqueId) -> usize {
        let projector = &self.projector;
        self.container
            .promote(threshold, |k, s, e| projector.project_item(k, s, e))
    }

    /// Safe map plus marks at `threshold`, used by the snapshot writer.
    pub fn safe_frame(&self, threshold: &SortableUniqueId) -> SafeFrame<M::Key, M::State> {
        self.container
            .safe_frame(threshold, |k, s, e| self.projector.project_item(k, s, e))
    }

    /// Strongly consistent view: only events at or below `threshold`.
    pub fn to_safe_view(&self, threshold: &SortableUniqueId) -> ProjectionView<M::Key, M::State> {
        let frame = self.safe_frame(threshold);
        let (last_sortable_unique_id, last_event_id) = match frame.tip {
            Some((id, event_id)) => (Some(id), Some(event_id)),
            None => (None, None),
        };
        ProjectionView {
            items: frame.items,
            last_sortable_unique_id,
            last_event_id,
            version: frame.events,
        }
    }

    /// Low-latency view including every accepted event.
    pub fn to_current_view(&self) -> ProjectionView<M::Key, M::State> {
        let (last_sortable_unique_id, last_event_id) = match self.container.current_tip() {
            Some((id, event_id)) => (Some(id.clone()), Some(*event_id)),
            None => (None, None),
        };
        ProjectionView {
            items: self.container.current().clone(),
            last_sortable_unique_id,
            last_event_id,
            version: self.container.applied_events(),
        }
    }

    pub fn is_key_unsafe(&self, key: &M::Key) -> bool {
        self.container.is_key_unsafe(key)
    }

    /// True when no accepted event sits above the promoted cutover.
    pub fn is_fully_safe(&self) -> bool {
        self.container.pending_len() == 0
    }
}
