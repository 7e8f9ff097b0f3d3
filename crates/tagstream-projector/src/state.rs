use crate::multi_projector::{MultiProjection, MultiProjector, ProjectionView};
use crate::safe_unsafe::ApplyOutcome;
use tagstream_core::{Event, ProjectionError, SortableUniqueId};
use uuid::Uuid;

/// A multi-projection plus its position in the event stream.
///
/// `version` grows by exactly one per applied event. The stream position
/// also advances past events that were filtered, duplicated or skipped by
/// the host, so the next read resumes after them.
#[derive(Debug, Clone)]
pub struct MultiProjectionState<M: MultiProjector> {
    payload: MultiProjection<M>,
    projector_name: String,
    projector_version: String,
    last_sortable_unique_id: Option<SortableUniqueId>,
    last_event_id: Option<Uuid>,
    version: u64,
    is_caught_up: bool,
    is_safe: bool,
}

impl<M: MultiProjector> MultiProjectionState<M> {
    pub fn new(projector: M) -> Self {
        Self::from_payload(MultiProjection::initial(projector), None, None, 0)
    }

    pub(crate) fn from_payload(
        payload: MultiProjection<M>,
        last_sortable_unique_id: Option<SortableUniqueId>,
        last_event_id: Option<Uuid>,
        version: u64,
    ) -> Self {
        let projector_name = payload.projector().name().to_string();
        let projector_version = payload.projector().version().to_string();
        let is_safe = payload.is_fully_safe();
        Self {
            payload,
            projector_name,
            projector_version,
            last_sortable_unique_id,
            last_event_id,
            version,
            is_caught_up: false,
            is_safe,
        }
    }

    /// Fold one event.
    ///
    /// On error nothing changes, including the stream position; the caller
    /// decides whether to [`skip`](Self::skip) the event or stop.
    pub fn apply(
        &mut self,
        event: &Event,
        threshold: Option<&SortableUniqueId>,
    ) -> Result<ApplyOutcome, ProjectionError> {
        let outcome = self.payload.project(event, threshold)?;
        if outcome.is_applied() {
            self.version += 1;
        }
        self.advance_position(event);
        self.is_safe = self.payload.is_fully_safe();
        Ok(outcome)
    }

    /// Move past `event` without folding it.
    pub fn skip(&mut self, event: &Event) {
        self.advance_position(event);
    }

    /// Promote a new safe threshold without folding an event.
    pub fn promote(&mut self, threshold: &SortableUniqueId) -> usize {
        let promoted = self.payload.promote(threshold);
        self.is_safe = self.payload.is_fully_safe();
        promoted
    }

    fn advance_position(&mut self, event: &Event) {
        if self
            .last_sortable_unique_id
            .as_ref()
            .map_or(true, |last| &event.sortable_unique_id > last)
        {
            self.last_sortable_unique_id = Some(event.sortable_unique_id.clone());
            self.last_event_id = Some(event.id);
        }
    }

    pub fn set_caught_up(&mut self, caught_up: bool) {
        self.is_caught_up = caught_up;
    }

    pub fn payload(&self) -> &MultiProjection<M> {
        &self.payload
    }

    pub fn projector(&self) -> &M {
        self.payload.projector()
    }

    pub fn projector_name(&self) -> &str {
        &self.projector_name
    }

    pub fn projector_version(&self) -> &str {
        &self.projector_version
    }

    pub fn last_sortable_unique_id(&self) -> Option<&SortableUniqueId> {
        self.last_sortable_unique_id.as_ref()
    }

    pub fn last_event_id(&self) -> Option<Uuid> {
        self.last_event_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_caught_up(&self) -> bool {
        self.is_caught_up
    }

    /// No applied event sits above the promoted safe threshold.
    pub fn is_safe(&self) -> bool {
        self.is_safe
    }

    pub fn to_safe_view(&self, threshold: &SortableUniqueId) -> ProjectionView<M::Key, M::State> {
        self.payload.to_safe_view(threshold)
    }

    pub fn to_current_view(&self) -> ProjectionView<M::Key, M::State> {
        self.payload.to_current_view()
    }
}
