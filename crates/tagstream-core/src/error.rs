use crate::types::{SortableUniqueId, Tag};
use std::io;
use thiserror::Error;

/// Construction-time validation failures. Anything rejected here never
/// reaches the event log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("tag group must not be empty")]
    EmptyTagGroup,

    #[error("tag group is {len} characters, maximum is {max}")]
    TagGroupTooLong { len: usize, max: usize },

    #[error("tag group contains invalid character {ch:?}")]
    InvalidTagGroupChar { ch: char },

    #[error("tag content must not be empty")]
    EmptyTagContent,

    #[error("tag content is {len} characters, maximum is {max}")]
    TagContentTooLong { len: usize, max: usize },

    #[error("tag content contains invalid character {ch:?}")]
    InvalidTagContentChar { ch: char },

    #[error("tag {0:?} is missing the ':' delimiter")]
    MissingTagDelimiter(String),

    #[error("invalid sortable unique id {0:?}")]
    InvalidSortableId(String),

    #[error("event type must not be empty")]
    EmptyEventType,

    #[error("event type {0:?} is not a known payload type")]
    UnknownPayloadType(String),

    #[error("event {event_type} does not carry reserved tag {tag}")]
    EventMissingTag { event_type: String, tag: String },

    #[error("event is {size} bytes, maximum is {max}")]
    EventTooLarge { size: usize, max: usize },

    #[error("{0}")]
    Other(String),
}

/// A single event could not be folded by a projector.
///
/// The projector only reports the problem; the host decides whether to skip,
/// halt or quarantine the event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("projector {projector} failed on {event_type} at {sortable_unique_id}: {reason}")]
pub struct ProjectionError {
    pub projector: String,
    pub event_id: uuid::Uuid,
    pub event_type: String,
    pub sortable_unique_id: SortableUniqueId,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum TagstreamError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Tag {tag} is already reserved until {expires_at}")]
    Conflict {
        tag: Tag,
        expires_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("Reservation for tag {tag} has expired")]
    ReservationExpired { tag: Tag },

    #[error("Reservation code for tag {tag} does not match the stored reservation")]
    ReservationMismatch { tag: Tag },

    #[error("Tag {tag} has been modified, expected {expected:?}, current {actual:?}")]
    TagModified {
        tag: Tag,
        expected: Option<SortableUniqueId>,
        actual: Option<SortableUniqueId>,
    },

    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("Offloaded snapshot {key} could not be read: {reason}")]
    OffloadReadFailure { key: String, reason: String },

    #[error("Snapshot version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl TagstreamError {
    /// Recoverable by retrying with a fresh reservation or a re-read of tag state.
    pub fn is_concurrency(&self) -> bool {
        matches!(
            self,
            TagstreamError::Conflict { .. }
                | TagstreamError::ReservationExpired { .. }
                | TagstreamError::ReservationMismatch { .. }
                | TagstreamError::TagModified { .. }
        )
    }

    /// The request itself is malformed and must be fixed before resubmitting.
    pub fn is_validation(&self) -> bool {
        matches!(self, TagstreamError::Validation(_))
    }

    /// Snapshot load failures that must not fall back to a full replay.
    pub fn is_fatal_snapshot_failure(&self) -> bool {
        matches!(self, TagstreamError::OffloadReadFailure { .. })
    }
}

impl From<serde_json::Error> for TagstreamError {
    fn from(err: serde_json::Error) -> Self {
        TagstreamError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TagstreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_and_validation_are_distinct() {
        let tag = Tag::new("order", "42").unwrap();
        let conflict = TagstreamError::ReservationExpired { tag };
        assert!(conflict.is_concurrency());
        assert!(!conflict.is_validation());

        let invalid = TagstreamError::from(ValidationError::EmptyTagGroup);
        assert!(invalid.is_validation());
        assert!(!invalid.is_concurrency());
    }

    #[test]
    fn offload_failure_is_fatal() {
        let err = TagstreamError::OffloadReadFailure {
            key: "orders/1/abc.snap".into(),
            reason: "missing".into(),
        };
        assert!(err.is_fatal_snapshot_failure());
        assert!(!TagstreamError::Storage("disk".into()).is_fatal_snapshot_failure());
    }
}
