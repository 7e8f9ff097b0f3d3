use crate::error::Result;
use crate::types::{Tag, TagWriteReservation};
use chrono::{DateTime, Utc};

/// Result of an atomic reservation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationSlot {
    /// The reservation was stored.
    Created,
    /// An unexpired reservation already holds the tag.
    Occupied(TagWriteReservation),
}

/// Shared reservation table.
///
/// `create_if_absent_or_expired` must be a single atomic step: two
/// concurrent calls for the same tag may not both return `Created` while
/// the first reservation is unexpired.
pub trait ReservationStore: Send + Sync {
    fn create_if_absent_or_expired(
        &self,
        reservation: &TagWriteReservation,
        now: DateTime<Utc>,
    ) -> Result<ReservationSlot>;

    /// Stored reservation for `tag`, expired or not.
    fn lookup(&self, tag: &Tag) -> Result<Option<TagWriteReservation>>;

    /// Remove the reservation for `tag` if it still carries `reservation_code`.
    /// Returns whether a row was removed.
    fn delete(&self, tag: &Tag, reservation_code: &str) -> Result<bool>;
}
