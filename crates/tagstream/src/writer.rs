//! Multi-tag event writer with optimistic expected-version checks
//!
//! A write reserves every tag it touches, in tag order, confirms that each
//! tag the caller read is still at the version the caller saw, appends the
//! whole batch, and releases the reservations.
//!
//! ```no_run
//! use tagstream::prelude::*;
//! use tagstream::writer::ConsistencyCheck;
//!
//! # fn main() -> Result<()> {
//! let db = TagstreamDb::open("./data")?;
//! let tag: Tag = "account:42".parse()?;
//! let seen = db.log().latest_for_tag(&tag)?;
//!
//! let event = PendingEvent::raw("Deposited", serde_json::json!({ "amount": 10 }), [tag.clone()])?;
//! let check = ConsistencyCheck::new().expect_latest(tag, seen);
//! db.writer().write(vec![event], &check)?;
//! # Ok(())
//! # }
//! ```

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use tagstream_core::{
    Event, PendingEvent, Result, SortableUniqueId, Tag, TagReservations, TagState,
    TagWriteOutcome, TagWriteReservation, TagstreamError, ValidationError,
};

/// Tags the caller read before writing, with the latest sortable id seen
/// for each. `None` means the caller saw no events under the tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyCheck {
    expected: BTreeMap<Tag, Option<SortableUniqueId>>,
}

impl ConsistencyCheck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_latest(mut self, tag: Tag, last: Option<SortableUniqueId>) -> Self {
        self.expected.insert(tag, last);
        self
    }

    /// Expect the tag to still be where `state` was loaded from.
    pub fn expect_state<P>(self, state: &TagState<P>) -> Self {
        self.expect_latest(state.tag.clone(), state.last_sortable_unique_id.clone())
    }

    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.expected.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.expected.is_empty()
    }
}

/// What a successful write stored.
#[derive(Debug, Clone)]
pub struct WriteResult {
    pub events: Vec<Event>,
    pub outcomes: Vec<TagWriteOutcome>,
}

/// Stamps and appends event batches under tag reservations.
pub struct EventWriter {
    reservations: TagReservations,
    last_issued: Mutex<Option<SortableUniqueId>>,
}

impl EventWriter {
    pub fn new(reservations: TagReservations) -> Self {
        Self {
            reservations,
            last_issued: Mutex::new(None),
        }
    }

    pub fn reservations(&self) -> &TagReservations {
        &self.reservations
    }

    /// Append `events` atomically with respect to every tag they carry.
    ///
    /// # Errors
    ///
    /// - `Validation` if an event carries no tag
    /// - `Conflict` if another writer holds one of the touched tags
    /// - `TagModified` if a checked tag moved since the caller read it
    ///
    /// Reservations acquired along the way are released on every error path.
    pub fn write(
        &self,
        events: Vec<PendingEvent>,
        consistency: &ConsistencyCheck,
    ) -> Result<WriteResult> {
        if events.is_empty() {
            return Ok(WriteResult {
                events: Vec::new(),
                outcomes: Vec::new(),
            });
        }
        if let Some(untagged) = events.iter().find(|e| e.tags.is_empty()) {
            return Err(ValidationError::Other(format!(
                "event {} carries no tags",
                untagged.event_type
            ))
            .into());
        }

        let touched: BTreeSet<Tag> = events
            .iter()
            .flat_map(|e| e.tags.iter().cloned())
            .chain(consistency.tags().cloned())
            .collect();

        let mut held = Vec::with_capacity(touched.len());
        for tag in &touched {
            match self.reservations.reserve_default(tag) {
                Ok(reservation) => held.push(reservation),
                Err(e) => {
                    self.release_all(&held);
                    return Err(e);
                }
            }
        }

        match self.write_reserved(&held, events, consistency) {
            Ok(result) => Ok(result),
            Err(e) => {
                self.release_all(&held);
                Err(e)
            }
        }
    }

    fn write_reserved(
        &self,
        held: &[TagWriteReservation],
        events: Vec<PendingEvent>,
        consistency: &ConsistencyCheck,
    ) -> Result<WriteResult> {
        let log = self.reservations.log();
        for (tag, expected) in &consistency.expected {
            let actual = log.latest_for_tag(tag)?;
            if actual != *expected {
                tracing::debug!(tag = %tag, ?expected, ?actual, "tag moved since it was read");
                return Err(TagstreamError::TagModified {
                    tag: tag.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        let stamped = self.stamp_all(events);
        let outcomes = self.reservations.commit_many(held, &stamped)?;
        tracing::debug!(
            events = stamped.len(),
            tags = held.len(),
            "wrote event batch"
        );
        Ok(WriteResult {
            events: stamped,
            outcomes,
        })
    }

    /// Stamp a batch with strictly increasing sortable ids so the log order
    /// matches the caller's order.
    fn stamp_all(&self, events: Vec<PendingEvent>) -> Vec<Event> {
        let now = self.reservations.clock().now();
        let mut last = self.last_issued.lock();
        events
            .into_iter()
            .map(|pending| {
                let at = match last.as_ref() {
                    Some(prev) if SortableUniqueId::lower_bound(now) <= *prev => {
                        prev.timestamp() + chrono::Duration::nanoseconds(100)
                    }
                    _ => now,
                };
                let id = SortableUniqueId::generate_random(at);
                *last = Some(id.clone());
                pending.stamp(id)
            })
            .collect()
    }

    fn release_all(&self, held: &[TagWriteReservation]) {
        for reservation in held {
            if let Err(e) = self.reservations.release(reservation) {
                tracing::warn!(tag = %reservation.tag, error = %e, "failed to release reservation");
            }
        }
    }
}
