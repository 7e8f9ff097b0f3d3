//! Tag write reservation protocol
//!
//! A writer reserves every tag it intends to append under, appends, and the
//! reservation is released on commit. At most one unexpired reservation may
//! exist per tag; expiry bounds how long a crashed writer can block others.

use crate::clock::Clock;
use crate::config::ReservationConfig;
use crate::error::{Result, TagstreamError, ValidationError};
use crate::event_log::EventLog;
use crate::observe::{self, ReservationOutcome};
use crate::traits::{ReservationSlot, ReservationStore};
use crate::types::{Event, Tag, TagWriteOutcome, TagWriteReservation};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Reservation state machine over a [`ReservationStore`] and an [`EventLog`].
#[derive(Clone)]
pub struct TagReservations {
    store: Arc<dyn ReservationStore>,
    log: Arc<dyn EventLog>,
    clock: Arc<dyn Clock>,
    config: ReservationConfig,
}

impl TagReservations {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        log: Arc<dyn EventLog>,
        clock: Arc<dyn Clock>,
        config: ReservationConfig,
    ) -> Self {
        Self {
            store,
            log,
            clock,
            config,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn log(&self) -> &Arc<dyn EventLog> {
        &self.log
    }

    /// Reserve `tag` for `lease`.
    ///
    /// # Errors
    ///
    /// `Conflict` if another unexpired reservation holds the tag.
    pub fn reserve(&self, tag: &Tag, lease: Duration) -> Result<TagWriteReservation> {
        let lease = chrono::Duration::from_std(lease)
            .map_err(|e| TagstreamError::Config(format!("lease out of range: {e}")))?;
        let now = self.clock.now();
        let reservation = TagWriteReservation::issue(tag.clone(), now + lease);
        match self.store.create_if_absent_or_expired(&reservation, now)? {
            ReservationSlot::Created => {
                tracing::debug!(tag = %tag, expires_at = %reservation.expires_at, "reserved tag");
                observe::record_reservation(ReservationOutcome::Granted);
                Ok(reservation)
            }
            ReservationSlot::Occupied(existing) => {
                tracing::debug!(tag = %tag, held_until = %existing.expires_at, "tag already reserved");
                observe::record_reservation(ReservationOutcome::Conflict);
                Err(TagstreamError::Conflict {
                    tag: tag.clone(),
                    expires_at: existing.expires_at,
                })
            }
        }
    }

    /// Reserve with the configured default lease.
    pub fn reserve_default(&self, tag: &Tag) -> Result<TagWriteReservation> {
        self.reserve(tag, self.config.lease())
    }

    /// Check that `reservation` is still the live one for its tag.
    ///
    /// # Errors
    ///
    /// `ReservationExpired` when the lease has run out or the row is gone,
    /// `ReservationMismatch` when another writer now holds the tag.
    pub fn validate(&self, reservation: &TagWriteReservation) -> Result<()> {
        let now = self.clock.now();
        let stored = self.store.lookup(&reservation.tag)?;
        match stored {
            None => {
                observe::record_reservation(ReservationOutcome::Expired);
                Err(TagstreamError::ReservationExpired {
                    tag: reservation.tag.clone(),
                })
            }
            Some(stored) if stored.reservation_code != reservation.reservation_code => {
                observe::record_reservation(ReservationOutcome::Mismatch);
                Err(TagstreamError::ReservationMismatch {
                    tag: reservation.tag.clone(),
                })
            }
            Some(stored) if stored.is_expired(now) => {
                observe::record_reservation(ReservationOutcome::Expired);
                Err(TagstreamError::ReservationExpired {
                    tag: reservation.tag.clone(),
                })
            }
            Some(_) => Ok(()),
        }
    }

    /// Append `events` under a single reservation and release it.
    ///
    /// Every event must carry the reserved tag. Nothing is appended if the
    /// reservation is no longer valid.
    pub fn commit(
        &self,
        reservation: &TagWriteReservation,
        events: &[Event],
    ) -> Result<Vec<TagWriteOutcome>> {
        for event in events {
            if !event.has_tag(&reservation.tag) {
                return Err(ValidationError::EventMissingTag {
                    event_type: event.event_type.clone(),
                    tag: reservation.tag.to_string(),
                }
                .into());
            }
        }
        self.commit_many(std::slice::from_ref(reservation), events)
    }

    /// Append `events` under several reservations and release them all.
    ///
    /// Every event must carry at least one reserved tag; other tags on the
    /// event are written without a consistency guarantee.
    pub fn commit_many(
        &self,
        reservations: &[TagWriteReservation],
        events: &[Event],
    ) -> Result<Vec<TagWriteOutcome>> {
        for event in events {
            if !reservations.iter().any(|r| event.has_tag(&r.tag)) {
                let tag = reservations
                    .first()
                    .map(|r| r.tag.to_string())
                    .unwrap_or_default();
                return Err(ValidationError::EventMissingTag {
                    event_type: event.event_type.clone(),
                    tag,
                }
                .into());
            }
        }
        for reservation in reservations {
            self.validate(reservation)?;
        }

        let start = Instant::now();
        let outcomes = self.log.append(events)?;
        observe::record_append(events.len(), start.elapsed());
        tracing::debug!(
            events = events.len(),
            tags = reservations.len(),
            "committed events under reservation"
        );

        for reservation in reservations {
            self.store
                .delete(&reservation.tag, &reservation.reservation_code)?;
            observe::record_reservation(ReservationOutcome::Committed);
        }
        Ok(outcomes)
    }

    /// Release without committing. Returns `false` if the reservation was
    /// already gone or had been replaced.
    pub fn release(&self, reservation: &TagWriteReservation) -> Result<bool> {
        let removed = self
            .store
            .delete(&reservation.tag, &reservation.reservation_code)?;
        if removed {
            observe::record_reservation(ReservationOutcome::Released);
        }
        Ok(removed)
    }
}
