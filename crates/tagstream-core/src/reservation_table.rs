//! Stripe-partitioned in-process reservation table
//!
//! Tags are hashed to stripes; each stripe owns its slice of the table behind
//! its own mutex, so reservations on unrelated tags rarely contend. The
//! check-and-insert for one tag happens under a single stripe lock, which is
//! what makes `create_if_absent_or_expired` atomic.

use crate::error::Result;
use crate::traits::{ReservationSlot, ReservationStore};
use crate::types::{Tag, TagWriteReservation};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use xxhash_rust::xxh3::xxh3_64;

/// Default number of stripes
pub const DEFAULT_STRIPES: usize = 64;

/// In-memory [`ReservationStore`] for a single process.
pub struct InMemoryReservationStore {
    stripes: Vec<Mutex<HashMap<Tag, TagWriteReservation>>>,
}

impl InMemoryReservationStore {
    /// Create a table with `num_stripes` stripes (at least one).
    pub fn new(num_stripes: usize) -> Self {
        let stripes = (0..num_stripes.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self { stripes }
    }

    pub fn num_stripes(&self) -> usize {
        self.stripes.len()
    }

    fn stripe(&self, tag: &Tag) -> &Mutex<HashMap<Tag, TagWriteReservation>> {
        let hash = xxh3_64(tag.to_string().as_bytes());
        &self.stripes[(hash as usize) % self.stripes.len()]
    }

    /// Drop every expired reservation. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for stripe in &self.stripes {
            let mut table = stripe.lock();
            let before = table.len();
            table.retain(|_, r| !r.is_expired(now));
            removed += before - table.len();
        }
        removed
    }
}

impl Default for InMemoryReservationStore {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}

impl ReservationStore for InMemoryReservationStore {
    fn create_if_absent_or_expired(
        &self,
        reservation: &TagWriteReservation,
        now: DateTime<Utc>,
    ) -> Result<ReservationSlot> {
        let mut table = self.stripe(&reservation.tag).lock();
        if let Some(existing) = table.get(&reservation.tag) {
            if !existing.is_expired(now) {
                return Ok(ReservationSlot::Occupied(existing.clone()));
            }
        }
        table.insert(reservation.tag.clone(), reservation.clone());
        Ok(ReservationSlot::Created)
    }

    fn lookup(&self, tag: &Tag) -> Result<Option<TagWriteReservation>> {
        Ok(self.stripe(tag).lock().get(tag).cloned())
    }

    fn delete(&self, tag: &Tag, reservation_code: &str) -> Result<bool> {
        let mut table = self.stripe(tag).lock();
        match table.get(tag) {
            Some(r) if r.reservation_code == reservation_code => {
                table.remove(tag);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
