use crate::error::ValidationError;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const TICK_DIGITS: usize = 19;
const TOKEN_DIGITS: usize = 11;
const TOKEN_MODULUS: u64 = 100_000_000_000;
const TICKS_PER_SECOND: i64 = 10_000_000;
const NANOS_PER_TICK: u32 = 100;

/// Total width of every id.
pub const SORTABLE_ID_LEN: usize = TICK_DIGITS + TOKEN_DIGITS;

/// Ordering key for the event stream.
///
/// Thirty ASCII digits: nineteen for the number of 100ns ticks since the Unix
/// epoch, followed by eleven for a uniqueness token. Because the width is
/// fixed, plain string comparison agrees with chronological order and ties at
/// the same tick are broken by the token.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SortableUniqueId(String);

impl SortableUniqueId {
    /// Build an id from a timestamp and a uniqueness token.
    ///
    /// Timestamps before the epoch clamp to tick zero. Only the low eleven
    /// decimal digits of `token` are kept.
    pub fn generate(timestamp: DateTime<Utc>, token: u64) -> Self {
        let ticks = timestamp
            .timestamp()
            .saturating_mul(TICKS_PER_SECOND)
            .saturating_add(i64::from(timestamp.timestamp_subsec_nanos() / NANOS_PER_TICK))
            .max(0);
        Self(format!(
            "{:0tw$}{:0kw$}",
            ticks,
            token % TOKEN_MODULUS,
            tw = TICK_DIGITS,
            kw = TOKEN_DIGITS
        ))
    }

    /// Id for `timestamp` with a random token.
    pub fn generate_random(timestamp: DateTime<Utc>) -> Self {
        let token = uuid::Uuid::new_v4().as_u128() as u64;
        Self::generate(timestamp, token)
    }

    /// Smallest id at `timestamp`.
    pub fn lower_bound(timestamp: DateTime<Utc>) -> Self {
        Self::generate(timestamp, 0)
    }

    /// Largest id at `timestamp`. Every id generated for the same tick
    /// compares less than or equal to it, which makes it the natural
    /// "everything up to and including this instant" threshold.
    pub fn upper_bound(timestamp: DateTime<Utc>) -> Self {
        Self::generate(timestamp, TOKEN_MODULUS - 1)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wall-clock component, truncated to 100ns.
    pub fn timestamp(&self) -> DateTime<Utc> {
        let ticks: i64 = self.0[..TICK_DIGITS].parse().unwrap_or(0);
        let secs = ticks / TICKS_PER_SECOND;
        let nanos = ((ticks % TICKS_PER_SECOND) as u32) * NANOS_PER_TICK;
        Utc.timestamp_opt(secs, nanos)
            .single()
            .unwrap_or_default()
    }

    pub fn token(&self) -> u64 {
        self.0[TICK_DIGITS..].parse().unwrap_or(0)
    }
}

impl FromStr for SortableUniqueId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != SORTABLE_ID_LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::InvalidSortableId(s.to_string()));
        }
        // Tick count must fit an i64.
        if s[..TICK_DIGITS].parse::<i64>().is_err() {
            return Err(ValidationError::InvalidSortableId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for SortableUniqueId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SortableUniqueId> for String {
    fn from(id: SortableUniqueId) -> Self {
        id.0
    }
}

impl fmt::Display for SortableUniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SortableUniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SortableUniqueId({})", self.0)
    }
}
