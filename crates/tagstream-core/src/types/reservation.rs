use super::Tag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lease on a tag held by a writer between reading tag state and appending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagWriteReservation {
    pub tag: Tag,
    pub reservation_code: String,
    pub expires_at: DateTime<Utc>,
}

impl TagWriteReservation {
    /// Fresh reservation with a random code.
    pub fn issue(tag: Tag, expires_at: DateTime<Utc>) -> Self {
        Self {
            tag,
            reservation_code: uuid::Uuid::new_v4().to_string(),
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
