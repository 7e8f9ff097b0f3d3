use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for tag write reservations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationConfig {
    /// Lease length used when the caller does not pass one
    /// Default: 30s
    #[serde(default = "default_lease_ms")]
    pub lease_ms: u64,
}

fn default_lease_ms() -> u64 {
    30_000
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            lease_ms: default_lease_ms(),
        }
    }
}

impl ReservationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease_ms = lease.as_millis() as u64;
        self
    }

    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }
}
