use serde::{Deserialize, Serialize};

/// What the projection host does with an event the projector cannot fold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Log and move past the event
    #[default]
    Skip,
    /// Stop folding and surface the error; the event is retried next run
    Halt,
    /// Record the event for later inspection and move past it
    Quarantine,
}

/// Configuration for the projection host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionHostConfig {
    /// Maximum number of events per batch
    /// Default: 1000
    #[serde(default = "default_batch_events_max")]
    pub batch_events_max: usize,

    /// How far behind wall-clock time the safe threshold trails when no
    /// delivery watermark is supplied (milliseconds)
    /// Default: 20000
    #[serde(default = "default_safe_window_ms")]
    pub safe_window_ms: u64,

    /// Poll interval when caught up (milliseconds)
    /// Default: 100ms
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub error_policy: ErrorPolicy,
}

fn default_batch_events_max() -> usize {
    1000
}

fn default_safe_window_ms() -> u64 {
    20_000
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl Default for ProjectionHostConfig {
    fn default() -> Self {
        Self {
            batch_events_max: default_batch_events_max(),
            safe_window_ms: default_safe_window_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl ProjectionHostConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_events_max(mut self, max: usize) -> Self {
        self.batch_events_max = max.max(1);
        self
    }

    pub fn with_safe_window_ms(mut self, ms: u64) -> Self {
        self.safe_window_ms = ms;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }
}
