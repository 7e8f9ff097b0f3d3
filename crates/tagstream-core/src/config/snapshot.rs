use serde::{Deserialize, Serialize};

/// Configuration for snapshot writing and rebuilds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Compressed payloads larger than this go to blob storage
    /// Default: 1,000,000 bytes
    #[serde(default = "default_offload_threshold_bytes")]
    pub offload_threshold_bytes: usize,

    /// zstd compression level
    /// Default: 3
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    /// New events required before a rebuild is worthwhile
    /// Default: 3000
    #[serde(default = "default_min_event_threshold")]
    pub min_event_threshold: u64,
}

fn default_offload_threshold_bytes() -> usize {
    1_000_000
}

fn default_compression_level() -> i32 {
    3
}

fn default_min_event_threshold() -> u64 {
    3000
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            offload_threshold_bytes: default_offload_threshold_bytes(),
            compression_level: default_compression_level(),
            min_event_threshold: default_min_event_threshold(),
        }
    }
}

impl SnapshotConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offload_threshold_bytes(mut self, bytes: usize) -> Self {
        self.offload_threshold_bytes = bytes;
        self
    }

    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_min_event_threshold(mut self, events: u64) -> Self {
        self.min_event_threshold = events;
        self
    }
}
