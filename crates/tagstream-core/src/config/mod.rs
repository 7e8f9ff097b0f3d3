pub mod host;
pub mod reservation;
pub mod snapshot;

pub use host::{ErrorPolicy, ProjectionHostConfig};
pub use reservation::ReservationConfig;
pub use snapshot::SnapshotConfig;

use crate::error::{Result, TagstreamError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Aggregate configuration, loadable from a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagstreamConfig {
    #[serde(default)]
    pub reservation: ReservationConfig,

    #[serde(default)]
    pub host: ProjectionHostConfig,

    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

impl TagstreamConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| TagstreamError::Config(format!("{}: {}", path.display(), e)))
    }
}
