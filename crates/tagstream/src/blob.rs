//! Local filesystem blob storage for offloaded snapshots
//!
//! ```no_run
//! use tagstream::blob::LocalBlobStorage;
//! use tagstream::BlobAccessor;
//!
//! # fn main() -> tagstream::Result<()> {
//! let blobs = LocalBlobStorage::new("./data/blobs");
//! let key = blobs.write(b"snapshot bytes", "orders/1")?;
//! assert_eq!(blobs.read(&key)?, b"snapshot bytes");
//! # Ok(())
//! # }
//! ```

use std::path::{Component, Path, PathBuf};
use tagstream_core::{BlobAccessor, Result, TagstreamError};
use uuid::Uuid;

/// Blob storage rooted at a directory. Keys map to relative paths.
#[derive(Debug, Clone)]
pub struct LocalBlobStorage {
    base_path: PathBuf,
}

impl LocalBlobStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve `key` under the base directory, rejecting keys that escape it.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(TagstreamError::Validation(
                tagstream_core::ValidationError::Other(format!("invalid blob key {key:?}")),
            ));
        }
        Ok(self.base_path.join(relative))
    }

    /// Remove a blob. Returns `false` if it did not exist.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl BlobAccessor for LocalBlobStorage {
    fn provider_name(&self) -> &str {
        "local"
    }

    fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Err(TagstreamError::NotFound(format!("Blob not found: {}", key)));
        }
        Ok(std::fs::read(&path)?)
    }

    fn write(&self, bytes: &[u8], key_prefix: &str) -> Result<String> {
        let key = format!("{}/{}.snap", key_prefix.trim_end_matches('/'), Uuid::new_v4());
        let dest_path = self.path_for(&key)?;
        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Write under a temporary name so readers never see a partial blob.
        let tmp_path = dest_path.with_extension("snap.tmp");
        std::fs::write(&tmp_path, bytes)?;
        std::fs::rename(&tmp_path, &dest_path)?;

        tracing::debug!(key = %key, bytes = bytes.len(), "wrote blob");
        Ok(key)
    }
}
