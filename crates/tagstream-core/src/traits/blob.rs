use crate::error::Result;

/// Secondary storage for oversized snapshot payloads.
pub trait BlobAccessor: Send + Sync {
    /// Name recorded alongside offloaded rows.
    fn provider_name(&self) -> &str;

    fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// Store `bytes` under a fresh key beginning with `key_prefix` and return the key.
    fn write(&self, bytes: &[u8], key_prefix: &str) -> Result<String>;
}
