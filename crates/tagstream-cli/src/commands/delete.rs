//! Delete command implementation

use anyhow::{Context, Result};
use tagstream::{SnapshotStore, TagstreamDb};

/// Delete a snapshot row and, if it was offloaded, its blob.
pub fn execute(db: &TagstreamDb, projector: &str, version: &str) -> Result<bool> {
    let offload_key = db
        .snapshots()
        .list_all()
        .context("Failed to list snapshots")?
        .into_iter()
        .find(|info| info.projector_name == projector && info.projector_version == version)
        .and_then(|info| info.offload_key);

    let removed = db
        .snapshots()
        .delete(projector, version)
        .with_context(|| format!("Failed to delete snapshot {projector} v{version}"))?;
    if !removed {
        println!("[SKIP] No snapshot stored for {projector} v{version}");
        return Ok(false);
    }

    if let Some(key) = offload_key {
        match db.blobs().delete(&key) {
            Ok(true) => tracing::debug!(key = %key, "deleted offloaded payload"),
            Ok(false) => tracing::warn!(key = %key, "offloaded payload was already gone"),
            Err(e) => tracing::warn!(key = %key, error = %e, "failed to delete offloaded payload"),
        }
    }
    println!("[OK]   Deleted snapshot {projector} v{version}");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::build::{self, BuildArgs};
    use crate::commands::testing::{open, write};

    #[test]
    fn test_delete_existing_then_missing() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(dir.path());
        write(&db, "Opened", "acct:1");
        let args = BuildArgs {
            projector: None,
            force: true,
            min_events: None,
            dry_run: false,
        };
        build::execute(&db, &args).unwrap();

        assert!(execute(&db, "tag-catalog", "1").unwrap());
        assert!(!execute(&db, "tag-catalog", "1").unwrap());
        let remaining: Vec<String> = db
            .snapshots()
            .list_all()
            .unwrap()
            .into_iter()
            .map(|info| info.projector_name)
            .collect();
        assert_eq!(remaining, vec!["event-type-count"]);
    }
}
