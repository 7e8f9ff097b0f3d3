//! List command implementation

use super::format_bytes;
use anyhow::{Context, Result};
use tagstream::{SnapshotInfo, SnapshotStore, TagstreamDb};

pub fn execute(db: &TagstreamDb) -> Result<Vec<SnapshotInfo>> {
    let snapshots = db
        .snapshots()
        .list_all()
        .context("Failed to list snapshots")?;

    println!("\nSnapshots");
    println!("{}", "=".repeat(60));
    if snapshots.is_empty() {
        println!("No snapshots stored. Run 'tagstream build' to create them.");
        return Ok(snapshots);
    }

    println!(
        "{:<24} {:<8} {:>10} {:>10}  {:<10} {}",
        "PROJECTOR", "VERSION", "EVENTS", "SIZE", "STORAGE", "UPDATED"
    );
    for info in &snapshots {
        println!(
            "{:<24} {:<8} {:>10} {:>10}  {:<10} {}",
            info.projector_name,
            info.projector_version,
            info.events_processed,
            format_bytes(info.compressed_size),
            if info.is_offloaded { "offloaded" } else { "inline" },
            info.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(snapshots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{open, write};
    use crate::commands::build::{self, BuildArgs};

    #[test]
    fn test_lists_built_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(dir.path());
        assert!(execute(&db).unwrap().is_empty());

        write(&db, "Opened", "acct:1");
        let args = BuildArgs {
            projector: Some("event-type-count".to_string()),
            force: true,
            min_events: None,
            dry_run: false,
        };
        build::execute(&db, &args).unwrap();

        let listed = execute(&db).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].projector_name, "event-type-count");
        assert!(!listed[0].is_offloaded);
    }
}
