//! Status command implementation

use super::{format_bytes, registry};
use anyhow::{Context, Result};
use tagstream::{events_since_snapshot, EventLog, SnapshotStore, TagstreamDb};

/// Freshness of one registered projector's snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectorStatus {
    pub name: String,
    pub version: String,
    /// Events the stored snapshot covers, `None` without a snapshot.
    pub events_processed: Option<u64>,
    /// Log events past the snapshot's position, or the whole log without one.
    pub behind: u64,
}

pub fn execute(db: &TagstreamDb) -> Result<Vec<ProjectorStatus>> {
    tracing::info!("Checking status: {}", db.base_path().display());

    let stats = db.log().stats().context("Failed to read event log stats")?;
    println!("\nTagstream Status");
    println!("{}", "=".repeat(60));
    println!("Path: {}", db.base_path().display());

    println!("\nEvent Log:");
    println!("  Events: {}", stats.event_count);
    println!("  Tags: {}", stats.tag_count);
    println!("  Size: {}", format_bytes(stats.total_bytes));
    if let Some(oldest) = &stats.oldest {
        println!("  Oldest: {}", oldest.timestamp().to_rfc3339());
    }
    if let Some(newest) = &stats.newest {
        println!("  Newest: {}", newest.timestamp().to_rfc3339());
    }

    let snapshots = db
        .snapshots()
        .list_all()
        .context("Failed to list snapshots")?;
    let mut statuses = Vec::new();
    println!("\nProjectors:");
    for projector in registry()?.list() {
        let snapshot = snapshots
            .iter()
            .find(|s| s.projector_name == projector.name && s.projector_version == projector.version);
        let events_processed = snapshot.map(|s| s.events_processed);
        let behind = match snapshot {
            Some(s) => events_since_snapshot(db.log().as_ref(), s)
                .context("Failed to count events since snapshot")?,
            None => stats.event_count,
        };
        match events_processed {
            None => println!("  [MISS] {} v{}: no snapshot", projector.name, projector.version),
            Some(_) if behind == 0 => {
                println!("  [OK]   {} v{}: up to date", projector.name, projector.version)
            }
            Some(done) => println!(
                "  [LAG]  {} v{}: {} event(s) behind ({} covered)",
                projector.name, projector.version, behind, done
            ),
        }
        statuses.push(ProjectorStatus {
            name: projector.name,
            version: projector.version,
            events_processed,
            behind,
        });
    }
    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::build::{self, BuildArgs};
    use crate::commands::testing::{open, write};

    #[test]
    fn test_reports_lag_per_projector() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(dir.path());
        write(&db, "Opened", "acct:1");
        write(&db, "Opened", "acct:2");

        let before = execute(&db).unwrap();
        assert!(before.iter().all(|s| s.events_processed.is_none() && s.behind == 2));

        let args = BuildArgs {
            projector: Some("event-type-count".to_string()),
            force: true,
            min_events: None,
            dry_run: false,
        };
        build::execute(&db, &args).unwrap();

        let after = execute(&db).unwrap();
        let counts = after.iter().find(|s| s.name == "event-type-count").unwrap();
        assert_eq!(counts.events_processed, Some(2));
        assert_eq!(counts.behind, 0);
        let catalog = after.iter().find(|s| s.name == "tag-catalog").unwrap();
        assert_eq!(catalog.events_processed, None);
        assert_eq!(catalog.behind, 2);
    }

    #[test]
    fn test_behind_counts_events_past_the_snapshot_position() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(dir.path());
        write(&db, "Opened", "acct:1");
        let args = BuildArgs {
            projector: Some("event-type-count".to_string()),
            force: true,
            min_events: None,
            dry_run: false,
        };
        build::execute(&db, &args).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        write(&db, "Closed", "acct:1");
        let statuses = execute(&db).unwrap();
        let counts = statuses.iter().find(|s| s.name == "event-type-count").unwrap();
        assert_eq!(counts.events_processed, Some(1));
        assert_eq!(counts.behind, 1);
    }
}
