//! Build command implementation

use super::{format_bytes, registry};
use anyhow::{bail, Context, Result};
use tagstream::{BuildOptions, BuildResult, BuildStatus, TagstreamDb};

pub struct BuildArgs {
    pub projector: Option<String>,
    pub force: bool,
    pub min_events: Option<u64>,
    pub dry_run: bool,
}

pub fn execute(db: &TagstreamDb, args: &BuildArgs) -> Result<Vec<BuildResult>> {
    let config = db.config();
    let mut options = BuildOptions::new()
        .with_force(args.force)
        .with_dry_run(args.dry_run)
        .with_snapshot_config(config.snapshot.clone())
        .with_host_config(config.host.clone())
        .with_build_source("cli");
    if let Some(min_events) = args.min_events {
        options = options.with_min_event_threshold(min_events);
    }
    if let Some(name) = &args.projector {
        options = options.with_projector(name.clone());
    }

    let builder = db.snapshot_builder(registry()?);
    let results = builder
        .build_all(&options)
        .context("Failed to build snapshots")?;

    println!("\nSnapshot Build");
    println!("{}", "=".repeat(60));
    for result in &results {
        println!("{}", describe(result));
    }

    let failed = results
        .iter()
        .filter(|r| r.status == BuildStatus::Failed)
        .count();
    if failed > 0 {
        bail!("{failed} projector(s) failed to build");
    }
    Ok(results)
}

fn describe(result: &BuildResult) -> String {
    let label = match result.status {
        BuildStatus::Success => "[OK]  ",
        BuildStatus::Skipped => "[SKIP]",
        BuildStatus::Failed => "[FAIL]",
    };
    let mut line = format!(
        "{label} {} v{}: {}",
        result.projector_name, result.projector_version, result.reason
    );
    if let Some(info) = &result.snapshot {
        line.push_str(&format!(
            " ({} events, {}{}, {:?})",
            info.events_processed,
            format_bytes(info.compressed_size),
            if info.is_offloaded { ", offloaded" } else { "" },
            result.duration
        ));
    }
    line
}
