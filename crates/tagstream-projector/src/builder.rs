//! Snapshot builder
//!
//! Decides per registered projector whether a rebuild is worthwhile, folds
//! the log on top of the best available snapshot and writes the result.

use crate::host::ProjectionHost;
use crate::multi_projector::MultiProjector;
use crate::snapshot::{load_snapshot, write_snapshot, BuildOrigin};
use crate::state::MultiProjectionState;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tagstream_core::config::SnapshotConfig;
use tagstream_core::{
    Clock, EventLog, ProjectionHostConfig, Result, SnapshotInfo, SnapshotStore, TagstreamError,
};

/// Build options
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Rebuild from scratch regardless of thresholds
    pub force: bool,
    /// Only build this projector
    pub projector: Option<String>,
    /// Report decisions without writing
    pub dry_run: bool,
    pub snapshot: SnapshotConfig,
    pub host: ProjectionHostConfig,
    pub build_source: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            force: false,
            projector: None,
            dry_run: false,
            snapshot: SnapshotConfig::default(),
            host: ProjectionHostConfig::default(),
            build_source: "builder".to_string(),
        }
    }
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_projector(mut self, name: impl Into<String>) -> Self {
        self.projector = Some(name.into());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_min_event_threshold(mut self, events: u64) -> Self {
        self.snapshot.min_event_threshold = events;
        self
    }

    pub fn with_snapshot_config(mut self, config: SnapshotConfig) -> Self {
        self.snapshot = config;
        self
    }

    pub fn with_host_config(mut self, config: ProjectionHostConfig) -> Self {
        self.host = config;
        self
    }

    pub fn with_build_source(mut self, source: impl Into<String>) -> Self {
        self.build_source = source.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Success,
    Skipped,
    Failed,
}

#[derive(Debug, Clone)]
pub struct BuildResult {
    pub projector_name: String,
    pub projector_version: String,
    pub status: BuildStatus,
    pub reason: String,
    pub events_processed: u64,
    pub snapshot: Option<SnapshotInfo>,
    pub duration: Duration,
}

/// What to do for one projector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildDecision {
    /// Fold from an empty state.
    FromScratch { reason: String },
    /// Fold on top of the same-version snapshot.
    Incremental { reason: String },
    Skip { reason: String },
}

/// Decide whether to rebuild.
///
/// `new_since_snapshot` is the number of log events past the same-version
/// snapshot's position, `None` when no such snapshot exists.
///
/// - `force` always rebuilds from scratch.
/// - A same-version snapshot is extended once `min_events` new events exist.
/// - An older-version snapshot that had reached `min_events` is rebuilt for
///   the new version right away.
/// - With no snapshot, a build starts once the log holds `min_events`.
pub fn decide(
    total_events: u64,
    new_since_snapshot: Option<u64>,
    any_version: Option<&SnapshotInfo>,
    force: bool,
    min_events: u64,
) -> BuildDecision {
    if force {
        return BuildDecision::FromScratch {
            reason: "forced".to_string(),
        };
    }
    if let Some(new_events) = new_since_snapshot {
        return if new_events >= min_events {
            BuildDecision::Incremental {
                reason: format!("{new_events} new events since last snapshot"),
            }
        } else {
            BuildDecision::Skip {
                reason: format!("only {new_events} new events (< {min_events})"),
            }
        };
    }
    if let Some(older) = any_version {
        if older.events_processed >= min_events {
            return BuildDecision::FromScratch {
                reason: format!(
                    "projector version changed from {}",
                    older.projector_version
                ),
            };
        }
    }
    if total_events >= min_events {
        BuildDecision::FromScratch {
            reason: format!("{total_events} events in log"),
        }
    } else {
        BuildDecision::Skip {
            reason: format!("only {total_events} events (< {min_events})"),
        }
    }
}

/// Log events appended past the position `snapshot` covers.
///
/// Events the projector ignored are part of that position, so a projector
/// that filters most of the log does not look permanently behind.
pub fn events_since_snapshot(log: &dyn EventLog, snapshot: &SnapshotInfo) -> Result<u64> {
    log.count(snapshot.log_position())
}

/// Newest snapshot metadata for `projector_name` under any version other
/// than `current_version`. Reads metadata only, never offloaded payloads.
fn latest_other_version(
    snapshots: &dyn SnapshotStore,
    projector_name: &str,
    current_version: &str,
) -> Result<Option<SnapshotInfo>> {
    Ok(snapshots
        .list_all()?
        .into_iter()
        .filter(|s| s.projector_name == projector_name && s.projector_version != current_version)
        .max_by(|a, b| {
            a.events_processed
                .cmp(&b.events_processed)
                .then(a.updated_at.cmp(&b.updated_at))
        }))
}

/// Shared handles used by every build.
#[derive(Clone)]
pub struct BuildContext {
    pub log: Arc<dyn EventLog>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub clock: Arc<dyn Clock>,
}

/// A projector type erased for the registry.
pub trait RegisteredProjector: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn build(&self, ctx: &BuildContext, options: &BuildOptions) -> Result<BuildResult>;
}

struct Registration<M>(M);

impl<M: MultiProjector> RegisteredProjector for Registration<M> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn version(&self) -> &str {
        self.0.version()
    }

    fn build(&self, ctx: &BuildContext, options: &BuildOptions) -> Result<BuildResult> {
        let start = Instant::now();
        let projector = &self.0;
        let total = ctx.log.count(None)?;
        let same_info = match ctx
            .snapshots
            .get_latest(projector.name(), projector.version())
        {
            Ok(record) => record.map(|r| r.info()),
            Err(e) if e.is_fatal_snapshot_failure() => return Err(e),
            Err(e) => {
                tracing::warn!(projector = %projector.name(), error = %e, "snapshot unreadable, rebuilding from log");
                None
            }
        };
        let new_since_snapshot = match &same_info {
            Some(info) => Some(events_since_snapshot(ctx.log.as_ref(), info)?),
            None => None,
        };
        let any_info =
            latest_other_version(ctx.snapshots.as_ref(), projector.name(), projector.version())?;

        let decision = decide(
            total,
            new_since_snapshot,
            any_info.as_ref(),
            options.force,
            options.snapshot.min_event_threshold,
        );
        let result = |status, reason: String, events, snapshot| BuildResult {
            projector_name: projector.name().to_string(),
            projector_version: projector.version().to_string(),
            status,
            reason,
            events_processed: events,
            snapshot,
            duration: start.elapsed(),
        };

        let (incremental, reason) = match decision {
            BuildDecision::Skip { reason } => {
                return Ok(result(
                    BuildStatus::Skipped,
                    reason,
                    same_info.map_or(0, |s| s.events_processed),
                    None,
                ))
            }
            BuildDecision::FromScratch { reason } => (false, reason),
            BuildDecision::Incremental { reason } => (true, reason),
        };
        if options.dry_run {
            return Ok(result(
                BuildStatus::Skipped,
                format!("dry run: would build ({reason})"),
                0,
                None,
            ));
        }

        let base = if incremental {
            load_snapshot(ctx.snapshots.as_ref(), projector, None)?
        } else {
            None
        };
        let state = base.unwrap_or_else(|| MultiProjectionState::new(projector.clone()));
        let mut host = ProjectionHost::from_state(
            state,
            ctx.log.clone(),
            ctx.clock.clone(),
            options.host.clone(),
        );
        host.catch_up()?;
        let threshold = host.current_threshold();
        let info = write_snapshot(
            ctx.snapshots.as_ref(),
            host.state(),
            &threshold,
            &options.snapshot,
            &BuildOrigin::new(options.build_source.clone()),
        )?;
        let events = info.events_processed;
        Ok(result(BuildStatus::Success, reason, events, Some(info)))
    }
}

/// Name, version pair for listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectorDescriptor {
    pub name: String,
    pub version: String,
}

/// Projectors known to a builder, by name.
#[derive(Default, Clone)]
pub struct ProjectorRegistry {
    entries: BTreeMap<String, Arc<dyn RegisteredProjector>>,
}

impl ProjectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// `Config` if a projector with the same name is already registered.
    pub fn register<M: MultiProjector>(&mut self, projector: M) -> Result<()> {
        let name = projector.name().to_string();
        if self.entries.contains_key(&name) {
            return Err(TagstreamError::Config(format!(
                "projector {name} is already registered"
            )));
        }
        self.entries.insert(name, Arc::new(Registration(projector)));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn RegisteredProjector>> {
        self.entries.get(name)
    }

    pub fn list(&self) -> Vec<ProjectorDescriptor> {
        self.entries
            .values()
            .map(|p| ProjectorDescriptor {
                name: p.name().to_string(),
                version: p.version().to_string(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds snapshots for registered projectors.
pub struct SnapshotBuilder {
    ctx: BuildContext,
    registry: ProjectorRegistry,
}

impl SnapshotBuilder {
    pub fn new(ctx: BuildContext, registry: ProjectorRegistry) -> Self {
        Self { ctx, registry }
    }

    pub fn registry(&self) -> &ProjectorRegistry {
        &self.registry
    }

    /// Build a single projector by name.
    ///
    /// # Errors
    ///
    /// `NotFound` if no projector is registered under `name`.
    pub fn build_projector(&self, name: &str, options: &BuildOptions) -> Result<BuildResult> {
        let options = options.clone().with_projector(name);
        self.build_all(&options)?
            .pop()
            .ok_or_else(|| TagstreamError::NotFound(format!("projector {name}")))
    }

    /// Build every projector, or only `options.projector`.
    ///
    /// A failing projector is reported as `Failed` and does not stop the
    /// others.
    ///
    /// # Errors
    ///
    /// `NotFound` if `options.projector` names an unregistered projector.
    pub fn build_all(&self, options: &BuildOptions) -> Result<Vec<BuildResult>> {
        let targets: Vec<&Arc<dyn RegisteredProjector>> = match &options.projector {
            Some(name) => vec![self
                .registry
                .get(name)
                .ok_or_else(|| TagstreamError::NotFound(format!("projector {name}")))?],
            None => self.registry.entries.values().collect(),
        };

        let mut results = Vec::with_capacity(targets.len());
        for projector in targets {
            let start = Instant::now();
            match projector.build(&self.ctx, options) {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!(projector = %projector.name(), error = %e, "snapshot build failed");
                    results.push(BuildResult {
                        projector_name: projector.name().to_string(),
                        projector_version: projector.version().to_string(),
                        status: BuildStatus::Failed,
                        reason: e.to_string(),
                        events_processed: 0,
                        snapshot: None,
                        duration: start.elapsed(),
                    });
                }
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn info(version: &str, processed: u64) -> SnapshotInfo {
        SnapshotInfo {
            projector_name: "orders".into(),
            projector_version: version.into(),
            payload_type: "x".into(),
            last_sortable_unique_id: None,
            events_processed: processed,
            is_offloaded: false,
            offload_key: None,
            original_size: 0,
            compressed_size: 0,
            safe_window_threshold: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            build_source: "test".into(),
        }
    }

    #[test]
    fn force_always_builds() {
        assert!(matches!(
            decide(100, Some(0), None, true, 3000),
            BuildDecision::FromScratch { .. }
        ));
    }

    #[test]
    fn same_version_needs_enough_new_events() {
        assert!(matches!(
            decide(3999, Some(2999), None, false, 3000),
            BuildDecision::Skip { .. }
        ));
        assert!(matches!(
            decide(4000, Some(3000), None, false, 3000),
            BuildDecision::Incremental { .. }
        ));
    }

    #[test]
    fn same_version_ignores_total_log_size() {
        // A projector that folded few of many events is still up to date.
        assert!(matches!(
            decide(110, Some(0), None, false, 50),
            BuildDecision::Skip { .. }
        ));
    }

    #[test]
    fn log_position_prefers_threshold() {
        let mut snapshot = info("1", 10);
        assert_eq!(snapshot.log_position(), None);
        let last = tagstream_core::SortableUniqueId::generate(Utc::now(), 1);
        snapshot.last_sortable_unique_id = Some(last.clone());
        assert_eq!(snapshot.log_position(), Some(&last));
        let threshold = tagstream_core::SortableUniqueId::upper_bound(Utc::now());
        snapshot.safe_window_threshold = Some(threshold.clone());
        assert_eq!(snapshot.log_position(), Some(&threshold));
    }

    #[test]
    fn version_change_rebuilds_established_projector() {
        let old = info("1", 5000);
        assert!(matches!(
            decide(5000, None, Some(&old), false, 3000),
            BuildDecision::FromScratch { .. }
        ));
        let small_old = info("1", 10);
        assert!(matches!(
            decide(20, None, Some(&small_old), false, 3000),
            BuildDecision::Skip { .. }
        ));
    }

    #[test]
    fn fresh_projector_waits_for_minimum() {
        assert!(matches!(decide(2999, None, None, false, 3000), BuildDecision::Skip { .. }));
        assert!(matches!(
            decide(3000, None, None, false, 3000),
            BuildDecision::FromScratch { .. }
        ));
    }
}
