use crate::multi_projector::MultiProjector;
use crate::safe_unsafe::ApplyOutcome;
use crate::state::MultiProjectionState;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tagstream_core::{
    observe, Clock, ErrorPolicy, Event, EventLog, ProjectionError, ProjectionHostConfig, Result,
    SortableUniqueId, TagstreamError,
};
use tokio::sync::Notify;

/// An event the host moved past under [`ErrorPolicy::Quarantine`].
#[derive(Debug, Clone)]
pub struct FailedEvent {
    pub event: Event,
    pub error: ProjectionError,
    pub failed_at: DateTime<Utc>,
}

/// Projection host: feeds events from the log into one projection state.
///
/// The host owns the safe-threshold policy. Without an explicit delivery
/// watermark the threshold trails the clock by `safe_window_ms`; the value
/// handed to the projection never moves backwards.
///
/// Each pass rescans the log from the promoted cutover rather than from the
/// highest id seen, so an event appended late with an id inside the unsafe
/// window is still picked up. Ids already handled above the cutover are
/// remembered and not folded twice.
pub struct ProjectionHost<M: MultiProjector> {
    log: Arc<dyn EventLog>,
    clock: Arc<dyn Clock>,
    config: ProjectionHostConfig,
    state: MultiProjectionState<M>,
    threshold: Option<SortableUniqueId>,
    watermark: Option<SortableUniqueId>,
    quarantine: Vec<FailedEvent>,
    /// Ids above the cutover that were already folded, skipped or quarantined.
    seen: BTreeSet<SortableUniqueId>,
    /// Resume point while a rescan spans several batches.
    scan_cursor: Option<SortableUniqueId>,
    shutdown: Arc<AtomicBool>,
    /// When set, the host awaits this notification instead of polling.
    event_notify: Option<Arc<Notify>>,
}

impl<M: MultiProjector> ProjectionHost<M> {
    pub fn new(
        projector: M,
        log: Arc<dyn EventLog>,
        clock: Arc<dyn Clock>,
        config: ProjectionHostConfig,
    ) -> Self {
        Self::from_state(MultiProjectionState::new(projector), log, clock, config)
    }

    /// Resume from an existing state, typically one loaded from a snapshot.
    pub fn from_state(
        state: MultiProjectionState<M>,
        log: Arc<dyn EventLog>,
        clock: Arc<dyn Clock>,
        config: ProjectionHostConfig,
    ) -> Self {
        let threshold = state.payload().container().cutover().cloned();
        Self {
            log,
            clock,
            config,
            state,
            threshold,
            watermark: None,
            quarantine: Vec::new(),
            seen: BTreeSet::new(),
            scan_cursor: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            event_notify: None,
        }
    }

    /// Attach an event notification handle for push-based projection.
    pub fn with_event_notify(mut self, notify: Arc<Notify>) -> Self {
        self.event_notify = Some(notify);
        self
    }

    /// Supply a delivery watermark: every event at or before `watermark` has
    /// been delivered from every upstream partition. Replaces the clock
    /// based policy from now on.
    pub fn set_delivery_watermark(&mut self, watermark: SortableUniqueId) {
        self.watermark = Some(watermark);
    }

    /// Threshold to hand the projection now.
    pub fn current_threshold(&mut self) -> SortableUniqueId {
        let candidate = match &self.watermark {
            Some(watermark) => watermark.clone(),
            None => {
                let window = chrono::Duration::milliseconds(
                    i64::try_from(self.config.safe_window_ms).unwrap_or(i64::MAX),
                );
                let at = self
                    .clock
                    .now()
                    .checked_sub_signed(window)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                SortableUniqueId::upper_bound(at)
            }
        };
        let threshold = match self.threshold.take() {
            Some(previous) if previous > candidate => previous,
            _ => candidate,
        };
        self.threshold = Some(threshold.clone());
        threshold
    }

    /// Fold one pushed event, applying the error policy.
    pub fn deliver(&mut self, event: &Event) -> Result<ApplyOutcome> {
        let threshold = self.current_threshold();
        self.fold(event, &threshold)
    }

    fn fold(&mut self, event: &Event, threshold: &SortableUniqueId) -> Result<ApplyOutcome> {
        match self.state.apply(event, Some(threshold)) {
            Ok(outcome) => {
                self.seen.insert(event.sortable_unique_id.clone());
                Ok(outcome)
            }
            Err(error) => {
                observe::record_projection_failure(self.state.projector_name());
                match self.config.error_policy {
                    ErrorPolicy::Halt => {
                        tracing::error!(error = %error, "halting projection");
                        Err(TagstreamError::Projection(error))
                    }
                    ErrorPolicy::Skip => {
                        tracing::warn!(error = %error, "skipping event");
                        self.state.skip(event);
                        self.seen.insert(event.sortable_unique_id.clone());
                        Ok(ApplyOutcome::Filtered)
                    }
                    ErrorPolicy::Quarantine => {
                        tracing::warn!(error = %error, "quarantining event");
                        self.quarantine.push(FailedEvent {
                            event: event.clone(),
                            error,
                            failed_at: self.clock.now(),
                        });
                        self.state.skip(event);
                        self.seen.insert(event.sortable_unique_id.clone());
                        Ok(ApplyOutcome::Filtered)
                    }
                }
            }
        }
    }

    /// Run one batch from the log.
    ///
    /// Reads up to `batch_events_max` events after the promoted cutover (or
    /// after the previous batch of an unfinished rescan), folds the ones not
    /// handled before, then promotes the current threshold.
    pub fn run_once(&mut self) -> Result<HostStats> {
        let start = Instant::now();
        let threshold = self.current_threshold();
        let since = match &self.scan_cursor {
            Some(cursor) => Some(cursor.clone()),
            None => self.state.payload().container().cutover().cloned(),
        };
        let events: Vec<Event> = self
            .log
            .read_since(None, since.as_ref(), Some(self.config.batch_events_max))?
            .collect::<Result<_>>()?;

        let mut stats = HostStats::empty();
        stats.has_more = events.len() >= self.config.batch_events_max;
        for event in &events {
            if self.seen.contains(&event.sortable_unique_id) {
                continue;
            }
            stats.events_read += 1;
            if self.fold(event, &threshold)?.is_applied() {
                stats.events_applied += 1;
            }
        }
        self.scan_cursor = match events.last() {
            Some(last) if stats.has_more => Some(last.sortable_unique_id.clone()),
            _ => None,
        };

        // Threshold may have advanced even when nothing new arrived.
        stats.events_promoted = self.state.promote(&threshold);
        self.forget_safe(&threshold);
        stats.duration = start.elapsed();
        stats.position = self.state.last_sortable_unique_id().cloned();

        if stats.events_read > 0 {
            observe::record_fold_batch(
                self.state.projector_name(),
                stats.events_read,
                stats.duration,
            );
        }
        Ok(stats)
    }

    /// Drop remembered ids at or below `threshold`; rescans start above it.
    fn forget_safe(&mut self, threshold: &SortableUniqueId) {
        let mut above = self.seen.split_off(threshold);
        above.remove(threshold);
        self.seen = above;
    }

    /// Read until the log has nothing newer, then mark the state caught up.
    pub fn catch_up(&mut self) -> Result<HostStats> {
        let start = Instant::now();
        let mut total = HostStats::empty();
        loop {
            let batch = self.run_once()?;
            total.events_read += batch.events_read;
            total.events_applied += batch.events_applied;
            total.events_promoted += batch.events_promoted;
            total.position = batch.position;
            if !batch.has_more {
                break;
            }
        }
        total.duration = start.elapsed();
        self.state.set_caught_up(true);
        Ok(total)
    }

    /// Run the host continuously until shutdown.
    ///
    /// When an `event_notify` handle is set, the host awaits the
    /// notification instead of sleeping for `poll_interval_ms` once caught up.
    pub async fn run_continuous(&mut self) -> Result<()> {
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.run_once() {
                Ok(stats) => {
                    if stats.events_read == 0 && !stats.has_more {
                        self.state.set_caught_up(true);
                        if let Some(notify) = &self.event_notify {
                            tokio::select! {
                                _ = notify.notified() => {}
                                _ = tokio::time::sleep(poll) => {}
                            }
                        } else {
                            tokio::time::sleep(poll).await;
                        }
                    } else if stats.events_read > 0 {
                        self.state.set_caught_up(false);
                        tracing::debug!(
                            "Applied {} of {} events in {:?}",
                            stats.events_applied,
                            stats.events_read,
                            stats.duration
                        );
                    }
                }
                Err(e) => {
                    tracing::error!("Projection host error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        Ok(())
    }

    /// Signal shutdown
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Handle that can stop [`run_continuous`](Self::run_continuous) from elsewhere.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Events in the log not yet read by this host.
    pub fn get_lag(&self) -> Result<u64> {
        self.log.count(self.state.last_sortable_unique_id())
    }

    pub fn state(&self) -> &MultiProjectionState<M> {
        &self.state
    }

    pub fn into_state(self) -> MultiProjectionState<M> {
        self.state
    }

    pub fn quarantined(&self) -> &[FailedEvent] {
        &self.quarantine
    }

    /// Hand back quarantined events, clearing the list.
    pub fn drain_quarantine(&mut self) -> Vec<FailedEvent> {
        std::mem::take(&mut self.quarantine)
    }
}

/// Host statistics
#[derive(Debug, Clone)]
pub struct HostStats {
    /// Events read that this host had not handled before.
    pub events_read: usize,
    pub events_applied: usize,
    pub events_promoted: usize,
    /// The batch was full; the rescan continues on the next run.
    pub has_more: bool,
    pub duration: Duration,
    pub position: Option<SortableUniqueId>,
}

impl HostStats {
    pub fn empty() -> Self {
        Self {
            events_read: 0,
            events_applied: 0,
            events_promoted: 0,
            has_more: false,
            duration: Duration::ZERO,
            position: None,
        }
    }
}
