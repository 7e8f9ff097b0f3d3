//! Optional metrics instrumentation for tagstream.
//!
//! When the `observe` feature is enabled, key operations emit counters and
//! histograms via the [`metrics`] crate. A downstream application must
//! install a metrics recorder to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

use std::time::Duration;

/// Outcome label for a reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationOutcome {
    Granted,
    Conflict,
    Committed,
    Expired,
    Mismatch,
    Released,
}

impl ReservationOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ReservationOutcome::Granted => "granted",
            ReservationOutcome::Conflict => "conflict",
            ReservationOutcome::Committed => "committed",
            ReservationOutcome::Expired => "expired",
            ReservationOutcome::Mismatch => "mismatch",
            ReservationOutcome::Released => "released",
        }
    }
}

/// - `tagstream.reservation.total` – counter with `outcome` label
#[inline]
pub fn record_reservation(outcome: ReservationOutcome) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tagstream.reservation.total", "outcome" => outcome.as_str()).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = outcome;
    }
}

/// - `tagstream.log.appended_events_total` – counter
/// - `tagstream.log.append_duration_seconds` – histogram
#[inline]
pub fn record_append(events: usize, duration: Duration) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tagstream.log.appended_events_total").increment(events as u64);
        metrics::histogram!("tagstream.log.append_duration_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (events, duration);
    }
}

/// - `tagstream.projection.folded_events_total` – counter with `projector` label
/// - `tagstream.projection.batch_duration_seconds` – histogram
#[inline]
pub fn record_fold_batch(projector: &str, events: usize, duration: Duration) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tagstream.projection.folded_events_total", "projector" => projector.to_string())
            .increment(events as u64);
        metrics::histogram!("tagstream.projection.batch_duration_seconds")
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (projector, events, duration);
    }
}

/// - `tagstream.projection.failed_events_total` – counter with `projector` label
#[inline]
pub fn record_projection_failure(projector: &str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tagstream.projection.failed_events_total", "projector" => projector.to_string())
            .increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = projector;
    }
}

/// - `tagstream.snapshot.writes_total` – counter with `tier` label (`inline` / `blob`)
/// - `tagstream.snapshot.compressed_bytes` – histogram
#[inline]
pub fn record_snapshot_write(bytes: usize, offloaded: bool) {
    #[cfg(feature = "observe")]
    {
        let tier = if offloaded { "blob" } else { "inline" };
        metrics::counter!("tagstream.snapshot.writes_total", "tier" => tier).increment(1);
        metrics::histogram!("tagstream.snapshot.compressed_bytes").record(bytes as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (bytes, offloaded);
    }
}

/// - `tagstream.snapshot.loads_total` – counter with `result` label
///   (`hit` / `miss` / `fallback` / `failed`)
#[inline]
pub fn record_snapshot_load(result: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tagstream.snapshot.loads_total", "result" => result).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = result;
    }
}
