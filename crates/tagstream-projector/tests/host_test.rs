mod common;

use chrono::Duration;
use common::{base_time, raw_event, shop_event, sid, Item, ItemProjector, ShopEvent, VecLog};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tagstream_core::{
    Clock, ErrorPolicy, EventLog, ManualClock, ProjectionHostConfig, SortableUniqueId,
    TagstreamError,
};
use tagstream_projector::ProjectionHost;

struct Fixture {
    log: Arc<VecLog>,
    clock: Arc<ManualClock>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            log: Arc::new(VecLog::default()),
            clock: Arc::new(ManualClock::new(base_time() + Duration::milliseconds(5_000))),
        }
    }

    fn host(&self, config: ProjectionHostConfig) -> ProjectionHost<ItemProjector> {
        ProjectionHost::new(
            ItemProjector::default(),
            self.log.clone() as Arc<dyn EventLog>,
            self.clock.clone() as Arc<dyn Clock>,
            config,
        )
    }

    fn add(&self, ms: i64, id: u32, price: u64) {
        self.log.push(shop_event(ms, ShopEvent::ItemAdded { id, price }));
    }
}

fn one_second_window() -> ProjectionHostConfig {
    ProjectionHostConfig::new().with_safe_window_ms(1_000)
}

#[test]
fn test_threshold_trails_clock_by_safe_window() {
    let fx = Fixture::new();
    let mut host = fx.host(one_second_window());
    assert_eq!(
        host.current_threshold(),
        SortableUniqueId::upper_bound(base_time() + Duration::milliseconds(4_000))
    );
}

#[test]
fn test_recent_events_stay_unsafe_until_window_passes() {
    let fx = Fixture::new();
    fx.add(1_000, 1, 10);
    fx.add(3_000, 2, 20);
    fx.add(4_500, 3, 30);
    let mut host = fx.host(one_second_window());

    let stats = host.run_once().unwrap();
    assert_eq!(stats.events_read, 3);
    assert_eq!(stats.events_applied, 3);
    assert_eq!(stats.position, Some(sid(4_500)));
    assert!(!host.state().is_safe());

    let threshold = host.current_threshold();
    let safe = host.state().to_safe_view(&threshold);
    assert_eq!(safe.items.len(), 2);
    assert_eq!(host.state().to_current_view().items.len(), 3);

    fx.clock.advance(Duration::milliseconds(1_000));
    let stats = host.run_once().unwrap();
    assert_eq!(stats.events_read, 0);
    assert_eq!(stats.events_promoted, 1);
    assert!(host.state().is_safe());
}

#[test]
fn test_late_append_inside_window_is_still_folded() {
    let fx = Fixture::new();
    let mut host = fx.host(one_second_window());

    fx.add(4_800, 2, 20);
    let stats = host.run_once().unwrap();
    assert_eq!(stats.events_read, 1);
    assert_eq!(stats.position, Some(sid(4_800)));

    // A slower writer lands an older id after the host has read past it.
    fx.add(4_700, 1, 10);
    let stats = host.run_once().unwrap();
    assert_eq!(stats.events_read, 1);
    assert_eq!(stats.events_applied, 1);
    assert_eq!(host.state().version(), 2);

    // Rescanning the window does not fold anything twice.
    let stats = host.run_once().unwrap();
    assert_eq!(stats.events_read, 0);
    assert_eq!(host.state().version(), 2);

    fx.clock.advance(Duration::milliseconds(1_000));
    let stats = host.run_once().unwrap();
    assert_eq!(stats.events_promoted, 2);
    let threshold = host.current_threshold();
    let safe = host.state().to_safe_view(&threshold);
    assert_eq!(safe.items.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    assert!(host.state().is_safe());
}

#[test]
fn test_rescan_does_not_quarantine_twice() {
    let fx = Fixture::new();
    fx.log.push(raw_event(4_900, "ItemRemoved", json!({})));
    let mut host = fx.host(one_second_window().with_error_policy(ErrorPolicy::Quarantine));

    host.run_once().unwrap();
    host.run_once().unwrap();
    assert_eq!(host.quarantined().len(), 1);
}

#[test]
fn test_skip_policy_moves_past_bad_event() {
    let fx = Fixture::new();
    fx.add(1_000, 1, 10);
    fx.log.push(raw_event(2_000, "ItemAdded", json!({"id": 2})));
    fx.add(3_000, 3, 30);
    let mut host = fx.host(one_second_window().with_error_policy(ErrorPolicy::Skip));

    let stats = host.run_once().unwrap();
    assert_eq!(stats.events_read, 3);
    assert_eq!(stats.events_applied, 2);
    assert_eq!(host.state().version(), 2);
    assert_eq!(host.state().last_sortable_unique_id(), Some(&sid(3_000)));
    assert!(host.quarantined().is_empty());
}

#[test]
fn test_halt_policy_stops_at_bad_event() {
    let fx = Fixture::new();
    fx.add(1_000, 1, 10);
    fx.log.push(raw_event(2_000, "PriceChanged", json!("garbage")));
    fx.add(3_000, 3, 30);
    let mut host = fx.host(one_second_window().with_error_policy(ErrorPolicy::Halt));

    let err = host.run_once().unwrap_err();
    match err {
        TagstreamError::Projection(e) => {
            assert_eq!(e.event_type, "PriceChanged");
            assert_eq!(e.sortable_unique_id, sid(2_000));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(host.state().last_sortable_unique_id(), Some(&sid(1_000)));

    // Retrying hits the same event again.
    assert!(host.run_once().is_err());
    assert_eq!(host.state().version(), 1);
}

#[test]
fn test_quarantine_policy_records_failed_event() {
    let fx = Fixture::new();
    let bad = raw_event(2_000, "ItemRemoved", json!({}));
    fx.add(1_000, 1, 10);
    fx.log.push(bad.clone());
    let mut host = fx.host(one_second_window().with_error_policy(ErrorPolicy::Quarantine));

    host.run_once().unwrap();
    assert_eq!(host.quarantined().len(), 1);
    assert_eq!(host.quarantined()[0].event.id, bad.id);
    assert_eq!(host.quarantined()[0].failed_at, fx.clock.now());

    let drained = host.drain_quarantine();
    assert_eq!(drained.len(), 1);
    assert!(host.quarantined().is_empty());
    assert_eq!(host.state().last_sortable_unique_id(), Some(&sid(2_000)));
}

#[test]
fn test_delivery_watermark_replaces_clock_and_never_regresses() {
    let fx = Fixture::new();
    fx.add(1_000, 1, 10);
    fx.add(2_000, 2, 20);
    let mut host = fx.host(one_second_window());

    host.set_delivery_watermark(sid(1_000));
    host.run_once().unwrap();
    assert_eq!(host.current_threshold(), sid(1_000));
    assert!(host.state().payload().is_key_unsafe(&2));

    host.set_delivery_watermark(sid(500));
    assert_eq!(host.current_threshold(), sid(1_000));

    host.set_delivery_watermark(sid(2_000));
    host.run_once().unwrap();
    assert!(host.state().is_safe());
}

#[test]
fn test_catch_up_reads_all_batches() {
    let fx = Fixture::new();
    for i in 0..5u32 {
        fx.add(100 * (i as i64 + 1), i, u64::from(i));
    }
    let mut host = fx.host(one_second_window().with_batch_events_max(2));
    assert_eq!(host.get_lag().unwrap(), 5);

    let stats = host.catch_up().unwrap();
    assert_eq!(stats.events_read, 5);
    assert_eq!(stats.events_applied, 5);
    assert!(host.state().is_caught_up());
    assert_eq!(host.get_lag().unwrap(), 0);
    assert_eq!(host.state().version(), 5);
}

#[test]
fn test_deliver_pushes_single_event() {
    let fx = Fixture::new();
    let mut host = fx.host(one_second_window());
    let event = shop_event(4_900, ShopEvent::ItemAdded { id: 9, price: 1 });

    assert!(host.deliver(&event).unwrap().is_applied());
    assert_eq!(
        host.state().to_current_view().items[&9],
        Item { price: 1, updates: 1 }
    );
    assert!(host.state().payload().is_key_unsafe(&9));
}

#[tokio::test]
async fn test_run_continuous_stops_on_shutdown() {
    let fx = Fixture::new();
    fx.add(1_000, 1, 10);
    fx.add(2_000, 2, 20);
    let mut host = fx.host(one_second_window().with_poll_interval_ms(5));

    let shutdown = host.shutdown_handle();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown.store(true, Ordering::SeqCst);
    });
    host.run_continuous().await.unwrap();

    assert!(host.state().is_caught_up());
    assert_eq!(host.state().to_current_view().items.len(), 2);
}
