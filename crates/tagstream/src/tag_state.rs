//! Rebuild a single tag's state by replaying its events.

use tagstream_core::{EventLog, Result, Tag, TagProjector, TagState, TagstreamError};

/// Replay every event carrying `tag` through `P`.
///
/// Events of types foreign to `P` are ignored. A malformed event of a known
/// type aborts the replay with a projection error.
pub fn load_tag_state<P: TagProjector>(
    log: &dyn EventLog,
    tag: &Tag,
) -> Result<TagState<P::Payload>> {
    if !tag.is_in_group(P::TAG_GROUP) {
        return Err(TagstreamError::InvalidState(format!(
            "projector {} folds group {:?}, not tag {}",
            P::NAME,
            P::TAG_GROUP,
            tag
        )));
    }

    let mut state = TagState::empty::<P>(tag.clone());
    let mut applied = 0usize;
    for event in log.read_since(Some(tag), None, None)? {
        if state.apply::<P>(&event?)? {
            applied += 1;
        }
    }
    tracing::trace!(tag = %tag, projector = P::NAME, applied, "loaded tag state");
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryEventLog;
    use chrono::{TimeZone, Utc};
    use serde::{Deserialize, Serialize};
    use tagstream_core::{PendingEvent, SortableUniqueId, TypedPayload};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "data")]
    enum CounterEvent {
        Incremented { by: i64 },
        Closed,
    }

    impl TypedPayload for CounterEvent {
        const TYPE_NAMES: &'static [&'static str] = &["Incremented", "Closed"];
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "data")]
    enum Counter {
        Open { total: i64 },
        Closed { total: i64 },
    }

    impl TypedPayload for Counter {
        const TYPE_NAMES: &'static [&'static str] = &["Open", "Closed"];
    }

    struct CounterProjector;

    impl TagProjector for CounterProjector {
        type Payload = Counter;
        type Event = CounterEvent;

        const NAME: &'static str = "counter";
        const VERSION: &'static str = "1";
        const TAG_GROUP: &'static str = "counter";

        fn initial_payload() -> Counter {
            Counter::Open { total: 0 }
        }

        fn project(payload: Counter, event: &CounterEvent) -> Counter {
            match (payload, event) {
                (Counter::Open { total }, CounterEvent::Incremented { by }) => {
                    Counter::Open { total: total + by }
                }
                (Counter::Open { total }, CounterEvent::Closed) => Counter::Closed { total },
                (closed, _) => closed,
            }
        }

        fn is_retired(payload: &Counter) -> bool {
            matches!(payload, Counter::Closed { .. })
        }
    }

    fn append(log: &InMemoryEventLog, token: u64, tag: &Tag, event: &CounterEvent) {
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap();
        let pending = PendingEvent::new(event, [tag.clone()]).unwrap();
        log.append(&[pending.stamp(SortableUniqueId::generate(at, token))])
            .unwrap();
    }

    #[test]
    fn test_replays_only_the_requested_tag() {
        let log = InMemoryEventLog::new();
        let a: Tag = "counter:a".parse().unwrap();
        let b: Tag = "counter:b".parse().unwrap();
        append(&log, 1, &a, &CounterEvent::Incremented { by: 2 });
        append(&log, 2, &b, &CounterEvent::Incremented { by: 100 });
        append(&log, 3, &a, &CounterEvent::Incremented { by: 5 });
        append(&log, 4, &a, &CounterEvent::Closed);

        let state = load_tag_state::<CounterProjector>(&log, &a).unwrap();
        assert_eq!(state.payload, Counter::Closed { total: 7 });
        assert_eq!(state.version, 3);
        assert!(state.is_retired::<CounterProjector>());
        assert_eq!(state.last_sortable_unique_id.unwrap().token(), 4);
    }

    #[test]
    fn test_unknown_tag_yields_initial_state() {
        let log = InMemoryEventLog::new();
        let tag: Tag = "counter:none".parse().unwrap();
        let state = load_tag_state::<CounterProjector>(&log, &tag).unwrap();
        assert_eq!(state.payload, Counter::Open { total: 0 });
        assert_eq!(state.version, 0);
        assert_eq!(state.last_sortable_unique_id, None);
    }

    #[test]
    fn test_rejects_tag_from_another_group() {
        let log = InMemoryEventLog::new();
        let tag: Tag = "invoice:1".parse().unwrap();
        assert!(matches!(
            load_tag_state::<CounterProjector>(&log, &tag),
            Err(TagstreamError::InvalidState(_))
        ));
    }
}
