//! Windowed dual-state fold container
//!
//! Folds events into a keyed map while separating results that are stable
//! ("safe": built only from events at or below a caller-supplied threshold)
//! from results that may still change because recent events can arrive late
//! or more than once.
//!
//! Layout:
//! - `safe` is the fold of every accepted event at or below `cutover`
//! - `pending` holds accepted events above `cutover`, keyed by sortable id
//! - `current` is the fold of everything accepted so far
//!
//! A safe view for a threshold above `cutover` is `safe` plus the pending
//! events up to that threshold, re-folded in sortable-id order. Promoting a
//! threshold moves those pending events into `safe` for good.
//!
//! Per key, an event is accepted only if its id is newer than the last id
//! applied to that key. That makes duplicate delivery a no-op and means each
//! key only ever sees its own events in increasing order, so `current`
//! depends on the set of accepted events and not on global arrival order.

use std::collections::BTreeMap;
use tagstream_core::{Sequenced, SortableUniqueId};
use uuid::Uuid;

/// Result of offering one event to the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Folded into `keys` keys. `safe` is true when the event was at or
    /// below the cutover and went straight into the safe map.
    Applied { keys: usize, safe: bool },
    /// Every affected key had already seen this id or a newer one.
    Duplicate,
    /// The event affects no key.
    NoKeys,
    /// The projector does not handle this event type.
    Filtered,
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied { .. })
    }
}

#[derive(Debug, Clone)]
struct Pending<K, E> {
    event: E,
    keys: Vec<K>,
}

/// Safe map, per-key marks, event count and tip at some threshold.
///
/// `marks` may name keys that are absent from `items`: those keys were
/// removed and the mark keeps late duplicates from resurrecting them.
#[derive(Debug, Clone, PartialEq)]
pub struct SafeFrame<K: Ord, S> {
    pub items: BTreeMap<K, S>,
    pub marks: BTreeMap<K, SortableUniqueId>,
    pub events: u64,
    pub tip: Option<(SortableUniqueId, Uuid)>,
}

#[derive(Debug, Clone)]
pub struct SafeUnsafeProjectionState<K: Ord, S, E> {
    safe: BTreeMap<K, S>,
    safe_marks: BTreeMap<K, SortableUniqueId>,
    safe_events: u64,
    safe_tip: Option<(SortableUniqueId, Uuid)>,
    current: BTreeMap<K, S>,
    current_marks: BTreeMap<K, SortableUniqueId>,
    current_events: u64,
    current_tip: Option<(SortableUniqueId, Uuid)>,
    pending: BTreeMap<SortableUniqueId, Pending<K, E>>,
    unsafe_keys: BTreeMap<K, usize>,
    cutover: Option<SortableUniqueId>,
}

impl<K: Ord, S, E> Default for SafeUnsafeProjectionState<K, S, E> {
    fn default() -> Self {
        Self {
            safe: BTreeMap::new(),
            safe_marks: BTreeMap::new(),
            safe_events: 0,
            safe_tip: None,
            current: BTreeMap::new(),
            current_marks: BTreeMap::new(),
            current_events: 0,
            current_tip: None,
            pending: BTreeMap::new(),
            unsafe_keys: BTreeMap::new(),
            cutover: None,
        }
    }
}

fn store<K: Ord + Clone, S>(map: &mut BTreeMap<K, S>, key: &K, value: Option<S>) {
    match value {
        Some(state) => {
            map.insert(key.clone(), state);
        }
        None => {
            map.remove(key);
        }
    }
}

fn advance_tip(tip: &mut Option<(SortableUniqueId, Uuid)>, id: &SortableUniqueId, event_id: Uuid) {
    if tip.as_ref().map_or(true, |(last, _)| id > last) {
        *tip = Some((id.clone(), event_id));
    }
}

impl<K, S, E> SafeUnsafeProjectionState<K, S, E>
where
    K: Ord + Clone,
    S: Clone,
    E: Sequenced,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted safe frame. Everything in the frame is
    /// treated as safe up to `cutover`.
    pub fn from_safe_frame(frame: SafeFrame<K, S>, cutover: Option<SortableUniqueId>) -> Self {
        Self {
            current: frame.items.clone(),
            current_marks: frame.marks.clone(),
            current_events: frame.events,
            current_tip: frame.tip.clone(),
            safe: frame.items,
            safe_marks: frame.marks,
            safe_events: frame.events,
            safe_tip: frame.tip,
            pending: BTreeMap::new(),
            unsafe_keys: BTreeMap::new(),
            cutover,
        }
    }

    /// Fold one event.
    ///
    /// `project` returning `None` removes the key. Keys for which the event
    /// is not newer than the last applied id are left untouched.
    ///
    /// That includes a late event whose id sorts below a pending event
    /// already applied to the same key: it is dropped for that key, not
    /// re-ordered into the window. Keys it shares with no newer event still
    /// take it.
    pub fn apply<X, P>(&mut self, event: E, extract_affected_keys: X, project: P) -> ApplyOutcome
    where
        X: FnOnce(&E) -> Vec<K>,
        P: Fn(&K, Option<&S>, &E) -> Option<S>,
    {
        let id = event.sortable_unique_id().clone();
        let mut keys = extract_affected_keys(&event);
        if keys.is_empty() {
            return ApplyOutcome::NoKeys;
        }
        keys.sort();
        keys.dedup();
        let accepted: Vec<K> = keys
            .into_iter()
            .filter(|k| self.current_marks.get(k).map_or(true, |mark| &id > mark))
            .collect();
        if accepted.is_empty() {
            return ApplyOutcome::Duplicate;
        }

        let is_safe = self.cutover.as_ref().is_some_and(|cutover| &id <= cutover);
        for key in &accepted {
            let next = project(key, self.current.get(key), &event);
            if is_safe {
                // An accepted key below the cutover has no pending events, so
                // its safe and current values are the same before this event.
                store(&mut self.safe, key, next.clone());
                self.safe_marks.insert(key.clone(), id.clone());
            }
            store(&mut self.current, key, next);
            self.current_marks.insert(key.clone(), id.clone());
        }
        self.current_events += 1;
        advance_tip(&mut self.current_tip, &id, event.event_id());

        let keys = accepted.len();
        if is_safe {
            self.safe_events += 1;
            advance_tip(&mut self.safe_tip, &id, event.event_id());
        } else {
            for key in &accepted {
                *self.unsafe_keys.entry(key.clone()).or_insert(0) += 1;
            }
            self.pending.insert(
                id,
                Pending {
                    event,
                    keys: accepted,
                },
            );
        }
        ApplyOutcome::Applied {
            keys,
            safe: is_safe,
        }
    }

    /// Move every pending event at or below `threshold` into the safe map.
    ///
    /// A threshold at or below the current cutover is ignored, so the safe
    /// map never moves backwards. Returns the number of events promoted.
    pub fn promote<P>(&mut self, threshold: &SortableUniqueId, project: P) -> usize
    where
        P: Fn(&K, Option<&S>, &E) -> Option<S>,
    {
        if self.cutover.as_ref().is_some_and(|c| threshold <= c) {
            return 0;
        }
        let ready: Vec<SortableUniqueId> = self
            .pending
            .range(..=threshold)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ready {
            let Some(pending) = self.pending.remove(id) else {
                continue;
            };
            for key in &pending.keys {
                let next = project(key, self.safe.get(key), &pending.event);
                store(&mut self.safe, key, next);
                self.safe_marks.insert(key.clone(), id.clone());
                if let Some(count) = self.unsafe_keys.get_mut(key) {
                    *count -= 1;
                    if *count == 0 {
                        self.unsafe_keys.remove(key);
                    }
                }
            }
            self.safe_events += 1;
            advance_tip(&mut self.safe_tip, id, pending.event.event_id());
        }
        self.cutover = Some(threshold.clone());
        ready.len()
    }

    /// Everything folded so far.
    pub fn current(&self) -> &BTreeMap<K, S> {
        &self.current
    }

    /// Fold result using only accepted events at or below `threshold`.
    ///
    /// Thresholds below the promoted cutover see the cutover view; history
    /// below the cutover is not retained.
    pub fn safe<P>(&self, threshold: &SortableUniqueId, project: P) -> BTreeMap<K, S>
    where
        P: Fn(&K, Option<&S>, &E) -> Option<S>,
    {
        self.safe_frame(threshold, project).items
    }

    /// Safe map together with marks, event count and tip at `threshold`.
    pub fn safe_frame<P>(&self, threshold: &SortableUniqueId, project: P) -> SafeFrame<K, S>
    where
        P: Fn(&K, Option<&S>, &E) -> Option<S>,
    {
        let mut frame = SafeFrame {
            items: self.safe.clone(),
            marks: self.safe_marks.clone(),
            events: self.safe_events,
            tip: self.safe_tip.clone(),
        };
        for (id, pending) in self.pending.range(..=threshold) {
            for key in &pending.keys {
                let next = project(key, frame.items.get(key), &pending.event);
                store(&mut frame.items, key, next);
                frame.marks.insert(key.clone(), id.clone());
            }
            frame.events += 1;
            advance_tip(&mut frame.tip, id, pending.event.event_id());
        }
        frame
    }

    /// True while `key` has events above the promoted cutover, i.e. while
    /// its current value may differ from its safe value.
    pub fn is_key_unsafe(&self, key: &K) -> bool {
        self.unsafe_keys.contains_key(key)
    }

    pub fn unsafe_key_count(&self) -> usize {
        self.unsafe_keys.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn cutover(&self) -> Option<&SortableUniqueId> {
        self.cutover.as_ref()
    }

    /// Last id applied to `key`, including keys that have since been removed.
    pub fn last_applied(&self, key: &K) -> Option<&SortableUniqueId> {
        self.current_marks.get(key)
    }

    /// Number of accepted events.
    pub fn applied_events(&self) -> u64 {
        self.current_events
    }

    /// Newest accepted event.
    pub fn current_tip(&self) -> Option<&(SortableUniqueId, Uuid)> {
        self.current_tip.as_ref()
    }
}
