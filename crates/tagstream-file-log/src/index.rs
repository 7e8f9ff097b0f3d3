use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Bound;
use tagstream_core::{Event, SortableUniqueId, Tag};
use uuid::Uuid;

/// Where a frame's body lives on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Location {
    pub file_num: u64,
    pub offset: u64,
    pub len: u32,
}

/// Ordering key; the event id breaks ties between equal sortable ids.
pub(crate) type Position = (SortableUniqueId, Uuid);

#[derive(Debug, Default)]
pub(crate) struct LogIndex {
    by_position: BTreeMap<Position, Location>,
    by_tag: HashMap<Tag, BTreeSet<Position>>,
    ids: HashSet<Uuid>,
}

impl LogIndex {
    pub fn contains(&self, id: &Uuid) -> bool {
        self.ids.contains(id)
    }

    pub fn insert(&mut self, event: &Event, location: Location) {
        let position = (event.sortable_unique_id.clone(), event.id);
        for tag in &event.tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(position.clone());
        }
        self.ids.insert(event.id);
        self.by_position.insert(position, location);
    }

    pub fn len(&self) -> usize {
        self.by_position.len()
    }

    pub fn tag_count(&self) -> usize {
        self.by_tag.len()
    }

    pub fn oldest(&self) -> Option<&SortableUniqueId> {
        self.by_position.keys().next().map(|(id, _)| id)
    }

    pub fn newest(&self) -> Option<&SortableUniqueId> {
        self.by_position.keys().next_back().map(|(id, _)| id)
    }

    pub fn latest_for_tag(&self, tag: &Tag) -> Option<&SortableUniqueId> {
        self.by_tag
            .get(tag)
            .and_then(|positions| positions.iter().next_back())
            .map(|(id, _)| id)
    }

    /// Locations strictly after `since`, in order.
    pub fn locations_after(
        &self,
        tag: Option<&Tag>,
        since: Option<&SortableUniqueId>,
        max: usize,
    ) -> Vec<Location> {
        let lower = lower_bound(since);
        match tag {
            None => self
                .by_position
                .range((lower, Bound::Unbounded))
                .take(max)
                .map(|(_, location)| *location)
                .collect(),
            Some(tag) => self
                .by_tag
                .get(tag)
                .map(|positions| {
                    positions
                        .range((lower, Bound::Unbounded))
                        .take(max)
                        .filter_map(|position| self.by_position.get(position).copied())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn count_after(&self, since: Option<&SortableUniqueId>) -> u64 {
        self.by_position
            .range((lower_bound(since), Bound::Unbounded))
            .count() as u64
    }
}

fn lower_bound(since: Option<&SortableUniqueId>) -> Bound<Position> {
    match since {
        // Every event id sorts at or below the max uuid, so this excludes
        // all events at `since` itself.
        Some(since) => Bound::Excluded((since.clone(), Uuid::from_u128(u128::MAX))),
        None => Bound::Unbounded,
    }
}
