//! Registration registry: which timeline occurrences use an asset.
//!
//! Counts are derived from the map itself, so registry membership and the
//! in-use count cannot drift apart. Iteration order is insertion order
//! (`IndexMap`/`IndexSet`) so broadcasts are deterministic.
//!
//! Double registration and deregistering an unknown occurrence are
//! programming errors and panic.

use indexmap::{IndexMap, IndexSet};

use super::timeline::{ClipId, TimelineId};

#[derive(Debug, Default, Clone)]
pub struct Registry {
    instances: IndexMap<TimelineId, IndexSet<ClipId>>,
    total: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an occurrence. Panics if already registered under `timeline`.
    pub fn register(&mut self, timeline: TimelineId, clip_id: ClipId) {
        let set = self.instances.entry(timeline).or_default();
        assert!(
            set.insert(clip_id),
            "occurrence {} already registered on timeline {}",
            clip_id,
            timeline
        );
        self.total += 1;
    }

    /// Deregister an occurrence. Panics if it is not registered.
    pub fn deregister(&mut self, timeline: TimelineId, clip_id: ClipId) {
        let removed = self
            .instances
            .get_mut(&timeline)
            .map(|set| set.shift_remove(&clip_id))
            .unwrap_or(false);
        assert!(removed, "occurrence {} is not registered on timeline {}", clip_id, timeline);
        self.total -= 1;
        if self.instances.get(&timeline).is_some_and(|s| s.is_empty()) {
            self.instances.shift_remove(&timeline);
        }
    }

    pub fn contains(&self, timeline: TimelineId, clip_id: ClipId) -> bool {
        self.instances
            .get(&timeline)
            .is_some_and(|set| set.contains(&clip_id))
    }

    /// Occurrences registered on one timeline
    pub fn count(&self, timeline: TimelineId) -> usize {
        self.instances.get(&timeline).map(|s| s.len()).unwrap_or(0)
    }

    /// Occurrences across all timelines
    pub fn total_count(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Occurrence ids on one timeline, in registration order
    pub fn clip_ids(&self, timeline: TimelineId) -> Vec<ClipId> {
        self.instances
            .get(&timeline)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// All (timeline, occurrence) pairs, in registration order
    pub fn occurrences(&self) -> Vec<(TimelineId, ClipId)> {
        self.instances
            .iter()
            .flat_map(|(tl, set)| set.iter().map(move |c| (*tl, *c)))
            .collect()
    }

    pub fn timelines(&self) -> Vec<TimelineId> {
        self.instances.keys().copied().collect()
    }

    /// Recount from the map (consistency check used in debug assertions)
    pub fn recount(&self) -> usize {
        self.instances.values().map(|s| s.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_counts_follow_registrations() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut reg = Registry::new();

        reg.register(a, 5);
        reg.register(b, 7);
        assert_eq!(reg.total_count(), 2);

        reg.deregister(a, 5);
        assert_eq!(reg.count(a), 0);
        assert_eq!(reg.count(b), 1);
        assert_eq!(reg.total_count(), 1);
        assert_eq!(reg.recount(), reg.total_count());
    }

    #[test]
    fn test_same_clip_id_on_two_timelines() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut reg = Registry::new();
        reg.register(a, 1);
        reg.register(b, 1);
        assert_eq!(reg.total_count(), 2);
        assert_eq!(reg.occurrences(), vec![(a, 1), (b, 1)]);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_double_register_panics() {
        let a = Uuid::new_v4();
        let mut reg = Registry::new();
        reg.register(a, 3);
        reg.register(a, 3);
    }

    #[test]
    #[should_panic(expected = "not registered")]
    fn test_deregister_unknown_panics() {
        let mut reg = Registry::new();
        reg.deregister(Uuid::new_v4(), 3);
    }

    #[test]
    fn test_total_matches_sum_over_random_sequence() {
        let tls: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let mut reg = Registry::new();
        let mut live: Vec<(Uuid, i32)> = Vec::new();
        for step in 0..60i32 {
            let tl = tls[(step % 3) as usize];
            if step % 4 == 3 && !live.is_empty() {
                let (t, c) = live.remove((step as usize) % live.len());
                reg.deregister(t, c);
            } else {
                reg.register(tl, step);
                live.push((tl, step));
            }
            let sum: usize = tls.iter().map(|t| reg.count(*t)).sum();
            assert_eq!(reg.total_count(), sum);
            assert_eq!(reg.total_count(), live.len());
        }
    }
}
