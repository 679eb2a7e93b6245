//! Deciding when and what to fetch.
//!
//! The trigger looks at consumer access against a list's window and plans
//! the smallest request that covers the gap. It never plans a range that
//! overlaps one already in flight, nor a page token already being fetched.

use crate::{
    config::DataSourceConfig,
    window::{Direction, IndexWindow, TokenWindow},
    ListIndex,
};
use serde::{Deserialize, Serialize};

/// Fetch state of a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FetchState {
    /// Nothing outstanding.
    Idle,
    /// At least one request is waiting for its response.
    FetchPending,
    /// The owning document finished; responses are dropped.
    Abandoned,
}

/// A planned index fetch, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexFetchPlan {
    pub start: ListIndex,
    pub end: ListIndex,
}

impl IndexFetchPlan {
    pub fn count(&self) -> u64 {
        self.end.abs_diff(self.start)
    }
}

/// Plans fetches from consumer access patterns.
#[derive(Debug, Clone, Copy)]
pub struct FetchTrigger<'a> {
    config: &'a DataSourceConfig,
}

impl<'a> FetchTrigger<'a> {
    pub fn new(config: &'a DataSourceConfig) -> Self {
        Self { config }
    }

    fn chunk(&self) -> ListIndex {
        self.config.fetch_chunk_size as ListIndex
    }

    /// Plan fetches for an access to absolute `index` of an index list.
    ///
    /// An index outside the window yields one request covering the gap
    /// between the window and `index`, at least one chunk long where the
    /// bounds allow. An index inside the window yields prefetches when it is
    /// within the prefetch distance of an edge.
    pub fn plan_index(&self, window: &IndexWindow, index: ListIndex) -> Vec<IndexFetchPlan> {
        let candidates = if window.contains(index) {
            self.prefetch_candidates(window, index)
        } else if window.needs_fetch(index) {
            if index < window.start_index {
                vec![self.backward_range(window, index)]
            } else {
                vec![self.forward_range(window, index)]
            }
        } else {
            Vec::new()
        };

        candidates
            .into_iter()
            .filter(|plan| plan.start < plan.end)
            .filter(|plan| !window.overlaps_in_flight(plan.start, plan.end))
            .collect()
    }

    fn prefetch_candidates(&self, window: &IndexWindow, index: ListIndex) -> Vec<IndexFetchPlan> {
        let distance = self.config.prefetch_distance as ListIndex;
        if distance == 0 {
            return Vec::new();
        }

        let mut plans = Vec::new();
        if index - window.start_index < distance && !window.at_start() {
            plans.push(self.backward_range(window, window.start_index.saturating_sub(1)));
        }
        if window.end_index() - 1 - index < distance && !window.at_end() {
            plans.push(self.forward_range(window, window.end_index()));
        }
        plans
    }

    fn backward_range(&self, window: &IndexWindow, index: ListIndex) -> IndexFetchPlan {
        let mut start = index.min(window.start_index.saturating_sub(self.chunk()));
        if let Some(min) = window.minimum_inclusive_index {
            start = start.max(min);
        }
        IndexFetchPlan {
            start,
            end: window.start_index,
        }
    }

    fn forward_range(&self, window: &IndexWindow, index: ListIndex) -> IndexFetchPlan {
        let mut end = index
            .saturating_add(1)
            .max(window.end_index().saturating_add(self.chunk()));
        if let Some(max) = window.maximum_exclusive_index {
            end = end.min(max);
        }
        IndexFetchPlan {
            start: window.end_index(),
            end,
        }
    }

    /// Plan a page fetch for a token list.
    pub fn plan_page(&self, window: &TokenWindow, direction: Direction) -> Option<String> {
        window.needs_fetch(direction)
    }

    /// Directions worth prefetching for an access at `position` of a token
    /// list holding `len` items.
    pub fn plan_page_prefetch(&self, len: usize, position: usize) -> Vec<Direction> {
        let distance = self.config.prefetch_distance as usize;
        if distance == 0 || position >= len {
            return Vec::new();
        }

        let mut directions = Vec::new();
        if position < distance {
            directions.push(Direction::Backward);
        }
        if len - 1 - position < distance {
            directions.push(Direction::Forward);
        }
        directions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk: u64, prefetch: u64) -> DataSourceConfig {
        DataSourceConfig::default()
            .with_fetch_chunk_size(chunk)
            .with_prefetch_distance(prefetch)
    }

    fn plan(start: ListIndex, end: ListIndex) -> IndexFetchPlan {
        IndexFetchPlan { start, end }
    }

    #[test]
    fn forward_gap_uses_chunk() {
        let config = config(10, 0);
        let trigger = FetchTrigger::new(&config);
        let window = IndexWindow::new(10, 5, Some(0), Some(100)).unwrap();

        assert_eq!(trigger.plan_index(&window, 15), vec![plan(15, 25)]);
        assert_eq!(trigger.plan_index(&window, 40), vec![plan(15, 41)]);
    }

    #[test]
    fn backward_gap_uses_chunk() {
        let config = config(10, 0);
        let trigger = FetchTrigger::new(&config);
        let window = IndexWindow::new(30, 5, None, None).unwrap();

        assert_eq!(trigger.plan_index(&window, 29), vec![plan(20, 30)]);
        assert_eq!(trigger.plan_index(&window, 5), vec![plan(5, 30)]);
    }

    #[test]
    fn ranges_clamped_to_bounds() {
        let config = config(10, 0);
        let trigger = FetchTrigger::new(&config);
        let window = IndexWindow::new(10, 1, Some(5), Some(13)).unwrap();

        assert_eq!(trigger.plan_index(&window, 9), vec![plan(5, 10)]);
        assert_eq!(trigger.plan_index(&window, 11), vec![plan(11, 13)]);
        assert!(trigger.plan_index(&window, 13).is_empty());
        assert!(trigger.plan_index(&window, 4).is_empty());
    }

    #[test]
    fn loaded_index_needs_nothing_without_prefetch() {
        let config = config(10, 0);
        let trigger = FetchTrigger::new(&config);
        let window = IndexWindow::new(0, 5, None, None).unwrap();
        assert!(trigger.plan_index(&window, 4).is_empty());
    }

    #[test]
    fn overlapping_in_flight_suppressed() {
        let config = config(10, 0);
        let trigger = FetchTrigger::new(&config);
        let mut window = IndexWindow::new(10, 5, None, None).unwrap();
        window.mark_in_flight(15, 25);

        assert!(trigger.plan_index(&window, 16).is_empty());
        assert!(trigger.plan_index(&window, 40).is_empty());
        assert_eq!(trigger.plan_index(&window, 9), vec![plan(0, 10)]);
    }

    #[test]
    fn prefetch_near_edges() {
        let config = config(4, 2);
        let trigger = FetchTrigger::new(&config);
        let window = IndexWindow::new(10, 10, Some(0), Some(100)).unwrap();

        assert_eq!(trigger.plan_index(&window, 11), vec![plan(6, 10)]);
        assert_eq!(trigger.plan_index(&window, 18), vec![plan(20, 24)]);
        assert!(trigger.plan_index(&window, 15).is_empty());
    }

    #[test]
    fn prefetch_stops_at_known_bounds() {
        let config = config(4, 2);
        let trigger = FetchTrigger::new(&config);
        let window = IndexWindow::new(0, 3, Some(0), Some(3)).unwrap();
        assert!(trigger.plan_index(&window, 1).is_empty());
    }

    #[test]
    fn page_planning() {
        let config = config(10, 1);
        let trigger = FetchTrigger::new(&config);
        let mut window = TokenWindow::new("p", Some("n".into()), Some("b".into()));

        assert_eq!(
            trigger.plan_page(&window, Direction::Forward),
            Some("n".to_string())
        );
        window.mark_in_flight("n");
        assert_eq!(trigger.plan_page(&window, Direction::Forward), None);
        assert_eq!(
            trigger.plan_page(&window, Direction::Backward),
            Some("b".to_string())
        );

        assert_eq!(
            trigger.plan_page_prefetch(5, 4),
            vec![Direction::Forward]
        );
        assert_eq!(
            trigger.plan_page_prefetch(5, 0),
            vec![Direction::Backward]
        );
        assert_eq!(
            trigger.plan_page_prefetch(1, 0),
            vec![Direction::Backward, Direction::Forward]
        );
        assert!(trigger.plan_page_prefetch(5, 2).is_empty());
        assert!(trigger.plan_page_prefetch(5, 9).is_empty());
    }
}
