//! Per-subscriber view of a backing list.
//!
//! Clients address patch operations relative to the items they hold, so a
//! batch produced against the full backing list is rewritten for each
//! subscriber before it is pushed.

use std::collections::HashSet;

use datasource_engine::{ListIndex, PatchOperation};

/// Backing-list range `[start, end)` a subscriber holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberWindow {
    pub start: ListIndex,
    pub end: ListIndex,
}

impl SubscriberWindow {
    pub fn new(start: ListIndex, count: usize) -> Self {
        Self {
            start,
            end: start.saturating_add(to_index(count)),
        }
    }

    pub fn len(&self) -> usize {
        usize::try_from(self.end - self.start).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Grow to cover a fetched range as well.
    pub fn extend(&mut self, start: ListIndex, count: usize) {
        let other = Self::new(start, count);
        self.start = self.start.min(other.start);
        self.end = self.end.max(other.end);
    }

    /// Rewrite operations against the backing list into window positions.
    ///
    /// Operations before the window only move it, operations past its end
    /// are dropped. `skipped` holds the batch positions the backing list
    /// rejected; those never reached it and are ignored.
    pub fn rebase(
        &mut self,
        operations: &[PatchOperation],
        skipped: &HashSet<usize>,
    ) -> Vec<PatchOperation> {
        let mut rebased = Vec::with_capacity(operations.len());

        for (position, op) in operations.iter().enumerate() {
            if skipped.contains(&position) {
                continue;
            }
            let index = op.index();
            let relative = index - self.start;

            match op {
                PatchOperation::InsertItem { item, .. } => {
                    if index < self.start {
                        self.shift(1);
                    } else if index <= self.end {
                        rebased.push(PatchOperation::insert(relative, item.clone()));
                        self.end += 1;
                    }
                }
                PatchOperation::InsertMultipleItems { items, .. } => {
                    let count = to_index(items.len());
                    if index < self.start {
                        self.shift(count);
                    } else if index <= self.end {
                        rebased.push(PatchOperation::insert_many(relative, items.clone()));
                        self.end = self.end.saturating_add(count);
                    }
                }
                PatchOperation::DeleteItem { .. } => {
                    if index < self.start {
                        self.shift(-1);
                    } else if index < self.end {
                        rebased.push(PatchOperation::delete(relative));
                        self.end -= 1;
                    }
                }
                PatchOperation::DeleteMultipleItems { count, .. } => {
                    let count = ListIndex::try_from(*count).unwrap_or(ListIndex::MAX);
                    let delete_end = index.saturating_add(count);
                    let before = delete_end.min(self.start) - index.min(self.start);
                    let overlap_start = index.max(self.start);
                    let overlap_end = delete_end.min(self.end);

                    if overlap_start < overlap_end {
                        rebased.push(PatchOperation::delete_many(
                            overlap_start - self.start,
                            (overlap_end - overlap_start) as u64,
                        ));
                        self.end -= overlap_end - overlap_start;
                    }
                    self.shift(-before);
                }
                PatchOperation::SetItem { item, .. } => {
                    if index >= self.start && index < self.end {
                        rebased.push(PatchOperation::set(relative, item.clone()));
                    }
                }
            }
        }

        rebased
    }

    fn shift(&mut self, delta: ListIndex) {
        self.start = self.start.saturating_add(delta);
        self.end = self.end.saturating_add(delta);
    }
}

fn to_index(count: usize) -> ListIndex {
    ListIndex::try_from(count).unwrap_or(ListIndex::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn none() -> HashSet<usize> {
        HashSet::new()
    }

    #[test]
    fn operations_inside_window_become_relative() {
        let mut window = SubscriberWindow::new(10, 5);
        let rebased = window.rebase(
            &[
                PatchOperation::set(10, json!("a")),
                PatchOperation::insert(15, json!("b")),
                PatchOperation::delete(12),
            ],
            &none(),
        );

        assert_eq!(
            rebased,
            vec![
                PatchOperation::set(0, json!("a")),
                PatchOperation::insert(5, json!("b")),
                PatchOperation::delete(2),
            ]
        );
        assert_eq!(window, SubscriberWindow::new(10, 5));
    }

    #[test]
    fn operations_before_window_shift_it() {
        let mut window = SubscriberWindow::new(10, 5);
        let rebased = window.rebase(
            &[
                PatchOperation::insert_many(0, vec![json!(1), json!(2)]),
                PatchOperation::delete(3),
                PatchOperation::set(5, json!("x")),
                PatchOperation::set(11, json!("first")),
            ],
            &none(),
        );

        assert_eq!(rebased, vec![PatchOperation::set(0, json!("first"))]);
        assert_eq!(window, SubscriberWindow::new(11, 5));
    }

    #[test]
    fn operations_past_window_dropped() {
        let mut window = SubscriberWindow::new(0, 5);
        let rebased = window.rebase(
            &[
                PatchOperation::insert(6, json!("far")),
                PatchOperation::delete(5),
                PatchOperation::set(9, json!("far")),
            ],
            &none(),
        );
        assert!(rebased.is_empty());
        assert_eq!(window.len(), 5);
    }

    #[test]
    fn range_delete_straddling_start_is_clipped() {
        let mut window = SubscriberWindow::new(10, 5);
        let rebased = window.rebase(&[PatchOperation::delete_many(8, 4)], &none());

        assert_eq!(rebased, vec![PatchOperation::delete_many(0, 2)]);
        assert_eq!(window, SubscriberWindow::new(8, 3));
    }

    #[test]
    fn range_delete_covering_window_empties_it() {
        let mut window = SubscriberWindow::new(2, 3);
        let rebased = window.rebase(&[PatchOperation::delete_many(0, 10)], &none());

        assert_eq!(rebased, vec![PatchOperation::delete_many(0, 3)]);
        assert!(window.is_empty());
        assert_eq!(window.start, 0);
    }

    #[test]
    fn skipped_operations_ignored() {
        let mut window = SubscriberWindow::new(10, 5);
        let skipped = HashSet::from([0]);
        let rebased = window.rebase(
            &[
                PatchOperation::insert(0, json!("rejected")),
                PatchOperation::set(10, json!("a")),
            ],
            &skipped,
        );
        assert_eq!(rebased, vec![PatchOperation::set(0, json!("a"))]);
    }

    #[test]
    fn extend_covers_both_ranges() {
        let mut window = SubscriberWindow::new(10, 5);
        window.extend(5, 5);
        window.extend(15, 3);
        assert_eq!(window, SubscriberWindow::new(5, 13));
    }
}
