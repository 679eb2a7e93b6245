//! Applying patch batches and window merges to an item sequence.
//!
//! # Algorithm
//!
//! 1. Every slot of the incoming sequence remembers where it came from
//!    (an original position, or inserted by this batch)
//! 2. Operations splice items and slots in lockstep, in array order
//! 3. The diff is read off the surviving slots: removals of original
//!    positions (descending), insertions at final positions (ascending),
//!    then in-place updates at final positions
//!
//! Applying the diff in that order to the previous rendering reproduces the
//! new sequence. Items inserted and removed within the same batch never show
//! up, and a set on a freshly inserted item is folded into the insert.

use crate::operation::PatchOperation;
use serde::{Deserialize, Serialize};

/// What happened at a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Remove,
    Update,
}

/// A single positional change for the rendering layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub position: usize,
    pub kind: ChangeKind,
}

impl Change {
    pub fn insert(position: usize) -> Self {
        Self {
            position,
            kind: ChangeKind::Insert,
        }
    }

    pub fn remove(position: usize) -> Self {
        Self {
            position,
            kind: ChangeKind::Remove,
        }
    }

    pub fn update(position: usize) -> Self {
        Self {
            position,
            kind: ChangeKind::Update,
        }
    }
}

/// Difference between two renderings of a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ListDiff {
    /// Everything was rebuilt; the new sequence has `len` items.
    Replace { len: usize },
    /// Ordered positional changes.
    Changes { changes: Vec<Change> },
}

impl ListDiff {
    /// A diff with no changes.
    pub fn empty() -> Self {
        ListDiff::Changes {
            changes: Vec::new(),
        }
    }

    /// Check if applying this diff would change nothing.
    pub fn is_empty(&self) -> bool {
        matches!(self, ListDiff::Changes { changes } if changes.is_empty())
    }

    /// Positional changes, empty for a replacement.
    pub fn changes(&self) -> &[Change] {
        match self {
            ListDiff::Replace { .. } => &[],
            ListDiff::Changes { changes } => changes,
        }
    }
}

/// An operation that was skipped or trimmed while applying a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationWarning {
    /// Position of the operation within its batch
    pub operation_index: usize,
    /// Wire name of the operation
    pub operation: String,
    pub message: String,
}

/// Result of applying a batch of operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchOutcome {
    pub diff: ListDiff,
    pub warnings: Vec<OperationWarning>,
    /// Change in item count
    pub delta: isize,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Original { position: usize, dirty: bool },
    Inserted,
}

/// Apply operations to a copy of `current`, returning the new sequence.
pub fn apply_operations(
    current: &[serde_json::Value],
    operations: &[PatchOperation],
) -> (Vec<serde_json::Value>, PatchOutcome) {
    let mut items = current.to_vec();
    let outcome = apply_operations_in_place(&mut items, operations);
    (items, outcome)
}

/// Apply operations to `items` in order.
///
/// Out-of-bounds operations are skipped with a warning and the rest of the
/// batch still applies.
pub fn apply_operations_in_place(
    items: &mut Vec<serde_json::Value>,
    operations: &[PatchOperation],
) -> PatchOutcome {
    let original_len = items.len();
    let mut slots: Vec<Slot> = (0..original_len)
        .map(|position| Slot::Original {
            position,
            dirty: false,
        })
        .collect();
    let mut warnings = Vec::new();

    for (operation_index, op) in operations.iter().enumerate() {
        let mut warn = |message: String| {
            tracing::warn!(
                operation_index,
                operation = op.name(),
                "{}",
                message
            );
            warnings.push(OperationWarning {
                operation_index,
                operation: op.name().to_string(),
                message,
            });
        };

        match op {
            PatchOperation::InsertItem { index, item } => {
                match insert_position(*index, items.len()) {
                    Some(at) => {
                        items.insert(at, item.clone());
                        slots.insert(at, Slot::Inserted);
                    }
                    None => warn(out_of_bounds(*index, items.len())),
                }
            }
            PatchOperation::InsertMultipleItems {
                index,
                items: new_items,
            } => match insert_position(*index, items.len()) {
                Some(at) => {
                    items.splice(at..at, new_items.iter().cloned());
                    slots.splice(at..at, std::iter::repeat(Slot::Inserted).take(new_items.len()));
                }
                None => warn(out_of_bounds(*index, items.len())),
            },
            PatchOperation::DeleteItem { index } => {
                match existing_position(*index, items.len()) {
                    Some(at) => {
                        items.remove(at);
                        slots.remove(at);
                    }
                    None => warn(out_of_bounds(*index, items.len())),
                }
            }
            PatchOperation::DeleteMultipleItems { index, count } => {
                if *count == 0 {
                    continue;
                }
                match existing_position(*index, items.len()) {
                    Some(at) => {
                        let available = items.len() - at;
                        let removed = usize::try_from(*count)
                            .unwrap_or(usize::MAX)
                            .min(available);
                        if (removed as u64) < *count {
                            warn(format!(
                                "count {} overruns the {} items after index {}, clamped",
                                count, available, index
                            ));
                        }
                        items.drain(at..at + removed);
                        slots.drain(at..at + removed);
                    }
                    None => warn(out_of_bounds(*index, items.len())),
                }
            }
            PatchOperation::SetItem { index, item } => {
                match existing_position(*index, items.len()) {
                    Some(at) => {
                        items[at] = item.clone();
                        if let Slot::Original { dirty, .. } = &mut slots[at] {
                            *dirty = true;
                        }
                    }
                    None => warn(out_of_bounds(*index, items.len())),
                }
            }
        }
    }

    PatchOutcome {
        diff: diff_from_slots(original_len, &slots),
        warnings,
        delta: items.len() as isize - original_len as isize,
    }
}

/// Extend `items` with fetched data on either side.
///
/// Returns insertions at the front followed by insertions at the back,
/// positions relative to the sequence as it grows.
pub fn merge_window(
    items: &mut Vec<serde_json::Value>,
    prepend: Vec<serde_json::Value>,
    append: Vec<serde_json::Value>,
) -> ListDiff {
    let front = prepend.len();
    let mut changes: Vec<_> = (0..front).map(Change::insert).collect();

    items.splice(0..0, prepend);
    let back = items.len();
    changes.extend((back..back + append.len()).map(Change::insert));
    items.extend(append);

    ListDiff::Changes { changes }
}

/// Replace `items` wholesale.
pub fn replace_all(
    items: &mut Vec<serde_json::Value>,
    replacement: Vec<serde_json::Value>,
) -> ListDiff {
    *items = replacement;
    ListDiff::Replace { len: items.len() }
}

fn insert_position(index: i64, len: usize) -> Option<usize> {
    usize::try_from(index).ok().filter(|&at| at <= len)
}

fn existing_position(index: i64, len: usize) -> Option<usize> {
    usize::try_from(index).ok().filter(|&at| at < len)
}

fn out_of_bounds(index: i64, len: usize) -> String {
    format!("index {} is out of bounds for {} items, skipped", index, len)
}

fn diff_from_slots(original_len: usize, slots: &[Slot]) -> ListDiff {
    let mut survived = vec![false; original_len];
    for slot in slots {
        if let Slot::Original { position, .. } = slot {
            survived[*position] = true;
        }
    }

    let mut changes: Vec<Change> = survived
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, kept)| !**kept)
        .map(|(position, _)| Change::remove(position))
        .collect();

    changes.extend(
        slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| matches!(slot, Slot::Inserted))
            .map(|(position, _)| Change::insert(position)),
    );

    changes.extend(
        slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| matches!(slot, Slot::Original { dirty: true, .. }))
            .map(|(position, _)| Change::update(position)),
    );

    ListDiff::Changes { changes }
}
