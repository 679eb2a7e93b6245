//! Patch operations for expressing list changes.
//!
//! Changes arrive as versioned batches of splice operations rather than
//! whole-list replacements. Indices are positions in the currently loaded
//! items, not absolute list indices.

use crate::{ListId, ListVersion};
use serde::{Deserialize, Serialize};

/// A single list mutation.
///
/// Serialized with a `type` tag matching the wire names
/// (`"InsertItem"`, `"DeleteMultipleItems"`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PatchOperation {
    /// Insert one item before `index`; `index == len` appends.
    InsertItem {
        index: i64,
        item: serde_json::Value,
    },
    /// Insert several items starting at `index`, keeping their order.
    InsertMultipleItems {
        index: i64,
        items: Vec<serde_json::Value>,
    },
    /// Remove the item at `index`.
    DeleteItem { index: i64 },
    /// Remove `count` items starting at `index`.
    DeleteMultipleItems { index: i64, count: u64 },
    /// Replace the item at `index` in place.
    SetItem {
        index: i64,
        item: serde_json::Value,
    },
}

impl PatchOperation {
    /// Create an insert of a single item.
    pub fn insert(index: i64, item: serde_json::Value) -> Self {
        PatchOperation::InsertItem { index, item }
    }

    /// Create an insert of several items.
    pub fn insert_many(index: i64, items: Vec<serde_json::Value>) -> Self {
        PatchOperation::InsertMultipleItems { index, items }
    }

    /// Create a delete of a single item.
    pub fn delete(index: i64) -> Self {
        PatchOperation::DeleteItem { index }
    }

    /// Create a delete of a contiguous run.
    pub fn delete_many(index: i64, count: u64) -> Self {
        PatchOperation::DeleteMultipleItems { index, count }
    }

    /// Create an in-place replacement.
    pub fn set(index: i64, item: serde_json::Value) -> Self {
        PatchOperation::SetItem { index, item }
    }

    /// Position this operation targets.
    pub fn index(&self) -> i64 {
        match self {
            PatchOperation::InsertItem { index, .. }
            | PatchOperation::InsertMultipleItems { index, .. }
            | PatchOperation::DeleteItem { index }
            | PatchOperation::DeleteMultipleItems { index, .. }
            | PatchOperation::SetItem { index, .. } => *index,
        }
    }

    /// Wire name of the operation.
    pub fn name(&self) -> &'static str {
        match self {
            PatchOperation::InsertItem { .. } => "InsertItem",
            PatchOperation::InsertMultipleItems { .. } => "InsertMultipleItems",
            PatchOperation::DeleteItem { .. } => "DeleteItem",
            PatchOperation::DeleteMultipleItems { .. } => "DeleteMultipleItems",
            PatchOperation::SetItem { .. } => "SetItem",
        }
    }
}

/// One versioned unit of mutation for a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchBatch {
    /// Target list
    pub list_id: ListId,
    /// The version this batch produces
    pub list_version: ListVersion,
    /// Operations, applied in order
    pub operations: Vec<PatchOperation>,
}

impl PatchBatch {
    /// Create a new batch.
    pub fn new(
        list_id: impl Into<ListId>,
        list_version: ListVersion,
        operations: Vec<PatchOperation>,
    ) -> Self {
        Self {
            list_id: list_id.into(),
            list_version,
            operations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_accessors() {
        let op = PatchOperation::insert_many(3, vec![json!(1), json!(2)]);
        assert_eq!(op.index(), 3);
        assert_eq!(op.name(), "InsertMultipleItems");

        let op = PatchOperation::delete_many(1, 2);
        assert_eq!(op.index(), 1);
        assert_eq!(op.name(), "DeleteMultipleItems");
    }

    #[test]
    fn wire_format() {
        let op = PatchOperation::set(1, json!({"color": "blue"}));
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(
            json,
            json!({"type": "SetItem", "index": 1, "item": {"color": "blue"}})
        );
    }

    #[test]
    fn parse_batch() {
        let json = r#"{
            "listId": "vQdpOESlok",
            "listVersion": 2,
            "operations": [
                {"type": "InsertItem", "index": 0, "item": {"text": "a"}},
                {"type": "InsertMultipleItems", "index": 1, "items": [1, 2]},
                {"type": "DeleteItem", "index": 4},
                {"type": "DeleteMultipleItems", "index": 0, "count": 2},
                {"type": "SetItem", "index": 0, "item": "z"}
            ]
        }"#;

        let batch: PatchBatch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.list_id, "vQdpOESlok");
        assert_eq!(batch.list_version, 2);
        assert_eq!(batch.operations.len(), 5);
        assert_eq!(batch.operations[3], PatchOperation::delete_many(0, 2));
    }

    #[test]
    fn missing_item_is_malformed() {
        let json = r#"{"type": "InsertItem", "index": 0}"#;
        assert!(serde_json::from_str::<PatchOperation>(json).is_err());
    }

    #[test]
    fn unknown_operation_is_malformed() {
        let json = r#"{"type": "MoveItem", "index": 0, "to": 3}"#;
        assert!(serde_json::from_str::<PatchOperation>(json).is_err());
    }

    #[test]
    fn negative_count_is_malformed() {
        let json = r#"{"type": "DeleteMultipleItems", "index": 0, "count": -1}"#;
        assert!(serde_json::from_str::<PatchOperation>(json).is_err());
    }

    #[test]
    fn batch_requires_version() {
        let json = r#"{"listId": "l", "operations": []}"#;
        assert!(serde_json::from_str::<PatchBatch>(json).is_err());
    }
}
