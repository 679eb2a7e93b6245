//! Dynamic lists and the arena that owns them.

use crate::{
    error::Result,
    payload::{DataSourcePayload, DataSourceType},
    window::{IndexWindow, TokenWindow, Window},
    Error, ListId, ListIndex,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable handle to a list within its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListHandle(pub u32);

/// A named, lazily loaded list of opaque items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicList {
    /// Identifier, immutable for the lifetime of the list
    pub list_id: ListId,
    /// Loaded items, in order
    pub items: Vec<serde_json::Value>,
    /// What is loaded and what could be fetched
    pub window: Window,
}

impl DynamicList {
    /// Build a list from a full payload.
    pub fn from_payload(payload: DataSourcePayload) -> Result<Self> {
        match payload {
            DataSourcePayload::Index(p) => {
                let window = IndexWindow::new(
                    p.start_index,
                    p.items.len(),
                    p.minimum_inclusive_index,
                    p.maximum_exclusive_index,
                )
                .map_err(|message| Error::InconsistentRange {
                    list_id: p.list_id.clone(),
                    message,
                })?;
                Ok(Self {
                    list_id: p.list_id,
                    items: p.items,
                    window: Window::Index(window),
                })
            }
            DataSourcePayload::Token(p) => Ok(Self {
                list_id: p.list_id,
                items: p.items,
                window: Window::Token(TokenWindow::new(
                    p.page_token,
                    p.forward_page_token,
                    p.backward_page_token,
                )),
            }),
        }
    }

    /// Kind of this list.
    pub fn source_type(&self) -> DataSourceType {
        match self.window {
            Window::Index(_) => DataSourceType::Index,
            Window::Token(_) => DataSourceType::Token,
        }
    }

    /// Fail unless this list is of the expected kind.
    pub fn expect_type(&self, expected: DataSourceType) -> Result<()> {
        let actual = self.source_type();
        if actual == expected {
            Ok(())
        } else {
            Err(Error::ListKindMismatch {
                list_id: self.list_id.clone(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            })
        }
    }

    pub fn index_window(&self) -> Option<&IndexWindow> {
        match &self.window {
            Window::Index(window) => Some(window),
            Window::Token(_) => None,
        }
    }

    pub fn index_window_mut(&mut self) -> Option<&mut IndexWindow> {
        match &mut self.window {
            Window::Index(window) => Some(window),
            Window::Token(_) => None,
        }
    }

    pub fn token_window(&self) -> Option<&TokenWindow> {
        match &self.window {
            Window::Token(window) => Some(window),
            Window::Index(_) => None,
        }
    }

    pub fn token_window_mut(&mut self) -> Option<&mut TokenWindow> {
        match &mut self.window {
            Window::Token(window) => Some(window),
            Window::Index(_) => None,
        }
    }

    /// Number of loaded items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if nothing is loaded.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item at an absolute index of an index list.
    pub fn get_index(&self, index: ListIndex) -> Option<&serde_json::Value> {
        self.index_window()
            .and_then(|window| window.position_of(index))
            .and_then(|position| self.items.get(position))
    }

    /// Item at a position in the loaded items.
    pub fn get(&self, position: usize) -> Option<&serde_json::Value> {
        self.items.get(position)
    }

    /// Check if a fetch is in flight for this list.
    pub fn is_fetching(&self) -> bool {
        self.window.has_in_flight()
    }
}

/// Owns every list of a session, addressed by stable handles.
///
/// Slots of removed lists are never reused, so a stale handle cannot alias a
/// newer list.
#[derive(Debug, Clone, Default)]
pub struct ListArena {
    slots: Vec<Option<DynamicList>>,
    by_id: HashMap<ListId, ListHandle>,
}

impl ListArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    /// Insert a list, replacing any list with the same id.
    ///
    /// Returns the new handle and the replaced list, if any.
    pub fn insert(&mut self, list: DynamicList) -> (ListHandle, Option<DynamicList>) {
        let replaced = self.remove(&list.list_id);
        let handle = ListHandle(self.slots.len() as u32);
        self.by_id.insert(list.list_id.clone(), handle);
        self.slots.push(Some(list));
        (handle, replaced)
    }

    /// Remove a list by id.
    pub fn remove(&mut self, list_id: &str) -> Option<DynamicList> {
        let handle = self.by_id.remove(list_id)?;
        self.slots.get_mut(handle.0 as usize)?.take()
    }

    /// Handle for a list id.
    pub fn handle(&self, list_id: &str) -> Option<ListHandle> {
        self.by_id.get(list_id).copied()
    }

    pub fn get(&self, handle: ListHandle) -> Option<&DynamicList> {
        self.slots.get(handle.0 as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, handle: ListHandle) -> Option<&mut DynamicList> {
        self.slots.get_mut(handle.0 as usize)?.as_mut()
    }

    pub fn by_id(&self, list_id: &str) -> Option<&DynamicList> {
        self.handle(list_id).and_then(|handle| self.get(handle))
    }

    pub fn by_id_mut(&mut self, list_id: &str) -> Option<&mut DynamicList> {
        let handle = self.handle(list_id)?;
        self.get_mut(handle)
    }

    /// All live lists.
    pub fn iter(&self) -> impl Iterator<Item = (ListHandle, &DynamicList)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|list| (ListHandle(i as u32), list)))
    }

    /// Number of live lists.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Check if there are no live lists.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Drop every list, keeping handles retired.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.by_id.clear();
    }
}
