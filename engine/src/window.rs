//! Window tracking for loaded list data.
//!
//! An index list knows which absolute range is loaded and, once discovered,
//! the bounds of the whole list. A token list knows the tokens for the pages
//! on either side of what is loaded. Both remember what is currently being
//! fetched so the same gap is never requested twice.

use crate::ListIndex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Range;

/// Direction of pagination relative to the loaded window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

/// Loaded window of an index-addressed list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexWindow {
    /// Lowest valid index of the whole list, None while unbounded.
    pub minimum_inclusive_index: Option<ListIndex>,
    /// One past the highest valid index, None while unbounded.
    pub maximum_exclusive_index: Option<ListIndex>,
    /// Absolute index of the first loaded item.
    pub start_index: ListIndex,
    /// Number of loaded items.
    pub loaded_count: usize,
    #[serde(skip)]
    in_flight: Vec<(ListIndex, ListIndex)>,
}

/// Which parts of a fetch response extend the window.
///
/// Ranges index into the response's item array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub prepend: Range<usize>,
    pub append: Range<usize>,
}

impl MergePlan {
    /// Number of response items that become part of the window.
    pub fn len(&self) -> usize {
        self.prepend.len() + self.append.len()
    }

    /// Check if the response adds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IndexWindow {
    /// Create a window and check it against its bounds.
    pub fn new(
        start_index: ListIndex,
        loaded_count: usize,
        minimum_inclusive_index: Option<ListIndex>,
        maximum_exclusive_index: Option<ListIndex>,
    ) -> std::result::Result<Self, String> {
        let window = Self {
            minimum_inclusive_index,
            maximum_exclusive_index,
            start_index,
            loaded_count,
            in_flight: Vec::new(),
        };
        window.validate()?;
        Ok(window)
    }

    /// Check `min <= start <= end <= max` for whichever bounds are known.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.checked_end_index().is_none() {
            return Err(format!(
                "{} items from startIndex {} overflow the index range",
                self.loaded_count, self.start_index
            ));
        }
        if let (Some(min), Some(max)) = (self.minimum_inclusive_index, self.maximum_exclusive_index)
        {
            if min > max {
                return Err(format!(
                    "minimumInclusiveIndex {} exceeds maximumExclusiveIndex {}",
                    min, max
                ));
            }
        }
        if let Some(min) = self.minimum_inclusive_index {
            if self.start_index < min {
                return Err(format!(
                    "startIndex {} is below minimumInclusiveIndex {}",
                    self.start_index, min
                ));
            }
        }
        if let Some(max) = self.maximum_exclusive_index {
            if self.end_index() > max {
                return Err(format!(
                    "loaded window ends at {} beyond maximumExclusiveIndex {}",
                    self.end_index(),
                    max
                ));
            }
        }
        Ok(())
    }

    /// Replace the window wholesale, dropping in-flight bookkeeping.
    pub fn adopt(
        &mut self,
        start_index: ListIndex,
        loaded_count: usize,
        minimum_inclusive_index: Option<ListIndex>,
        maximum_exclusive_index: Option<ListIndex>,
    ) -> std::result::Result<(), String> {
        *self = Self::new(
            start_index,
            loaded_count,
            minimum_inclusive_index,
            maximum_exclusive_index,
        )?;
        Ok(())
    }

    /// Exclusive end of the loaded window, saturating at `ListIndex::MAX`.
    pub fn end_index(&self) -> ListIndex {
        self.start_index
            .saturating_add(ListIndex::try_from(self.loaded_count).unwrap_or(ListIndex::MAX))
    }

    fn checked_end_index(&self) -> Option<ListIndex> {
        ListIndex::try_from(self.loaded_count)
            .ok()
            .and_then(|count| self.start_index.checked_add(count))
    }

    /// Check if an absolute index is loaded.
    pub fn contains(&self, index: ListIndex) -> bool {
        index >= self.start_index && index < self.end_index()
    }

    /// Check if an absolute index lies within the list's bounds.
    pub fn in_bounds(&self, index: ListIndex) -> bool {
        self.minimum_inclusive_index.map_or(true, |min| index >= min)
            && self.maximum_exclusive_index.map_or(true, |max| index < max)
    }

    /// True if `index` is not loaded but could exist.
    pub fn needs_fetch(&self, index: ListIndex) -> bool {
        !self.contains(index) && self.in_bounds(index)
    }

    /// True if nothing exists before the window.
    pub fn at_start(&self) -> bool {
        self.minimum_inclusive_index == Some(self.start_index)
    }

    /// True if nothing exists after the window.
    pub fn at_end(&self) -> bool {
        self.maximum_exclusive_index == Some(self.end_index())
    }

    /// Translate an absolute index to a position in the loaded items.
    pub fn position_of(&self, index: ListIndex) -> Option<usize> {
        self.contains(index)
            .then_some((index - self.start_index) as usize)
    }

    /// Check if `[start, end)` overlaps anything being fetched.
    pub fn overlaps_in_flight(&self, start: ListIndex, end: ListIndex) -> bool {
        self.in_flight.iter().any(|&(s, e)| start < e && s < end)
    }

    /// Remember that `[start, end)` is being fetched.
    pub fn mark_in_flight(&mut self, start: ListIndex, end: ListIndex) {
        self.in_flight.push((start, end));
    }

    /// Forget an in-flight range.
    pub fn clear_in_flight(&mut self, start: ListIndex, end: ListIndex) {
        self.in_flight.retain(|&range| range != (start, end));
    }

    /// Ranges currently being fetched.
    pub fn in_flight(&self) -> &[(ListIndex, ListIndex)] {
        &self.in_flight
    }

    /// Account for items inserted into or deleted from the window.
    ///
    /// The list as a whole grows or shrinks by the same amount, so a known
    /// maximum moves with it, as do in-flight ranges past the window end.
    pub fn adjust_loaded(&mut self, delta: isize) {
        let old_end = self.end_index();
        let shift = delta as ListIndex;
        self.loaded_count = self.loaded_count.saturating_add_signed(delta);
        if let Some(max) = self.maximum_exclusive_index.as_mut() {
            *max = max.saturating_add(shift);
        }
        for (start, end) in self.in_flight.iter_mut() {
            if *start >= old_end {
                *start = start.saturating_add(shift);
                *end = end.saturating_add(shift);
            }
        }
    }

    /// Work out how a response of `count` items at `start` extends the window.
    ///
    /// The response must touch or overlap the window. Items already loaded
    /// are kept; only the parts outside the window are merged.
    pub fn plan_merge(
        &self,
        start: ListIndex,
        count: usize,
    ) -> std::result::Result<MergePlan, String> {
        let response_end = start.saturating_add(count as ListIndex);
        if count > 0 && (response_end < self.start_index || start > self.end_index()) {
            return Err(format!(
                "response [{}, {}) is not contiguous with loaded window [{}, {})",
                start,
                response_end,
                self.start_index,
                self.end_index()
            ));
        }

        let prepend_len = if start < self.start_index {
            (response_end.min(self.start_index) - start) as usize
        } else {
            0
        };
        let append_from = self.end_index().saturating_sub(start).max(0) as usize;
        let append = if response_end > self.end_index() {
            append_from..count
        } else {
            count..count
        };

        Ok(MergePlan {
            prepend: 0..prepend_len,
            append,
        })
    }

    /// Grow the window by a merge that has been applied to the items.
    pub fn apply_merge(&mut self, plan: &MergePlan) {
        self.start_index -= plan.prepend.len() as ListIndex;
        self.loaded_count += plan.len();
    }
}

/// Loaded window of a token-addressed list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenWindow {
    /// Token of the page the list was anchored on.
    pub page_token: String,
    /// Token of the next page after the window, None when exhausted.
    pub forward_page_token: Option<String>,
    /// Token of the page before the window, None when exhausted.
    pub backward_page_token: Option<String>,
    #[serde(skip)]
    in_flight: BTreeSet<String>,
}

impl TokenWindow {
    /// Create a window anchored on `page_token`.
    pub fn new(
        page_token: impl Into<String>,
        forward_page_token: Option<String>,
        backward_page_token: Option<String>,
    ) -> Self {
        Self {
            page_token: page_token.into(),
            forward_page_token,
            backward_page_token,
            in_flight: BTreeSet::new(),
        }
    }

    /// Token for the adjacent page in `direction`.
    pub fn adjacent(&self, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Forward => self.forward_page_token.as_deref(),
            Direction::Backward => self.backward_page_token.as_deref(),
        }
    }

    /// The adjacent token if it exists and is not already being fetched.
    pub fn needs_fetch(&self, direction: Direction) -> Option<String> {
        self.adjacent(direction)
            .filter(|token| !self.in_flight.contains(*token))
            .map(str::to_string)
    }

    /// Remember that a page is being fetched.
    pub fn mark_in_flight(&mut self, token: impl Into<String>) {
        self.in_flight.insert(token.into());
    }

    /// Forget an in-flight page.
    pub fn clear_in_flight(&mut self, token: &str) {
        self.in_flight.remove(token);
    }

    /// Check if a page is being fetched.
    pub fn is_in_flight(&self, token: &str) -> bool {
        self.in_flight.contains(token)
    }

    /// Number of pages being fetched.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Move the edge in `direction` past a loaded page.
    pub fn advance(&mut self, direction: Direction, next_page_token: Option<String>) {
        match direction {
            Direction::Forward => self.forward_page_token = next_page_token,
            Direction::Backward => self.backward_page_token = next_page_token,
        }
    }

    /// Forget all in-flight pages.
    pub fn clear_all_in_flight(&mut self) {
        self.in_flight.clear();
    }
}

/// The window of a list, by list kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Window {
    Index(IndexWindow),
    Token(TokenWindow),
}

impl Window {
    /// Check if any fetch is in flight for this window.
    pub fn has_in_flight(&self) -> bool {
        match self {
            Window::Index(window) => !window.in_flight().is_empty(),
            Window::Token(window) => window.in_flight_count() > 0,
        }
    }

    /// Forget all in-flight fetches.
    pub fn clear_all_in_flight(&mut self) {
        match self {
            Window::Index(window) => window.in_flight.clear(),
            Window::Token(window) => window.clear_all_in_flight(),
        }
    }
}
