//! Correlation of outbound fetch requests with their eventual responses.
//!
//! Each request gets a fresh token. A response is matched by echoing the
//! token back; resolving consumes it, so duplicates and late responses for
//! abandoned lists fall through as unknown.

use crate::{payload::FetchRequestPayload, CorrelationToken, Direction, ListId, ListIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// First counter value. Tokens are issued after incrementing, so the first
/// token handed out is `"101"`.
pub const INITIAL_TOKEN_COUNTER: u64 = 100;

/// What was asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FetchParams {
    /// A contiguous range of an index list.
    #[serde(rename_all = "camelCase")]
    Index { start_index: ListIndex, count: u64 },
    /// The page adjacent to the loaded window of a token list.
    #[serde(rename_all = "camelCase")]
    Token {
        page_token: String,
        direction: Direction,
    },
}

/// An outstanding request for more list data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub correlation_token: CorrelationToken,
    pub list_id: ListId,
    pub params: FetchParams,
}

impl FetchRequest {
    /// Exclusive end of an index request, if this is one.
    pub fn index_range(&self) -> Option<(ListIndex, ListIndex)> {
        match self.params {
            FetchParams::Index { start_index, count } => {
                Some((start_index, start_index.saturating_add(count as ListIndex)))
            }
            FetchParams::Token { .. } => None,
        }
    }

    /// Wire form handed to the fetch collaborator.
    pub fn to_payload(&self) -> FetchRequestPayload {
        match &self.params {
            FetchParams::Index { start_index, count } => FetchRequestPayload::Index {
                correlation_token: self.correlation_token.clone(),
                list_id: self.list_id.clone(),
                start_index: *start_index,
                count: *count,
            },
            FetchParams::Token { page_token, .. } => FetchRequestPayload::Token {
                correlation_token: self.correlation_token.clone(),
                list_id: self.list_id.clone(),
                page_token: page_token.clone(),
            },
        }
    }
}

/// Issues correlation tokens and keeps the table of outstanding requests.
#[derive(Debug, Clone)]
pub struct CorrelationManager {
    counter: u64,
    outstanding: HashMap<CorrelationToken, FetchRequest>,
}

impl Default for CorrelationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationManager {
    /// Create a manager with no outstanding requests.
    pub fn new() -> Self {
        Self {
            counter: INITIAL_TOKEN_COUNTER,
            outstanding: HashMap::new(),
        }
    }

    /// Issue a token that has never been handed out by this manager.
    pub fn issue_token(&mut self) -> CorrelationToken {
        self.counter += 1;
        self.counter.to_string()
    }

    /// Record a request as outstanding under its token.
    pub fn register_request(&mut self, request: FetchRequest) {
        tracing::debug!(
            token = %request.correlation_token,
            list_id = %request.list_id,
            "fetch request registered"
        );
        self.outstanding
            .insert(request.correlation_token.clone(), request);
    }

    /// Look at an outstanding request without consuming it.
    pub fn peek(&self, token: &str) -> Option<&FetchRequest> {
        self.outstanding.get(token)
    }

    /// Resolve and consume an outstanding request.
    pub fn resolve(&mut self, token: &str) -> Option<FetchRequest> {
        let resolved = self.outstanding.remove(token);
        if resolved.is_none() {
            tracing::debug!(token = %token, "dropping response with unknown correlation token");
        }
        resolved
    }

    /// Abandon every outstanding request for a list. Returns what was dropped.
    pub fn abandon_all(&mut self, list_id: &str) -> Vec<FetchRequest> {
        let tokens: Vec<_> = self
            .outstanding
            .iter()
            .filter(|(_, request)| request.list_id == list_id)
            .map(|(token, _)| token.clone())
            .collect();

        let abandoned: Vec<_> = tokens
            .iter()
            .filter_map(|token| self.outstanding.remove(token))
            .collect();

        if !abandoned.is_empty() {
            tracing::debug!(
                list_id = %list_id,
                count = abandoned.len(),
                "abandoned outstanding fetch requests"
            );
        }
        abandoned
    }

    /// Move outstanding index requests of a list that start at or after
    /// `from` by `delta`, after the items before them grew or shrank.
    pub fn shift_index_requests(&mut self, list_id: &str, from: ListIndex, delta: ListIndex) {
        if delta == 0 {
            return;
        }
        for request in self.outstanding.values_mut() {
            if request.list_id != list_id {
                continue;
            }
            if let FetchParams::Index { start_index, .. } = &mut request.params {
                if *start_index >= from {
                    *start_index = start_index.saturating_add(delta);
                }
            }
        }
    }

    /// Abandon everything, used on session teardown.
    pub fn abandon_everything(&mut self) -> usize {
        let count = self.outstanding.len();
        self.outstanding.clear();
        count
    }

    /// Outstanding requests for a list, ordered by token issue order.
    pub fn outstanding(&self, list_id: &str) -> Vec<&FetchRequest> {
        let mut requests: Vec<_> = self
            .outstanding
            .values()
            .filter(|request| request.list_id == list_id)
            .collect();
        requests.sort_by_key(|request| request.correlation_token.parse::<u64>().unwrap_or(0));
        requests
    }

    /// Total number of outstanding requests.
    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    /// Check if nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_request(manager: &mut CorrelationManager, list_id: &str) -> FetchRequest {
        FetchRequest {
            correlation_token: manager.issue_token(),
            list_id: list_id.to_string(),
            params: FetchParams::Index {
                start_index: 10,
                count: 5,
            },
        }
    }

    #[test]
    fn shift_moves_only_later_index_requests() {
        let mut manager = CorrelationManager::new();
        let later = index_request(&mut manager, "l");
        let mut earlier = index_request(&mut manager, "l");
        earlier.params = FetchParams::Index {
            start_index: 0,
            count: 5,
        };
        let other = index_request(&mut manager, "m");
        for request in [&later, &earlier, &other] {
            manager.register_request(request.clone());
        }

        manager.shift_index_requests("l", 10, 3);

        let range = |token: &str| manager.peek(token).and_then(FetchRequest::index_range);
        assert_eq!(range(&later.correlation_token), Some((13, 18)));
        assert_eq!(range(&earlier.correlation_token), Some((0, 5)));
        assert_eq!(range(&other.correlation_token), Some((10, 15)));
    }

    #[test]
    fn tokens_start_at_101_and_increase() {
        let mut manager = CorrelationManager::new();
        assert_eq!(manager.issue_token(), "101");
        assert_eq!(manager.issue_token(), "102");
        assert_eq!(manager.issue_token(), "103");
    }

    #[test]
    fn resolve_is_destructive() {
        let mut manager = CorrelationManager::new();
        let request = index_request(&mut manager, "list");
        let token = request.correlation_token.clone();
        manager.register_request(request.clone());

        assert_eq!(manager.resolve(&token), Some(request));
        assert_eq!(manager.resolve(&token), None);
    }

    #[test]
    fn unknown_token_is_noop() {
        let mut manager = CorrelationManager::new();
        let request = index_request(&mut manager, "list");
        manager.register_request(request);

        assert_eq!(manager.resolve("999"), None);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn abandon_all_only_touches_one_list() {
        let mut manager = CorrelationManager::new();
        let a1 = index_request(&mut manager, "a");
        let a2 = index_request(&mut manager, "a");
        let b1 = index_request(&mut manager, "b");
        manager.register_request(a1.clone());
        manager.register_request(a2);
        manager.register_request(b1.clone());

        let abandoned = manager.abandon_all("a");
        assert_eq!(abandoned.len(), 2);
        assert_eq!(manager.resolve(&a1.correlation_token), None);
        assert_eq!(manager.resolve(&b1.correlation_token), Some(b1));
    }

    #[test]
    fn outstanding_is_ordered_by_issue() {
        let mut manager = CorrelationManager::new();
        let requests: Vec<_> = (0..12).map(|_| index_request(&mut manager, "a")).collect();
        for request in requests.iter().rev() {
            manager.register_request(request.clone());
        }

        let tokens: Vec<_> = manager
            .outstanding("a")
            .into_iter()
            .map(|r| r.correlation_token.clone())
            .collect();
        let expected: Vec<_> = requests.iter().map(|r| r.correlation_token.clone()).collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn index_request_payload_shape() {
        let request = FetchRequest {
            correlation_token: "101".into(),
            list_id: "vQdpOESlok".into(),
            params: FetchParams::Index {
                start_index: 5,
                count: 5,
            },
        };
        assert_eq!(request.index_range(), Some((5, 10)));

        let json = serde_json::to_value(request.to_payload()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "correlationToken": "101",
                "listId": "vQdpOESlok",
                "startIndex": 5,
                "count": 5
            })
        );
    }

    #[test]
    fn token_request_payload_shape() {
        let request = FetchRequest {
            correlation_token: "102".into(),
            list_id: "tokens".into(),
            params: FetchParams::Token {
                page_token: "nextPageToken".into(),
                direction: Direction::Forward,
            },
        };
        assert_eq!(request.index_range(), None);

        let json = serde_json::to_value(request.to_payload()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "correlationToken": "102",
                "listId": "tokens",
                "pageToken": "nextPageToken"
            })
        );
    }

    #[test]
    fn abandon_everything_clears() {
        let mut manager = CorrelationManager::new();
        let a = index_request(&mut manager, "a");
        let b = index_request(&mut manager, "b");
        manager.register_request(a);
        manager.register_request(b);

        assert_eq!(manager.abandon_everything(), 2);
        assert!(manager.is_empty());
        // Counter keeps going so tokens are never reused.
        assert_eq!(manager.issue_token(), "103");
    }
}
