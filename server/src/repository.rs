//! In-memory backing lists.
//!
//! Each list is held in full. Index lists expose absolute indices
//! `[0, len)`. Token lists are cut into fixed-size pages addressed by
//! tokens that encode the page number and the direction of travel.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use datasource_engine::{
    patch, DataSourcePayload, DataSourceType, FetchRequestPayload, IndexFetchResponse,
    IndexListPayload, ListId, ListIndex, ListVersion, OperationWarning, PatchBatch,
    PatchOperation, TokenFetchResponse, TokenListPayload,
};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr, sync::Arc};

/// Repository errors.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("list not found: {0}")]
    NotFound(ListId),

    #[error("list '{list_id}' is a {actual} list")]
    KindMismatch {
        list_id: ListId,
        actual: DataSourceType,
    },

    #[error("invalid page token: {0}")]
    InvalidPageToken(String),

    #[error("duplicate list id: {0}")]
    Duplicate(ListId),

    #[error("failed to read lists file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse lists file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One entry of the seed file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSeed {
    pub list_id: ListId,
    #[serde(rename = "type")]
    pub source_type: DataSourceType,
    #[serde(default)]
    pub list_version: ListVersion,
    #[serde(default)]
    pub page_size: Option<usize>,
    pub items: Vec<serde_json::Value>,
}

/// Overview of a backing list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSummary {
    pub list_id: ListId,
    #[serde(rename = "type")]
    pub source_type: DataSourceType,
    pub list_version: ListVersion,
    pub length: usize,
    pub updated_at: DateTime<Utc>,
}

/// Address of a page of a token list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageToken {
    /// The page a client anchored on
    Anchor(usize),
    /// Reached by paging forward
    Forward(usize),
    /// Reached by paging backward
    Backward(usize),
}

impl PageToken {
    pub fn page(&self) -> usize {
        match *self {
            PageToken::Anchor(page) | PageToken::Forward(page) | PageToken::Backward(page) => page,
        }
    }
}

impl fmt::Display for PageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageToken::Anchor(page) => write!(f, "page-{}", page),
            PageToken::Forward(page) => write!(f, "forward-{}", page),
            PageToken::Backward(page) => write!(f, "backward-{}", page),
        }
    }
}

impl FromStr for PageToken {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RepositoryError::InvalidPageToken(s.to_string());
        let (kind, page) = s.split_once('-').ok_or_else(invalid)?;
        let page = page.parse().map_err(|_| invalid())?;
        match kind {
            "page" => Ok(PageToken::Anchor(page)),
            "forward" => Ok(PageToken::Forward(page)),
            "backward" => Ok(PageToken::Backward(page)),
            _ => Err(invalid()),
        }
    }
}

/// Response to a fetch request, in the list's wire shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FetchResponse {
    Index(IndexFetchResponse),
    Token(TokenFetchResponse),
}

impl FetchResponse {
    pub fn source_type(&self) -> DataSourceType {
        match self {
            FetchResponse::Index(_) => DataSourceType::Index,
            FetchResponse::Token(_) => DataSourceType::Token,
        }
    }
}

/// Where an initial payload should start.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialQuery {
    /// First index, index lists only
    pub start_index: Option<ListIndex>,
    /// Number of items, index lists only
    pub count: Option<usize>,
    /// Anchor page, token lists only
    pub page: Option<usize>,
}

/// A list held in full by the server.
#[derive(Debug, Clone)]
pub struct BackingList {
    pub list_id: ListId,
    pub source_type: DataSourceType,
    pub version: ListVersion,
    pub items: Vec<serde_json::Value>,
    pub page_size: usize,
    pub updated_at: DateTime<Utc>,
}

impl BackingList {
    pub fn from_seed(seed: ListSeed, default_page_size: usize) -> Self {
        Self {
            list_id: seed.list_id,
            source_type: seed.source_type,
            version: seed.list_version,
            items: seed.items,
            page_size: seed.page_size.filter(|&size| size > 0).unwrap_or(default_page_size),
            updated_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> ListSummary {
        ListSummary {
            list_id: self.list_id.clone(),
            source_type: self.source_type,
            list_version: self.version,
            length: self.items.len(),
            updated_at: self.updated_at,
        }
    }

    fn page_count(&self) -> usize {
        self.items.len().div_ceil(self.page_size)
    }

    fn page_items(&self, page: usize) -> Vec<serde_json::Value> {
        let start = (page * self.page_size).min(self.items.len());
        let end = (start + self.page_size).min(self.items.len());
        self.items[start..end].to_vec()
    }

    fn has_page(&self, page: usize) -> bool {
        page < self.page_count() || (page == 0 && self.items.is_empty())
    }

    fn index_range(&self, start: ListIndex, count: usize) -> (usize, usize) {
        let len = self.items.len();
        let start = usize::try_from(start.max(0)).unwrap_or(usize::MAX).min(len);
        let end = start.saturating_add(count).min(len);
        (start, end)
    }

    /// Full payload a client registers the list with.
    pub fn initial_payload(&self, query: &InitialQuery) -> Result<DataSourcePayload, RepositoryError> {
        match self.source_type {
            DataSourceType::Index => {
                let count = query.count.unwrap_or(self.page_size);
                let (start, end) = self.index_range(query.start_index.unwrap_or(0), count);
                Ok(DataSourcePayload::Index(IndexListPayload {
                    list_id: self.list_id.clone(),
                    list_version: Some(self.version),
                    start_index: start as ListIndex,
                    minimum_inclusive_index: Some(0),
                    maximum_exclusive_index: Some(self.items.len() as ListIndex),
                    items: self.items[start..end].to_vec(),
                }))
            }
            DataSourceType::Token => {
                let page = query.page.unwrap_or(0);
                if !self.has_page(page) {
                    return Err(RepositoryError::InvalidPageToken(
                        PageToken::Anchor(page).to_string(),
                    ));
                }
                Ok(DataSourcePayload::Token(TokenListPayload {
                    list_id: self.list_id.clone(),
                    list_version: Some(self.version),
                    page_token: PageToken::Anchor(page).to_string(),
                    forward_page_token: self.forward_of(page),
                    backward_page_token: self.backward_of(page),
                    items: self.page_items(page),
                }))
            }
        }
    }

    /// Backing-list index of the first item on the page a token addresses.
    pub fn page_start(&self, page_token: &str) -> Result<ListIndex, RepositoryError> {
        let page = page_token.parse::<PageToken>()?.page();
        Ok(page.saturating_mul(self.page_size) as ListIndex)
    }

    fn forward_of(&self, page: usize) -> Option<String> {
        (page + 1 < self.page_count()).then(|| PageToken::Forward(page + 1).to_string())
    }

    fn backward_of(&self, page: usize) -> Option<String> {
        page.checked_sub(1)
            .map(|previous| PageToken::Backward(previous).to_string())
    }

    /// Answer a fetch request.
    ///
    /// Responses carry no list version: the client's version only moves
    /// with patches.
    pub fn respond(&self, request: &FetchRequestPayload) -> Result<FetchResponse, RepositoryError> {
        match (self.source_type, request) {
            (
                DataSourceType::Index,
                FetchRequestPayload::Index {
                    correlation_token,
                    start_index,
                    count,
                    ..
                },
            ) => {
                let count = usize::try_from(*count).unwrap_or(usize::MAX);
                let (start, end) = self.index_range(*start_index, count);
                Ok(FetchResponse::Index(IndexFetchResponse {
                    list_id: self.list_id.clone(),
                    correlation_token: correlation_token.clone(),
                    list_version: None,
                    start_index: start as ListIndex,
                    minimum_inclusive_index: Some(0),
                    maximum_exclusive_index: Some(self.items.len() as ListIndex),
                    items: self.items[start..end].to_vec(),
                }))
            }
            (
                DataSourceType::Token,
                FetchRequestPayload::Token {
                    correlation_token,
                    page_token,
                    ..
                },
            ) => {
                let token: PageToken = page_token.parse()?;
                if !self.has_page(token.page()) {
                    return Err(RepositoryError::InvalidPageToken(page_token.clone()));
                }
                let next_page_token = match token {
                    PageToken::Backward(page) => self.backward_of(page),
                    PageToken::Anchor(page) | PageToken::Forward(page) => self.forward_of(page),
                };
                Ok(FetchResponse::Token(TokenFetchResponse {
                    list_id: self.list_id.clone(),
                    correlation_token: correlation_token.clone(),
                    list_version: None,
                    page_token: page_token.clone(),
                    next_page_token,
                    items: self.page_items(token.page()),
                }))
            }
            (actual, _) => Err(RepositoryError::KindMismatch {
                list_id: self.list_id.clone(),
                actual,
            }),
        }
    }

    /// Apply operations and advance the version.
    ///
    /// Returns the batch to broadcast and any operations that were skipped.
    pub fn apply(&mut self, operations: Vec<PatchOperation>) -> (PatchBatch, Vec<OperationWarning>) {
        let outcome = patch::apply_operations_in_place(&mut self.items, &operations);
        self.version += 1;
        self.updated_at = Utc::now();
        (
            PatchBatch::new(self.list_id.clone(), self.version, operations),
            outcome.warnings,
        )
    }
}

/// All backing lists, shared across handlers.
#[derive(Debug)]
pub struct ListRepository {
    lists: DashMap<ListId, BackingList>,
    default_page_size: usize,
}

impl ListRepository {
    /// Create an empty repository.
    pub fn new(default_page_size: usize) -> Self {
        Self {
            lists: DashMap::new(),
            default_page_size: default_page_size.max(1),
        }
    }

    /// Create an empty repository wrapped in Arc for sharing.
    pub fn new_shared(default_page_size: usize) -> Arc<Self> {
        Arc::new(Self::new(default_page_size))
    }

    /// Build a repository from seeds.
    pub fn from_seeds(
        seeds: Vec<ListSeed>,
        default_page_size: usize,
    ) -> Result<Self, RepositoryError> {
        let repository = Self::new(default_page_size);
        for seed in seeds {
            repository.insert(seed)?;
        }
        Ok(repository)
    }

    /// Load seeds from a JSON file holding an array of lists.
    pub async fn load(path: &Path, default_page_size: usize) -> Result<Self, RepositoryError> {
        let text = tokio::fs::read_to_string(path).await?;
        let seeds: Vec<ListSeed> = serde_json::from_str(&text)?;
        let repository = Self::from_seeds(seeds, default_page_size)?;
        tracing::info!(
            path = %path.display(),
            lists = repository.len(),
            "Loaded backing lists"
        );
        Ok(repository)
    }

    /// Add a list. Ids must be unique.
    pub fn insert(&self, seed: ListSeed) -> Result<(), RepositoryError> {
        if self.lists.contains_key(&seed.list_id) {
            return Err(RepositoryError::Duplicate(seed.list_id));
        }
        let list = BackingList::from_seed(seed, self.default_page_size);
        self.lists.insert(list.list_id.clone(), list);
        Ok(())
    }

    /// Summaries of every list, ordered by id.
    pub fn summaries(&self) -> Vec<ListSummary> {
        let mut summaries: Vec<_> = self.lists.iter().map(|entry| entry.summary()).collect();
        summaries.sort_by(|a, b| a.list_id.cmp(&b.list_id));
        summaries
    }

    pub fn summary(&self, list_id: &str) -> Result<ListSummary, RepositoryError> {
        self.lists
            .get(list_id)
            .map(|list| list.summary())
            .ok_or_else(|| RepositoryError::NotFound(list_id.to_string()))
    }

    pub fn initial_payload(
        &self,
        list_id: &str,
        query: &InitialQuery,
    ) -> Result<DataSourcePayload, RepositoryError> {
        self.lists
            .get(list_id)
            .ok_or_else(|| RepositoryError::NotFound(list_id.to_string()))?
            .initial_payload(query)
    }

    pub fn fetch(&self, request: &FetchRequestPayload) -> Result<FetchResponse, RepositoryError> {
        self.lists
            .get(request.list_id())
            .ok_or_else(|| RepositoryError::NotFound(request.list_id().clone()))?
            .respond(request)
    }

    pub fn page_start(&self, list_id: &str, page_token: &str) -> Result<ListIndex, RepositoryError> {
        self.lists
            .get(list_id)
            .ok_or_else(|| RepositoryError::NotFound(list_id.to_string()))?
            .page_start(page_token)
    }

    pub fn apply_operations(
        &self,
        list_id: &str,
        operations: Vec<PatchOperation>,
    ) -> Result<(PatchBatch, Vec<OperationWarning>), RepositoryError> {
        let mut list = self
            .lists
            .get_mut(list_id)
            .ok_or_else(|| RepositoryError::NotFound(list_id.to_string()))?;
        Ok(list.apply(operations))
    }

    /// Number of lists.
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seed(list_id: &str, source_type: DataSourceType, len: usize) -> ListSeed {
        ListSeed {
            list_id: list_id.to_string(),
            source_type,
            list_version: 0,
            page_size: Some(3),
            items: (0..len).map(|i| json!(i)).collect(),
        }
    }

    fn repository() -> ListRepository {
        ListRepository::from_seeds(
            vec![
                seed("numbers", DataSourceType::Index, 10),
                seed("pages", DataSourceType::Token, 7),
            ],
            20,
        )
        .unwrap()
    }

    #[test]
    fn page_tokens_round_trip_through_text() {
        for token in [
            PageToken::Anchor(0),
            PageToken::Forward(12),
            PageToken::Backward(3),
        ] {
            assert_eq!(token.to_string().parse::<PageToken>().unwrap(), token);
        }
        assert!("sideways-1".parse::<PageToken>().is_err());
        assert!("page-x".parse::<PageToken>().is_err());
        assert!("page".parse::<PageToken>().is_err());
    }

    #[test]
    fn index_initial_payload() {
        let payload = repository()
            .initial_payload(
                "numbers",
                &InitialQuery {
                    start_index: Some(4),
                    count: Some(3),
                    page: None,
                },
            )
            .unwrap();
        match payload {
            DataSourcePayload::Index(p) => {
                assert_eq!(p.start_index, 4);
                assert_eq!(p.items, vec![json!(4), json!(5), json!(6)]);
                assert_eq!(p.maximum_exclusive_index, Some(10));
                assert_eq!(p.list_version, Some(0));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn index_fetch_is_clamped() {
        let response = repository()
            .fetch(&FetchRequestPayload::Index {
                correlation_token: "101".into(),
                list_id: "numbers".into(),
                start_index: 8,
                count: 10,
            })
            .unwrap();
        match response {
            FetchResponse::Index(r) => {
                assert_eq!(r.correlation_token, "101");
                assert_eq!(r.items, vec![json!(8), json!(9)]);
                assert_eq!(r.list_version, None);
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[test]
    fn token_pages_chain_in_both_directions() {
        let repository = repository();
        let payload = repository
            .initial_payload(
                "pages",
                &InitialQuery {
                    page: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();
        let initial = match payload {
            DataSourcePayload::Token(p) => p,
            other => panic!("unexpected payload {:?}", other),
        };
        assert_eq!(initial.page_token, "page-1");
        assert_eq!(initial.items, vec![json!(3), json!(4), json!(5)]);
        assert_eq!(initial.forward_page_token.as_deref(), Some("forward-2"));
        assert_eq!(initial.backward_page_token.as_deref(), Some("backward-0"));

        let fetch = |token: &str| {
            match repository
                .fetch(&FetchRequestPayload::Token {
                    correlation_token: "1".into(),
                    list_id: "pages".into(),
                    page_token: token.into(),
                })
                .unwrap()
            {
                FetchResponse::Token(r) => r,
                other => panic!("unexpected response {:?}", other),
            }
        };

        let forward = fetch("forward-2");
        assert_eq!(forward.items, vec![json!(6)]);
        assert_eq!(forward.next_page_token, None);

        let backward = fetch("backward-0");
        assert_eq!(backward.items, vec![json!(0), json!(1), json!(2)]);
        assert_eq!(backward.next_page_token, None);

        assert_eq!(repository.page_start("pages", "page-1").unwrap(), 3);
        assert_eq!(repository.page_start("pages", "forward-2").unwrap(), 6);
        assert!(repository.page_start("pages", "sideways-1").is_err());
    }

    #[test]
    fn unknown_pages_and_kinds_rejected() {
        let repository = repository();
        assert!(matches!(
            repository.fetch(&FetchRequestPayload::Token {
                correlation_token: "1".into(),
                list_id: "pages".into(),
                page_token: "forward-9".into(),
            }),
            Err(RepositoryError::InvalidPageToken(_))
        ));
        assert!(matches!(
            repository.fetch(&FetchRequestPayload::Token {
                correlation_token: "1".into(),
                list_id: "numbers".into(),
                page_token: "page-0".into(),
            }),
            Err(RepositoryError::KindMismatch { .. })
        ));
        assert!(matches!(
            repository.summary("missing"),
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[test]
    fn operations_bump_version() {
        let repository = repository();
        let (batch, warnings) = repository
            .apply_operations(
                "numbers",
                vec![
                    PatchOperation::delete(0),
                    PatchOperation::set(99, json!("x")),
                ],
            )
            .unwrap();

        assert_eq!(batch.list_version, 1);
        assert_eq!(batch.operations.len(), 2);
        assert_eq!(warnings.len(), 1);
        assert_eq!(repository.summary("numbers").unwrap().length, 9);
    }

    #[test]
    fn duplicate_seed_rejected() {
        let result = ListRepository::from_seeds(
            vec![
                seed("a", DataSourceType::Index, 1),
                seed("a", DataSourceType::Token, 1),
            ],
            20,
        );
        assert!(matches!(result, Err(RepositoryError::Duplicate(_))));
    }

    #[test]
    fn seed_file_format() {
        let seeds: Vec<ListSeed> = serde_json::from_str(
            r#"[
                {"listId": "a", "type": "dynamicIndexList", "items": [1, 2]},
                {"listId": "b", "type": "dynamicTokenList", "listVersion": 4, "pageSize": 2, "items": []}
            ]"#,
        )
        .unwrap();
        let repository = ListRepository::from_seeds(seeds, 5).unwrap();

        let summaries = repository.summaries();
        assert_eq!(summaries[0].list_id, "a");
        assert_eq!(summaries[1].list_version, 4);
        assert!(repository
            .initial_payload("b", &InitialQuery::default())
            .is_ok());
    }
}
