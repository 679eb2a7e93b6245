//! The data-source session.
//!
//! A session owns every dynamic list of one document together with the
//! protocol state that keeps them consistent with their producers: list
//! versions, outstanding fetch requests, and the queues through which the
//! host learns about fetches to issue, changes to render and rejected
//! payloads.
//!
//! The session is driven by a single owning thread. Payloads produced on
//! other threads go through a [`ResponseSender`] and are applied by
//! [`DataSourceSession::process_queued`].

use crate::{
    config::DataSourceConfig,
    correlation::{CorrelationManager, FetchParams, FetchRequest},
    error::Result,
    list::{DynamicList, ListArena, ListHandle},
    operation::PatchBatch,
    patch::{self, ListDiff, OperationWarning},
    payload::{
        DataSourcePayload, DataSourceType, FetchRequestPayload, IncomingPayload,
        IndexFetchResponse, TokenFetchResponse,
    },
    queue::{self, QueuedUpdate, ResponseSender},
    trigger::{FetchState, FetchTrigger},
    version::VersionTracker,
    window::{Direction, Window},
    CorrelationToken, Error, ListId, ListIndex, ListVersion,
};
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use std::{fmt, mem};

/// Why a payload was rejected or partly applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorReason {
    /// The payload could not be parsed
    InvalidPayload,
    /// Unknown type name, or the wrong type for the list
    InvalidDataSourceType,
    /// No list with this id is registered
    InvalidListId,
    /// The version was already applied
    DuplicateListVersion,
    /// One or more versions were skipped
    MissingListVersion,
    /// An operation addressed an item outside the list
    ListIndexOutOfRange,
    /// A fetch response does not line up with the loaded window
    InconsistentRange,
    /// A fetch response answers a different page than was requested
    InconsistentPageToken,
}

impl ErrorReason {
    /// Classify an error. Errors that are dropped silently have no reason.
    pub fn from_error(err: &Error) -> Option<Self> {
        match err {
            Error::MalformedPayload(_) => Some(ErrorReason::InvalidPayload),
            Error::UnknownSourceType(_) | Error::ListKindMismatch { .. } => {
                Some(ErrorReason::InvalidDataSourceType)
            }
            Error::UnregisteredList(_) => Some(ErrorReason::InvalidListId),
            Error::StaleVersion {
                expected, actual, ..
            } => Some(if actual < expected {
                ErrorReason::DuplicateListVersion
            } else {
                ErrorReason::MissingListVersion
            }),
            Error::InconsistentRange { .. } => Some(ErrorReason::InconsistentRange),
            Error::InconsistentPageToken { .. } => Some(ErrorReason::InconsistentPageToken),
            Error::UnknownCorrelation(_) | Error::SessionFinished | Error::InvalidConfig(_) => {
                None
            }
        }
    }
}

/// A rejection recorded for the host to report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceError {
    pub reason: ErrorReason,
    /// Empty when the payload did not name a list
    pub list_id: ListId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_version: Option<ListVersion>,
    pub message: String,
}

/// A change set for the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListChange {
    pub list_id: ListId,
    pub diff: ListDiff,
}

/// What an accepted update did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub list_id: ListId,
    pub diff: ListDiff,
    /// Operations skipped or trimmed while applying a patch
    pub warnings: Vec<OperationWarning>,
}

/// Callback receiving fetch requests as they are issued.
pub type FetchHandler = Box<dyn FnMut(FetchRequestPayload) + Send>;

/// All dynamic lists of one document.
pub struct DataSourceSession {
    config: DataSourceConfig,
    lists: ListArena,
    versions: VersionTracker,
    correlations: CorrelationManager,
    fetch_handler: Option<FetchHandler>,
    /// Requests issued while no handler is set
    outbox: Vec<FetchRequestPayload>,
    changes: Vec<ListChange>,
    errors: Vec<DataSourceError>,
    sender: ResponseSender,
    inbox: Option<Receiver<QueuedUpdate>>,
    finished: bool,
}

impl fmt::Debug for DataSourceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceSession")
            .field("config", &self.config)
            .field("lists", &self.lists.len())
            .field("outstanding", &self.correlations.len())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Default for DataSourceSession {
    fn default() -> Self {
        Self::build(DataSourceConfig::default())
    }
}

impl DataSourceSession {
    /// Create a session with a validated configuration.
    pub fn new(config: DataSourceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: DataSourceConfig) -> Self {
        let (sender, inbox) = queue::inbox();
        Self {
            config,
            lists: ListArena::new(),
            versions: VersionTracker::new(),
            correlations: CorrelationManager::new(),
            fetch_handler: None,
            outbox: Vec::new(),
            changes: Vec::new(),
            errors: Vec::new(),
            sender,
            inbox: Some(inbox),
            finished: false,
        }
    }

    pub fn config(&self) -> &DataSourceConfig {
        &self.config
    }

    /// Deliver fetch requests to `handler` instead of the outbox.
    pub fn set_fetch_handler<F>(&mut self, handler: F)
    where
        F: FnMut(FetchRequestPayload) + Send + 'static,
    {
        self.fetch_handler = Some(Box::new(handler));
    }

    /// Go back to collecting fetch requests in the outbox.
    pub fn clear_fetch_handler(&mut self) {
        self.fetch_handler = None;
    }

    // ========================================================================
    // Registration and updates
    // ========================================================================

    /// Register a list from its full payload.
    ///
    /// Registering an id that already exists replaces that list: its
    /// outstanding fetches are abandoned, its version is reset to the
    /// payload's, and a [`ListDiff::Replace`] change is queued.
    pub fn register_data_source(
        &mut self,
        source_type: &str,
        payload: serde_json::Value,
    ) -> Result<ListHandle> {
        self.ensure_active()?;
        let (hint_id, hint_version) = identify(&payload);

        let parsed = DataSourceType::parse(source_type)
            .and_then(|source_type| DataSourcePayload::parse(source_type, payload))
            .and_then(|payload| {
                let version = payload.list_version();
                DynamicList::from_payload(payload).map(|list| (list, version))
            });
        let (list, version) = parsed.map_err(|err| self.reject(&hint_id, hint_version, err))?;

        let list_id = list.list_id.clone();
        let abandoned = self.correlations.abandon_all(&list_id);
        self.outbox.retain(|request| request.list_id() != &list_id);
        match version {
            Some(version) => self.versions.initialize(list_id.clone(), version),
            None => self.versions.forget(&list_id),
        }

        let len = list.len();
        let (handle, replaced) = self.lists.insert(list);
        if replaced.is_some() {
            tracing::debug!(
                list_id = %list_id,
                abandoned = abandoned.len(),
                "list re-registered, contents replaced"
            );
            self.changes.push(ListChange {
                list_id,
                diff: ListDiff::Replace { len },
            });
        } else {
            tracing::debug!(list_id = %list_id, items = len, "list registered");
        }
        Ok(handle)
    }

    /// Apply a patch or fetch response. Returns true if it was accepted.
    pub fn update_data_source(&mut self, source_type: &str, payload: serde_json::Value) -> bool {
        self.apply_update(source_type, payload).is_ok()
    }

    /// Apply a patch or fetch response, reporting what happened.
    ///
    /// A rejected payload mutates nothing. Rejections other than unknown
    /// correlation tokens are also queued as [`DataSourceError`]s.
    pub fn apply_update(
        &mut self,
        source_type: &str,
        payload: serde_json::Value,
    ) -> Result<UpdateOutcome> {
        if self.finished {
            tracing::debug!("dropping update after session finished");
            return Err(Error::SessionFinished);
        }
        let (hint_id, hint_version) = identify(&payload);

        let result = DataSourceType::parse(source_type)
            .and_then(|source_type| {
                IncomingPayload::parse(source_type, payload).map(|incoming| (source_type, incoming))
            })
            .and_then(|(source_type, incoming)| self.dispatch(source_type, incoming));
        result.map_err(|err| self.reject(&hint_id, hint_version, err))
    }

    fn dispatch(
        &mut self,
        source_type: DataSourceType,
        incoming: IncomingPayload,
    ) -> Result<UpdateOutcome> {
        let list = self
            .lists
            .by_id(incoming.list_id())
            .ok_or_else(|| Error::UnregisteredList(incoming.list_id().clone()))?;
        list.expect_type(source_type)?;

        match incoming {
            IncomingPayload::Patch(batch) => self.apply_patch(batch),
            IncomingPayload::IndexResponse(response) => self.apply_index_response(response),
            IncomingPayload::TokenResponse(response) => self.apply_token_response(response),
        }
    }

    fn apply_patch(&mut self, batch: PatchBatch) -> Result<UpdateOutcome> {
        self.check_version(&batch.list_id, batch.list_version)?;

        let list = self
            .lists
            .by_id_mut(&batch.list_id)
            .ok_or_else(|| Error::UnregisteredList(batch.list_id.clone()))?;
        let outcome = patch::apply_operations_in_place(&mut list.items, &batch.operations);
        if let Some(window) = list.index_window_mut() {
            let old_end = window.end_index();
            window.adjust_loaded(outcome.delta);
            self.correlations.shift_index_requests(
                &batch.list_id,
                old_end,
                outcome.delta as ListIndex,
            );
        }
        self.versions.try_accept(&batch.list_id, batch.list_version);

        for warning in &outcome.warnings {
            self.errors.push(DataSourceError {
                reason: ErrorReason::ListIndexOutOfRange,
                list_id: batch.list_id.clone(),
                list_version: Some(batch.list_version),
                message: format!(
                    "{} (operation {}): {}",
                    warning.operation, warning.operation_index, warning.message
                ),
            });
        }

        tracing::debug!(
            list_id = %batch.list_id,
            version = batch.list_version,
            operations = batch.operations.len(),
            delta = outcome.delta,
            "patch applied"
        );
        Ok(self.publish(batch.list_id, outcome.diff, outcome.warnings))
    }

    fn apply_index_response(&mut self, response: IndexFetchResponse) -> Result<UpdateOutcome> {
        let request = self.outstanding_request(&response.list_id, &response.correlation_token)?;
        let (requested_start, requested_end) = request
            .index_range()
            .ok_or_else(|| Error::UnknownCorrelation(response.correlation_token.clone()))?;
        if let Some(version) = response.list_version {
            self.check_version(&response.list_id, version)?;
        }
        self.correlations.resolve(&response.correlation_token);

        let DynamicList { items, window, .. } = self
            .lists
            .by_id_mut(&response.list_id)
            .ok_or_else(|| Error::UnregisteredList(response.list_id.clone()))?;
        let window = match window {
            Window::Index(window) => window,
            Window::Token(_) => {
                return Err(Error::UnknownCorrelation(response.correlation_token.clone()))
            }
        };
        window.clear_in_flight(requested_start, requested_end);

        let inconsistent = |message: String| Error::InconsistentRange {
            list_id: response.list_id.clone(),
            message,
        };
        let plan = window
            .plan_merge(response.start_index, response.items.len())
            .map_err(inconsistent)?;

        let mut next = window.clone();
        next.apply_merge(&plan);
        next.minimum_inclusive_index = response
            .minimum_inclusive_index
            .or(window.minimum_inclusive_index);
        next.maximum_exclusive_index = response
            .maximum_exclusive_index
            .or(window.maximum_exclusive_index);
        if response.items.is_empty() {
            // Nothing came back, so the list ends where the window does.
            if requested_start >= window.end_index() && next.maximum_exclusive_index.is_none() {
                next.maximum_exclusive_index = Some(window.end_index());
            }
            if requested_end <= window.start_index && next.minimum_inclusive_index.is_none() {
                next.minimum_inclusive_index = Some(window.start_index);
            }
        }
        next.validate().map_err(inconsistent)?;

        let mut fetched = response.items;
        let append = fetched.split_off(plan.append.start);
        fetched.truncate(plan.prepend.end);
        let diff = patch::merge_window(items, fetched, append);
        *window = next;

        if let Some(version) = response.list_version {
            self.versions.try_accept(&response.list_id, version);
        }
        tracing::debug!(
            list_id = %response.list_id,
            token = %response.correlation_token,
            merged = plan.len(),
            "index fetch response merged"
        );
        Ok(self.publish(response.list_id, diff, Vec::new()))
    }

    fn apply_token_response(&mut self, response: TokenFetchResponse) -> Result<UpdateOutcome> {
        let request = self.outstanding_request(&response.list_id, &response.correlation_token)?;
        let (requested, direction) = match request.params {
            FetchParams::Token {
                page_token,
                direction,
            } => (page_token, direction),
            FetchParams::Index { .. } => {
                return Err(Error::UnknownCorrelation(response.correlation_token))
            }
        };
        if let Some(version) = response.list_version {
            self.check_version(&response.list_id, version)?;
        }
        self.correlations.resolve(&response.correlation_token);

        let DynamicList { items, window, .. } = self
            .lists
            .by_id_mut(&response.list_id)
            .ok_or_else(|| Error::UnregisteredList(response.list_id.clone()))?;
        let window = match window {
            Window::Token(window) => window,
            Window::Index(_) => return Err(Error::UnknownCorrelation(response.correlation_token)),
        };
        window.clear_in_flight(&requested);

        if response.page_token != requested {
            return Err(Error::InconsistentPageToken {
                list_id: response.list_id,
                expected: requested,
                actual: response.page_token,
            });
        }

        let count = response.items.len();
        let diff = match direction {
            Direction::Forward => patch::merge_window(items, Vec::new(), response.items),
            Direction::Backward => patch::merge_window(items, response.items, Vec::new()),
        };
        window.advance(direction, response.next_page_token);

        if let Some(version) = response.list_version {
            self.versions.try_accept(&response.list_id, version);
        }
        tracing::debug!(
            list_id = %response.list_id,
            token = %response.correlation_token,
            ?direction,
            items = count,
            "token fetch response merged"
        );
        Ok(self.publish(response.list_id, diff, Vec::new()))
    }

    fn check_version(&self, list_id: &str, version: ListVersion) -> Result<()> {
        if self.versions.would_accept(list_id, version) {
            Ok(())
        } else {
            Err(Error::StaleVersion {
                list_id: list_id.to_string(),
                expected: self.versions.expected_next(list_id).unwrap_or(version),
                actual: version,
            })
        }
    }

    fn outstanding_request(&self, list_id: &str, token: &str) -> Result<FetchRequest> {
        match self.correlations.peek(token) {
            Some(request) if request.list_id == list_id => Ok(request.clone()),
            _ => Err(Error::UnknownCorrelation(token.to_string())),
        }
    }

    fn publish(
        &mut self,
        list_id: ListId,
        diff: ListDiff,
        warnings: Vec<OperationWarning>,
    ) -> UpdateOutcome {
        if !diff.is_empty() {
            self.changes.push(ListChange {
                list_id: list_id.clone(),
                diff: diff.clone(),
            });
        }
        UpdateOutcome {
            list_id,
            diff,
            warnings,
        }
    }

    fn reject(&mut self, list_id: &str, list_version: Option<ListVersion>, err: Error) -> Error {
        match ErrorReason::from_error(&err) {
            Some(reason) => {
                tracing::warn!(list_id = %list_id, ?reason, error = %err, "payload rejected");
                self.errors.push(DataSourceError {
                    reason,
                    list_id: list_id.to_string(),
                    list_version,
                    message: err.to_string(),
                });
            }
            None => tracing::debug!(list_id = %list_id, error = %err, "payload dropped"),
        }
        err
    }

    fn ensure_active(&self) -> Result<()> {
        if self.finished {
            Err(Error::SessionFinished)
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // Consumer access
    // ========================================================================

    /// Note that the consumer wants absolute `index` of an index list.
    ///
    /// Issues whatever fetches are needed and returns their tokens.
    pub fn ensure_index(
        &mut self,
        list_id: &str,
        index: ListIndex,
    ) -> Result<Vec<CorrelationToken>> {
        self.ensure_active()?;
        let list = self
            .lists
            .by_id(list_id)
            .ok_or_else(|| Error::UnregisteredList(list_id.to_string()))?;
        list.expect_type(DataSourceType::Index)?;

        let plans = match list.index_window() {
            Some(window) => FetchTrigger::new(&self.config).plan_index(window, index),
            None => Vec::new(),
        };

        let mut tokens = Vec::with_capacity(plans.len());
        for plan in plans {
            if let Some(window) = self
                .lists
                .by_id_mut(list_id)
                .and_then(DynamicList::index_window_mut)
            {
                window.mark_in_flight(plan.start, plan.end);
            }
            tokens.push(self.issue(
                list_id,
                FetchParams::Index {
                    start_index: plan.start,
                    count: plan.count(),
                },
            ));
        }
        Ok(tokens)
    }

    /// Note that the consumer wants the loaded item at `position`.
    ///
    /// Only ever prefetches, since the item itself is already loaded.
    pub fn ensure_position(
        &mut self,
        list_id: &str,
        position: usize,
    ) -> Result<Vec<CorrelationToken>> {
        self.ensure_active()?;
        let list = self
            .lists
            .by_id(list_id)
            .ok_or_else(|| Error::UnregisteredList(list_id.to_string()))?;

        match list.index_window() {
            Some(window) => {
                let index = window.start_index.saturating_add(position as ListIndex);
                self.ensure_index(list_id, index)
            }
            None => {
                let directions =
                    FetchTrigger::new(&self.config).plan_page_prefetch(list.len(), position);
                let mut tokens = Vec::new();
                for direction in directions {
                    if let Some(token) = self.fetch_page(list_id, direction)? {
                        tokens.push(token);
                    }
                }
                Ok(tokens)
            }
        }
    }

    /// Fetch the adjacent page of a token list, unless there is none or it
    /// is already being fetched.
    pub fn fetch_page(
        &mut self,
        list_id: &str,
        direction: Direction,
    ) -> Result<Option<CorrelationToken>> {
        self.ensure_active()?;
        let list = self
            .lists
            .by_id_mut(list_id)
            .ok_or_else(|| Error::UnregisteredList(list_id.to_string()))?;
        list.expect_type(DataSourceType::Token)?;

        let window = match list.token_window_mut() {
            Some(window) => window,
            None => return Ok(None),
        };
        let page_token = match FetchTrigger::new(&self.config).plan_page(window, direction) {
            Some(token) => token,
            None => return Ok(None),
        };
        window.mark_in_flight(page_token.clone());

        Ok(Some(self.issue(
            list_id,
            FetchParams::Token {
                page_token,
                direction,
            },
        )))
    }

    fn issue(&mut self, list_id: &str, params: FetchParams) -> CorrelationToken {
        let token = self.correlations.issue_token();
        let request = FetchRequest {
            correlation_token: token.clone(),
            list_id: list_id.to_string(),
            params,
        };
        let payload = request.to_payload();
        self.correlations.register_request(request);

        match self.fetch_handler.as_mut() {
            Some(handler) => handler(payload),
            None => self.outbox.push(payload),
        }
        token
    }

    // ========================================================================
    // Host queues
    // ========================================================================

    /// Drain fetch requests issued while no handler was set.
    pub fn take_fetch_requests(&mut self) -> Vec<FetchRequestPayload> {
        mem::take(&mut self.outbox)
    }

    /// Drain change sets for the rendering layer, in the order they happened.
    pub fn take_changes(&mut self) -> Vec<ListChange> {
        mem::take(&mut self.changes)
    }

    /// Drain recorded rejections.
    pub fn take_pending_errors(&mut self) -> Vec<DataSourceError> {
        mem::take(&mut self.errors)
    }

    /// Handle for submitting payloads from other threads.
    pub fn response_sender(&self) -> ResponseSender {
        self.sender.clone()
    }

    /// Apply every queued payload in arrival order. Returns how many were
    /// accepted.
    pub fn process_queued(&mut self) -> usize {
        let queued: Vec<QueuedUpdate> = match &self.inbox {
            Some(inbox) => inbox.try_iter().collect(),
            None => return 0,
        };
        queued
            .into_iter()
            .map(|update| self.update_data_source(&update.source_type, update.payload))
            .filter(|accepted| *accepted)
            .count()
    }

    /// Tear down: abandon every list and outstanding request.
    ///
    /// Later updates return false and queued senders start failing.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let abandoned = self.correlations.abandon_everything();
        self.lists.clear();
        self.versions = VersionTracker::new();
        self.outbox.clear();
        self.inbox = None;
        tracing::info!(abandoned, "data source session finished");
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Fetch state of a list. Every list is abandoned once the session
    /// has finished.
    pub fn list_state(&self, list_id: &str) -> Option<FetchState> {
        if self.finished {
            return Some(FetchState::Abandoned);
        }
        self.lists.by_id(list_id).map(|list| {
            if list.is_fetching() {
                FetchState::FetchPending
            } else {
                FetchState::Idle
            }
        })
    }

    pub fn list(&self, list_id: &str) -> Option<&DynamicList> {
        self.lists.by_id(list_id)
    }

    pub fn list_by_handle(&self, handle: ListHandle) -> Option<&DynamicList> {
        self.lists.get(handle)
    }

    pub fn handle(&self, list_id: &str) -> Option<ListHandle> {
        self.lists.handle(list_id)
    }

    /// Loaded items of a list.
    pub fn items(&self, list_id: &str) -> Option<&[serde_json::Value]> {
        self.lists.by_id(list_id).map(|list| list.items.as_slice())
    }

    /// Last accepted version of a list.
    pub fn list_version(&self, list_id: &str) -> Option<ListVersion> {
        self.versions.current(list_id)
    }

    /// Outstanding requests for a list, oldest first.
    pub fn outstanding(&self, list_id: &str) -> Vec<&FetchRequest> {
        self.correlations.outstanding(list_id)
    }

    /// Number of registered lists.
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

fn identify(payload: &serde_json::Value) -> (ListId, Option<ListVersion>) {
    let list_id = payload
        .get("listId")
        .and_then(|id| id.as_str())
        .unwrap_or_default()
        .to_string();
    let version = payload.get("listVersion").and_then(|v| v.as_u64());
    (list_id, version)
}
