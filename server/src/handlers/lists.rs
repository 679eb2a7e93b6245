//! List handlers: initial payloads, fetch responses, and mutations.

use datasource_engine::{
    DataSourcePayload, FetchRequestPayload, ListId, ListVersion, OperationWarning, PatchOperation,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{AppError, Result};
use crate::repository::{FetchResponse, InitialQuery, ListRepository, ListSummary};
use crate::websocket::ConnectionManager;

/// Body of a mutation request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationsRequest {
    pub operations: Vec<PatchOperation>,
}

/// Result of a mutation.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationsResponse {
    pub list_id: ListId,
    /// Version the batch produced
    pub list_version: ListVersion,
    /// Operations skipped as out of range
    pub warnings: Vec<OperationWarning>,
    /// Subscribers the batch was pushed to
    pub notified: usize,
}

pub fn handle_summaries(repository: &ListRepository) -> Vec<ListSummary> {
    repository.summaries()
}

pub fn handle_initial(
    repository: &ListRepository,
    list_id: &str,
    query: &InitialQuery,
) -> Result<DataSourcePayload> {
    Ok(repository.initial_payload(list_id, query)?)
}

/// Answer a fetch request.
///
/// With `list_id` set, the request must name the same list.
pub fn handle_fetch(
    repository: &ListRepository,
    list_id: Option<&str>,
    request: &FetchRequestPayload,
) -> Result<FetchResponse> {
    if let Some(list_id) = list_id {
        if request.list_id() != list_id {
            return Err(AppError::BadRequest(format!(
                "request is for list '{}', not '{}'",
                request.list_id(),
                list_id
            )));
        }
    }

    let response = repository.fetch(request)?;
    tracing::debug!(
        list_id = %request.list_id(),
        correlation_token = %request.correlation_token(),
        "Answered fetch request"
    );
    Ok(response)
}

/// Apply operations and push the resulting batch to subscribers.
///
/// Operation indices address the whole backing list; each subscriber
/// receives them rebased onto the range it loaded.
pub fn handle_operations(
    repository: &ListRepository,
    conn_manager: &ConnectionManager,
    list_id: &str,
    request: OperationsRequest,
) -> Result<OperationsResponse> {
    if request.operations.is_empty() {
        return Err(AppError::BadRequest("no operations".to_string()));
    }

    let source_type = repository.summary(list_id)?.source_type;
    let (batch, warnings) = repository.apply_operations(list_id, request.operations)?;
    let list_version = batch.list_version;

    if !warnings.is_empty() {
        tracing::warn!(
            list_id = %list_id,
            skipped = warnings.len(),
            "Skipped out-of-range operations"
        );
    }

    let skipped: HashSet<usize> = warnings.iter().map(|w| w.operation_index).collect();
    let notified = conn_manager.publish_batch(source_type, &batch, &skipped);
    tracing::info!(
        list_id = %list_id,
        list_version,
        notified,
        "Applied patch batch"
    );

    Ok(OperationsResponse {
        list_id: list_id.to_string(),
        list_version,
        warnings,
        notified,
    })
}
