//! List endpoint routes.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use datasource_engine::{DataSourcePayload, FetchRequestPayload};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{
    handle_fetch, handle_initial, handle_operations, handle_summaries, OperationsRequest,
    OperationsResponse,
};
use crate::repository::{FetchResponse, InitialQuery, ListSummary};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/lists", get(summaries_handler))
        .route("/lists/{list_id}", get(initial_handler))
        .route("/lists/{list_id}/fetch", post(fetch_handler))
        .route("/lists/{list_id}/operations", post(operations_handler))
}

/// GET /lists - Summaries of every list.
async fn summaries_handler(State(state): State<AppState>) -> Json<Vec<ListSummary>> {
    Json(handle_summaries(&state.repository))
}

/// GET /lists/{list_id} - Initial payload.
async fn initial_handler(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    Query(query): Query<InitialQuery>,
) -> Result<Json<DataSourcePayload>> {
    Ok(Json(handle_initial(&state.repository, &list_id, &query)?))
}

/// POST /lists/{list_id}/fetch - Answer a fetch request.
async fn fetch_handler(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    Json(request): Json<FetchRequestPayload>,
) -> Result<Json<FetchResponse>> {
    Ok(Json(handle_fetch(
        &state.repository,
        Some(&list_id),
        &request,
    )?))
}

/// POST /lists/{list_id}/operations - Apply operations and push the batch.
async fn operations_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(list_id): Path<String>,
    Json(request): Json<OperationsRequest>,
) -> Result<Json<OperationsResponse>> {
    let response = handle_operations(
        &state.repository,
        &state.conn_manager,
        &list_id,
        request,
    )?;
    Ok(Json(response))
}
