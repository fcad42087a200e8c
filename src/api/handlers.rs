use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{sse::Sse, IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{iso_timestamp, ContentId, ContentItem, DataType, SnapshotEntry},
};

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct RelatedQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnounceResponse {
    pub data_type: DataType,
    pub delivered: usize,
    pub dropped: usize,
    pub computed_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeStatusResponse {
    pub connections: usize,
    pub data_types: Vec<DataType>,
    pub cached: Vec<DataType>,
}

// Handlers

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "connections": state.hub.connection_count(),
        })),
    )
}

/// Related posts or projects for one published item
pub async fn get_related(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RelatedQuery>,
) -> AppResult<Json<Vec<ContentItem>>> {
    let limit = query.limit.unwrap_or(state.related_default_limit);
    let related = state
        .recommendations
        .get_related(&ContentId::new(id), limit)
        .await?;
    Ok(Json(related))
}

/// Opens the server-sent events stream
pub async fn stream_events(State(state): State<AppState>) -> Response {
    let live = state.hub.connect();

    // Sse sets the content type and cache-control headers
    ([(header::CONNECTION, "keep-alive")], Sse::new(live)).into_response()
}

/// Recomputes one data type and pushes it to every open stream
pub async fn announce(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(data_type): Path<String>,
) -> AppResult<Json<AnnounceResponse>> {
    let data_type: DataType = data_type.parse()?;

    tracing::info!(request_id = %request_id, data_type = %data_type, "Processing announce request");

    let announcement = state.hub.announce(data_type).await?;

    Ok(Json(AnnounceResponse {
        data_type,
        delivered: announcement.outcome.delivered,
        dropped: announcement.outcome.dropped,
        computed_at: iso_timestamp(announcement.entry.computed_at),
    }))
}

/// Last snapshot computed for a data type
pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(data_type): Path<String>,
) -> AppResult<Json<SnapshotEntry>> {
    let data_type: DataType = data_type.parse()?;

    state
        .hub
        .load_snapshot(data_type)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No snapshot for {}", data_type)))
}

/// Live connection count and known data types
pub async fn realtime_status(State(state): State<AppState>) -> Json<RealtimeStatusResponse> {
    Json(RealtimeStatusResponse {
        connections: state.hub.connection_count(),
        data_types: state.hub.announceable_data_types(),
        cached: state.hub.cached_data_types(),
    })
}
