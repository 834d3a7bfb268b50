//! Session, alert, and stats route handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use carpark_core::{SessionStatus, Vehicle};

use super::error::{ApiError, ApiJson};
use super::handlers::LimitQuery;
use super::state::AppState;

/// Default page size for session listings.
const SESSION_PAGE_LIMIT: usize = 20;
/// Default number of alerts returned.
const ALERT_LIMIT: usize = 10;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StartSessionRequest {
    vehicle: Vehicle,
    space_number: String,
    user_id: String,
}

/// POST /sessions
pub(crate) async fn handle_start_session(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<StartSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .service
        .start_session(req.vehicle, &req.space_number, &req.user_id)
        .await?;
    let response = serde_json::json!({ "success": true, "session": session });
    Ok((StatusCode::CREATED, Json(response)))
}

#[derive(Deserialize)]
pub(crate) struct EndSessionRequest {
    amount: Option<f64>,
}

/// PUT /sessions/{id}/end
pub(crate) async fn handle_end_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<EndSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.service.end_session(id, req.amount).await?;
    Ok(Json(serde_json::json!({ "success": true, "session": session })))
}

/// GET /sessions/{id}
pub(crate) async fn handle_get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.service.get_session(id).await?;
    Ok(Json(serde_json::json!({ "success": true, "session": session })))
}

#[derive(Deserialize)]
pub(crate) struct SessionsQuery {
    status: Option<SessionStatus>,
    page: Option<usize>,
    limit: Option<usize>,
}

/// GET /sessions
pub(crate) async fn handle_list_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(SESSION_PAGE_LIMIT);
    let sessions = state.service.list_sessions(query.status, page, limit).await?;

    let response = serde_json::json!({
        "sessions": sessions.sessions,
        "pagination": {
            "page": sessions.page,
            "limit": sessions.limit,
            "total": sessions.total,
            "pages": sessions.pages,
        },
    });
    Ok(Json(response))
}

/// GET /alerts
pub(crate) async fn handle_list_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let alerts = state
        .service
        .alerts(query.limit.unwrap_or(ALERT_LIMIT))
        .await?;
    Ok(Json(serde_json::json!({ "alerts": alerts })))
}

/// PUT /alerts/{id}/read
pub(crate) async fn handle_mark_alert_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.mark_alert_read(id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Alert {id} marked as read"),
    })))
}

/// GET /stats
pub(crate) async fn handle_stats(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.service.stats().await?;
    Ok(Json(stats))
}
