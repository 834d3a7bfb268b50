//! Parking route handlers: registry, state machine transitions, history,
//! and the on-demand expiry sweep.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use carpark_core::{SpaceStatus, VehicleType, DEFAULT_ZONE_COUNT};

use super::error::{json_error, ApiError, ApiJson};
use super::state::AppState;

/// Default page size for per-space history queries.
const SPACE_HISTORY_LIMIT: usize = 50;
/// Default page size for global history queries.
const GLOBAL_HISTORY_LIMIT: usize = 100;

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateRequest {
    total_spaces: usize,
    zone_count: Option<usize>,
}

/// POST /parking/generate-spaces
pub(crate) async fn handle_generate(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<GenerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let zones = req.zone_count.unwrap_or(DEFAULT_ZONE_COUNT);
    let spaces = state.service.generate(req.total_spaces, zones).await?;

    let response = serde_json::json!({
        "success": true,
        "message": format!("Generated {} parking spaces across {} zones", spaces.len(), zones),
        "spaces": spaces,
    });
    Ok((StatusCode::CREATED, Json(response)))
}

#[derive(Deserialize)]
pub(crate) struct SpacesQuery {
    zone: Option<String>,
    status: Option<SpaceStatus>,
}

/// GET /parking/spaces
pub(crate) async fn handle_list_spaces(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SpacesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let zone = query.zone.map(parse_zone).transpose()?;
    let spaces = state.service.list_spaces(zone, query.status).await?;
    Ok(Json(spaces))
}

/// GET /parking/spaces/{number}
pub(crate) async fn handle_get_space(
    State(state): State<Arc<AppState>>,
    Path(number): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let space = state.service.get_space(&number).await?;
    Ok(Json(space))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReserveRequest {
    space_number: String,
    plate: String,
    vehicle_type: VehicleType,
}

/// POST /parking/reserve
pub(crate) async fn handle_reserve(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ReserveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let space = state
        .service
        .reserve(&req.space_number, &req.plate, req.vehicle_type)
        .await?;
    Ok(transition_ok(format!(
        "Space {} reserved for {}",
        space.number,
        space.reservation.as_ref().map_or_else(String::new, |r| r.plate.clone()),
    )))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OccupyRequest {
    space_number: String,
    session_id: Option<Uuid>,
    plate: Option<String>,
    vehicle_type: Option<VehicleType>,
}

/// POST /parking/occupy
pub(crate) async fn handle_occupy(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<OccupyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let space = state
        .service
        .occupy(
            &req.space_number,
            req.session_id,
            req.plate.as_deref(),
            req.vehicle_type,
        )
        .await?;
    Ok(transition_ok(format!("Space {} occupied", space.number)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FreeRequest {
    space_number: String,
    session_id: Option<Uuid>,
}

/// POST /parking/free
pub(crate) async fn handle_free(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<FreeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let space = state
        .service
        .release(&req.space_number, req.session_id)
        .await?;
    Ok(transition_ok(format!("Space {} freed", space.number)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SpaceRequest {
    space_number: String,
}

/// POST /parking/cancel-reservation
pub(crate) async fn handle_cancel_reservation(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<SpaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let space = state.service.cancel_reservation(&req.space_number).await?;
    Ok(transition_ok(format!(
        "Reservation cancelled for space {}",
        space.number
    )))
}

/// POST /parking/out-of-service
pub(crate) async fn handle_out_of_service(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<SpaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let space = state.service.set_out_of_service(&req.space_number).await?;
    Ok(transition_ok(format!(
        "Space {} marked out of service",
        space.number
    )))
}

/// POST /parking/in-service
pub(crate) async fn handle_in_service(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<SpaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let space = state.service.set_in_service(&req.space_number).await?;
    Ok(transition_ok(format!(
        "Space {} returned to service",
        space.number
    )))
}

#[derive(Deserialize)]
pub(crate) struct LimitQuery {
    pub(crate) limit: Option<usize>,
}

/// GET /parking/history/{number}
pub(crate) async fn handle_space_history(
    State(state): State<Arc<AppState>>,
    Path(number): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(SPACE_HISTORY_LIMIT);
    let entries = state.service.history_for_space(&number, limit).await?;
    Ok(Json(entries))
}

#[derive(Deserialize)]
pub(crate) struct HistoryQuery {
    limit: Option<usize>,
    page: Option<usize>,
}

/// GET /parking/history
pub(crate) async fn handle_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(GLOBAL_HISTORY_LIMIT);
    let page = query.page.unwrap_or(1);
    let history = state.service.history_page(page, limit).await?;

    let response = serde_json::json!({
        "history": history.entries,
        "pagination": {
            "page": history.page,
            "limit": history.limit,
            "total": history.total,
            "pages": history.pages,
        },
    });
    Ok(Json(response))
}

/// POST /parking/cleanup-expired
pub(crate) async fn handle_cleanup_expired(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.service.sweep_expired(OffsetDateTime::now_utc()).await?;
    let response = serde_json::json!({
        "success": true,
        "freedSpaces": outcome.freed,
    });
    Ok(Json(response))
}

/// 200 `{success, message}` for a completed transition.
fn transition_ok(message: String) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "success": true, "message": message })),
    )
}

/// A zone filter is a single letter; upper-cased to match zone names.
fn parse_zone(raw: String) -> Result<char, ApiError> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Ok(c.to_ascii_uppercase()),
        _ => Err(ApiError(carpark_engine::ParkingError::Validation(format!(
            "zone must be a single letter, got {raw:?}"
        )))),
    }
}
