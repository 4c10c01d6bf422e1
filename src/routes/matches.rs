use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::{delete, get, post},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::matches::{
        ActionResponse, CheckoutConfirmRequest, MatchSnapshot, OpenMatchRequest,
        OpenMatchResponse, ScoreResponse, StarterRequest, ThrowRequest, VisitTotalRequest,
    },
    error::AppError,
    services::{match_service, score_service},
    state::SharedState,
};

/// Header carrying the scorer device identity on every scoring request.
const DEVICE_ID_HEADER: &str = "x-device-id";

/// Routes handling the live match: lifecycle and scoring inputs.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/matches/{id}/open", post(open_match))
        .route("/matches/{id}/starter", post(select_starter))
        .route("/matches/{id}/darts", post(add_dart))
        .route("/matches/{id}/darts/last", delete(remove_last_dart))
        .route("/matches/{id}/visit", post(submit_visit_total))
        .route("/matches/{id}/checkout", post(confirm_checkout))
        .route("/matches/{id}/undo", post(undo))
        .route("/matches/{id}/abandon", post(abandon))
        .route("/matches/{id}", get(snapshot))
}

/// Extract the scorer device identity from the request headers.
fn device_id(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(DEVICE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("missing {DEVICE_ID_HEADER} header")))
}

/// Open a match for scoring, recovering any prior state.
#[utoipa::path(
    post,
    path = "/matches/{id}/open",
    tag = "match",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = OpenMatchRequest,
    responses(
        (status = 200, description = "Match opened", body = OpenMatchResponse),
        (status = 401, description = "Another device holds the scorer role"),
        (status = 409, description = "A different match is already live")
    )
)]
pub async fn open_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OpenMatchRequest>,
) -> Result<Json<OpenMatchResponse>, AppError> {
    payload.validate()?;
    let response = match_service::open_match(&state, id, payload).await?;
    Ok(Json(response))
}

/// Select who throws first in leg 1.
#[utoipa::path(
    post,
    path = "/matches/{id}/starter",
    tag = "match",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = StarterRequest,
    responses(
        (status = 200, description = "Starter selected", body = ActionResponse),
        (status = 409, description = "Starter already selected or match not awaiting one")
    )
)]
pub async fn select_starter(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<StarterRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let device = device_id(&headers)?;
    let response = score_service::select_starter(&state, id, device, payload).await?;
    Ok(Json(response))
}

/// Enter one dart of the open visit.
#[utoipa::path(
    post,
    path = "/matches/{id}/darts",
    tag = "scoring",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = ThrowRequest,
    responses(
        (status = 200, description = "Input handled; accepted flag tells whether it counted", body = ScoreResponse),
        (status = 401, description = "Caller does not hold the scorer role")
    )
)]
pub async fn add_dart(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ThrowRequest>,
) -> Result<Json<ScoreResponse>, AppError> {
    payload.validate()?;
    let device = device_id(&headers)?;
    let response = score_service::add_dart(&state, id, device, payload).await?;
    Ok(Json(response))
}

/// Remove the last dart of the open visit.
#[utoipa::path(
    delete,
    path = "/matches/{id}/darts/last",
    tag = "scoring",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Input handled", body = ScoreResponse)
    )
)]
pub async fn remove_last_dart(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ScoreResponse>, AppError> {
    let device = device_id(&headers)?;
    let response = score_service::remove_last_dart(&state, id, device).await?;
    Ok(Json(response))
}

/// Submit a whole visit as a declared 3-dart total.
#[utoipa::path(
    post,
    path = "/matches/{id}/visit",
    tag = "scoring",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = VisitTotalRequest,
    responses(
        (status = 200, description = "Input handled", body = ScoreResponse),
        (status = 400, description = "Total above 180")
    )
)]
pub async fn submit_visit_total(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<VisitTotalRequest>,
) -> Result<Json<ScoreResponse>, AppError> {
    payload.validate()?;
    let device = device_id(&headers)?;
    let response = score_service::submit_turn_total(&state, id, device, payload).await?;
    Ok(Json(response))
}

/// Resolve a pending zeroing total with darts used and the double flag.
#[utoipa::path(
    post,
    path = "/matches/{id}/checkout",
    tag = "scoring",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = CheckoutConfirmRequest,
    responses(
        (status = 200, description = "Confirmation handled", body = ScoreResponse)
    )
)]
pub async fn confirm_checkout(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<CheckoutConfirmRequest>,
) -> Result<Json<ScoreResponse>, AppError> {
    payload.validate()?;
    let device = device_id(&headers)?;
    let response = score_service::confirm_checkout(&state, id, device, payload).await?;
    Ok(Json(response))
}

/// Revert the most recent closed visit.
#[utoipa::path(
    post,
    path = "/matches/{id}/undo",
    tag = "scoring",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Visit reverted", body = ActionResponse),
        (status = 409, description = "Nothing to undo or a visit is open")
    )
)]
pub async fn undo(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ActionResponse>, AppError> {
    let device = device_id(&headers)?;
    let response = score_service::undo_last_visit(&state, id, device).await?;
    Ok(Json(response))
}

/// Stop scoring without completing the match.
#[utoipa::path(
    post,
    path = "/matches/{id}/abandon",
    tag = "match",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Match abandoned", body = ActionResponse)
    )
)]
pub async fn abandon(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ActionResponse>, AppError> {
    let device = device_id(&headers)?;
    let snapshot = match_service::abandon_match(&state, id, device).await?;
    Ok(Json(ActionResponse { snapshot }))
}

/// Read-only snapshot of the live match.
#[utoipa::path(
    get,
    path = "/matches/{id}",
    tag = "match",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Current state", body = MatchSnapshot),
        (status = 404, description = "Match is not live on this device")
    )
)]
pub async fn snapshot(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchSnapshot>, AppError> {
    let snapshot = match_service::live_snapshot(&state, id).await?;
    Ok(Json(snapshot))
}
