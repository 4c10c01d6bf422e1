use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::presence::{PresenceRequest, PresenceResponse},
    error::AppError,
    services::presence_service,
    state::SharedState,
};

/// Routes handling the scorer role registry.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/matches/{id}/presence", post(claim_presence))
        .route("/matches/{id}/presence", delete(release_presence))
        .route("/matches/{id}/presence", get(current_presence))
}

/// Claim the scorer role for a match.
#[utoipa::path(
    post,
    path = "/matches/{id}/presence",
    tag = "presence",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = PresenceRequest,
    responses(
        (status = 200, description = "Scorer role claimed", body = PresenceResponse),
        (status = 401, description = "Another device holds the role and no takeover was requested")
    )
)]
pub async fn claim_presence(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PresenceRequest>,
) -> Result<Json<PresenceResponse>, AppError> {
    payload.validate()?;
    let entity = presence_service::start_presence(
        &state,
        id,
        &payload.device_id,
        &payload.user_id,
        payload.takeover,
    )
    .await?;
    Ok(Json(PresenceResponse::from(&entity)))
}

/// Release the scorer role.
#[utoipa::path(
    delete,
    path = "/matches/{id}/presence",
    tag = "presence",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = PresenceRequest,
    responses(
        (status = 200, description = "Scorer role released"),
        (status = 404, description = "No scorer registered for this match")
    )
)]
pub async fn release_presence(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PresenceRequest>,
) -> Result<(), AppError> {
    presence_service::end_presence(&state, id, &payload.device_id).await?;
    Ok(())
}

/// Current scorer registration.
#[utoipa::path(
    get,
    path = "/matches/{id}/presence",
    tag = "presence",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Current registration", body = PresenceResponse),
        (status = 404, description = "No scorer registered for this match")
    )
)]
pub async fn current_presence(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PresenceResponse>, AppError> {
    let entity = presence_service::current_presence(&state, id)
        .ok_or_else(|| AppError::NotFound(format!("no scorer registered for match {id}")))?;
    Ok(Json(PresenceResponse::from(&entity)))
}
