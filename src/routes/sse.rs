use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    services::{sse_events, sse_service},
    state::SharedState,
};

/// Configure the SSE endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/matches/{id}/events", get(match_events))
}

#[utoipa::path(
    get,
    path = "/matches/{id}/events",
    tag = "sse",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses((status = 200, description = "Live match event stream", content_type = "text/event-stream", body = String))
)]
/// Stream realtime match snapshots and phase changes to observers.
pub async fn match_events(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = sse_service::subscribe(&state);
    info!(match_id = %id, "new SSE connection");
    sse_events::broadcast_handshake(&state).await;
    sse_service::to_sse_stream(receiver)
}
