use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the match scoring backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::matches::open_match,
        crate::routes::matches::select_starter,
        crate::routes::matches::add_dart,
        crate::routes::matches::remove_last_dart,
        crate::routes::matches::submit_visit_total,
        crate::routes::matches::confirm_checkout,
        crate::routes::matches::undo,
        crate::routes::matches::abandon,
        crate::routes::matches::snapshot,
        crate::routes::presence::claim_presence,
        crate::routes::presence::release_presence,
        crate::routes::presence::current_presence,
        crate::routes::sse::match_events,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::matches::OpenMatchRequest,
            crate::dto::matches::OpenMatchResponse,
            crate::dto::matches::PlayerDescriptor,
            crate::dto::matches::StarterRequest,
            crate::dto::matches::ThrowRequest,
            crate::dto::matches::VisitTotalRequest,
            crate::dto::matches::CheckoutConfirmRequest,
            crate::dto::matches::ScoreResponse,
            crate::dto::matches::ActionResponse,
            crate::dto::matches::MatchSnapshot,
            crate::dto::matches::PlayerSnapshot,
            crate::dto::matches::RecoverySource,
            crate::dto::phase::VisibleMatchPhase,
            crate::dto::presence::PresenceRequest,
            crate::dto::presence::PresenceResponse,
            crate::state::scoring::PlayerSlot,
            crate::state::scoring::Multiplier,
            crate::state::session::MatchResult,
            crate::state::session::PlayerResult,
            crate::state::session::VisitOutcome,
        )
    ),
    tags(
        (name = "match", description = "Match lifecycle endpoints"),
        (name = "scoring", description = "Scoring input endpoints"),
        (name = "presence", description = "Scorer role registry"),
        (name = "sse", description = "Server-sent events stream"),
        (name = "health", description = "Health check endpoints"),
    )
)]
pub struct ApiDoc;
