/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Match lifecycle: open, recovery, abandon, snapshots.
pub mod match_service;
/// Scorer role registration and ownership checks.
pub mod presence_service;
/// Scoring input handling and persistence write-through.
pub mod score_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Background remote synchronisation supervisor.
pub mod sync_service;
