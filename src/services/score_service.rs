//! Scoring input handling: ownership gating, engine execution, persistence
//! write-through, state-machine milestones, and SSE fan-out.
//!
//! Engine rejections are answered as `accepted: false` no-ops so a scorer
//! tapping an impossible input never sees an HTTP error; the only exception
//! is a completion attempt with a missing player id, which is a conflict the
//! scorer must resolve.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::models::RemoteMatchRecord,
    dto::matches::{
        ActionResponse, CheckoutConfirmRequest, MatchSnapshot, ScoreResponse, StarterRequest,
        ThrowRequest, VisitTotalRequest,
    },
    error::ServiceError,
    services::{presence_service, sse_events},
    state::{
        SharedState,
        machine::MatchEvent,
        session::{
            CloseSummary, DartOutcome, MatchResult, MatchSession, ScoreRejection, TotalOutcome,
        },
        transitions::run_transition_with_broadcast,
    },
};

/// Select who throws first in leg 1.
pub async fn select_starter(
    state: &SharedState,
    match_id: Uuid,
    device_id: &str,
    request: StarterRequest,
) -> Result<ActionResponse, ServiceError> {
    let applied = apply_input(state, match_id, device_id, |session| {
        session.select_starter(request.player)
    })
    .await?;

    match applied {
        Applied::Accepted { session, .. } => {
            run_transition_with_broadcast(state, MatchEvent::SelectStarter, || async {
                persist_cache_next(state, &session).await
            })
            .await?;
            let snapshot = build_snapshot(state, &session).await;
            sse_events::broadcast_snapshot(state, snapshot.clone());
            Ok(ActionResponse { snapshot })
        }
        Applied::Rejected { rejection, .. } => {
            Err(ServiceError::InvalidState(rejection.to_string()))
        }
    }
}

/// Enter one dart of the open visit.
pub async fn add_dart(
    state: &SharedState,
    match_id: Uuid,
    device_id: &str,
    request: ThrowRequest,
) -> Result<ScoreResponse, ServiceError> {
    let applied = apply_input(state, match_id, device_id, |session| {
        session.add_dart(request.base, request.multiplier)
    })
    .await?;

    match applied {
        Applied::Accepted { value, session } => {
            let summary = match value {
                DartOutcome::Closed(summary) => Some(summary),
                DartOutcome::Continue { .. } => None,
            };
            let result = commit(state, &session, summary.as_ref()).await?;
            accepted_response(state, &session, summary.as_ref(), result).await
        }
        Applied::Rejected { rejection, session } => {
            rejected_response(state, &session, rejection).await
        }
    }
}

/// Remove the last dart of the open visit.
pub async fn remove_last_dart(
    state: &SharedState,
    match_id: Uuid,
    device_id: &str,
) -> Result<ScoreResponse, ServiceError> {
    let applied = apply_input(state, match_id, device_id, |session| {
        session.remove_last_dart()
    })
    .await?;

    match applied {
        Applied::Accepted { session, .. } => {
            let result = commit(state, &session, None).await?;
            accepted_response(state, &session, None, result).await
        }
        Applied::Rejected { rejection, session } => {
            rejected_response(state, &session, rejection).await
        }
    }
}

/// Submit a whole visit as a declared 3-dart total.
pub async fn submit_turn_total(
    state: &SharedState,
    match_id: Uuid,
    device_id: &str,
    request: VisitTotalRequest,
) -> Result<ScoreResponse, ServiceError> {
    let applied = apply_input(state, match_id, device_id, |session| {
        session.submit_turn_total(request.total)
    })
    .await?;

    match applied {
        Applied::Accepted { value, session } => match value {
            TotalOutcome::ConfirmationRequired { total } => {
                run_transition_with_broadcast(state, MatchEvent::RequestCheckoutConfirm, || async {
                    persist_cache_next(state, &session).await
                })
                .await?;
                debug!(%match_id, total, "turn total hit zero; awaiting checkout confirmation");
                let snapshot = build_snapshot(state, &session).await;
                sse_events::broadcast_snapshot(state, snapshot.clone());
                Ok(ScoreResponse {
                    accepted: true,
                    rejection: None,
                    outcome: None,
                    leg_won: false,
                    match_won: false,
                    result: None,
                    snapshot,
                })
            }
            TotalOutcome::Closed(summary) => {
                let result = commit(state, &session, Some(&summary)).await?;
                accepted_response(state, &session, Some(&summary), result).await
            }
        },
        Applied::Rejected { rejection, session } => {
            rejected_response(state, &session, rejection).await
        }
    }
}

/// Resolve a pending zeroing total with the darts used and double flag.
pub async fn confirm_checkout(
    state: &SharedState,
    match_id: Uuid,
    device_id: &str,
    request: CheckoutConfirmRequest,
) -> Result<ScoreResponse, ServiceError> {
    let applied = apply_input(state, match_id, device_id, |session| {
        session.confirm_checkout(request.darts_used, request.finished_on_double)
    })
    .await?;

    match applied {
        Applied::Accepted { value, session } => {
            let result = if value.match_won {
                commit(state, &session, Some(&value)).await?
            } else {
                // leaves the confirmation phase whatever the resolution was
                run_transition_with_broadcast(state, MatchEvent::ResolveCheckoutConfirm, || async {
                    persist_cache_next(state, &session).await
                })
                .await?;
                push_remote(state, &session).await;
                None
            };
            accepted_response(state, &session, Some(&value), result).await
        }
        Applied::Rejected { rejection, session } => {
            rejected_response(state, &session, rejection).await
        }
    }
}

/// Revert the most recent closed visit.
pub async fn undo_last_visit(
    state: &SharedState,
    match_id: Uuid,
    device_id: &str,
) -> Result<ActionResponse, ServiceError> {
    let applied = apply_input(state, match_id, device_id, |session| session.undo()).await?;

    match applied {
        Applied::Accepted { session, .. } => {
            persist_cache(state, &session).await?;
            push_remote(state, &session).await;
            let snapshot = build_snapshot(state, &session).await;
            sse_events::broadcast_snapshot(state, snapshot.clone());
            Ok(ActionResponse { snapshot })
        }
        Applied::Rejected { rejection, .. } => {
            Err(ServiceError::InvalidState(rejection.to_string()))
        }
    }
}

/// Outcome of running an engine operation on the live session.
enum Applied<R> {
    /// The engine accepted the input; the session clone reflects the change.
    Accepted { value: R, session: MatchSession },
    /// The engine refused the input and nothing changed.
    Rejected {
        rejection: ScoreRejection,
        session: MatchSession,
    },
}

/// Gate on scorer ownership, run an engine operation under the live-match
/// lock, and hand back a clone of the session for lock-free persistence.
async fn apply_input<R>(
    state: &SharedState,
    match_id: Uuid,
    device_id: &str,
    op: impl FnOnce(&mut MatchSession) -> Result<R, ScoreRejection>,
) -> Result<Applied<R>, ServiceError> {
    presence_service::ensure_scorer(state, match_id, device_id)?;

    let mut guard = state.current_match().write().await;
    let session = guard
        .as_mut()
        .filter(|session| session.id == match_id)
        .ok_or_else(|| ServiceError::NotFound(format!("match {match_id} is not live")))?;

    match op(session) {
        Ok(value) => {
            let session = session.clone();
            Ok(Applied::Accepted { value, session })
        }
        Err(ScoreRejection::MissingPlayerIdentity) => Err(ServiceError::InvalidState(
            "cannot complete the match while a player id is missing".into(),
        )),
        Err(rejection) => {
            debug!(%match_id, %rejection, "scoring input ignored");
            let session = session.clone();
            Ok(Applied::Rejected { rejection, session })
        }
    }
}

/// Persist and run machine milestones for an accepted input.
async fn commit(
    state: &SharedState,
    session: &MatchSession,
    summary: Option<&CloseSummary>,
) -> Result<Option<MatchResult>, ServiceError> {
    match summary {
        Some(summary) if summary.match_won => {
            let result = session
                .result()
                .map_err(|err| ServiceError::InvalidState(err.to_string()))?;
            run_transition_with_broadcast(state, MatchEvent::CompleteMatch, || async {
                // the dart-granular snapshot has served its purpose; a failed
                // delete must not keep an already-won match out of its
                // terminal phase
                if let Err(err) = state.cache().delete(session.id).await {
                    warn!(match_id = %session.id, error = %err, "stale cache snapshot left behind");
                }
                Ok(())
            })
            .await?;
            finalize_remote(state, session, result.clone()).await;
            if let Some(presence) = presence_service::current_presence(state, session.id) {
                let _ = presence_service::end_presence(state, session.id, &presence.device_id).await;
            }
            Ok(Some(result))
        }
        Some(summary) if summary.leg_won => {
            run_transition_with_broadcast(state, MatchEvent::LegComplete, || async {
                persist_cache_next(state, session).await
            })
            .await?;
            push_remote(state, session).await;
            Ok(None)
        }
        Some(_) => {
            persist_cache(state, session).await?;
            push_remote(state, session).await;
            Ok(None)
        }
        None => {
            persist_cache(state, session).await?;
            Ok(None)
        }
    }
}

/// Write-through cache save stamped with the current machine version.
async fn persist_cache(state: &SharedState, session: &MatchSession) -> Result<(), ServiceError> {
    let version = state.snapshot().await.version;
    state.cache().save(session.to_entity(version)).await?;
    Ok(())
}

/// Cache save from inside a pending transition, stamped with the version the
/// transition will apply.
async fn persist_cache_next(
    state: &SharedState,
    session: &MatchSession,
) -> Result<(), ServiceError> {
    let version = state.snapshot().await.version + 1;
    state.cache().save(session.to_entity(version)).await?;
    Ok(())
}

/// Fire-and-forget push of the coarse record to the tournament backend.
async fn push_remote(state: &SharedState, session: &MatchSession) {
    let Some(remote) = state.remote_store().await else {
        return;
    };
    let record = RemoteMatchRecord::capture(session, state.snapshot().await.version);
    tokio::spawn(async move {
        if let Err(err) = remote.push_record(record).await {
            warn!(error = %err, "remote record push failed; cache stays authoritative");
        }
    });
}

/// Final remote interaction at completion: last record push, result
/// submission, live flag cleared. All best-effort.
async fn finalize_remote(state: &SharedState, session: &MatchSession, result: MatchResult) {
    let Some(remote) = state.remote_store().await else {
        warn!(match_id = %session.id, "match completed in degraded mode; result not submitted");
        return;
    };
    let record = RemoteMatchRecord::capture(session, state.snapshot().await.version);
    let match_id = session.id;
    tokio::spawn(async move {
        if let Err(err) = remote.push_record(record).await {
            warn!(%match_id, error = %err, "final record push failed");
        }
        if let Err(err) = remote.submit_result(result).await {
            warn!(%match_id, error = %err, "match result submission failed");
        }
        if let Err(err) = remote.clear_live(match_id).await {
            warn!(%match_id, error = %err, "failed to clear live flag after completion");
        }
    });
}

async fn build_snapshot(state: &SharedState, session: &MatchSession) -> MatchSnapshot {
    let phase = state.machine_phase().await;
    MatchSnapshot::from_session(session, &phase, state.is_degraded().await)
}

async fn accepted_response(
    state: &SharedState,
    session: &MatchSession,
    summary: Option<&CloseSummary>,
    result: Option<MatchResult>,
) -> Result<ScoreResponse, ServiceError> {
    let snapshot = build_snapshot(state, session).await;
    sse_events::broadcast_snapshot(state, snapshot.clone());
    Ok(ScoreResponse {
        accepted: true,
        rejection: None,
        outcome: summary.map(|summary| summary.outcome),
        leg_won: summary.is_some_and(|summary| summary.leg_won),
        match_won: summary.is_some_and(|summary| summary.match_won),
        result,
        snapshot,
    })
}

async fn rejected_response(
    state: &SharedState,
    session: &MatchSession,
    rejection: ScoreRejection,
) -> Result<ScoreResponse, ServiceError> {
    let snapshot = build_snapshot(state, session).await;
    Ok(ScoreResponse {
        accepted: false,
        rejection: Some(rejection.to_string()),
        outcome: None,
        leg_won: false,
        match_won: false,
        result: None,
        snapshot,
    })
}
