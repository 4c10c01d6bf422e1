//! Match lifecycle: opening with state recovery, abandoning, and read-only
//! snapshot projection.
//!
//! Recovery precedence when opening: the device-local cache wins when it
//! holds a started match (dart-granular), then the remote record when it
//! shows progress (coarse), then a fresh match awaiting starter selection.
//! When both copies exist the freshest snapshot version wins, the cache on
//! ties.

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{MatchStateEntity, RemoteMatchRecord},
    dto::matches::{MatchSnapshot, OpenMatchRequest, OpenMatchResponse, RecoverySource},
    error::ServiceError,
    services::presence_service,
    state::{
        SharedState,
        machine::{MatchPhase, MatchStateMachine},
        session::{MatchSession, PlayerProfile},
    },
};

/// Open a match for scoring: claim the scorer role, recover any prior state,
/// and install the session as the live match.
pub async fn open_match(
    state: &SharedState,
    match_id: Uuid,
    request: OpenMatchRequest,
) -> Result<OpenMatchResponse, ServiceError> {
    let players: [PlayerProfile; 2] = request
        .players
        .into_iter()
        .map(Into::into)
        .collect::<Vec<_>>()
        .try_into()
        .map_err(|_| ServiceError::InvalidInput("a match needs exactly two players".into()))?;

    {
        let guard = state.current_match().read().await;
        if let Some(live) = guard.as_ref() {
            if live.id != match_id && live.in_progress() {
                return Err(ServiceError::InvalidState(format!(
                    "another match ({}) is already live on this device",
                    live.id
                )));
            }
        }
    }

    presence_service::start_presence(
        state,
        match_id,
        &request.device_id,
        &request.user_id,
        request.takeover,
    )
    .await?;

    let cached = load_cached(state, match_id).await;
    let remote = fetch_remote(state, match_id).await;

    let (session, version, source) = resolve_recovery(
        match_id,
        players,
        request.legs_to_win,
        request.starting_score,
        cached,
        remote,
        &request.user_id,
    );

    let phase = recovered_phase(&session);
    state
        .reset_machine(MatchStateMachine::recovered(phase, version))
        .await;

    // Write-through so a fresh match survives a crash before its first dart.
    let entity = session.to_entity(version);
    state.cache().save(entity).await?;

    let snapshot = MatchSnapshot::from_session(&session, &phase, state.is_degraded().await);
    {
        let mut guard = state.current_match().write().await;
        *guard = Some(session);
    }

    info!(%match_id, source = ?source, "match opened");
    Ok(OpenMatchResponse { source, snapshot })
}

/// Stop scoring without completing: release the scorer role and drop the live
/// session. The cache file is deliberately left behind for later resolution.
pub async fn abandon_match(
    state: &SharedState,
    match_id: Uuid,
    device_id: &str,
) -> Result<MatchSnapshot, ServiceError> {
    presence_service::ensure_scorer(state, match_id, device_id)?;

    let session = {
        let mut guard = state.current_match().write().await;
        match guard.take() {
            Some(session) if session.id == match_id => session,
            Some(other) => {
                *guard = Some(other);
                return Err(ServiceError::NotFound(format!(
                    "match {match_id} is not live"
                )));
            }
            None => {
                return Err(ServiceError::NotFound(format!(
                    "match {match_id} is not live"
                )));
            }
        }
    };

    let phase = recovered_phase(&session);
    let snapshot = MatchSnapshot::from_session(&session, &phase, state.is_degraded().await);

    presence_service::end_presence(state, match_id, device_id).await?;
    state.reset_machine(MatchStateMachine::new()).await;
    info!(%match_id, "match abandoned; cache snapshot kept");
    Ok(snapshot)
}

/// Read-only projection of the live match.
pub async fn live_snapshot(
    state: &SharedState,
    match_id: Uuid,
) -> Result<MatchSnapshot, ServiceError> {
    let guard = state.current_match().read().await;
    let session = guard
        .as_ref()
        .filter(|session| session.id == match_id)
        .ok_or_else(|| ServiceError::NotFound(format!("match {match_id} is not live")))?;
    let phase = state.machine_phase().await;
    Ok(MatchSnapshot::from_session(
        session,
        &phase,
        state.is_degraded().await,
    ))
}

/// Cached snapshot, tolerating corruption by falling through to the remote.
async fn load_cached(state: &SharedState, match_id: Uuid) -> Option<MatchStateEntity> {
    match state.cache().load(match_id).await {
        Ok(found) => found.filter(|entity| entity.started),
        Err(err) => {
            warn!(%match_id, error = %err, "cache snapshot unreadable; trying remote");
            None
        }
    }
}

/// Remote record, tolerating a degraded or failing backend.
async fn fetch_remote(state: &SharedState, match_id: Uuid) -> Option<RemoteMatchRecord> {
    let remote = state.remote_store().await?;
    match remote.fetch_record(match_id).await {
        Ok(found) => found,
        Err(err) => {
            warn!(%match_id, error = %err, "remote record unreachable during recovery");
            None
        }
    }
}

fn resolve_recovery(
    match_id: Uuid,
    players: [PlayerProfile; 2],
    legs_to_win: u8,
    starting_score: u16,
    cached: Option<MatchStateEntity>,
    remote: Option<RemoteMatchRecord>,
    user_id: &str,
) -> (MatchSession, usize, RecoverySource) {
    let remote = remote.filter(|record| record.shows_progress(starting_score));

    match (cached, remote) {
        (Some(entity), Some(record)) if record.snapshot_version > entity.snapshot_version => {
            from_remote(match_id, players, legs_to_win, starting_score, &record)
        }
        (Some(entity), _) => {
            let version = entity.snapshot_version;
            (
                MatchSession::from_entity(entity),
                version,
                RecoverySource::Cache,
            )
        }
        (None, Some(record)) => {
            from_remote(match_id, players, legs_to_win, starting_score, &record)
        }
        (None, None) => {
            let mut session = MatchSession::new(match_id, players, legs_to_win, starting_score);
            session.started_by_user = Some(user_id.to_string());
            (session, 0, RecoverySource::Fresh)
        }
    }
}

fn from_remote(
    match_id: Uuid,
    players: [PlayerProfile; 2],
    legs_to_win: u8,
    starting_score: u16,
    record: &RemoteMatchRecord,
) -> (MatchSession, usize, RecoverySource) {
    let session =
        MatchSession::recover_from_remote(match_id, players, legs_to_win, starting_score, record);
    if session.match_starter.is_none() {
        info!(
            %match_id,
            leg = record.current_leg,
            "remote recovery beyond leg 1 without a recorded starter; alternating from the current leg"
        );
    }
    (session, record.snapshot_version, RecoverySource::Remote)
}

/// Machine phase implied by a recovered session.
fn recovered_phase(session: &MatchSession) -> MatchPhase {
    if session.complete {
        MatchPhase::MatchComplete
    } else if session.pending_finish.is_some() {
        MatchPhase::AwaitingCheckoutConfirm
    } else if session.started {
        MatchPhase::LegInProgress
    } else {
        MatchPhase::AwaitingStarter
    }
}
