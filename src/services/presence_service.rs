//! Scorer role registry: one device at a time may enter scores for a match,
//! read-only observers are always welcome.

use std::time::SystemTime;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{dao::models::PresenceEntity, error::ServiceError, state::SharedState};

/// Claim the scorer role for a match. A second device is refused unless it
/// asks for a takeover, which evicts the current holder.
pub async fn start_presence(
    state: &SharedState,
    match_id: Uuid,
    device_id: &str,
    user_id: &str,
    takeover: bool,
) -> Result<PresenceEntity, ServiceError> {
    if let Some(existing) = state.presence().get(&match_id) {
        if existing.device_id != device_id && !takeover {
            return Err(ServiceError::Unauthorized(format!(
                "match {match_id} is already being scored by another device"
            )));
        }
        if existing.device_id != device_id {
            info!(
                %match_id,
                from = %existing.device_id,
                to = %device_id,
                "scorer role taken over"
            );
        }
    }

    let entity = PresenceEntity {
        match_id,
        device_id: device_id.to_string(),
        user_id: user_id.to_string(),
        since: SystemTime::now(),
    };
    state.presence().insert(match_id, entity.clone());
    mirror_live(state, entity.clone()).await;
    Ok(entity)
}

/// Release the scorer role. Only the holding device may release it.
pub async fn end_presence(
    state: &SharedState,
    match_id: Uuid,
    device_id: &str,
) -> Result<(), ServiceError> {
    let held = state
        .presence()
        .get(&match_id)
        .map(|entry| entry.device_id.clone());
    match held {
        None => Err(ServiceError::NotFound(format!(
            "no scorer registered for match {match_id}"
        ))),
        Some(holder) if holder != device_id => Err(ServiceError::Unauthorized(
            "scorer role is held by another device".into(),
        )),
        Some(_) => {
            state.presence().remove(&match_id);
            clear_live(state, match_id).await;
            Ok(())
        }
    }
}

/// Current scorer registration, if any.
pub fn current_presence(state: &SharedState, match_id: Uuid) -> Option<PresenceEntity> {
    state.presence().get(&match_id).map(|entry| entry.clone())
}

/// Verify that the calling device holds the scorer role for the match.
pub fn ensure_scorer(
    state: &SharedState,
    match_id: Uuid,
    device_id: &str,
) -> Result<(), ServiceError> {
    match state.presence().get(&match_id) {
        None => Err(ServiceError::Unauthorized(format!(
            "no scorer registered for match {match_id}"
        ))),
        Some(entry) if entry.device_id != device_id => Err(ServiceError::Unauthorized(
            "scorer role is held by another device".into(),
        )),
        Some(_) => Ok(()),
    }
}

/// Mirror the registration to the tournament backend, best-effort.
async fn mirror_live(state: &SharedState, entity: PresenceEntity) {
    let Some(remote) = state.remote_store().await else {
        return;
    };
    tokio::spawn(async move {
        if let Err(err) = remote.set_live(entity).await {
            warn!(error = %err, "failed to mirror scorer presence to remote");
        }
    });
}

/// Clear the live flag on the tournament backend, best-effort.
async fn clear_live(state: &SharedState, match_id: Uuid) {
    let Some(remote) = state.remote_store().await else {
        return;
    };
    tokio::spawn(async move {
        if let Err(err) = remote.clear_live(match_id).await {
            warn!(%match_id, error = %err, "failed to clear live flag on remote");
        }
    });
}
