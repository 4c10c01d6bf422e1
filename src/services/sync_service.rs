//! Background remote synchronisation: keeps the tournament backend fed with
//! the live match record and toggles degraded mode when it is unreachable.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{
        match_store::RemoteStore,
        models::RemoteMatchRecord,
        storage::{StorageError, StorageResult},
    },
    services::sse_events,
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the remote store and keep the shared state in degraded mode
/// while it is unavailable. Once connected, push the live match record every
/// `sync_interval`.
pub async fn run<F, Fut>(state: SharedState, sync_interval: Duration, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn RemoteStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.install_remote_store(store.clone()).await;
                sse_events::broadcast_system_status(&state, false);
                info!("remote store connected; leaving degraded mode");
                delay = INITIAL_DELAY;

                loop {
                    sleep(sync_interval).await;

                    match sync_tick(&state, &store).await {
                        Ok(()) => continue,
                        Err(err) => {
                            warn!(error = %err, "periodic remote sync failed");
                            if !probe_with_backoff(&state, &store).await {
                                state.clear_remote_store().await;
                                sse_events::broadcast_system_status(&state, true);
                                warn!("exhausted remote probe attempts; entering degraded mode");
                                break;
                            }
                        }
                    }
                }

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "remote store connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// One periodic round: push the live match record if a match is in progress.
async fn sync_tick(state: &SharedState, store: &Arc<dyn RemoteStore>) -> StorageResult<()> {
    let record = {
        let guard = state.current_match().read().await;
        guard
            .as_ref()
            .filter(|session| session.in_progress())
            .map(|session| (session.id, session.clone()))
    };

    let Some((match_id, session)) = record else {
        return Ok(());
    };

    let version = state.snapshot().await.version;
    store
        .push_record(RemoteMatchRecord::capture(&session, version))
        .await?;
    tracing::debug!(%match_id, version, "periodic remote push succeeded");
    Ok(())
}

/// Probe the remote health endpoint with exponential backoff. Returns whether
/// the backend answered within the attempt budget.
async fn probe_with_backoff(state: &SharedState, store: &Arc<dyn RemoteStore>) -> bool {
    let mut attempt = 0;
    let mut probe_delay = INITIAL_DELAY;

    while attempt < MAX_RECONNECT_ATTEMPTS {
        match store.health_check().await {
            Ok(()) => {
                if attempt > 0 {
                    info!("remote store healthy again; leaving degraded mode");
                    state.update_degraded(false).await;
                    sse_events::broadcast_system_status(state, false);
                }
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %err,
                        "remote probe first attempt failed; flagging degraded mode"
                    );
                    state.update_degraded(true).await;
                    sse_events::broadcast_system_status(state, true);
                } else {
                    warn!(attempt, error = %err, "remote probe attempt failed");
                }
                attempt += 1;
                sleep(probe_delay).await;
                probe_delay = (probe_delay * 2).min(MAX_DELAY);
            }
        }
    }

    false
}
