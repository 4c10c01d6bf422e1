pub mod machine;
pub mod scoring;
pub mod session;
mod sse;
pub mod transitions;

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::timeout;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::{
        match_store::{CacheStore, RemoteStore},
        models::PresenceEntity,
    },
    error::ServiceError,
    state::{machine::MatchPhase, session::MatchSession},
};

pub use self::machine::{AbortError, ApplyError, Plan, PlanError, PlanId, Snapshot};
pub use self::sse::SseHub;
use self::machine::{MatchEvent, MatchStateMachine};

pub type SharedState = Arc<AppState>;
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);

/// Central application state: the live match, its state machine, the two
/// storage backends, presence, and the SSE fan-out.
///
/// The local cache is always present; only the remote tournament store can
/// come and go, and its absence is what "degraded" means here.
pub struct AppState {
    cache: Arc<dyn CacheStore>,
    remote: RwLock<Option<Arc<dyn RemoteStore>>>,
    sse: SseHub,
    presence: DashMap<Uuid, PresenceEntity>,
    machine: RwLock<MatchStateMachine>,
    current_match: RwLock<Option<MatchSession>>,
    degraded: watch::Sender<bool>,
    transition_gate: Mutex<()>,
    transition_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a remote store is installed.
    pub fn new(cache: Arc<dyn CacheStore>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            cache,
            remote: RwLock::new(None),
            sse: SseHub::new(16),
            presence: DashMap::new(),
            machine: RwLock::new(MatchStateMachine::new()),
            current_match: RwLock::new(None),
            degraded: degraded_tx,
            transition_gate: Mutex::new(()),
            transition_timeout: Some(DEFAULT_TRANSITION_TIMEOUT),
        })
    }

    /// The device-local snapshot cache.
    pub fn cache(&self) -> Arc<dyn CacheStore> {
        self.cache.clone()
    }

    /// Obtain a handle to the remote tournament store, if one is installed.
    pub async fn remote_store(&self) -> Option<Arc<dyn RemoteStore>> {
        let guard = self.remote.read().await;
        guard.as_ref().cloned()
    }

    /// Install a remote store implementation and leave degraded mode.
    pub async fn install_remote_store(&self, store: Arc<dyn RemoteStore>) {
        {
            let mut guard = self.remote.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current remote store and enter degraded mode.
    pub async fn clear_remote_store(&self) {
        {
            let mut guard = self.remote.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.remote.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Broadcast hub used for the match SSE stream.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }

    /// Registry of scorer registrations keyed by match id.
    pub fn presence(&self) -> &DashMap<Uuid, PresenceEntity> {
        &self.presence
    }

    /// Snapshot the current phase of the shared match state machine.
    pub async fn machine_phase(&self) -> MatchPhase {
        self.machine.read().await.phase()
    }

    /// Replace the machine wholesale, used when recovery lands mid-match.
    pub async fn reset_machine(&self, machine: MatchStateMachine) {
        let mut guard = self.machine.write().await;
        *guard = machine;
    }

    /// Currently live match session data.
    pub fn current_match(&self) -> &RwLock<Option<MatchSession>> {
        &self.current_match
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        if *self.degraded.borrow() == value {
            return;
        }

        let _ = self.degraded.send(value);
    }

    /// Plan a transition on the shared match state machine, returning the plan.
    async fn plan_transition(&self, event: MatchEvent) -> Result<Plan, PlanError> {
        let mut sm = self.machine.write().await;
        sm.plan(event)
    }

    /// Apply the planned transition, returning the next phase.
    async fn apply_planned_transition(&self, plan_id: PlanId) -> Result<MatchPhase, ApplyError> {
        let mut sm = self.machine.write().await;
        sm.apply(plan_id)
    }

    /// Abort a planned transition of the shared match state machine.
    async fn abort_transition(&self, plan_id: PlanId) -> Result<(), AbortError> {
        let mut sm = self.machine.write().await;
        sm.abort(plan_id)
    }

    /// Phase, version, and pending-transition snapshot of the machine.
    pub async fn snapshot(&self) -> Snapshot {
        let sm = self.machine.read().await;
        sm.snapshot()
    }

    /// Run `work` inside a planned machine transition: the plan is applied
    /// only when the work succeeds within the timeout, and aborted otherwise.
    pub async fn run_transition<F, Fut, T>(
        &self,
        event: MatchEvent,
        work: F,
    ) -> Result<(T, MatchPhase), ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, ServiceError>>,
    {
        let gate = self.transition_gate.lock().await;
        let Plan { id: plan_id, .. } = self.plan_transition(event).await?;

        let work_future = work();
        let outcome = if let Some(limit) = self.transition_timeout {
            match timeout(limit, work_future).await {
                Ok(result) => result,
                Err(_) => {
                    if let Err(abort_err) = self.abort_transition(plan_id).await {
                        warn!(
                            event = ?event,
                            plan_id = %plan_id,
                            error = ?abort_err,
                            "failed to abort transition after timeout"
                        );
                    }
                    drop(gate);
                    return Err(ServiceError::Timeout);
                }
            }
        } else {
            work_future.await
        };

        match outcome {
            Ok(value) => {
                let next = self.apply_planned_transition(plan_id).await?;
                drop(gate);
                Ok((value, next))
            }
            Err(err) => {
                if let Err(abort_err) = self.abort_transition(plan_id).await {
                    warn!(
                        event = ?event,
                        plan_id = %plan_id,
                        error = ?abort_err,
                        "failed to abort transition after work error"
                    );
                }
                drop(gate);
                Err(err)
            }
        }
    }
}
