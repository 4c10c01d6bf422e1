use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{
        matches::MatchSnapshot,
        sse::{Handshake, PhaseChangedEvent, ServerEvent, SnapshotEvent, SystemStatus},
    },
    state::{SharedState, machine::MatchPhase},
};

const EVENT_HANDSHAKE: &str = "handshake";
const EVENT_PHASE_CHANGED: &str = "phase_changed";
const EVENT_SNAPSHOT: &str = "snapshot";
const EVENT_SYSTEM_STATUS: &str = "system_status";

/// Greet a freshly connected SSE client (every subscriber sees it).
pub async fn broadcast_handshake(state: &SharedState) {
    let payload = Handshake {
        message: "match stream connected".into(),
        degraded: state.is_degraded().await,
    };
    send_event(state, EVENT_HANDSHAKE, &payload);
}

/// Broadcast the authoritative match snapshot after an accepted input.
pub fn broadcast_snapshot(state: &SharedState, snapshot: MatchSnapshot) {
    send_event(state, EVENT_SNAPSHOT, &SnapshotEvent(snapshot));
}

/// Broadcast a lifecycle phase change notification.
pub async fn broadcast_phase_changed(state: &SharedState, phase: &MatchPhase) {
    let payload = PhaseChangedEvent {
        phase: phase.into(),
    };
    send_event(state, EVENT_PHASE_CHANGED, &payload);
}

/// Broadcast that the backend entered or left degraded mode.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

fn send_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize SSE payload"),
    }
}
