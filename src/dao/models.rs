use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::{
    machine::MatchPhase,
    scoring::{PlayerLegState, PlayerSlot, Visit},
    session::{InputMode, MatchSession, PlayerProfile, VisitRecord},
};

/// Full serializable snapshot of a live match, written through to the
/// device-local cache on every mutation. Round-trips losslessly back into a
/// [`MatchSession`] so an interrupted match resumes with dart-level detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchStateEntity {
    /// Match identity.
    pub id: Uuid,
    /// The two participants.
    pub players: [PlayerProfile; 2],
    /// Legs needed to win the match.
    pub legs_to_win: u8,
    /// 301, 501, or 701.
    pub starting_score: u16,
    /// Current leg, 1-based.
    pub current_leg: u8,
    /// Player whose visit is open.
    pub current_player: PlayerSlot,
    /// Player who started leg 1, when known.
    pub match_starter: Option<PlayerSlot>,
    /// Player who started the current leg.
    pub leg_starter: PlayerSlot,
    /// Per-player scoring state.
    pub states: [PlayerLegState; 2],
    /// The open visit.
    pub current_visit: Visit,
    /// Closed visits of the current leg.
    pub history: Vec<VisitRecord>,
    /// Zeroing turn total awaiting confirmation, if any.
    pub pending_total: Option<u16>,
    /// Match-lifetime dart counter.
    pub dart_count: u32,
    /// Last used input mode.
    pub input_mode: InputMode,
    /// Whether a starter was chosen (or recovery skipped that step).
    pub started: bool,
    /// Whether the match finished.
    pub complete: bool,
    /// User who opened the match for scoring.
    pub started_by_user: Option<String>,
    /// Monotonic state-machine version at capture time; recovery prefers the
    /// highest version when several copies exist.
    pub snapshot_version: usize,
    /// Session creation time.
    pub created_at: SystemTime,
    /// Time of the last mutation.
    pub updated_at: SystemTime,
}

impl MatchStateEntity {
    /// Phase the state machine was in when this snapshot was captured.
    pub fn phase(&self) -> MatchPhase {
        if self.complete {
            MatchPhase::MatchComplete
        } else if self.pending_total.is_some() {
            MatchPhase::AwaitingCheckoutConfirm
        } else if self.started {
            MatchPhase::LegInProgress
        } else {
            MatchPhase::AwaitingStarter
        }
    }
}

/// Coarse cross-device copy of a match held by the remote store. It never
/// carries dart-level detail; recovery from it preserves leg and score
/// integrity only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMatchRecord {
    /// Match identity.
    pub match_id: Uuid,
    /// Current leg, 1-based.
    pub current_leg: u8,
    /// Player one remaining score.
    pub player_one_score: u16,
    /// Player two remaining score.
    pub player_two_score: u16,
    /// Player one legs won.
    pub player_one_legs: u8,
    /// Player two legs won.
    pub player_two_legs: u8,
    /// Player whose turn it is.
    pub current_player: PlayerSlot,
    /// Player who started leg 1. Persisted from leg 1 onward so a remote-only
    /// recovery keeps the alternation parity; absent in records written by
    /// older scorers.
    pub match_starter: Option<PlayerSlot>,
    /// Monotonic snapshot version of the writing device.
    pub snapshot_version: usize,
    /// Time of the last mutation on the writing device.
    pub last_activity_at: SystemTime,
    /// User who opened the match for scoring.
    pub started_by_user_id: Option<String>,
}

impl RemoteMatchRecord {
    /// Capture a coarse record from a live session.
    pub fn capture(session: &MatchSession, snapshot_version: usize) -> Self {
        Self {
            match_id: session.id,
            current_leg: session.current_leg,
            player_one_score: session.state(PlayerSlot::One).current_score,
            player_two_score: session.state(PlayerSlot::Two).current_score,
            player_one_legs: session.state(PlayerSlot::One).legs,
            player_two_legs: session.state(PlayerSlot::Two).legs,
            current_player: session.current_player,
            match_starter: session.match_starter,
            snapshot_version,
            last_activity_at: session.updated_at,
            started_by_user_id: session.started_by_user.clone(),
        }
    }

    /// Whether the record shows any scoring progress relative to a fresh
    /// match at the given starting score.
    pub fn shows_progress(&self, starting_score: u16) -> bool {
        self.current_leg > 1
            || self.player_one_legs > 0
            || self.player_two_legs > 0
            || self.player_one_score != starting_score
            || self.player_two_score != starting_score
    }
}

/// Registration of the device and user currently scoring a live match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntity {
    /// The live match.
    pub match_id: Uuid,
    /// Device holding the scorer role.
    pub device_id: String,
    /// User holding the scorer role.
    pub user_id: String,
    /// When the registration was made.
    pub since: SystemTime,
}
