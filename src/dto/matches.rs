use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    dto::{format_system_time, phase::VisibleMatchPhase},
    state::{
        machine::MatchPhase,
        scoring::{Multiplier, PlayerSlot},
        session::{MatchResult, MatchSession, PlayerProfile, VisitOutcome},
    },
};

/// One participant in the match descriptor sent by the scorer app.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct PlayerDescriptor {
    /// Tournament-side player id. May be absent for casual play, but the
    /// match cannot complete without it.
    pub id: Option<Uuid>,
    /// Display name.
    #[validate(length(min = 1, max = 64))]
    pub name: String,
}

impl From<PlayerDescriptor> for PlayerProfile {
    fn from(value: PlayerDescriptor) -> Self {
        Self {
            id: value.id,
            name: value.name,
        }
    }
}

/// Body of `POST /matches/{id}/open`: the match descriptor plus the identity
/// of the device and user claiming the scorer role.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct OpenMatchRequest {
    /// The two participants, slot one first.
    #[validate(nested)]
    pub players: Vec<PlayerDescriptor>,
    /// Legs needed to win the match.
    #[validate(range(min = 1, max = 50))]
    pub legs_to_win: u8,
    /// 301, 501, or 701.
    #[validate(custom(function = "validate_starting_score"))]
    pub starting_score: u16,
    /// Device claiming the scorer role.
    #[validate(length(min = 1, max = 128))]
    pub device_id: String,
    /// User claiming the scorer role.
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
    /// Take the scorer role over from another device, if one holds it.
    #[serde(default)]
    pub takeover: bool,
}

/// Validates a match starting score against the supported game variants.
fn validate_starting_score(score: u16) -> Result<(), ValidationError> {
    if matches!(score, 301 | 501 | 701) {
        Ok(())
    } else {
        let mut err = ValidationError::new("starting_score");
        err.message = Some("starting score must be 301, 501, or 701".into());
        Err(err)
    }
}

/// Body of `POST /matches/{id}/starter`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StarterRequest {
    /// Player who throws first in leg 1.
    pub player: PlayerSlot,
}

/// Body of `POST /matches/{id}/darts`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ThrowRequest {
    /// Segment hit: 0 (miss), 1..=20, or 25 (bull).
    #[validate(range(max = 25))]
    pub base: u8,
    /// Ring hit.
    pub multiplier: Multiplier,
}

/// Body of `POST /matches/{id}/visit`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VisitTotalRequest {
    /// Declared 3-dart total.
    #[validate(range(max = 180))]
    pub total: u16,
}

/// Body of `POST /matches/{id}/checkout`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckoutConfirmRequest {
    /// Darts actually thrown in the finishing visit.
    #[validate(range(min = 1, max = 3))]
    pub darts_used: u8,
    /// Whether the finishing dart was a double.
    pub finished_on_double: bool,
}

/// Where the state served by `POST /matches/{id}/open` came from.
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecoverySource {
    /// Dart-granular snapshot from the device-local cache.
    Cache,
    /// Coarse record from the tournament backend.
    Remote,
    /// No prior state; the match starts from scratch.
    Fresh,
}

/// Per-player view inside a [`MatchSnapshot`].
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct PlayerSnapshot {
    /// Tournament-side player id, if known.
    pub id: Option<Uuid>,
    /// Display name.
    pub name: String,
    /// Remaining score in the current leg.
    pub score: u16,
    /// Legs won so far.
    pub legs: u8,
    /// Darts thrown in the current leg.
    pub leg_darts: u16,
    /// Match-wide 3-dart average.
    pub average: f64,
}

/// Projection of the live match served over REST and SSE.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct MatchSnapshot {
    /// Match identity.
    pub match_id: Uuid,
    /// Lifecycle phase.
    pub phase: VisibleMatchPhase,
    /// Current leg, 1-based.
    pub current_leg: u8,
    /// Legs needed to win.
    pub legs_to_win: u8,
    /// 301, 501, or 701.
    pub starting_score: u16,
    /// Player whose visit is open.
    pub current_player: PlayerSlot,
    /// The two participants, slot one first.
    pub players: Vec<PlayerSnapshot>,
    /// Labels of the darts in the open visit, e.g. `["T20", "5"]`.
    pub open_visit: Vec<String>,
    /// Zeroing turn total awaiting confirmation, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_total: Option<u16>,
    /// Whether the most recent closed visit can still be undone.
    pub can_undo: bool,
    /// True when the backend has no connection to the tournament backend.
    pub degraded: bool,
    /// Time of the last mutation, RFC 3339.
    pub updated_at: String,
}

impl MatchSnapshot {
    /// Project a live session for clients.
    pub fn from_session(session: &MatchSession, phase: &MatchPhase, degraded: bool) -> Self {
        let players = [PlayerSlot::One, PlayerSlot::Two]
            .into_iter()
            .map(|slot| {
                let profile = &session.players[slot.index()];
                let state = session.state(slot);
                PlayerSnapshot {
                    id: profile.id,
                    name: profile.name.clone(),
                    score: state.current_score,
                    legs: state.legs,
                    leg_darts: state.leg_darts,
                    average: state.match_average(),
                }
            })
            .collect();

        Self {
            match_id: session.id,
            phase: phase.into(),
            current_leg: session.current_leg,
            legs_to_win: session.legs_to_win,
            starting_score: session.starting_score,
            current_player: session.current_player,
            players,
            open_visit: session
                .current_visit
                .darts
                .iter()
                .map(|dart| dart.label.clone())
                .collect(),
            pending_total: session.pending_finish.map(|pending| pending.total),
            can_undo: session.can_undo(),
            degraded,
            updated_at: format_system_time(session.updated_at),
        }
    }
}

/// Response to `POST /matches/{id}/open`.
#[derive(Debug, Serialize, ToSchema)]
pub struct OpenMatchResponse {
    /// Which copy of the state won the recovery precedence.
    pub source: RecoverySource,
    /// The state being served.
    pub snapshot: MatchSnapshot,
}

/// Response to every scoring input.
///
/// Invalid inputs come back as `accepted: false` no-ops with the rejection
/// reason, never as HTTP errors; the snapshot is authoritative either way.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScoreResponse {
    /// Whether the input changed any state.
    pub accepted: bool,
    /// Reason the input was ignored, when `accepted` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<String>,
    /// How the visit resolved, when the input closed one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<VisitOutcome>,
    /// Whether the input decided a leg.
    pub leg_won: bool,
    /// Whether the input decided the match.
    pub match_won: bool,
    /// Final result, present once `match_won` is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<MatchResult>,
    /// Authoritative state after the input.
    pub snapshot: MatchSnapshot,
}

/// Response to non-scoring actions (starter, undo, abandon).
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    /// Authoritative state after the action.
    pub snapshot: MatchSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    fn open_request(starting_score: u16) -> OpenMatchRequest {
        OpenMatchRequest {
            players: vec![
                PlayerDescriptor {
                    id: Some(Uuid::new_v4()),
                    name: "Anna".into(),
                },
                PlayerDescriptor {
                    id: Some(Uuid::new_v4()),
                    name: "Bea".into(),
                },
            ],
            legs_to_win: 3,
            starting_score,
            device_id: "tablet-1".into(),
            user_id: "anna".into(),
            takeover: false,
        }
    }

    #[test]
    fn accepts_standard_game_variants() {
        assert!(open_request(301).validate().is_ok());
        assert!(open_request(501).validate().is_ok());
        assert!(open_request(701).validate().is_ok());
    }

    #[test]
    fn rejects_nonstandard_starting_score() {
        assert!(open_request(500).validate().is_err());
        assert!(open_request(0).validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_turn_total() {
        let request = VisitTotalRequest { total: 181 };
        assert!(request.validate().is_err());
        let request = VisitTotalRequest { total: 180 };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn snapshot_projects_leg_counters() {
        let mut session = MatchSession::new(
            Uuid::new_v4(),
            [
                PlayerProfile {
                    id: Some(Uuid::new_v4()),
                    name: "Anna".into(),
                },
                PlayerProfile {
                    id: Some(Uuid::new_v4()),
                    name: "Bea".into(),
                },
            ],
            2,
            501,
        );
        session.select_starter(PlayerSlot::One).unwrap();
        for _ in 0..3 {
            session.add_dart(20, Multiplier::Triple).unwrap();
        }

        let snapshot =
            MatchSnapshot::from_session(&session, &MatchPhase::LegInProgress, false);
        let thrower = &snapshot.players[0];
        assert_eq!(thrower.score, 321);
        assert_eq!(thrower.leg_darts, session.state(PlayerSlot::One).leg_darts);
        assert_eq!(thrower.leg_darts, 3);
        assert_eq!(snapshot.current_player, PlayerSlot::Two);
        assert!(snapshot.open_visit.is_empty());
    }
}
