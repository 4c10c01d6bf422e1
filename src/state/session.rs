//! In-memory state of a live match: the visit accumulator, the finishing
//! resolver, leg/match bookkeeping, and single-level undo.
//!
//! All operations are synchronous; persistence and broadcasting happen in the
//! service layer around this type.

use std::mem;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{MatchStateEntity, RemoteMatchRecord};
use crate::state::scoring::{
    CheckoutRecord, DartThrow, DeclaredTotal, InvalidDart, LegDetail, Multiplier, PlayerLegState,
    PlayerSlot, Visit, three_dart_average,
};

/// Identity of one of the two match participants, assigned by the tournament
/// engine before the match reaches this backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    /// Tournament-side player id. Required before a match can complete.
    pub id: Option<Uuid>,
    /// Display name.
    pub name: String,
}

/// How scores are currently being entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Dart-by-dart entry.
    PerDart,
    /// Declared 3-dart totals.
    TurnTotal,
}

/// Resolution of a closed visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VisitOutcome {
    /// Score reduced, leg continues.
    Normal,
    /// Visit discarded: below zero, exactly 1, or zero without a double.
    Bust,
    /// Leg won on a double.
    Checkout,
}

/// A closed visit as kept in the per-leg history list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitRecord {
    /// Player who threw the visit.
    pub player: PlayerSlot,
    /// Leg the visit belongs to.
    pub leg: u8,
    /// The visit itself, including its start-of-turn score.
    pub visit: Visit,
    /// How the visit resolved.
    pub outcome: VisitOutcome,
}

/// Turn-total submission that landed on exactly zero and now waits for the
/// scorer to declare darts used and whether the last dart was a double.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFinish {
    /// The declared total, equal to the score that was remaining.
    pub total: u16,
}

/// Full pre-visit snapshot backing the single-level undo. Restoring it
/// reverses any visit kind, including busts and leg-winning checkouts.
#[derive(Debug, Clone)]
struct UndoSnapshot {
    states: [PlayerLegState; 2],
    current_player: PlayerSlot,
    current_leg: u8,
    leg_starter: PlayerSlot,
    dart_count: u32,
    history: Vec<VisitRecord>,
}

/// Why a scoring input was not applied. Surfaced to clients as a no-op, not
/// as an HTTP error, except for [`ScoreRejection::MissingPlayerIdentity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScoreRejection {
    /// No starter has been selected yet.
    #[error("no starter selected")]
    StarterNotSelected,
    /// The starter was already chosen (or the match was recovered mid-leg).
    #[error("starter already selected")]
    StarterAlreadySelected,
    /// The match is complete; no further input is accepted.
    #[error("match is complete")]
    MatchComplete,
    /// A checkout confirmation is pending and must be resolved first.
    #[error("checkout confirmation pending")]
    ConfirmationPending,
    /// The open visit already holds three darts.
    #[error("visit already has three darts")]
    VisitFull,
    /// The dart itself cannot exist.
    #[error(transparent)]
    Dart(#[from] InvalidDart),
    /// Turn total outside 0..=180.
    #[error("turn total {0} exceeds 180")]
    TotalOutOfRange(u16),
    /// A turn total was submitted while per-dart input is mid-visit.
    #[error("darts already entered for this visit")]
    VisitInProgress,
    /// The open visit has no dart to remove.
    #[error("no dart to remove")]
    NoDartToRemove,
    /// No closed visit is available to undo.
    #[error("nothing to undo")]
    NothingToUndo,
    /// Undo requested while the open visit holds darts; remove those first.
    #[error("open visit in progress; remove darts individually")]
    OpenVisit,
    /// No checkout confirmation is pending.
    #[error("no checkout confirmation pending")]
    NoPendingCheckout,
    /// Darts used must be between 1 and 3.
    #[error("darts used must be 1..=3, got {0}")]
    InvalidDartsUsed(u8),
    /// A player id is missing, so the match result cannot be emitted.
    #[error("player identity missing; cannot complete match")]
    MissingPlayerIdentity,
    /// The match has not finished yet.
    #[error("match is not complete")]
    NotComplete,
}

/// Summary of a visit close, consumed by the service layer to drive
/// state-machine transitions and persistence milestones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseSummary {
    /// How the visit resolved.
    pub outcome: VisitOutcome,
    /// Player who threw it.
    pub player: PlayerSlot,
    /// Leg it was thrown in.
    pub leg: u8,
    /// Points the visit's darts added up to, busts included; a bust still
    /// reports what was thrown even though none of it is applied.
    pub score: u16,
    /// Darts the visit used.
    pub darts: u8,
    /// Whether the visit won the leg.
    pub leg_won: bool,
    /// Whether the visit won the match.
    pub match_won: bool,
}

/// Result of an accepted dart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DartOutcome {
    /// Visit stays open; provisional remaining score after this dart.
    Continue {
        /// `turn_start_score - visit.score()`.
        remaining: u16,
    },
    /// The dart closed the visit.
    Closed(CloseSummary),
}

/// Result of an accepted turn-total submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalOutcome {
    /// The total lands on exactly zero; `confirm_checkout` must follow.
    ConfirmationRequired {
        /// The zeroing total, held until confirmed.
        total: u16,
    },
    /// The total resolved immediately (normal or bust).
    Closed(CloseSummary),
}

/// Immutable match result handed to the tournament engine exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MatchResult {
    /// Match this result belongs to.
    pub match_id: Uuid,
    /// Winning slot.
    pub winner: PlayerSlot,
    /// Player one outcome and statistics.
    pub player_one: PlayerResult,
    /// Player two outcome and statistics.
    pub player_two: PlayerResult,
}

/// Per-player share of a [`MatchResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlayerResult {
    /// Tournament-side player id.
    pub player_id: Uuid,
    /// Legs won.
    pub legs: u8,
    /// Points scored over the match.
    pub total_score: u32,
    /// Darts thrown over the match.
    pub total_darts: u32,
    /// Whole-match three-dart average.
    pub average: f64,
    /// One average per leg won.
    pub leg_averages: Vec<f64>,
    /// Successful checkouts.
    pub checkouts: Vec<CheckoutRecord>,
}

/// Live state of one match: two players counting down from the starting
/// score, best-of `2 * legs_to_win - 1` legs.
#[derive(Debug, Clone)]
pub struct MatchSession {
    /// Match identity, assigned by the tournament engine.
    pub id: Uuid,
    /// The two participants.
    pub players: [PlayerProfile; 2],
    /// Legs needed to win the match (>= 1).
    pub legs_to_win: u8,
    /// 301, 501, or 701.
    pub starting_score: u16,
    /// Current leg, 1-based.
    pub current_leg: u8,
    /// Player whose visit is open.
    pub current_player: PlayerSlot,
    /// Player who started leg 1. `None` after a remote-only recovery beyond
    /// leg 1, where the historical starter is unknown.
    pub match_starter: Option<PlayerSlot>,
    /// Player who started the current leg; drives alternation when
    /// `match_starter` is unknown.
    pub leg_starter: PlayerSlot,
    /// Per-player scoring state.
    pub states: [PlayerLegState; 2],
    /// The open visit of `current_player`.
    pub current_visit: Visit,
    /// Closed visits of the current leg, oldest first.
    pub history: Vec<VisitRecord>,
    /// Match-lifetime count of darts thrown, cosmetic.
    pub dart_count: u32,
    /// Last used input mode.
    pub input_mode: InputMode,
    /// Whether a zeroing turn total awaits confirmation.
    pub pending_finish: Option<PendingFinish>,
    /// Whether a starter has been chosen (or recovery skipped that step).
    pub started: bool,
    /// Terminal flag; set when a player reaches `legs_to_win`.
    pub complete: bool,
    /// User who opened the match for scoring, if known.
    pub started_by_user: Option<String>,
    /// Creation time of this in-memory session.
    pub created_at: SystemTime,
    /// Time of the last mutation.
    pub updated_at: SystemTime,
    undo_slot: Option<UndoSnapshot>,
}

impl MatchSession {
    /// Fresh match awaiting an explicit starter selection. Inputs are assumed
    /// validated by the caller (`legs_to_win >= 1`, standard starting score).
    pub fn new(
        id: Uuid,
        players: [PlayerProfile; 2],
        legs_to_win: u8,
        starting_score: u16,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            id,
            players,
            legs_to_win,
            starting_score,
            current_leg: 1,
            current_player: PlayerSlot::One,
            match_starter: None,
            leg_starter: PlayerSlot::One,
            states: [
                PlayerLegState::fresh(starting_score),
                PlayerLegState::fresh(starting_score),
            ],
            current_visit: Visit::open(starting_score),
            history: Vec::new(),
            dart_count: 0,
            input_mode: InputMode::PerDart,
            pending_finish: None,
            started: false,
            complete: false,
            started_by_user: None,
            created_at: now,
            updated_at: now,
            undo_slot: None,
        }
    }

    /// Borrow a player's scoring state.
    pub fn state(&self, slot: PlayerSlot) -> &PlayerLegState {
        &self.states[slot.index()]
    }

    /// Whether the match has started and is not yet complete.
    pub fn in_progress(&self) -> bool {
        self.started && !self.complete
    }

    /// Starter of the given leg as a pure function of the leg number and the
    /// initial starter; `None` when the initial starter is unknown.
    pub fn starter_for_leg(&self, leg: u8) -> Option<PlayerSlot> {
        self.match_starter
            .map(|starter| if leg % 2 == 1 { starter } else { starter.other() })
    }

    /// Choose who throws first. Valid exactly once, before any visit.
    pub fn select_starter(&mut self, slot: PlayerSlot) -> Result<(), ScoreRejection> {
        if self.complete {
            return Err(ScoreRejection::MatchComplete);
        }
        if self.started {
            return Err(ScoreRejection::StarterAlreadySelected);
        }
        self.started = true;
        self.match_starter = Some(slot);
        self.leg_starter = slot;
        self.current_player = slot;
        self.current_visit = Visit::open(self.starting_score);
        self.touch();
        Ok(())
    }

    /// Add one dart to the open visit and resolve it incrementally.
    pub fn add_dart(
        &mut self,
        base: u8,
        multiplier: Multiplier,
    ) -> Result<DartOutcome, ScoreRejection> {
        self.ensure_scoring_open()?;
        if self.current_visit.is_full() {
            return Err(ScoreRejection::VisitFull);
        }
        let dart = DartThrow::new(base, multiplier)?;
        self.input_mode = InputMode::PerDart;
        self.current_visit.darts.push(dart);

        let remaining = i32::from(self.current_visit.turn_start_score)
            - i32::from(self.current_visit.score());
        let resolution = if remaining < 0 || remaining == 1 {
            Some(VisitOutcome::Bust)
        } else if remaining == 0 {
            let on_double = self
                .current_visit
                .last_dart()
                .is_some_and(DartThrow::is_double);
            Some(if on_double {
                VisitOutcome::Checkout
            } else {
                VisitOutcome::Bust
            })
        } else if self.current_visit.darts.len() == 3 {
            Some(VisitOutcome::Normal)
        } else {
            None
        };

        match resolution {
            None => {
                self.touch();
                Ok(DartOutcome::Continue {
                    remaining: remaining as u16,
                })
            }
            Some(outcome) => match self.close_visit(outcome) {
                Ok(summary) => Ok(DartOutcome::Closed(summary)),
                Err(err) => {
                    // completion was refused; take the dart back so the
                    // session is untouched
                    self.current_visit.darts.pop();
                    Err(err)
                }
            },
        }
    }

    /// Remove the most recent dart of the open visit, restoring the
    /// provisional remaining score. Returns that score.
    pub fn remove_last_dart(&mut self) -> Result<u16, ScoreRejection> {
        self.ensure_scoring_open()?;
        if self.current_visit.darts.pop().is_none() {
            return Err(ScoreRejection::NoDartToRemove);
        }
        self.touch();
        Ok(self.current_visit.turn_start_score - self.current_visit.score())
    }

    /// Submit a declared 3-dart total for the whole visit. A total landing on
    /// exactly zero is held until [`MatchSession::confirm_checkout`] declares
    /// darts used and the finishing double.
    pub fn submit_turn_total(&mut self, total: u16) -> Result<TotalOutcome, ScoreRejection> {
        self.ensure_scoring_open()?;
        if !self.current_visit.darts.is_empty() {
            return Err(ScoreRejection::VisitInProgress);
        }
        if total > 180 {
            return Err(ScoreRejection::TotalOutOfRange(total));
        }
        self.input_mode = InputMode::TurnTotal;
        let remaining =
            i32::from(self.current_visit.turn_start_score) - i32::from(total);
        if remaining == 0 {
            self.pending_finish = Some(PendingFinish { total });
            self.touch();
            return Ok(TotalOutcome::ConfirmationRequired { total });
        }
        self.current_visit.declared = Some(DeclaredTotal {
            total,
            darts_used: 3,
        });
        let outcome = if remaining < 0 || remaining == 1 {
            VisitOutcome::Bust
        } else {
            VisitOutcome::Normal
        };
        let summary = self.close_visit(outcome)?;
        Ok(TotalOutcome::Closed(summary))
    }

    /// Resolve a pending zeroing total: a checkout when the last dart was a
    /// double, a bust otherwise. `darts_used` feeds the statistics.
    pub fn confirm_checkout(
        &mut self,
        darts_used: u8,
        finished_on_double: bool,
    ) -> Result<CloseSummary, ScoreRejection> {
        if !self.started {
            return Err(ScoreRejection::StarterNotSelected);
        }
        if self.complete {
            return Err(ScoreRejection::MatchComplete);
        }
        if !(1..=3).contains(&darts_used) {
            return Err(ScoreRejection::InvalidDartsUsed(darts_used));
        }
        let pending = self
            .pending_finish
            .ok_or(ScoreRejection::NoPendingCheckout)?;
        self.current_visit.declared = Some(DeclaredTotal {
            total: pending.total,
            darts_used,
        });
        let outcome = if finished_on_double {
            VisitOutcome::Checkout
        } else {
            VisitOutcome::Bust
        };
        match self.close_visit(outcome) {
            Ok(summary) => {
                self.pending_finish = None;
                Ok(summary)
            }
            Err(err) => {
                self.current_visit.declared = None;
                Err(err)
            }
        }
    }

    /// Whether an undo would currently be accepted.
    pub fn can_undo(&self) -> bool {
        self.undo_slot.is_some()
            && !self.complete
            && self.pending_finish.is_none()
            && self.current_visit.darts.is_empty()
    }

    /// Revert the most recent closed visit, whatever its outcome, by
    /// restoring the pre-visit snapshot. Single level: a second consecutive
    /// undo is rejected until another visit closes.
    pub fn undo(&mut self) -> Result<(), ScoreRejection> {
        if self.complete {
            return Err(ScoreRejection::MatchComplete);
        }
        if self.pending_finish.is_some() {
            return Err(ScoreRejection::ConfirmationPending);
        }
        if !self.current_visit.darts.is_empty() {
            return Err(ScoreRejection::OpenVisit);
        }
        let snapshot = self.undo_slot.take().ok_or(ScoreRejection::NothingToUndo)?;
        self.states = snapshot.states;
        self.current_player = snapshot.current_player;
        self.current_leg = snapshot.current_leg;
        self.leg_starter = snapshot.leg_starter;
        self.dart_count = snapshot.dart_count;
        self.history = snapshot.history;
        self.current_visit = Visit::open(self.state(self.current_player).current_score);
        self.touch();
        Ok(())
    }

    /// Build the immutable match result. Fails while the match is live or when
    /// a player id is missing (the completion path refuses the latter before
    /// the terminal state is ever reached).
    pub fn result(&self) -> Result<MatchResult, ScoreRejection> {
        if !self.complete {
            return Err(ScoreRejection::NotComplete);
        }
        let ids = [
            self.players[0]
                .id
                .ok_or(ScoreRejection::MissingPlayerIdentity)?,
            self.players[1]
                .id
                .ok_or(ScoreRejection::MissingPlayerIdentity)?,
        ];
        let winner = if self.states[0].legs >= self.legs_to_win {
            PlayerSlot::One
        } else {
            PlayerSlot::Two
        };
        let player_result = |slot: PlayerSlot| {
            let state = self.state(slot);
            PlayerResult {
                player_id: ids[slot.index()],
                legs: state.legs,
                total_score: state.total_score,
                total_darts: state.total_darts,
                average: state.match_average(),
                leg_averages: state.leg_averages.clone(),
                checkouts: state.checkouts.clone(),
            }
        };
        Ok(MatchResult {
            match_id: self.id,
            winner,
            player_one: player_result(PlayerSlot::One),
            player_two: player_result(PlayerSlot::Two),
        })
    }

    fn ensure_scoring_open(&self) -> Result<(), ScoreRejection> {
        if !self.started {
            Err(ScoreRejection::StarterNotSelected)
        } else if self.complete {
            Err(ScoreRejection::MatchComplete)
        } else if self.pending_finish.is_some() {
            Err(ScoreRejection::ConfirmationPending)
        } else {
            Ok(())
        }
    }

    /// Close the open visit with the given outcome: apply its scoring effect,
    /// record it, arm undo, and advance turn / leg / match state.
    fn close_visit(&mut self, outcome: VisitOutcome) -> Result<CloseSummary, ScoreRejection> {
        let player = self.current_player;
        let would_win = outcome == VisitOutcome::Checkout
            && self.states[player.index()].legs + 1 >= self.legs_to_win;
        if would_win && self.players.iter().any(|profile| profile.id.is_none()) {
            return Err(ScoreRejection::MissingPlayerIdentity);
        }

        let before = self.undo_snapshot();
        let leg = self.current_leg;
        let visit = mem::replace(&mut self.current_visit, Visit::open(0));
        let score = visit.score();
        let darts = visit.dart_count();
        let checkout_value = visit.turn_start_score;
        self.dart_count += u32::from(darts);

        {
            let state = &mut self.states[player.index()];
            state.leg_darts += u16::from(darts);
            state.total_darts += u32::from(darts);
            match outcome {
                // a bust restores turn_start_score; since the score is only
                // ever applied here, restoring means leaving it untouched
                VisitOutcome::Bust => {}
                VisitOutcome::Normal => {
                    state.current_score -= score;
                    state.total_score += u32::from(score);
                }
                VisitOutcome::Checkout => {
                    state.current_score = 0;
                    state.total_score += u32::from(score);
                }
            }
        }

        self.history.push(VisitRecord {
            player,
            leg,
            visit,
            outcome,
        });
        self.undo_slot = Some(before);

        let (leg_won, match_won) = if outcome == VisitOutcome::Checkout {
            self.finish_leg(player, checkout_value, darts)
        } else {
            (false, false)
        };

        if !leg_won {
            self.current_player = player.other();
            let turn_start = self.state(self.current_player).current_score;
            self.current_visit = Visit::open(turn_start);
        } else if match_won {
            self.current_visit = Visit::open(0);
        }
        self.touch();

        Ok(CloseSummary {
            outcome,
            player,
            leg,
            score,
            darts,
            leg_won,
            match_won,
        })
    }

    /// Record leg statistics for both players and either finish the match or
    /// open the next leg.
    fn finish_leg(
        &mut self,
        winner: PlayerSlot,
        checkout_value: u16,
        darts_used: u8,
    ) -> (bool, bool) {
        let leg = self.current_leg;
        let starting = self.starting_score;
        {
            let state = &mut self.states[winner.index()];
            state.legs += 1;
            let average = three_dart_average(starting, state.leg_darts);
            state.leg_averages.push(average);
            state.checkouts.push(CheckoutRecord {
                leg,
                checkout: checkout_value,
                darts_used,
            });
            state.leg_details.push(LegDetail {
                leg,
                darts: state.leg_darts,
                checkout: Some(checkout_value),
                average,
                is_win: true,
            });
        }
        {
            let state = &mut self.states[winner.other().index()];
            let scored = starting - state.current_score;
            state.leg_details.push(LegDetail {
                leg,
                darts: state.leg_darts,
                checkout: None,
                average: three_dart_average(scored, state.leg_darts),
                is_win: false,
            });
        }

        if self.states[winner.index()].legs >= self.legs_to_win {
            self.complete = true;
            (true, true)
        } else {
            self.begin_next_leg();
            (true, false)
        }
    }

    fn begin_next_leg(&mut self) {
        let starting = self.starting_score;
        self.current_leg += 1;
        for state in &mut self.states {
            state.begin_leg(starting);
        }
        self.history.clear();
        // deterministic parity from the match starter; when that is unknown
        // (remote-only recovery) alternation flips from the tracked leg starter
        let starter = self
            .starter_for_leg(self.current_leg)
            .unwrap_or_else(|| self.leg_starter.other());
        self.leg_starter = starter;
        self.current_player = starter;
        self.current_visit = Visit::open(starting);
    }

    fn undo_snapshot(&self) -> UndoSnapshot {
        UndoSnapshot {
            states: self.states.clone(),
            current_player: self.current_player,
            current_leg: self.current_leg,
            leg_starter: self.leg_starter,
            dart_count: self.dart_count,
            history: self.history.clone(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = SystemTime::now();
    }
}

impl MatchSession {
    /// Capture a full snapshot for the device-local cache, stamped with the
    /// state-machine version.
    pub fn to_entity(&self, snapshot_version: usize) -> MatchStateEntity {
        MatchStateEntity {
            id: self.id,
            players: self.players.clone(),
            legs_to_win: self.legs_to_win,
            starting_score: self.starting_score,
            current_leg: self.current_leg,
            current_player: self.current_player,
            match_starter: self.match_starter,
            leg_starter: self.leg_starter,
            states: self.states.clone(),
            current_visit: self.current_visit.clone(),
            history: self.history.clone(),
            pending_total: self.pending_finish.map(|pending| pending.total),
            dart_count: self.dart_count,
            input_mode: self.input_mode,
            started: self.started,
            complete: self.complete,
            started_by_user: self.started_by_user.clone(),
            snapshot_version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Rebuild a session from a cached snapshot. The undo slot is not
    /// persisted, so the first input after a resume cannot be undone.
    pub fn from_entity(entity: MatchStateEntity) -> Self {
        Self {
            id: entity.id,
            players: entity.players,
            legs_to_win: entity.legs_to_win,
            starting_score: entity.starting_score,
            current_leg: entity.current_leg,
            current_player: entity.current_player,
            match_starter: entity.match_starter,
            leg_starter: entity.leg_starter,
            states: entity.states,
            current_visit: entity.current_visit,
            history: entity.history,
            dart_count: entity.dart_count,
            input_mode: entity.input_mode,
            pending_finish: entity.pending_total.map(|total| PendingFinish { total }),
            started: entity.started,
            complete: entity.complete,
            started_by_user: entity.started_by_user,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
            undo_slot: None,
        }
    }

    /// Best-effort reconstruction from the coarse remote record: leg number,
    /// scores, legs won, and current player survive; dart-level detail and
    /// cumulative statistics are necessarily lost.
    ///
    /// The match starter is taken from the record when present. Failing
    /// that it is inferable only in leg 1; beyond that the match is treated
    /// as "already started, unknown historical starter" and alternation
    /// proceeds from the current leg.
    pub fn recover_from_remote(
        id: Uuid,
        players: [PlayerProfile; 2],
        legs_to_win: u8,
        starting_score: u16,
        record: &RemoteMatchRecord,
    ) -> Self {
        let match_starter = record
            .match_starter
            .or((record.current_leg == 1).then_some(record.current_player));
        let leg_starter = match match_starter {
            Some(starter) if record.current_leg % 2 == 1 => starter,
            Some(starter) => starter.other(),
            None => record.current_player,
        };
        let mut state_one = PlayerLegState::fresh(starting_score);
        state_one.current_score = record.player_one_score;
        state_one.legs = record.player_one_legs;
        let mut state_two = PlayerLegState::fresh(starting_score);
        state_two.current_score = record.player_two_score;
        state_two.legs = record.player_two_legs;

        let now = SystemTime::now();
        let current_visit = Visit::open(match record.current_player {
            PlayerSlot::One => record.player_one_score,
            PlayerSlot::Two => record.player_two_score,
        });
        Self {
            id,
            players,
            legs_to_win,
            starting_score,
            current_leg: record.current_leg,
            current_player: record.current_player,
            match_starter,
            leg_starter,
            states: [state_one, state_two],
            current_visit,
            history: Vec::new(),
            dart_count: 0,
            input_mode: InputMode::PerDart,
            pending_finish: None,
            started: true,
            complete: false,
            started_by_user: record.started_by_user_id.clone(),
            created_at: now,
            updated_at: now,
            undo_slot: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> MatchSession {
        let mut session = MatchSession::new(
            Uuid::new_v4(),
            [
                PlayerProfile {
                    id: Some(Uuid::new_v4()),
                    name: "Anna".into(),
                },
                PlayerProfile {
                    id: Some(Uuid::new_v4()),
                    name: "Bo".into(),
                },
            ],
            2,
            501,
        );
        session.select_starter(PlayerSlot::One).unwrap();
        session
    }

    fn throw(session: &mut MatchSession, base: u8, multiplier: Multiplier) -> DartOutcome {
        session.add_dart(base, multiplier).unwrap()
    }

    fn throw_visit(session: &mut MatchSession, darts: [(u8, Multiplier); 3]) {
        for (base, multiplier) in darts {
            throw(session, base, multiplier);
        }
    }

    /// Chip the current player down to `target` remaining with single-segment
    /// darts (misses fill out visits), leaving it their turn with an empty
    /// open visit. The opponent throws misses in between.
    fn grind_to(session: &mut MatchSession, target: u16) {
        let player = session.current_player;
        loop {
            if session.current_player == player {
                if session.state(player).current_score == target
                    && session.current_visit.darts.is_empty()
                {
                    return;
                }
                let provisional =
                    session.state(player).current_score - session.current_visit.score();
                let hit = provisional.saturating_sub(target).min(20) as u8;
                throw(session, hit, Multiplier::Single);
            } else {
                throw(session, 0, Multiplier::Single);
            }
        }
    }

    #[test]
    fn starter_must_be_selected_before_scoring() {
        let mut fresh = MatchSession::new(
            Uuid::new_v4(),
            [
                PlayerProfile {
                    id: None,
                    name: "A".into(),
                },
                PlayerProfile {
                    id: None,
                    name: "B".into(),
                },
            ],
            1,
            301,
        );
        assert_eq!(
            fresh.add_dart(20, Multiplier::Single),
            Err(ScoreRejection::StarterNotSelected)
        );
        fresh.select_starter(PlayerSlot::Two).unwrap();
        assert_eq!(fresh.current_player, PlayerSlot::Two);
        assert_eq!(
            fresh.select_starter(PlayerSlot::One),
            Err(ScoreRejection::StarterAlreadySelected)
        );
    }

    #[test]
    fn one_eighty_closes_visit_and_switches_player() {
        let mut session = session();
        throw(&mut session, 20, Multiplier::Triple);
        throw(&mut session, 20, Multiplier::Triple);
        let outcome = throw(&mut session, 20, Multiplier::Triple);
        match outcome {
            DartOutcome::Closed(summary) => {
                assert_eq!(summary.outcome, VisitOutcome::Normal);
                assert_eq!(summary.score, 180);
                assert_eq!(summary.darts, 3);
            }
            other => panic!("expected closed visit, got {other:?}"),
        }
        assert_eq!(session.state(PlayerSlot::One).current_score, 321);
        assert_eq!(session.current_player, PlayerSlot::Two);
        assert_eq!(session.current_visit.turn_start_score, 501);
    }

    #[test]
    fn score_conservation_without_busts() {
        let mut session = session();
        throw_visit(
            &mut session,
            [
                (20, Multiplier::Triple),
                (19, Multiplier::Triple),
                (12, Multiplier::Single),
            ],
        );
        throw_visit(&mut session, [(0, Multiplier::Single); 3]);
        throw_visit(
            &mut session,
            [
                (20, Multiplier::Single),
                (5, Multiplier::Double),
                (1, Multiplier::Single),
            ],
        );
        let scored: u16 = session
            .history
            .iter()
            .filter(|record| record.player == PlayerSlot::One)
            .map(|record| record.visit.score())
            .sum();
        assert_eq!(
            501 - session.state(PlayerSlot::One).current_score,
            scored
        );
    }

    #[test]
    fn bust_below_zero_restores_turn_start_score() {
        let mut session = session();
        grind_to(&mut session, 20);
        assert_eq!(session.current_player, PlayerSlot::One);
        let darts_before = session.state(PlayerSlot::One).total_darts;
        let outcome = throw(&mut session, 19, Multiplier::Double); // 38 > 20
        match outcome {
            DartOutcome::Closed(summary) => assert_eq!(summary.outcome, VisitOutcome::Bust),
            other => panic!("expected bust, got {other:?}"),
        }
        let state = session.state(PlayerSlot::One);
        assert_eq!(state.current_score, 20);
        assert_eq!(state.total_darts, darts_before + 1);
        assert_eq!(session.current_player, PlayerSlot::Two);
    }

    #[test]
    fn landing_on_one_is_a_bust() {
        let mut session = session();
        grind_to(&mut session, 2);
        let outcome = throw(&mut session, 1, Multiplier::Single);
        match outcome {
            DartOutcome::Closed(summary) => assert_eq!(summary.outcome, VisitOutcome::Bust),
            other => panic!("expected bust, got {other:?}"),
        }
        assert_eq!(session.state(PlayerSlot::One).current_score, 2);
        assert_eq!(session.current_player, PlayerSlot::Two);
    }

    #[test]
    fn zero_without_double_is_a_bust() {
        let mut session = session();
        grind_to(&mut session, 40);
        throw(&mut session, 20, Multiplier::Single);
        let outcome = throw(&mut session, 20, Multiplier::Single);
        match outcome {
            DartOutcome::Closed(summary) => assert_eq!(summary.outcome, VisitOutcome::Bust),
            other => panic!("expected bust, got {other:?}"),
        }
        assert_eq!(session.state(PlayerSlot::One).current_score, 40);
    }

    #[test]
    fn double_out_wins_the_leg() {
        let mut session = session();
        grind_to(&mut session, 40);
        let outcome = throw(&mut session, 20, Multiplier::Double);
        match outcome {
            DartOutcome::Closed(summary) => {
                assert_eq!(summary.outcome, VisitOutcome::Checkout);
                assert!(summary.leg_won);
                assert!(!summary.match_won);
            }
            other => panic!("expected checkout, got {other:?}"),
        }
        let winner = session.state(PlayerSlot::One);
        assert_eq!(winner.legs, 1);
        assert_eq!(winner.checkouts.len(), 1);
        assert_eq!(winner.checkouts[0].checkout, 40);
        assert_eq!(winner.checkouts[0].darts_used, 1);
        // next leg: scores reset, starter alternates to player two
        assert_eq!(session.current_leg, 2);
        assert_eq!(session.current_player, PlayerSlot::Two);
        assert_eq!(winner.current_score, 501);
        assert_eq!(winner.leg_darts, 0);
        assert!(session.history.is_empty());
    }

    #[test]
    fn starter_alternates_by_leg_parity() {
        let session = session();
        assert_eq!(session.starter_for_leg(1), Some(PlayerSlot::One));
        assert_eq!(session.starter_for_leg(2), Some(PlayerSlot::Two));
        assert_eq!(session.starter_for_leg(3), Some(PlayerSlot::One));
        assert_eq!(session.starter_for_leg(4), Some(PlayerSlot::Two));
    }

    #[test]
    fn match_completes_when_legs_to_win_reached() {
        let mut session = session();
        // leg 1 to player one
        grind_to(&mut session, 40);
        throw(&mut session, 20, Multiplier::Double);
        assert!(!session.complete);
        // leg 2: player two starts; bring player one to 40 again
        assert_eq!(session.current_player, PlayerSlot::Two);
        throw_visit(&mut session, [(0, Multiplier::Single); 3]);
        grind_to(&mut session, 40);
        let outcome = throw(&mut session, 20, Multiplier::Double);
        match outcome {
            DartOutcome::Closed(summary) => {
                assert!(summary.match_won);
            }
            other => panic!("expected match-winning checkout, got {other:?}"),
        }
        assert!(session.complete);
        assert_eq!(session.state(PlayerSlot::One).legs, 2);
        assert_eq!(
            session.add_dart(20, Multiplier::Single),
            Err(ScoreRejection::MatchComplete)
        );
        let result = session.result().unwrap();
        assert_eq!(result.winner, PlayerSlot::One);
        assert_eq!(result.player_one.legs, 2);
        assert_eq!(result.player_two.legs, 0);
    }

    #[test]
    fn match_average_holds_for_both_players() {
        let mut session = session();
        grind_to(&mut session, 40);
        throw(&mut session, 20, Multiplier::Double);
        for slot in [PlayerSlot::One, PlayerSlot::Two] {
            let state = session.state(slot);
            if state.total_darts > 0 {
                let expected =
                    (state.total_score as f64 / state.total_darts as f64) * 3.0;
                assert!((state.match_average() - expected).abs() < 1e-9);
            }
        }
        // winner's leg average uses the full starting score
        let winner = session.state(PlayerSlot::One);
        let expected = 501.0 / f64::from(winner.leg_details[0].darts) * 3.0;
        assert!((winner.leg_averages[0] - expected).abs() < 1e-9);
    }

    #[test]
    fn undo_restores_a_normal_visit_exactly() {
        let mut session = session();
        throw_visit(
            &mut session,
            [
                (20, Multiplier::Triple),
                (20, Multiplier::Triple),
                (20, Multiplier::Triple),
            ],
        );
        assert_eq!(session.current_player, PlayerSlot::Two);
        session.undo().unwrap();
        let state = session.state(PlayerSlot::One);
        assert_eq!(state.current_score, 501);
        assert_eq!(state.total_darts, 0);
        assert_eq!(state.leg_darts, 0);
        assert_eq!(session.current_player, PlayerSlot::One);
        assert_eq!(session.dart_count, 0);
        assert!(session.history.is_empty());
        // single level only
        assert_eq!(session.undo(), Err(ScoreRejection::NothingToUndo));
    }

    #[test]
    fn undo_reverses_a_bust() {
        let mut session = session();
        grind_to(&mut session, 2);
        let history_before = session.history.clone();
        throw(&mut session, 5, Multiplier::Single); // bust
        session.undo().unwrap();
        assert_eq!(session.state(PlayerSlot::One).current_score, 2);
        assert_eq!(session.current_player, PlayerSlot::One);
        assert_eq!(session.history, history_before);
    }

    #[test]
    fn undo_reverses_a_leg_winning_checkout() {
        let mut session = session();
        grind_to(&mut session, 40);
        throw(&mut session, 20, Multiplier::Double);
        assert_eq!(session.current_leg, 2);
        session.undo().unwrap();
        assert_eq!(session.current_leg, 1);
        let state = session.state(PlayerSlot::One);
        assert_eq!(state.legs, 0);
        assert_eq!(state.current_score, 40);
        assert!(state.checkouts.is_empty());
        assert!(state.leg_averages.is_empty());
        assert!(state.leg_details.is_empty());
        assert_eq!(session.current_player, PlayerSlot::One);
    }

    #[test]
    fn undo_requires_an_empty_open_visit() {
        let mut session = session();
        throw_visit(&mut session, [(0, Multiplier::Single); 3]);
        throw(&mut session, 20, Multiplier::Single);
        assert_eq!(session.undo(), Err(ScoreRejection::OpenVisit));
        session.remove_last_dart().unwrap();
        session.undo().unwrap();
        assert_eq!(session.current_player, PlayerSlot::One);
    }

    #[test]
    fn remove_last_dart_restores_provisional_score() {
        let mut session = session();
        throw(&mut session, 20, Multiplier::Triple);
        throw(&mut session, 19, Multiplier::Single);
        assert_eq!(session.remove_last_dart().unwrap(), 441);
        assert_eq!(session.remove_last_dart().unwrap(), 501);
        assert_eq!(
            session.remove_last_dart(),
            Err(ScoreRejection::NoDartToRemove)
        );
    }

    #[test]
    fn turn_total_of_170_requires_confirmation() {
        let mut session = session();
        grind_to(&mut session, 170);
        match session.submit_turn_total(170).unwrap() {
            TotalOutcome::ConfirmationRequired { total } => assert_eq!(total, 170),
            other => panic!("expected confirmation request, got {other:?}"),
        }
        // no other scoring input is accepted while pending
        assert_eq!(
            session.add_dart(20, Multiplier::Single),
            Err(ScoreRejection::ConfirmationPending)
        );
        assert_eq!(session.undo(), Err(ScoreRejection::ConfirmationPending));
        let summary = session.confirm_checkout(3, true).unwrap();
        assert_eq!(summary.outcome, VisitOutcome::Checkout);
        assert_eq!(summary.darts, 3);
        assert!(summary.leg_won);
        let winner = session.state(PlayerSlot::One);
        assert_eq!(winner.checkouts[0].checkout, 170);
        assert_eq!(winner.checkouts[0].darts_used, 3);
    }

    #[test]
    fn zeroing_total_without_double_is_a_bust() {
        let mut session = session();
        grind_to(&mut session, 100);
        session.submit_turn_total(100).unwrap();
        let summary = session.confirm_checkout(3, false).unwrap();
        assert_eq!(summary.outcome, VisitOutcome::Bust);
        assert_eq!(session.state(PlayerSlot::One).current_score, 100);
        assert_eq!(session.current_player, PlayerSlot::Two);
    }

    #[test]
    fn turn_total_busts_resolve_immediately() {
        let mut session = session();
        grind_to(&mut session, 60);
        match session.submit_turn_total(100).unwrap() {
            TotalOutcome::Closed(summary) => {
                assert_eq!(summary.outcome, VisitOutcome::Bust);
                assert_eq!(summary.darts, 3);
            }
            other => panic!("expected immediate bust, got {other:?}"),
        }
        assert_eq!(session.state(PlayerSlot::One).current_score, 60);
        // landing on exactly 1 also busts without confirmation
        throw_visit(&mut session, [(0, Multiplier::Single); 3]);
        match session.submit_turn_total(59).unwrap() {
            TotalOutcome::Closed(summary) => assert_eq!(summary.outcome, VisitOutcome::Bust),
            other => panic!("expected bust, got {other:?}"),
        }
    }

    #[test]
    fn turn_total_out_of_range_is_rejected() {
        let mut session = session();
        assert_eq!(
            session.submit_turn_total(181),
            Err(ScoreRejection::TotalOutOfRange(181))
        );
    }

    fn remote_record(session: &MatchSession) -> RemoteMatchRecord {
        RemoteMatchRecord {
            match_id: session.id,
            current_leg: 1,
            player_one_score: 501,
            player_two_score: 501,
            player_one_legs: 0,
            player_two_legs: 0,
            current_player: PlayerSlot::One,
            match_starter: None,
            snapshot_version: 7,
            last_activity_at: SystemTime::now(),
            started_by_user_id: Some("anna".into()),
        }
    }

    #[test]
    fn remote_recovery_keeps_starter_parity() {
        let source = session();
        let mut record = remote_record(&source);
        record.current_leg = 4;
        record.player_one_legs = 2;
        record.player_two_legs = 1;
        record.player_one_score = 381;
        record.player_two_score = 501;
        record.current_player = PlayerSlot::Two;
        record.match_starter = Some(PlayerSlot::One);

        let recovered = MatchSession::recover_from_remote(
            source.id,
            source.players.clone(),
            3,
            501,
            &record,
        );
        assert!(recovered.started);
        assert_eq!(recovered.current_leg, 4);
        assert_eq!(recovered.match_starter, Some(PlayerSlot::One));
        // even leg, so the other player started it
        assert_eq!(recovered.leg_starter, PlayerSlot::Two);
        assert_eq!(recovered.current_player, PlayerSlot::Two);
        assert_eq!(recovered.state(PlayerSlot::One).current_score, 381);
        assert_eq!(recovered.state(PlayerSlot::One).legs, 2);
        assert_eq!(recovered.state(PlayerSlot::Two).legs, 1);
        assert_eq!(recovered.current_visit.turn_start_score, 501);
        assert!(recovered.history.is_empty());
        assert_eq!(recovered.started_by_user.as_deref(), Some("anna"));
    }

    #[test]
    fn remote_recovery_infers_starter_in_leg_one() {
        let source = session();
        let mut record = remote_record(&source);
        record.player_two_score = 461;
        record.current_player = PlayerSlot::Two;

        let recovered = MatchSession::recover_from_remote(
            source.id,
            source.players.clone(),
            2,
            501,
            &record,
        );
        // leg 1, so whoever is throwing must have started the match
        assert_eq!(recovered.match_starter, Some(PlayerSlot::Two));
        assert_eq!(recovered.leg_starter, PlayerSlot::Two);
    }

    #[test]
    fn remote_recovery_without_starter_alternates_from_current_leg() {
        let source = session();
        let mut record = remote_record(&source);
        record.current_leg = 3;
        record.player_one_legs = 1;
        record.player_two_legs = 1;
        record.player_one_score = 40;
        record.player_two_score = 220;
        record.current_player = PlayerSlot::One;

        let mut recovered = MatchSession::recover_from_remote(
            source.id,
            source.players.clone(),
            3,
            501,
            &record,
        );
        assert_eq!(recovered.match_starter, None);
        assert_eq!(recovered.leg_starter, PlayerSlot::One);
        assert_eq!(recovered.starter_for_leg(4), None);

        // the next leg boundary flips from the tracked leg starter
        recovered.add_dart(20, Multiplier::Double).unwrap();
        assert_eq!(recovered.current_leg, 4);
        assert_eq!(recovered.leg_starter, PlayerSlot::Two);
        assert_eq!(recovered.current_player, PlayerSlot::Two);
    }

    #[test]
    fn completion_is_refused_without_player_ids() {
        let mut session = MatchSession::new(
            Uuid::new_v4(),
            [
                PlayerProfile {
                    id: None,
                    name: "A".into(),
                },
                PlayerProfile {
                    id: Some(Uuid::new_v4()),
                    name: "B".into(),
                },
            ],
            1,
            301,
        );
        session.select_starter(PlayerSlot::One).unwrap();
        grind_to(&mut session, 40);
        let darts_before = session.state(PlayerSlot::One).total_darts;
        assert_eq!(
            session.add_dart(20, Multiplier::Double),
            Err(ScoreRejection::MissingPlayerIdentity)
        );
        // the refused completion leaves the session untouched
        assert!(!session.complete);
        assert_eq!(session.state(PlayerSlot::One).current_score, 40);
        assert_eq!(session.state(PlayerSlot::One).total_darts, darts_before);
        assert!(session.current_visit.darts.is_empty());
    }
}
