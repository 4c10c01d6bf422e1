//! Leaf types of the scoring engine: darts, visits, and per-player leg state.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// One of the two fixed player slots of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlayerSlot {
    /// First player (index 0 in per-player arrays).
    One,
    /// Second player (index 1 in per-player arrays).
    Two,
}

impl PlayerSlot {
    /// The opposing slot.
    pub fn other(self) -> Self {
        match self {
            PlayerSlot::One => PlayerSlot::Two,
            PlayerSlot::Two => PlayerSlot::One,
        }
    }

    /// Index into `[T; 2]` per-player arrays.
    pub fn index(self) -> usize {
        match self {
            PlayerSlot::One => 0,
            PlayerSlot::Two => 1,
        }
    }
}

/// Multiplier ring hit by a dart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Multiplier {
    /// Plain segment.
    Single,
    /// Double ring (also the only valid finishing multiplier).
    Double,
    /// Triple ring.
    Triple,
}

impl Multiplier {
    /// Numeric scoring factor.
    pub fn factor(self) -> u16 {
        match self {
            Multiplier::Single => 1,
            Multiplier::Double => 2,
            Multiplier::Triple => 3,
        }
    }
}

/// Rejection raised when a dart cannot exist on a dartboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidDart {
    /// Base number is not 0, 1..=20, or 25.
    #[error("dart base {0} is not a dartboard segment")]
    BaseOutOfRange(u8),
    /// The bull has no triple ring.
    #[error("triple bull does not exist")]
    TripleBull,
}

/// A single validated dart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DartThrow {
    /// Segment hit: 0 (miss), 1..=20, or 25 (bull).
    pub base: u8,
    /// Ring hit.
    pub multiplier: Multiplier,
    /// Points scored by this dart.
    pub value: u16,
    /// Display label, e.g. `T20`, `D25`, `MISS`.
    pub label: String,
}

impl DartThrow {
    /// Build a dart from its segment and multiplier, rejecting impossible
    /// combinations. A base of 0 is always a miss worth 0, whatever the
    /// multiplier context was.
    pub fn new(base: u8, multiplier: Multiplier) -> Result<Self, InvalidDart> {
        match base {
            0 => Ok(Self {
                base: 0,
                multiplier: Multiplier::Single,
                value: 0,
                label: "MISS".into(),
            }),
            1..=20 => Ok(Self {
                base,
                multiplier,
                value: u16::from(base) * multiplier.factor(),
                label: match multiplier {
                    Multiplier::Single => base.to_string(),
                    Multiplier::Double => format!("D{base}"),
                    Multiplier::Triple => format!("T{base}"),
                },
            }),
            25 => match multiplier {
                Multiplier::Triple => Err(InvalidDart::TripleBull),
                Multiplier::Single => Ok(Self {
                    base: 25,
                    multiplier,
                    value: 25,
                    label: "25".into(),
                }),
                Multiplier::Double => Ok(Self {
                    base: 25,
                    multiplier,
                    value: 50,
                    label: "D25".into(),
                }),
            },
            other => Err(InvalidDart::BaseOutOfRange(other)),
        }
    }

    /// Whether this dart may legally finish a leg.
    pub fn is_double(&self) -> bool {
        self.multiplier == Multiplier::Double && self.value > 0
    }
}

/// Score and dart count declared for a whole visit when individual darts are
/// unknown (turn-total input mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredTotal {
    /// Declared 3-dart total.
    pub total: u16,
    /// Darts actually used (1..=3); relevant for checkout visits.
    pub darts_used: u8,
}

/// One turn of up to three darts by a single player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    /// Darts thrown so far (empty in turn-total mode).
    pub darts: Vec<DartThrow>,
    /// Declared total when darts were entered as a single number.
    pub declared: Option<DeclaredTotal>,
    /// Player's score before the first dart of this visit. Busts restore to
    /// this value and undo relies on it.
    pub turn_start_score: u16,
}

impl Visit {
    /// Open a fresh visit at the given remaining score.
    pub fn open(turn_start_score: u16) -> Self {
        Self {
            darts: Vec::new(),
            declared: None,
            turn_start_score,
        }
    }

    /// Points scored by the visit so far.
    pub fn score(&self) -> u16 {
        match self.declared {
            Some(declared) => declared.total,
            None => self.darts.iter().map(|dart| dart.value).sum(),
        }
    }

    /// Number of darts the visit accounts for.
    pub fn dart_count(&self) -> u8 {
        match self.declared {
            Some(declared) => declared.darts_used,
            None => self.darts.len() as u8,
        }
    }

    /// Whether another dart can still be added.
    pub fn is_full(&self) -> bool {
        self.declared.is_some() || self.darts.len() >= 3
    }

    /// Last dart thrown, if any.
    pub fn last_dart(&self) -> Option<&DartThrow> {
        self.darts.last()
    }
}

/// A recorded leg win: the score checked out and the darts it took.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckoutRecord {
    /// Leg number (1-based).
    pub leg: u8,
    /// Points cleared by the finishing visit.
    pub checkout: u16,
    /// Darts used in the finishing visit.
    pub darts_used: u8,
}

/// Per-leg statistics line, recorded for both players when a leg ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LegDetail {
    /// Leg number (1-based).
    pub leg: u8,
    /// Darts the player threw in this leg.
    pub darts: u16,
    /// Checkout value for the winner, `None` for the loser.
    pub checkout: Option<u16>,
    /// Three-dart average over this leg (partial for the loser).
    pub average: f64,
    /// Whether the player won the leg.
    pub is_win: bool,
}

/// Mutable per-player scoring state, one per player per match.
///
/// `current_score` and `leg_darts` reset at each leg boundary; the `total_*`
/// counters and the statistics vectors span the whole match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLegState {
    /// Legs won so far.
    pub legs: u8,
    /// Remaining points in the current leg.
    pub current_score: u16,
    /// Points scored over the whole match (busts contribute 0).
    pub total_score: u32,
    /// Darts thrown over the whole match (busts included).
    pub total_darts: u32,
    /// Darts thrown in the current leg only.
    pub leg_darts: u16,
    /// One three-dart average per leg won.
    pub leg_averages: Vec<f64>,
    /// Successful checkouts.
    pub checkouts: Vec<CheckoutRecord>,
    /// One line per finished leg, win or lose.
    pub leg_details: Vec<LegDetail>,
}

impl PlayerLegState {
    /// Fresh state at the start of a match.
    pub fn fresh(starting_score: u16) -> Self {
        Self {
            legs: 0,
            current_score: starting_score,
            total_score: 0,
            total_darts: 0,
            leg_darts: 0,
            leg_averages: Vec::new(),
            checkouts: Vec::new(),
            leg_details: Vec::new(),
        }
    }

    /// Three-dart average over the entire match, for winner and loser alike.
    pub fn match_average(&self) -> f64 {
        if self.total_darts == 0 {
            0.0
        } else {
            (self.total_score as f64 / self.total_darts as f64) * 3.0
        }
    }

    /// Reset the leg-scoped counters for a new leg.
    pub fn begin_leg(&mut self, starting_score: u16) {
        self.current_score = starting_score;
        self.leg_darts = 0;
    }
}

/// Three-dart average for `scored` points over `darts` darts, 0 when no darts
/// were thrown.
pub fn three_dart_average(scored: u16, darts: u16) -> f64 {
    if darts == 0 {
        0.0
    } else {
        (f64::from(scored) / f64::from(darts)) * 3.0
    }
}
