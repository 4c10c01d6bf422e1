use serde::Serialize;
use utoipa::ToSchema;

use crate::state::machine::MatchPhase;

/// Publicly visible match phase exposed to clients (REST/SSE).
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisibleMatchPhase {
    /// Match opened, waiting for an explicit starter selection.
    AwaitingStarter,
    /// A leg is being scored.
    LegInProgress,
    /// A zeroing turn total awaits its checkout confirmation.
    AwaitingCheckoutConfirm,
    /// The match has a winner.
    MatchComplete,
}

impl From<&MatchPhase> for VisibleMatchPhase {
    fn from(value: &MatchPhase) -> Self {
        match value {
            MatchPhase::AwaitingStarter => VisibleMatchPhase::AwaitingStarter,
            MatchPhase::LegInProgress => VisibleMatchPhase::LegInProgress,
            MatchPhase::AwaitingCheckoutConfirm => VisibleMatchPhase::AwaitingCheckoutConfirm,
            MatchPhase::MatchComplete => VisibleMatchPhase::MatchComplete,
        }
    }
}
