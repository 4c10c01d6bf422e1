use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

/// High-level phases a match can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Brand-new match; waiting for an explicit starter selection.
    AwaitingStarter,
    /// A leg is being scored.
    LegInProgress,
    /// A zeroing turn total awaits its `{darts_used, finished_on_double}`
    /// confirmation; no other scoring input is accepted.
    AwaitingCheckoutConfirm,
    /// Terminal phase; the match result has been emitted.
    MatchComplete,
}

/// Events that can be applied to the match state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEvent {
    /// A starter was chosen for leg 1.
    SelectStarter,
    /// State was recovered mid-progress; starter selection is skipped.
    Recover,
    /// A turn total landed on exactly zero.
    RequestCheckoutConfirm,
    /// The pending checkout confirmation resolved without ending the match.
    ResolveCheckoutConfirm,
    /// A leg finished and the next one opened.
    LegComplete,
    /// A player reached the required leg count.
    CompleteMatch,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: MatchPhase,
    /// The event that cannot be applied from this phase.
    pub event: MatchEvent,
}

/// Errors that can occur when planning a state machine transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned state machine transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// State machine phase changed since the plan was created.
    PhaseMismatch {
        /// Phase when plan was created.
        expected: MatchPhase,
        /// Current phase.
        actual: MatchPhase,
    },
    /// State machine version changed since the plan was created.
    VersionMismatch {
        /// Version when plan was created.
        expected: usize,
        /// Current version.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned state machine transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A planned state machine transition that has been validated but not yet applied.
#[derive(Debug, Clone, Copy)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase the state machine is currently in.
    pub from: MatchPhase,
    /// Phase the state machine will transition to.
    pub to: MatchPhase,
    /// Event that triggered this transition.
    pub event: MatchEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

/// Snapshot of the current state machine state. The version is the monotonic
/// counter carried by every persisted match snapshot, so recovery can pick
/// the freshest copy deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase of the state machine.
    pub phase: MatchPhase,
    /// Version number of the state machine (increments on each transition).
    pub version: usize,
    /// Pending transition phase, if a transition is planned but not yet applied.
    pub pending: Option<MatchPhase>,
}

/// State machine guarding the scoring lifecycle of a single match.
#[derive(Debug, Clone)]
pub struct MatchStateMachine {
    phase: MatchPhase,
    version: usize,
    pending: Option<Plan>,
}

impl Default for MatchStateMachine {
    fn default() -> Self {
        Self {
            phase: MatchPhase::AwaitingStarter,
            version: 0,
            pending: None,
        }
    }
}

impl MatchStateMachine {
    /// Create a new state machine awaiting a starter selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a machine from a recovered snapshot, keeping the persisted
    /// version so later snapshots stay monotonic across restarts.
    pub fn recovered(phase: MatchPhase, version: usize) -> Self {
        Self {
            phase,
            version,
            pending: None,
        }
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Create a snapshot of the current state machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to),
        }
    }

    /// Plan a transition by validating that the event can be applied from the
    /// current phase. Returns a Plan that can later be applied or aborted.
    pub fn plan(&mut self, event: MatchEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase,
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan);

        Ok(plan)
    }

    /// Apply a planned transition, moving the state machine to the next phase.
    /// Returns the new phase after the transition.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<MatchPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;
        self.pending = None;

        Ok(self.phase)
    }

    /// Abort a planned transition without applying it.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(&self, event: MatchEvent) -> Result<MatchPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (MatchPhase::AwaitingStarter, MatchEvent::SelectStarter) => MatchPhase::LegInProgress,
            (MatchPhase::AwaitingStarter, MatchEvent::Recover) => MatchPhase::LegInProgress,
            (MatchPhase::LegInProgress, MatchEvent::RequestCheckoutConfirm) => {
                MatchPhase::AwaitingCheckoutConfirm
            }
            (MatchPhase::AwaitingCheckoutConfirm, MatchEvent::ResolveCheckoutConfirm) => {
                MatchPhase::LegInProgress
            }
            // leg boundaries stay in LegInProgress; the version bump marks them
            (MatchPhase::LegInProgress, MatchEvent::LegComplete) => MatchPhase::LegInProgress,
            (MatchPhase::LegInProgress, MatchEvent::CompleteMatch) => MatchPhase::MatchComplete,
            // a confirmed checkout can win the match directly
            (MatchPhase::AwaitingCheckoutConfirm, MatchEvent::CompleteMatch) => {
                MatchPhase::MatchComplete
            }
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut MatchStateMachine, event: MatchEvent) -> MatchPhase {
        let plan = sm.plan(event).unwrap();
        sm.apply(plan.id).unwrap()
    }

    #[test]
    fn initial_state_awaits_starter() {
        let sm = MatchStateMachine::new();
        assert_eq!(sm.phase(), MatchPhase::AwaitingStarter);
        assert_eq!(sm.snapshot().version, 0);
    }

    #[test]
    fn full_happy_path_through_match() {
        let mut sm = MatchStateMachine::new();
        assert_eq!(
            apply(&mut sm, MatchEvent::SelectStarter),
            MatchPhase::LegInProgress
        );
        assert_eq!(
            apply(&mut sm, MatchEvent::LegComplete),
            MatchPhase::LegInProgress
        );
        assert_eq!(
            apply(&mut sm, MatchEvent::RequestCheckoutConfirm),
            MatchPhase::AwaitingCheckoutConfirm
        );
        assert_eq!(
            apply(&mut sm, MatchEvent::ResolveCheckoutConfirm),
            MatchPhase::LegInProgress
        );
        assert_eq!(
            apply(&mut sm, MatchEvent::CompleteMatch),
            MatchPhase::MatchComplete
        );
        assert_eq!(sm.snapshot().version, 5);
    }

    #[test]
    fn recovery_skips_starter_selection() {
        let mut sm = MatchStateMachine::new();
        assert_eq!(apply(&mut sm, MatchEvent::Recover), MatchPhase::LegInProgress);

        let resumed = MatchStateMachine::recovered(MatchPhase::LegInProgress, 17);
        assert_eq!(resumed.phase(), MatchPhase::LegInProgress);
        assert_eq!(resumed.snapshot().version, 17);
    }

    #[test]
    fn confirmed_checkout_can_complete_the_match() {
        let mut sm = MatchStateMachine::new();
        apply(&mut sm, MatchEvent::SelectStarter);
        apply(&mut sm, MatchEvent::RequestCheckoutConfirm);
        assert_eq!(
            apply(&mut sm, MatchEvent::CompleteMatch),
            MatchPhase::MatchComplete
        );
    }

    #[test]
    fn invalid_transition_returns_error() {
        let mut sm = MatchStateMachine::new();
        let err = sm.plan(MatchEvent::CompleteMatch).unwrap_err();
        match err {
            PlanError::InvalidTransition(invalid) => {
                assert_eq!(invalid.from, MatchPhase::AwaitingStarter);
                assert_eq!(invalid.event, MatchEvent::CompleteMatch);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn match_complete_is_terminal() {
        let mut sm = MatchStateMachine::new();
        apply(&mut sm, MatchEvent::SelectStarter);
        apply(&mut sm, MatchEvent::CompleteMatch);
        for event in [
            MatchEvent::SelectStarter,
            MatchEvent::Recover,
            MatchEvent::RequestCheckoutConfirm,
            MatchEvent::ResolveCheckoutConfirm,
            MatchEvent::LegComplete,
            MatchEvent::CompleteMatch,
        ] {
            assert!(matches!(
                sm.plan(event),
                Err(PlanError::InvalidTransition(_))
            ));
        }
    }

    #[test]
    fn plan_must_be_applied_before_the_next_one() {
        let mut sm = MatchStateMachine::new();
        let plan = sm.plan(MatchEvent::SelectStarter).unwrap();
        assert!(matches!(
            sm.plan(MatchEvent::SelectStarter),
            Err(PlanError::AlreadyPending)
        ));
        sm.abort(plan.id).unwrap();
        assert!(sm.plan(MatchEvent::SelectStarter).is_ok());
    }

    #[test]
    fn apply_rejects_mismatched_plan_id() {
        let mut sm = MatchStateMachine::new();
        let plan = sm.plan(MatchEvent::SelectStarter).unwrap();
        let err = sm.apply(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApplyError::IdMismatch { .. }));
        // the pending plan survives a mismatched apply
        assert_eq!(sm.apply(plan.id).unwrap(), MatchPhase::LegInProgress);
    }
}
