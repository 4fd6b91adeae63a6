use crate::model::{GateViolation, StepId, StepKind, Unit};

/// Result of asking a unit to leave its active step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAdvance {
    /// The unit moved on; `to` is `None` when the last step was left.
    Moved { from: StepId, to: Option<StepId> },
    /// A gated step's minimum-content policy is unmet. Nothing changed.
    Blocked(GateViolation),
    /// The unit was already past its last step.
    Finished,
}

/// What to do when a timed step's countdown reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepExpiry {
    Advance,
    /// Route to the extension decision instead of advancing.
    OfferExtension,
}

/// Walks a unit through its fixed step pipeline.
pub struct StepSequencer;

impl StepSequencer {
    /// Move to the next step, unless the active step is gated and its gate is unmet.
    pub fn advance(unit: &mut Unit) -> StepAdvance {
        let Some(step) = unit.active_step().copied() else {
            return StepAdvance::Finished;
        };

        if let Err(violation) = unit.check_gate() {
            return StepAdvance::Blocked(violation);
        }

        let next = unit.active_step_index() + 1;
        unit.set_active_step_index(next);
        StepAdvance::Moved {
            from: step.id,
            to: unit.active_step().map(|s| s.id),
        }
    }

    /// Decide how a timed step's expiry is handled.
    ///
    /// Only the extensible step diverts, and only the first time it expires in
    /// the unit's lifetime.
    #[must_use]
    pub fn on_timer_expired(unit: &Unit) -> StepExpiry {
        match unit.active_step() {
            Some(step)
                if matches!(step.kind, StepKind::Timed { .. })
                    && step.extensible
                    && !unit.extension_offered() =>
            {
                StepExpiry::OfferExtension
            }
            _ => StepExpiry::Advance,
        }
    }

    /// Rewind to the first response-capture step, discarding responses.
    pub fn rewind_for_retake(unit: &mut Unit) -> Option<StepId> {
        unit.reset_for_retake();
        unit.active_step().map(|s| s.id)
    }
}
