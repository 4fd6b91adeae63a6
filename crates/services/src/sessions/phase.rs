use recall_core::model::{GateViolation, Provenance, ResponseSlot, SessionSummary, StepId};
use recall_core::timer::Countdown;

/// The one countdown (or pending decision) the session is in.
///
/// Step, extension, break and report-dwell phases are mutually exclusive. The
/// phase is not persisted; a reload re-enters the active step from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivePhase {
    /// Waiting on the student (gated or manual step), or completed.
    Idle,
    Step(Countdown),
    /// The extensible step ran out; its countdown waits to be extended or dropped.
    ExtensionOffer {
        expired: Countdown,
        extra_secs: u32,
    },
    BreakOffer {
        duration_secs: u32,
    },
    Break(Countdown),
    ReportDwell(Countdown),
}

impl ActivePhase {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ActivePhase::Idle => "idle",
            ActivePhase::Step(_) => "a step timer runs",
            ActivePhase::ExtensionOffer { .. } => "an extension is offered",
            ActivePhase::BreakOffer { .. } => "a break is offered",
            ActivePhase::Break(_) => "on a break",
            ActivePhase::ReportDwell(_) => "the report is shown",
        }
    }

    /// The running countdown, if any.
    #[must_use]
    pub fn countdown(&self) -> Option<&Countdown> {
        match self {
            ActivePhase::Step(c) | ActivePhase::Break(c) | ActivePhase::ReportDwell(c) => Some(c),
            ActivePhase::ExtensionOffer { .. } | ActivePhase::BreakOffer { .. } | ActivePhase::Idle => {
                None
            }
        }
    }

    #[must_use]
    pub fn pending_decision(&self) -> Option<PendingDecision> {
        match *self {
            ActivePhase::ExtensionOffer { extra_secs, .. } => {
                Some(PendingDecision::Extension { extra_secs })
            }
            ActivePhase::BreakOffer { duration_secs } => {
                Some(PendingDecision::Break { duration_secs })
            }
            _ => None,
        }
    }
}

/// A two-outcome prompt waiting for the student.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingDecision {
    Extension { extra_secs: u32 },
    Break { duration_secs: u32 },
}

/// What a thin UI needs to render after each transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    Tick {
        remaining_secs: u32,
    },
    StepStarted {
        unit: usize,
        step: StepId,
        duration_secs: Option<u32>,
        resume_position_secs: Option<u32>,
    },
    ResponseCaptured {
        slot: ResponseSlot,
    },
    /// A gated step refused to advance; nothing changed.
    Blocked(GateViolation),
    ExtensionOffered {
        unit: usize,
        extra_secs: u32,
    },
    Extended {
        remaining_secs: u32,
    },
    BreakOffered {
        duration_secs: u32,
    },
    BreakStarted {
        duration_secs: u32,
    },
    ReportReady {
        unit: usize,
        score: u8,
        provenance: Provenance,
        dwell_secs: u32,
    },
    UnitCompleted {
        unit: usize,
        score: u8,
        attempt: u32,
    },
    /// The analysis judged the response off-topic; the unit restarts at `step`.
    RetakeRequired {
        unit: usize,
        step: StepId,
        feedback: String,
    },
    SessionCompleted {
        summary: SessionSummary,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timed_phases_expose_a_countdown() {
        assert!(ActivePhase::Idle.countdown().is_none());
        assert!(ActivePhase::BreakOffer { duration_secs: 600 }.countdown().is_none());
        assert_eq!(
            ActivePhase::Break(Countdown::start(600))
                .countdown()
                .map(Countdown::remaining_secs),
            Some(600)
        );
    }

    #[test]
    fn offers_are_pending_decisions() {
        let phase = ActivePhase::ExtensionOffer {
            expired: Countdown::start(0),
            extra_secs: 600,
        };
        assert_eq!(
            phase.pending_decision(),
            Some(PendingDecision::Extension { extra_secs: 600 })
        );
        assert_eq!(ActivePhase::ReportDwell(Countdown::start(5)).pending_decision(), None);
    }
}
