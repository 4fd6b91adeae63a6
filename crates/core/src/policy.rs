//! Decision points that can intercept normal step and unit advancement.
//!
//! Each decision is a pure function of the session state; the caller renders
//! the two outcomes and feeds the student's [`Choice`] back in.

use crate::model::{BreakCheckpoint, Session, SessionConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Accept,
    Decline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionOutcome {
    Extend { extra_secs: u32 },
    Advance,
}

/// What happens once the active unit has been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitBoundary {
    OfferBreak { duration_secs: u32 },
    NextUnit,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakOutcome {
    StartBreak { duration_secs: u32 },
    NextUnit,
}

/// Why a report dwell ended. Both are valid exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportExit {
    DwellElapsed,
    Confirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchPolicy {
    extension_secs: u32,
    report_dwell_secs: u32,
    break_checkpoint: Option<BreakCheckpoint>,
}

impl BranchPolicy {
    #[must_use]
    pub fn new(
        extension_secs: u32,
        report_dwell_secs: u32,
        break_checkpoint: Option<BreakCheckpoint>,
    ) -> Self {
        Self {
            extension_secs,
            report_dwell_secs,
            break_checkpoint,
        }
    }

    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.extension_secs(),
            config.report_dwell_secs(),
            config.break_checkpoint(),
        )
    }

    #[must_use]
    pub fn extension_secs(&self) -> u32 {
        self.extension_secs
    }

    /// Minimum time the report stays on screen before the unit may move on.
    #[must_use]
    pub fn report_dwell_secs(&self) -> u32 {
        self.report_dwell_secs
    }

    #[must_use]
    pub fn resolve_extension(&self, choice: Choice) -> ExtensionOutcome {
        match choice {
            Choice::Accept => ExtensionOutcome::Extend {
                extra_secs: self.extension_secs,
            },
            Choice::Decline => ExtensionOutcome::Advance,
        }
    }

    /// Decide what follows the active unit.
    ///
    /// The break is offered at most once per session, exactly when the number
    /// of finished units equals the checkpoint and more units remain.
    #[must_use]
    pub fn at_unit_boundary(&self, session: &Session) -> UnitBoundary {
        if !session.has_next_unit() {
            return UnitBoundary::Complete;
        }
        match self.break_checkpoint {
            Some(checkpoint)
                if !session.break_offered()
                    && session.active_unit_index() + 1 == checkpoint.after_units =>
            {
                UnitBoundary::OfferBreak {
                    duration_secs: checkpoint.duration_secs,
                }
            }
            _ => UnitBoundary::NextUnit,
        }
    }

    #[must_use]
    pub fn resolve_break(&self, choice: Choice, duration_secs: u32) -> BreakOutcome {
        match choice {
            Choice::Accept => BreakOutcome::StartBreak { duration_secs },
            Choice::Decline => BreakOutcome::NextUnit,
        }
    }
}
