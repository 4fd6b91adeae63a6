use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::response::{MinimumContentPolicy, ResponseSlot};
use crate::model::step::{SessionFlow, StepId, StepSpec};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionConfigError {
    #[error("a session needs at least one unit")]
    NoUnits,

    #[error("{field} must be > 0")]
    ZeroDuration { field: &'static str },

    #[error("break checkpoint after unit {after_units} must fall before the last of {unit_count} units")]
    CheckpointOutOfRange { after_units: usize, unit_count: usize },

    #[error("step plan must contain exactly one extensible step, found {found}")]
    ExtensibleSteps { found: usize },
}

//
// ─── BREAK CHECKPOINT ──────────────────────────────────────────────────────────
//

/// Unit boundary at which an optional pause is offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakCheckpoint {
    /// Offer the break once this many units are finished.
    pub after_units: usize,
    pub duration_secs: u32,
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Durations, unit count and branch settings for one session flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    flow: SessionFlow,
    unit_count: usize,
    read_secs: u32,
    respond_secs: u32,
    study_secs: u32,
    review_secs: u32,
    present_secs: u32,
    extension_secs: u32,
    report_dwell_secs: u32,
    break_checkpoint: Option<BreakCheckpoint>,
    response_policy: MinimumContentPolicy,
}

/// Editable form of `SessionConfig`; call `validate` to use it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfigDraft {
    pub flow: SessionFlow,
    pub unit_count: usize,
    pub read_secs: u32,
    pub respond_secs: u32,
    pub study_secs: u32,
    pub review_secs: u32,
    pub present_secs: u32,
    pub extension_secs: u32,
    pub report_dwell_secs: u32,
    pub break_checkpoint: Option<BreakCheckpoint>,
    pub response_policy: MinimumContentPolicy,
}

impl SessionConfig {
    /// Three-question daily drill.
    ///
    /// - 5 minutes reading, 10 minutes per spoken answer
    /// - 60 minutes of study, extensible once by 10 minutes
    /// - 10 minute report dwell, 10 minute break after the second question
    /// - answers must be at least 5 minutes of audio
    #[must_use]
    pub fn default_drill() -> Self {
        Self {
            flow: SessionFlow::Drill,
            unit_count: 3,
            read_secs: 300,
            respond_secs: 600,
            study_secs: 3600,
            review_secs: 600,
            present_secs: 0,
            extension_secs: 600,
            report_dwell_secs: 600,
            break_checkpoint: Some(BreakCheckpoint {
                after_units: 2,
                duration_secs: 600,
            }),
            response_policy: MinimumContentPolicy::AudioSeconds(300),
        }
    }

    /// Four video segments per part; the segment playback is the extensible step.
    #[must_use]
    pub fn default_segment_recall() -> Self {
        Self {
            flow: SessionFlow::SegmentRecall,
            unit_count: 4,
            read_secs: 0,
            respond_secs: 0,
            study_secs: 0,
            review_secs: 0,
            present_secs: 900,
            extension_secs: 600,
            report_dwell_secs: 600,
            break_checkpoint: Some(BreakCheckpoint {
                after_units: 2,
                duration_secs: 600,
            }),
            response_policy: MinimumContentPolicy::AudioSeconds(300),
        }
    }

    #[must_use]
    pub fn default_for(flow: SessionFlow) -> Self {
        match flow {
            SessionFlow::Drill => Self::default_drill(),
            SessionFlow::SegmentRecall => Self::default_segment_recall(),
        }
    }

    #[must_use]
    pub fn to_draft(&self) -> SessionConfigDraft {
        SessionConfigDraft {
            flow: self.flow,
            unit_count: self.unit_count,
            read_secs: self.read_secs,
            respond_secs: self.respond_secs,
            study_secs: self.study_secs,
            review_secs: self.review_secs,
            present_secs: self.present_secs,
            extension_secs: self.extension_secs,
            report_dwell_secs: self.report_dwell_secs,
            break_checkpoint: self.break_checkpoint,
            response_policy: self.response_policy,
        }
    }

    /// The fixed step pipeline every unit of this flow runs through.
    #[must_use]
    pub fn plan(&self) -> Vec<StepSpec> {
        match self.flow {
            SessionFlow::Drill => vec![
                StepSpec::timed(StepId::Read, self.read_secs),
                StepSpec::timed(StepId::RespondBefore, self.respond_secs)
                    .capturing(ResponseSlot::Before),
                StepSpec::gated(StepId::UploadBefore, ResponseSlot::Before),
                StepSpec::timed(StepId::Study, self.study_secs).extensible(),
                StepSpec::timed(StepId::RespondAfter, self.respond_secs)
                    .capturing(ResponseSlot::After),
                StepSpec::gated(StepId::UploadAfter, ResponseSlot::After),
                StepSpec::timed(StepId::ReviewReference, self.review_secs),
                StepSpec::manual(StepId::Report).report(),
            ],
            SessionFlow::SegmentRecall => vec![
                StepSpec::timed(StepId::Present, self.present_secs)
                    .extensible()
                    .resumable(),
                StepSpec::gated(StepId::Respond, ResponseSlot::Single),
                StepSpec::manual(StepId::Analysis).report(),
                StepSpec::manual(StepId::Done),
            ],
        }
    }

    #[must_use]
    pub fn flow(&self) -> SessionFlow {
        self.flow
    }

    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.unit_count
    }

    #[must_use]
    pub fn extension_secs(&self) -> u32 {
        self.extension_secs
    }

    #[must_use]
    pub fn report_dwell_secs(&self) -> u32 {
        self.report_dwell_secs
    }

    #[must_use]
    pub fn break_checkpoint(&self) -> Option<BreakCheckpoint> {
        self.break_checkpoint
    }

    #[must_use]
    pub fn response_policy(&self) -> MinimumContentPolicy {
        self.response_policy
    }
}

impl SessionConfigDraft {
    #[must_use]
    pub fn drill() -> Self {
        SessionConfig::default_drill().to_draft()
    }

    #[must_use]
    pub fn segment_recall() -> Self {
        SessionConfig::default_segment_recall().to_draft()
    }

    /// Validate the draft into usable settings.
    ///
    /// # Errors
    ///
    /// Returns `SessionConfigError` if there are no units, a used duration is zero,
    /// or the break checkpoint does not sit between two units.
    pub fn validate(self) -> Result<SessionConfig, SessionConfigError> {
        if self.unit_count == 0 {
            return Err(SessionConfigError::NoUnits);
        }

        let used: Vec<(&'static str, u32)> = match self.flow {
            SessionFlow::Drill => vec![
                ("read_secs", self.read_secs),
                ("respond_secs", self.respond_secs),
                ("study_secs", self.study_secs),
                ("review_secs", self.review_secs),
            ],
            SessionFlow::SegmentRecall => vec![("present_secs", self.present_secs)],
        };
        for (field, value) in used {
            if value == 0 {
                return Err(SessionConfigError::ZeroDuration { field });
            }
        }
        if self.extension_secs == 0 {
            return Err(SessionConfigError::ZeroDuration {
                field: "extension_secs",
            });
        }
        if self.report_dwell_secs == 0 {
            return Err(SessionConfigError::ZeroDuration {
                field: "report_dwell_secs",
            });
        }

        if let Some(checkpoint) = self.break_checkpoint {
            if checkpoint.after_units == 0 || checkpoint.after_units >= self.unit_count {
                return Err(SessionConfigError::CheckpointOutOfRange {
                    after_units: checkpoint.after_units,
                    unit_count: self.unit_count,
                });
            }
            if checkpoint.duration_secs == 0 {
                return Err(SessionConfigError::ZeroDuration {
                    field: "break_duration_secs",
                });
            }
        }

        let config = SessionConfig {
            flow: self.flow,
            unit_count: self.unit_count,
            read_secs: self.read_secs,
            respond_secs: self.respond_secs,
            study_secs: self.study_secs,
            review_secs: self.review_secs,
            present_secs: self.present_secs,
            extension_secs: self.extension_secs,
            report_dwell_secs: self.report_dwell_secs,
            break_checkpoint: self.break_checkpoint,
            response_policy: self.response_policy,
        };

        let found = config.plan().iter().filter(|step| step.extensible).count();
        if found != 1 {
            return Err(SessionConfigError::ExtensibleSteps { found });
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(SessionConfigDraft::drill().validate().is_ok());
        assert!(SessionConfigDraft::segment_recall().validate().is_ok());
    }

    #[test]
    fn drill_plan_has_eight_steps_with_study_extensible() {
        let plan = SessionConfig::default_drill().plan();
        assert_eq!(plan.len(), 8);
        let extensible: Vec<_> = plan.iter().filter(|s| s.extensible).collect();
        assert_eq!(extensible.len(), 1);
        assert_eq!(extensible[0].id, StepId::Study);
        assert_eq!(extensible[0].nominal_duration_secs(), Some(3600));
    }

    #[test]
    fn zero_study_duration_is_rejected() {
        let mut draft = SessionConfigDraft::drill();
        draft.study_secs = 0;
        assert_eq!(
            draft.validate(),
            Err(SessionConfigError::ZeroDuration {
                field: "study_secs"
            })
        );
    }

    #[test]
    fn checkpoint_after_last_unit_is_rejected() {
        let mut draft = SessionConfigDraft::drill();
        draft.break_checkpoint = Some(BreakCheckpoint {
            after_units: 3,
            duration_secs: 600,
        });
        assert!(matches!(
            draft.validate(),
            Err(SessionConfigError::CheckpointOutOfRange { .. })
        ));
    }

    #[test]
    fn segment_durations_ignore_drill_fields() {
        let mut draft = SessionConfigDraft::segment_recall();
        draft.study_secs = 0;
        assert!(draft.validate().is_ok());
    }
}
