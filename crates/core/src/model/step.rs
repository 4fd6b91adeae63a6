use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::response::ResponseSlot;

/// The two unit pipelines a session can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionFlow {
    /// Three-question daily drill: read, answer, study, answer again, report.
    Drill,
    /// Video segments: watch, recall aloud, read the analysis.
    SegmentRecall,
}

impl SessionFlow {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionFlow::Drill => "drill",
            SessionFlow::SegmentRecall => "segment_recall",
        }
    }
}

impl fmt::Display for SessionFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Read,
    RespondBefore,
    UploadBefore,
    Study,
    RespondAfter,
    UploadAfter,
    ReviewReference,
    Report,
    Present,
    Respond,
    Analysis,
    Done,
}

impl StepId {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StepId::Read => "read",
            StepId::RespondBefore => "respond_before",
            StepId::UploadBefore => "upload_before",
            StepId::Study => "study",
            StepId::RespondAfter => "respond_after",
            StepId::UploadAfter => "upload_after",
            StepId::ReviewReference => "review_reference",
            StepId::Report => "report",
            StepId::Present => "present",
            StepId::Respond => "respond",
            StepId::Analysis => "analysis",
            StepId::Done => "done",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a step is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// Ends when its countdown reaches zero, or early on "Done".
    Timed { duration_secs: u32 },
    /// Ends only once the response in `slot` meets the unit's minimum-content policy.
    Gated { slot: ResponseSlot },
    /// Ends on explicit confirmation.
    Manual,
}

/// One stage in a unit's fixed pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    pub id: StepId,
    pub kind: StepKind,
    /// Only one step per pipeline may be lengthened, once.
    pub extensible: bool,
    /// Slot this step records into without gating on it.
    pub captures: Option<ResponseSlot>,
    /// Entering this step shows the analysis report behind a minimum dwell.
    pub report: bool,
    /// Step has an internal position (playback offset) that survives reloads.
    pub resumable: bool,
}

impl StepSpec {
    #[must_use]
    pub fn timed(id: StepId, duration_secs: u32) -> Self {
        Self {
            id,
            kind: StepKind::Timed { duration_secs },
            extensible: false,
            captures: None,
            report: false,
            resumable: false,
        }
    }

    #[must_use]
    pub fn gated(id: StepId, slot: ResponseSlot) -> Self {
        Self {
            id,
            kind: StepKind::Gated { slot },
            extensible: false,
            captures: None,
            report: false,
            resumable: false,
        }
    }

    #[must_use]
    pub fn manual(id: StepId) -> Self {
        Self {
            id,
            kind: StepKind::Manual,
            extensible: false,
            captures: None,
            report: false,
            resumable: false,
        }
    }

    #[must_use]
    pub fn extensible(mut self) -> Self {
        self.extensible = true;
        self
    }

    #[must_use]
    pub fn capturing(mut self, slot: ResponseSlot) -> Self {
        self.captures = Some(slot);
        self
    }

    #[must_use]
    pub fn report(mut self) -> Self {
        self.report = true;
        self
    }

    #[must_use]
    pub fn resumable(mut self) -> Self {
        self.resumable = true;
        self
    }

    #[must_use]
    pub fn nominal_duration_secs(&self) -> Option<u32> {
        match self.kind {
            StepKind::Timed { duration_secs } => Some(duration_secs),
            _ => None,
        }
    }

    #[must_use]
    pub fn gate_slot(&self) -> Option<ResponseSlot> {
        match self.kind {
            StepKind::Gated { slot } => Some(slot),
            _ => None,
        }
    }

    /// True if a response for `slot` may be captured while this step is active.
    #[must_use]
    pub fn accepts(&self, slot: ResponseSlot) -> bool {
        self.captures == Some(slot) || self.gate_slot() == Some(slot)
    }

    #[must_use]
    pub fn is_capture(&self) -> bool {
        self.captures.is_some() || self.gate_slot().is_some()
    }
}

/// Index of the step a relevance reset or retake rewinds to.
#[must_use]
pub fn first_capture_index(steps: &[StepSpec]) -> Option<usize> {
    steps.iter().position(StepSpec::is_capture)
}

/// Index of the terminal response-capture step; leaving it requests analysis.
#[must_use]
pub fn analysis_trigger_index(steps: &[StepSpec]) -> Option<usize> {
    steps.iter().rposition(|step| step.gate_slot().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drill() -> Vec<StepSpec> {
        vec![
            StepSpec::timed(StepId::Read, 300),
            StepSpec::timed(StepId::RespondBefore, 600).capturing(ResponseSlot::Before),
            StepSpec::gated(StepId::UploadBefore, ResponseSlot::Before),
            StepSpec::timed(StepId::Study, 3600).extensible(),
            StepSpec::manual(StepId::Report).report(),
        ]
    }

    #[test]
    fn capture_and_trigger_indices() {
        let steps = drill();
        assert_eq!(first_capture_index(&steps), Some(1));
        assert_eq!(analysis_trigger_index(&steps), Some(2));
    }

    #[test]
    fn steps_accept_their_own_slot_only() {
        let steps = drill();
        assert!(steps[1].accepts(ResponseSlot::Before));
        assert!(steps[2].accepts(ResponseSlot::Before));
        assert!(!steps[2].accepts(ResponseSlot::After));
        assert!(!steps[0].accepts(ResponseSlot::Before));
    }

    #[test]
    fn only_timed_steps_have_a_duration() {
        let steps = drill();
        assert_eq!(steps[3].nominal_duration_secs(), Some(3600));
        assert_eq!(steps[4].nominal_duration_secs(), None);
    }
}
