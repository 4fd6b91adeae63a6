use recall_core::model::StepId;

use super::phase::PendingDecision;

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub total_units: usize,
    pub finished_units: usize,
    pub active_unit: usize,
    pub active_step: Option<StepId>,
    /// Seconds left on the step, break or report countdown.
    pub remaining_secs: Option<u32>,
    pub pending: Option<PendingDecision>,
    pub is_complete: bool,
}

impl SessionProgress {
    #[must_use]
    pub fn remaining_units(&self) -> usize {
        self.total_units.saturating_sub(self.finished_units)
    }
}
