use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::analysis::AnalysisResult;
use crate::model::content::UnitContent;
use crate::model::response::{CapturedResponse, GateViolation, MinimumContentPolicy, ResponseSlot};
use crate::model::step::{StepSpec, analysis_trigger_index, first_capture_index};

/// One question or content segment inside a session.
///
/// `active_step_index == steps.len()` marks a finished unit that is waiting
/// for the session to move on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    index: usize,
    content: Option<UnitContent>,
    response_policy: MinimumContentPolicy,
    steps: Vec<StepSpec>,
    active_step_index: usize,
    responses: BTreeMap<ResponseSlot, CapturedResponse>,
    analysis: Option<AnalysisResult>,
    resume_position_secs: Option<u32>,
    extension_offered: bool,
    extension_used: bool,
    attempts: u32,
}

impl Unit {
    /// Create a unit whose content has not been loaded yet.
    #[must_use]
    pub fn new(index: usize, steps: Vec<StepSpec>, response_policy: MinimumContentPolicy) -> Self {
        Self {
            index,
            content: None,
            response_policy,
            steps,
            active_step_index: 0,
            responses: BTreeMap::new(),
            analysis: None,
            resume_position_secs: None,
            extension_offered: false,
            extension_used: false,
            attempts: 1,
        }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn content(&self) -> Option<&UnitContent> {
        self.content.as_ref()
    }

    #[must_use]
    pub fn response_policy(&self) -> MinimumContentPolicy {
        self.response_policy
    }

    #[must_use]
    pub fn steps(&self) -> &[StepSpec] {
        &self.steps
    }

    #[must_use]
    pub fn active_step_index(&self) -> usize {
        self.active_step_index
    }

    #[must_use]
    pub fn active_step(&self) -> Option<&StepSpec> {
        self.steps.get(self.active_step_index)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.active_step_index >= self.steps.len()
    }

    #[must_use]
    pub fn responses(&self) -> &BTreeMap<ResponseSlot, CapturedResponse> {
        &self.responses
    }

    #[must_use]
    pub fn response(&self, slot: ResponseSlot) -> Option<&CapturedResponse> {
        self.responses.get(&slot)
    }

    #[must_use]
    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    #[must_use]
    pub fn resume_position_secs(&self) -> Option<u32> {
        self.resume_position_secs
    }

    #[must_use]
    pub fn extension_offered(&self) -> bool {
        self.extension_offered
    }

    #[must_use]
    pub fn extension_used(&self) -> bool {
        self.extension_used
    }

    /// Number of times the unit's responses have been (re)started.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True once leaving the active step would pass the analysis trigger.
    #[must_use]
    pub fn is_at_analysis_trigger(&self) -> bool {
        analysis_trigger_index(&self.steps) == Some(self.active_step_index)
    }

    /// Check the active step's gate, if it has one.
    ///
    /// # Errors
    ///
    /// Returns the `GateViolation` that blocks advancing.
    pub fn check_gate(&self) -> Result<(), GateViolation> {
        match self.active_step().and_then(StepSpec::gate_slot) {
            Some(slot) => self.response_policy.check(slot, self.response(slot)),
            None => Ok(()),
        }
    }

    pub fn install_content(&mut self, content: UnitContent) {
        self.response_policy = content.response_policy;
        self.content = Some(content);
    }

    pub fn capture_response(&mut self, slot: ResponseSlot, response: CapturedResponse) {
        self.responses.insert(slot, response);
    }

    pub fn set_analysis(&mut self, analysis: AnalysisResult) {
        self.analysis = Some(analysis);
    }

    pub fn set_resume_position(&mut self, position_secs: u32) {
        self.resume_position_secs = Some(position_secs);
    }

    /// Hand back the saved sub-position once, clearing it.
    pub fn take_resume_position(&mut self) -> Option<u32> {
        self.resume_position_secs.take()
    }

    pub fn mark_extension_offered(&mut self) {
        self.extension_offered = true;
    }

    pub fn mark_extension_used(&mut self) {
        self.extension_offered = true;
        self.extension_used = true;
    }

    /// Discard responses and analysis and rewind to the first capture step.
    ///
    /// The extension flags survive: a unit's extensible step is lengthened at
    /// most once over its lifetime.
    pub fn reset_for_retake(&mut self) {
        self.responses.clear();
        self.analysis = None;
        self.resume_position_secs = None;
        self.active_step_index = first_capture_index(&self.steps).unwrap_or(0);
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Put the unit at its first step with no transient state, ready to become active.
    pub fn reset_for_activation(&mut self) {
        self.responses.clear();
        self.analysis = None;
        self.active_step_index = 0;
    }

    pub(crate) fn set_active_step_index(&mut self, index: usize) {
        self.active_step_index = index.min(self.steps.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::PayloadRef;
    use crate::model::step::StepId;
    use crate::time::fixed_now;

    fn unit() -> Unit {
        Unit::new(
            0,
            vec![
                StepSpec::timed(StepId::Present, 900).resumable(),
                StepSpec::gated(StepId::Respond, ResponseSlot::Single),
                StepSpec::manual(StepId::Analysis).report(),
                StepSpec::manual(StepId::Done),
            ],
            MinimumContentPolicy::AudioSeconds(300),
        )
    }

    #[test]
    fn retake_rewinds_to_capture_step_and_clears_responses() {
        let mut unit = unit();
        unit.set_active_step_index(2);
        unit.capture_response(
            ResponseSlot::Single,
            CapturedResponse::audio(PayloadRef::new("a"), 320, fixed_now()),
        );
        unit.set_analysis(AnalysisResult::fallback());
        unit.mark_extension_used();

        unit.reset_for_retake();

        assert_eq!(unit.active_step_index(), 1);
        assert!(unit.responses().is_empty());
        assert!(unit.analysis().is_none());
        assert!(unit.extension_used());
        assert_eq!(unit.attempts(), 2);
    }

    #[test]
    fn resume_position_is_consumed_once() {
        let mut unit = unit();
        unit.set_resume_position(42);
        assert_eq!(unit.take_resume_position(), Some(42));
        assert_eq!(unit.take_resume_position(), None);
    }

    #[test]
    fn gate_uses_installed_content_policy() {
        let mut unit = unit();
        unit.set_active_step_index(1);
        unit.install_content(UnitContent::placeholder(0, MinimumContentPolicy::Images(1)));
        unit.capture_response(
            ResponseSlot::Single,
            CapturedResponse::images(vec![PayloadRef::new("i")], fixed_now()),
        );
        assert!(unit.check_gate().is_ok());
    }

    #[test]
    fn step_index_is_clamped_to_finished() {
        let mut unit = unit();
        unit.set_active_step_index(99);
        assert!(unit.is_finished());
        assert_eq!(unit.active_step_index(), 4);
    }
}
