use std::sync::Arc;

use recall_core::Clock;
use recall_core::model::{
    AnalysisResult, CapturedResponse, ResponseSlot, Session, StepKind, UnitContent,
    first_capture_index,
};
use recall_core::policy::{BranchPolicy, BreakOutcome, Choice, ExtensionOutcome, UnitBoundary};
use recall_core::sequencer::{StepAdvance, StepExpiry, StepSequencer};
use recall_core::timer::{Countdown, Tick};
use storage::repository::SessionStore;

use super::phase::{ActivePhase, ControllerEvent};
use super::progress::SessionProgress;
use super::recorder::ResultRecorder;
use super::runner::Command;
use crate::analysis_service::{AnalysisRequest, AnalysisService};
use crate::completion::SessionCompletionHandler;
use crate::content::ContentProvider;
use crate::error::SessionError;

/// Collaborators a controller talks to.
#[derive(Clone)]
pub struct SessionDeps {
    pub clock: Clock,
    pub store: Arc<dyn SessionStore>,
    pub recorder: ResultRecorder,
    pub content: Arc<dyn ContentProvider>,
    pub analysis: Arc<dyn AnalysisService>,
    pub completion: Arc<dyn SessionCompletionHandler>,
}

pub type Events = Result<Vec<ControllerEvent>, SessionError>;

/// Drives one session: selects the active unit, walks it through its steps,
/// applies the branch policy and records results.
///
/// Every state change that matters for resume is followed by one whole-snapshot
/// write. The active countdown lives in [`ActivePhase`] and is never persisted.
pub struct SessionController {
    session: Session,
    policy: BranchPolicy,
    phase: ActivePhase,
    deps: SessionDeps,
}

impl SessionController {
    #[must_use]
    pub fn new(session: Session, policy: BranchPolicy, deps: SessionDeps) -> Self {
        Self {
            session,
            policy,
            phase: ActivePhase::Idle,
            deps,
        }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn phase(&self) -> ActivePhase {
        self.phase
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.session.is_completed()
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let unit = self.session.current_unit();
        SessionProgress {
            total_units: self.session.units().len(),
            finished_units: self.session.finished_units(),
            active_unit: self.session.active_unit_index(),
            active_step: unit.active_step().map(|step| step.id),
            remaining_secs: self.phase.countdown().map(Countdown::remaining_secs),
            pending: self.phase.pending_decision(),
            is_complete: self.session.is_completed(),
        }
    }

    /// Enter the persisted position: the active step of the active unit, with a
    /// fresh countdown at the step's full duration.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the snapshot cannot be written.
    pub async fn start(&mut self) -> Events {
        let mut events = Vec::new();
        if self.session.is_completed() {
            self.phase = ActivePhase::Idle;
            return Ok(events);
        }

        if self.session.current_unit().is_finished() {
            // Stopped between a unit's last step and the next unit.
            self.complete_and_advance(&mut events).await?;
            return Ok(events);
        }

        self.ensure_content().await;
        self.persist().await?;
        self.enter_step(&mut events);
        Ok(events)
    }

    /// Dispatch a user command.
    ///
    /// # Errors
    ///
    /// See the individual command methods.
    pub async fn apply(&mut self, command: Command) -> Events {
        match command {
            Command::Done => self.done().await,
            Command::Submit { slot, response } => self.submit_response(slot, response).await,
            Command::Extension(choice) => self.decide_extension(choice).await,
            Command::Break(choice) => self.decide_break(choice).await,
            Command::SkipBreak => self.skip_break().await,
            Command::Retake => self.retake().await,
            Command::PlaybackPosition(position_secs) => {
                self.record_playback_position(position_secs).await
            }
        }
    }

    /// One wall-clock second for whichever countdown is active.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` on a completed session, or storage errors
    /// from the transition the expiry triggers.
    pub async fn tick(&mut self) -> Events {
        self.ensure_active()?;
        let tick = match &mut self.phase {
            ActivePhase::Step(countdown)
            | ActivePhase::Break(countdown)
            | ActivePhase::ReportDwell(countdown) => countdown.tick(),
            _ => return Ok(Vec::new()),
        };

        let mut events = Vec::new();
        match tick {
            Tick::Idle => {}
            Tick::Running { remaining_secs } => {
                events.push(ControllerEvent::Tick { remaining_secs });
            }
            Tick::Completed => self.on_countdown_completed(&mut events).await?,
        }
        Ok(events)
    }

    /// Manual "done"/"continue": finishes a timed step early, confirms a manual
    /// step or the report, or tries to pass a gated step.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidCommand` while a decision or break is pending.
    pub async fn done(&mut self) -> Events {
        self.ensure_active()?;
        match self.phase {
            ActivePhase::Step(ref mut countdown) | ActivePhase::ReportDwell(ref mut countdown) => {
                countdown.cancel();
            }
            ActivePhase::Idle => {}
            _ => return Err(self.not_applicable("done")),
        }

        let mut events = Vec::new();
        self.advance_step(&mut events).await?;
        Ok(events)
    }

    /// Store a captured response in `slot`, replacing any earlier one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidCommand` if the active step does not take `slot`.
    pub async fn submit_response(
        &mut self,
        slot: ResponseSlot,
        response: CapturedResponse,
    ) -> Events {
        self.ensure_active()?;
        let accepts = matches!(self.phase, ActivePhase::Idle | ActivePhase::Step(_))
            && self
                .session
                .current_unit()
                .active_step()
                .is_some_and(|step| step.accepts(slot));
        if !accepts {
            return Err(self.not_applicable("submit response"));
        }

        self.session
            .current_unit_mut()
            .capture_response(slot, response);
        self.persist().await?;
        tracing::debug!(
            session = %self.session.id(),
            unit = self.session.active_unit_index(),
            %slot,
            "response captured"
        );
        Ok(vec![ControllerEvent::ResponseCaptured { slot }])
    }

    /// # Errors
    ///
    /// Returns `SessionError::InvalidCommand` unless an extension is on offer.
    pub async fn decide_extension(&mut self, choice: Choice) -> Events {
        self.ensure_active()?;
        let ActivePhase::ExtensionOffer { mut expired, .. } = self.phase else {
            return Err(self.not_applicable("extension decision"));
        };

        let mut events = Vec::new();
        match self.policy.resolve_extension(choice) {
            ExtensionOutcome::Extend { extra_secs } => {
                expired.extend(extra_secs);
                self.session.current_unit_mut().mark_extension_used();
                self.phase = ActivePhase::Step(expired);
                self.persist().await?;
                tracing::info!(
                    unit = self.session.active_unit_index(),
                    extra_secs,
                    "step extended"
                );
                events.push(ControllerEvent::Extended {
                    remaining_secs: expired.remaining_secs(),
                });
            }
            ExtensionOutcome::Advance => {
                self.phase = ActivePhase::Idle;
                self.advance_step(&mut events).await?;
            }
        }
        Ok(events)
    }

    /// # Errors
    ///
    /// Returns `SessionError::InvalidCommand` unless a break is on offer.
    pub async fn decide_break(&mut self, choice: Choice) -> Events {
        self.ensure_active()?;
        let ActivePhase::BreakOffer { duration_secs } = self.phase else {
            return Err(self.not_applicable("break decision"));
        };

        let mut events = Vec::new();
        match self.policy.resolve_break(choice, duration_secs) {
            BreakOutcome::StartBreak { duration_secs } => {
                self.phase = ActivePhase::Break(Countdown::start(duration_secs));
                self.persist().await?;
                tracing::info!(duration_secs, "break started");
                events.push(ControllerEvent::BreakStarted { duration_secs });
            }
            BreakOutcome::NextUnit => self.activate_next(&mut events).await?,
        }
        Ok(events)
    }

    /// End a running break early.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidCommand` unless a break is running.
    pub async fn skip_break(&mut self) -> Events {
        self.ensure_active()?;
        let ActivePhase::Break(mut countdown) = self.phase else {
            return Err(self.not_applicable("skip break"));
        };
        countdown.cancel();
        tracing::info!(elapsed_secs = countdown.elapsed_secs(), "break skipped");

        let mut events = Vec::new();
        self.activate_next(&mut events).await?;
        Ok(events)
    }

    /// Discard the unit's responses and start again at its first capture step.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidCommand` before the unit reaches its first
    /// capture step, or while a decision or break is pending.
    pub async fn retake(&mut self) -> Events {
        self.ensure_active()?;
        let unit = self.session.current_unit();
        let reached_capture = first_capture_index(unit.steps())
            .is_some_and(|first| unit.active_step_index() >= first && !unit.is_finished());
        let phase_allows = matches!(
            self.phase,
            ActivePhase::Idle | ActivePhase::Step(_) | ActivePhase::ReportDwell(_)
        );
        if !reached_capture || !phase_allows {
            return Err(self.not_applicable("retake"));
        }

        if let Some(countdown) = self.phase_countdown_mut() {
            countdown.cancel();
        }
        self.phase = ActivePhase::Idle;
        StepSequencer::rewind_for_retake(self.session.current_unit_mut());
        self.persist().await?;
        tracing::info!(
            unit = self.session.active_unit_index(),
            attempt = self.session.current_unit().attempts(),
            "retake started"
        );

        let mut events = Vec::new();
        self.enter_step(&mut events);
        Ok(events)
    }

    /// Save the playback offset of a resumable step.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidCommand` if the active step is not resumable.
    pub async fn record_playback_position(&mut self, position_secs: u32) -> Events {
        self.ensure_active()?;
        let resumable = self
            .session
            .current_unit()
            .active_step()
            .is_some_and(|step| step.resumable);
        if !resumable {
            return Err(self.not_applicable("record playback position"));
        }
        self.session
            .current_unit_mut()
            .set_resume_position(position_secs);
        self.persist().await?;
        Ok(Vec::new())
    }

    /// Hand back the saved playback offset once.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if clearing the offset cannot be persisted.
    pub async fn take_resume_position(&mut self) -> Result<Option<u32>, SessionError> {
        self.ensure_active()?;
        let position = self.session.current_unit_mut().take_resume_position();
        if position.is_some() {
            self.persist().await?;
        }
        Ok(position)
    }

    // ─── TRANSITIONS ───────────────────────────────────────────────────────────

    async fn on_countdown_completed(
        &mut self,
        events: &mut Vec<ControllerEvent>,
    ) -> Result<(), SessionError> {
        match self.phase {
            ActivePhase::Step(expired) => {
                match StepSequencer::on_timer_expired(self.session.current_unit()) {
                    StepExpiry::OfferExtension => {
                        let extra_secs = self.policy.extension_secs();
                        self.session.current_unit_mut().mark_extension_offered();
                        self.phase = ActivePhase::ExtensionOffer {
                            expired,
                            extra_secs,
                        };
                        self.persist().await?;
                        events.push(ControllerEvent::ExtensionOffered {
                            unit: self.session.active_unit_index(),
                            extra_secs,
                        });
                        Ok(())
                    }
                    StepExpiry::Advance => self.advance_step(events).await,
                }
            }
            ActivePhase::Break(_) => {
                tracing::info!("break finished");
                self.activate_next(events).await
            }
            ActivePhase::ReportDwell(_) => self.advance_step(events).await,
            _ => Ok(()),
        }
    }

    /// Leave the active step. Passing the analysis trigger runs the analysis
    /// first; leaving the last step hands over to the unit cycle.
    async fn advance_step(&mut self, events: &mut Vec<ControllerEvent>) -> Result<(), SessionError> {
        if let Err(violation) = self.session.current_unit().check_gate() {
            tracing::debug!(%violation, "gate refused advance");
            events.push(ControllerEvent::Blocked(violation));
            return Ok(());
        }

        if self.session.current_unit().is_at_analysis_trigger() {
            let analysis = self.run_analysis().await;
            let relevant = analysis.is_relevant;
            self.session.current_unit_mut().set_analysis(analysis);
            if !relevant {
                return self.complete_and_advance(events).await;
            }
        }

        match StepSequencer::advance(self.session.current_unit_mut()) {
            StepAdvance::Blocked(violation) => {
                events.push(ControllerEvent::Blocked(violation));
                Ok(())
            }
            StepAdvance::Moved { from, to: Some(to) } => {
                tracing::debug!(
                    unit = self.session.active_unit_index(),
                    %from,
                    %to,
                    "step advanced"
                );
                self.persist().await?;
                self.enter_step(events);
                Ok(())
            }
            StepAdvance::Moved { to: None, .. } | StepAdvance::Finished => {
                self.complete_and_advance(events).await
            }
        }
    }

    /// Record the active unit, then either force a retake (off-topic analysis),
    /// offer the break, move to the next unit or complete the session.
    async fn complete_and_advance(
        &mut self,
        events: &mut Vec<ControllerEvent>,
    ) -> Result<(), SessionError> {
        let unit_index = self.session.active_unit_index();
        self.deps
            .recorder
            .record(
                self.session.id(),
                self.session.current_unit(),
                self.deps.clock.now(),
            )
            .await?;

        let analysis = self.session.current_unit().analysis().cloned();
        if let Some(analysis) = analysis.as_ref().filter(|a| !a.is_relevant) {
            self.phase = ActivePhase::Idle;
            let step = StepSequencer::rewind_for_retake(self.session.current_unit_mut());
            self.persist().await?;
            tracing::info!(unit = unit_index, "response judged off-topic; retake required");
            if let Some(step) = step {
                events.push(ControllerEvent::RetakeRequired {
                    unit: unit_index,
                    step,
                    feedback: analysis.feedback.clone(),
                });
            }
            self.enter_step(events);
            return Ok(());
        }

        let score = analysis.as_ref().map_or(0, |a| a.score);
        let attempt = self.session.current_unit().attempts();
        tracing::info!(unit = unit_index, score, attempt, "unit completed");
        events.push(ControllerEvent::UnitCompleted {
            unit: unit_index,
            score,
            attempt,
        });

        match self.policy.at_unit_boundary(&self.session) {
            UnitBoundary::Complete => self.finish_session(events).await,
            UnitBoundary::OfferBreak { duration_secs } => {
                self.session.mark_break_offered();
                self.phase = ActivePhase::BreakOffer { duration_secs };
                self.persist().await?;
                events.push(ControllerEvent::BreakOffered { duration_secs });
                Ok(())
            }
            UnitBoundary::NextUnit => self.activate_next(events).await,
        }
    }

    async fn activate_next(&mut self, events: &mut Vec<ControllerEvent>) -> Result<(), SessionError> {
        self.phase = ActivePhase::Idle;
        if !self.session.activate_next_unit() {
            return self.finish_session(events).await;
        }
        self.ensure_content().await;
        self.persist().await?;
        tracing::info!(
            session = %self.session.id(),
            unit = self.session.active_unit_index(),
            "unit activated"
        );
        self.enter_step(events);
        Ok(())
    }

    /// Complete the session, store its summary and hand it to the completion
    /// collaborator.
    async fn finish_session(&mut self, events: &mut Vec<ControllerEvent>) -> Result<(), SessionError> {
        self.phase = ActivePhase::Idle;
        // Only a fully stored completion replaces the in-progress session; on
        // failure the last unit stays finished and "done" retries.
        let mut completed = self.session.clone();
        completed.complete(self.deps.clock.now())?;
        let summary = self.deps.recorder.summarize(&completed)?;
        self.deps.recorder.persist_summary(&summary).await?;
        self.deps
            .store
            .put_snapshot(completed.id(), &completed.snapshot())
            .await?;
        self.session = completed;
        tracing::info!(
            session = %self.session.id(),
            average_score = summary.average_score(),
            "session completed"
        );

        if let Err(err) = self.deps.completion.on_session_completed(&summary).await {
            tracing::warn!(session = %self.session.id(), error = %err, "completion handoff failed");
        }
        events.push(ControllerEvent::SessionCompleted { summary });
        Ok(())
    }

    /// Start the phase that belongs to the active step.
    fn enter_step(&mut self, events: &mut Vec<ControllerEvent>) {
        let unit = self.session.current_unit();
        let Some(step) = unit.active_step().copied() else {
            self.phase = ActivePhase::Idle;
            return;
        };

        self.phase = match step.kind {
            StepKind::Timed { duration_secs } => ActivePhase::Step(Countdown::start(duration_secs)),
            _ if step.report => {
                ActivePhase::ReportDwell(Countdown::start(self.policy.report_dwell_secs()))
            }
            StepKind::Gated { .. } | StepKind::Manual => ActivePhase::Idle,
        };

        events.push(ControllerEvent::StepStarted {
            unit: unit.index(),
            step: step.id,
            duration_secs: step.nominal_duration_secs(),
            resume_position_secs: unit.resume_position_secs(),
        });
        if step.report {
            if let Some(analysis) = unit.analysis() {
                events.push(ControllerEvent::ReportReady {
                    unit: unit.index(),
                    score: analysis.score,
                    provenance: analysis.provenance,
                    dwell_secs: self.policy.report_dwell_secs(),
                });
            }
        }
    }

    async fn run_analysis(&self) -> AnalysisResult {
        let request = AnalysisRequest::for_unit(self.session.id(), self.session.current_unit());
        match self.deps.analysis.analyze(&request).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(
                    session = %self.session.id(),
                    unit = request.unit_index,
                    error = %err,
                    "analysis failed; using fallback result"
                );
                AnalysisResult::fallback()
            }
        }
    }

    async fn ensure_content(&mut self) {
        if self.session.current_unit().content().is_some() {
            return;
        }
        let index = self.session.active_unit_index();
        let content = match self
            .deps
            .content
            .unit_content(&self.session.key(), index)
            .await
        {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(unit = index, error = %err, "content unavailable; using placeholder");
                UnitContent::placeholder(index, self.session.current_unit().response_policy())
            }
        };
        self.session.current_unit_mut().install_content(content);
    }

    async fn persist(&self) -> Result<(), SessionError> {
        self.deps
            .store
            .put_snapshot(self.session.id(), &self.session.snapshot())
            .await?;
        Ok(())
    }

    fn phase_countdown_mut(&mut self) -> Option<&mut Countdown> {
        match &mut self.phase {
            ActivePhase::Step(countdown)
            | ActivePhase::Break(countdown)
            | ActivePhase::ReportDwell(countdown) => Some(countdown),
            _ => None,
        }
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.session.is_completed() {
            return Err(SessionError::Completed);
        }
        Ok(())
    }

    fn not_applicable(&self, command: &'static str) -> SessionError {
        SessionError::InvalidCommand {
            command,
            phase: self.phase.name(),
        }
    }
}
