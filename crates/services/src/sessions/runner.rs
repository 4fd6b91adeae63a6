use std::time::Duration;

use recall_core::model::{CapturedResponse, ResponseSlot};
use recall_core::policy::Choice;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use super::controller::{Events, SessionController};
use super::phase::ControllerEvent;
use crate::error::SessionError;

/// User input fed to a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// "Done" / "Continue" on the active step or report.
    Done,
    Submit {
        slot: ResponseSlot,
        response: CapturedResponse,
    },
    Extension(Choice),
    Break(Choice),
    SkipBreak,
    Retake,
    PlaybackPosition(u32),
}

/// What the runner hands back to the UI.
#[derive(Debug)]
pub enum RunnerOutput {
    Event(ControllerEvent),
    /// A command was refused or a transition failed; the session keeps running.
    Rejected(SessionError),
}

/// Owns a controller and drives it from a one-second interval and a command
/// channel on a single task.
///
/// The loop ends when the session completes, or when the command sender is
/// dropped (navigating away). The last snapshot stays in the store either way.
pub struct SessionRunner {
    controller: SessionController,
    commands: mpsc::Receiver<Command>,
    output: mpsc::Sender<RunnerOutput>,
}

impl SessionRunner {
    #[must_use]
    pub fn new(
        controller: SessionController,
        commands: mpsc::Receiver<Command>,
        output: mpsc::Sender<RunnerOutput>,
    ) -> Self {
        Self {
            controller,
            commands,
            output,
        }
    }

    /// Build a runner with fresh channels of the given capacity.
    #[must_use]
    pub fn channel(
        controller: SessionController,
        buffer: usize,
    ) -> (Self, mpsc::Sender<Command>, mpsc::Receiver<RunnerOutput>) {
        let (command_tx, command_rx) = mpsc::channel(buffer);
        let (output_tx, output_rx) = mpsc::channel(buffer);
        (Self::new(controller, command_rx, output_tx), command_tx, output_rx)
    }

    /// Run until completion or until the command channel closes, then hand the
    /// controller back.
    pub async fn run(mut self) -> SessionController {
        let mut interval = time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        let started = self.controller.start().await;
        if !self.forward(started).await {
            return self.controller;
        }
        interval.reset();

        while !self.controller.is_completed() {
            let result = tokio::select! {
                _ = interval.tick() => self.controller.tick().await,
                command = self.commands.recv() => match command {
                    Some(command) => self.controller.apply(command).await,
                    None => {
                        tracing::debug!(
                            session = %self.controller.session().id(),
                            "command channel closed; leaving session"
                        );
                        break;
                    }
                },
            };
            // A countdown begun between two ticks gets a full first second.
            if restarts_countdown(&result) {
                interval.reset();
            }
            if !self.forward(result).await {
                break;
            }
        }
        self.controller
    }

    /// Returns `false` once nobody is listening.
    async fn forward(&self, result: Events) -> bool {
        match result {
            Ok(events) => {
                for event in events {
                    if self.output.send(RunnerOutput::Event(event)).await.is_err() {
                        return false;
                    }
                }
                true
            }
            Err(err) => {
                tracing::debug!(error = %err, "command rejected");
                self.output.send(RunnerOutput::Rejected(err)).await.is_ok()
            }
        }
    }
}

fn restarts_countdown(result: &Events) -> bool {
    result.as_ref().is_ok_and(|events| {
        events.iter().any(|event| {
            matches!(
                event,
                ControllerEvent::StepStarted { .. }
                    | ControllerEvent::BreakStarted { .. }
                    | ControllerEvent::Extended { .. }
            )
        })
    })
}
