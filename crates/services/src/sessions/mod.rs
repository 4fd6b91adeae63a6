mod controller;
mod phase;
mod progress;
mod recorder;
mod runner;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use controller::{Events, SessionController, SessionDeps};
pub use phase::{ActivePhase, ControllerEvent, PendingDecision};
pub use progress::SessionProgress;
pub use recorder::ResultRecorder;
pub use runner::{Command, RunnerOutput, SessionRunner};
pub use workflow::SessionLoopService;
