#![forbid(unsafe_code)]

pub mod analysis_service;
pub mod app_services;
pub mod completion;
pub mod content;
pub mod error;
pub mod sessions;

pub use recall_core::Clock;
pub use sessions as session;

pub use analysis_service::{AnalysisConfig, AnalysisRequest, AnalysisService, HttpAnalysisService};
pub use app_services::AppServices;
pub use completion::{LoggingCompletionHandler, SessionCompletionHandler};
pub use content::{ContentProvider, StaticContentProvider};
pub use error::{AnalysisError, AppServicesError, CompletionError, ContentError, SessionError};

pub use sessions::{
    ActivePhase, Command, ControllerEvent, PendingDecision, ResultRecorder, RunnerOutput,
    SessionController, SessionLoopService, SessionProgress, SessionRunner,
};
