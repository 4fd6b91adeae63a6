mod analysis;
mod analysis_settings;
mod config;
mod content;
mod ids;
mod response;
mod session;
mod step;
mod summary;
mod unit;

pub use analysis::{AnalysisResult, FALLBACK_SCORE, Provenance};
pub use analysis_settings::{AnalysisSettings, AnalysisSettingsDraft, AnalysisSettingsError};
pub use config::{BreakCheckpoint, SessionConfig, SessionConfigDraft, SessionConfigError};
pub use content::UnitContent;
pub use ids::{ParseIdError, PayloadRef, SessionId, SessionKey};
pub use response::{
    CapturedResponse, GateViolation, MinimumContentPolicy, ResponseBody, ResponseKind,
    ResponseSlot,
};
pub use session::{Session, SessionSnapshot, SessionSnapshotError, SessionStatus};
pub use step::{
    SessionFlow, StepId, StepKind, StepSpec, analysis_trigger_index, first_capture_index,
};
pub use summary::{SessionSummary, SessionSummaryError, UnitScore};
pub use unit::Unit;
