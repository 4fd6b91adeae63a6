//! Shared error types for the services crate.

use thiserror::Error;

use recall_core::model::{SessionSnapshotError, SessionSummaryError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by an `AnalysisService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AnalysisError {
    #[error("analysis is not configured")]
    Disabled,
    #[error("analysis returned an empty response")]
    EmptyResponse,
    #[error("analysis response is malformed: {0}")]
    Malformed(String),
    #[error("analysis request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted by a `ContentProvider`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContentError {
    #[error("no content for unit {unit}")]
    Unavailable { unit: usize },
}

/// Errors emitted by a `SessionCompletionHandler`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompletionError {
    #[error("completion handoff rejected: {0}")]
    Rejected(String),
}

/// Errors emitted by the session controller and its services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session already completed")]
    Completed,
    #[error("`{command}` does not apply while {phase}")]
    InvalidCommand {
        command: &'static str,
        phase: &'static str,
    },
    #[error(transparent)]
    Snapshot(#[from] SessionSnapshotError),
    #[error(transparent)]
    Summary(#[from] SessionSummaryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}
