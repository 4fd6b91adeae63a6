use async_trait::async_trait;
use recall_core::model::SessionSummary;

use crate::error::CompletionError;

/// Receives the summary once, when a session transitions to completed.
#[async_trait]
pub trait SessionCompletionHandler: Send + Sync {
    /// # Errors
    ///
    /// Returns `CompletionError` if the handoff fails. The session stays completed.
    async fn on_session_completed(&self, summary: &SessionSummary) -> Result<(), CompletionError>;
}

/// Logs the summary and does nothing else.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingCompletionHandler;

#[async_trait]
impl SessionCompletionHandler for LoggingCompletionHandler {
    async fn on_session_completed(&self, summary: &SessionSummary) -> Result<(), CompletionError> {
        tracing::info!(
            session = %summary.session_id(),
            units = summary.unit_count(),
            average_score = summary.average_score(),
            fallbacks = summary.fallback_count(),
            "session completed"
        );
        Ok(())
    }
}
