use std::sync::Arc;

use chrono::{DateTime, Utc};
use recall_core::model::{Session, SessionId, SessionSummary, Unit};
use storage::repository::{SessionSummaryRepository, UnitResultRecord, UnitResultRepository};

use crate::error::SessionError;

/// Writes unit outcomes and the final summary.
///
/// A unit's record is keyed by session and unit index, so a resubmission
/// overwrites the previous attempt.
#[derive(Clone)]
pub struct ResultRecorder {
    unit_results: Arc<dyn UnitResultRepository>,
    summaries: Arc<dyn SessionSummaryRepository>,
}

impl ResultRecorder {
    #[must_use]
    pub fn new(
        unit_results: Arc<dyn UnitResultRepository>,
        summaries: Arc<dyn SessionSummaryRepository>,
    ) -> Self {
        Self {
            unit_results,
            summaries,
        }
    }

    /// Persist the unit's responses and analysis.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the write fails.
    pub async fn record(
        &self,
        session_id: &SessionId,
        unit: &Unit,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let record = UnitResultRecord::from_unit(session_id, unit, recorded_at);
        self.unit_results.upsert_unit_result(&record).await?;
        tracing::debug!(
            session = %session_id,
            unit = unit.index(),
            attempt = unit.attempts(),
            "unit result recorded"
        );
        Ok(())
    }

    /// Build the aggregate handed to the completion collaborator.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Summary` if the session is not completed or a unit
    /// was never scored.
    pub fn summarize(&self, session: &Session) -> Result<SessionSummary, SessionError> {
        Ok(SessionSummary::from_session(session)?)
    }

    /// Store the summary; repeated calls for one session keep the first row.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the write fails.
    pub async fn persist_summary(&self, summary: &SessionSummary) -> Result<i64, SessionError> {
        Ok(self.summaries.save_summary(summary).await?)
    }

    /// Stored unit records for a session, ordered by unit.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the read fails.
    pub async fn unit_results(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<UnitResultRecord>, SessionError> {
        Ok(self.unit_results.list_unit_results(session_id).await?)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the read fails.
    pub async fn summary(&self, session_id: &SessionId) -> Result<Option<SessionSummary>, SessionError> {
        Ok(self
            .summaries
            .summary_for_session(session_id)
            .await?
            .map(|row| row.summary))
    }
}
