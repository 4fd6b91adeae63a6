use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::analysis::Provenance;
use crate::model::ids::SessionId;
use crate::model::session::Session;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionSummaryError {
    #[error("session is not completed")]
    NotCompleted,

    #[error("completed_at is before started_at")]
    InvalidTimeRange,

    #[error("unit {unit} has no analysis")]
    MissingAnalysis { unit: usize },
}

/// Per-unit line of a session summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitScore {
    pub unit_index: usize,
    pub score: u8,
    pub provenance: Provenance,
    pub attempts: u32,
}

/// Aggregate handed to the daily-summary collaborator when a session completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    session_id: SessionId,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    unit_scores: Vec<UnitScore>,
}

impl SessionSummary {
    /// Rehydrate a summary from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionSummaryError::InvalidTimeRange` if the timestamps are inverted.
    pub fn from_persisted(
        session_id: SessionId,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        unit_scores: Vec<UnitScore>,
    ) -> Result<Self, SessionSummaryError> {
        if completed_at < started_at {
            return Err(SessionSummaryError::InvalidTimeRange);
        }
        Ok(Self {
            session_id,
            started_at,
            completed_at,
            unit_scores,
        })
    }

    /// Build a summary from a completed session.
    ///
    /// # Errors
    ///
    /// Returns `SessionSummaryError::NotCompleted` for a session still in progress and
    /// `SessionSummaryError::MissingAnalysis` if any unit was never scored.
    pub fn from_session(session: &Session) -> Result<Self, SessionSummaryError> {
        let completed_at = session
            .completed_at()
            .ok_or(SessionSummaryError::NotCompleted)?;

        let unit_scores = session
            .units()
            .iter()
            .map(|unit| {
                let analysis = unit.analysis().ok_or(SessionSummaryError::MissingAnalysis {
                    unit: unit.index(),
                })?;
                Ok(UnitScore {
                    unit_index: unit.index(),
                    score: analysis.score,
                    provenance: analysis.provenance,
                    attempts: unit.attempts(),
                })
            })
            .collect::<Result<Vec<_>, SessionSummaryError>>()?;

        Self::from_persisted(
            session.id().clone(),
            session.started_at(),
            completed_at,
            unit_scores,
        )
    }

    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    #[must_use]
    pub fn unit_scores(&self) -> &[UnitScore] {
        &self.unit_scores
    }

    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.unit_scores.len()
    }

    /// Mean score across units, rounded down; zero for an empty summary.
    #[must_use]
    pub fn average_score(&self) -> u8 {
        if self.unit_scores.is_empty() {
            return 0;
        }
        let total: u32 = self.unit_scores.iter().map(|s| u32::from(s.score)).sum();
        let count = u32::try_from(self.unit_scores.len()).unwrap_or(u32::MAX);
        u8::try_from(total / count).unwrap_or(u8::MAX)
    }

    /// Units scored from the fallback template rather than the analysis service.
    #[must_use]
    pub fn fallback_count(&self) -> usize {
        self.unit_scores
            .iter()
            .filter(|s| s.provenance == Provenance::FallbackTemplate)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::SessionKey;
    use crate::time::fixed_now;

    fn score(unit_index: usize, score: u8, provenance: Provenance) -> UnitScore {
        UnitScore {
            unit_index,
            score,
            provenance,
            attempts: 1,
        }
    }

    #[test]
    fn summary_averages_scores_and_counts_fallbacks() {
        let summary = SessionSummary::from_persisted(
            SessionKey::part(1, 1, 1).session_id(),
            fixed_now(),
            fixed_now(),
            vec![
                score(0, 80, Provenance::AiGenerated),
                score(1, 50, Provenance::FallbackTemplate),
                score(2, 71, Provenance::AiGenerated),
            ],
        )
        .unwrap();

        assert_eq!(summary.unit_count(), 3);
        assert_eq!(summary.average_score(), 67);
        assert_eq!(summary.fallback_count(), 1);
    }

    #[test]
    fn inverted_time_range_is_rejected() {
        let err = SessionSummary::from_persisted(
            SessionKey::part(1, 1, 1).session_id(),
            fixed_now(),
            fixed_now() - chrono::Duration::seconds(1),
            Vec::new(),
        )
        .unwrap_err();
        assert_eq!(err, SessionSummaryError::InvalidTimeRange);
    }
}
