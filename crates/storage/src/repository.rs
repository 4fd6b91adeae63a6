use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recall_core::model::{
    AnalysisResult, CapturedResponse, ResponseSlot, SessionId, SessionSnapshot, SessionSummary,
    Unit,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persisted outcome of one unit, overwritten when the unit is resubmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitResultRecord {
    pub session_id: SessionId,
    pub unit_index: usize,
    pub attempt: u32,
    pub responses: BTreeMap<ResponseSlot, CapturedResponse>,
    pub analysis: Option<AnalysisResult>,
    pub recorded_at: DateTime<Utc>,
}

impl UnitResultRecord {
    #[must_use]
    pub fn from_unit(session_id: &SessionId, unit: &Unit, recorded_at: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.clone(),
            unit_index: unit.index(),
            attempt: unit.attempts(),
            responses: unit.responses().clone(),
            analysis: unit.analysis().cloned(),
            recorded_at,
        }
    }
}

/// Summary with its storage id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummaryRow {
    pub id: i64,
    pub summary: SessionSummary,
}

impl SessionSummaryRow {
    #[must_use]
    pub fn new(id: i64, summary: SessionSummary) -> Self {
        Self { id, summary }
    }
}

/// Durable key/value store for whole-session snapshots.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the last snapshot written for `id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the stored payload cannot be decoded,
    /// or other storage errors.
    async fn get_snapshot(&self, id: &SessionId) -> Result<Option<SessionSnapshot>, StorageError>;

    /// Replace the snapshot stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be stored.
    async fn put_snapshot(
        &self,
        id: &SessionId,
        snapshot: &SessionSnapshot,
    ) -> Result<(), StorageError>;
}

#[async_trait]
pub trait UnitResultRepository: Send + Sync {
    /// Insert or overwrite the result for `(session_id, unit_index)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn upsert_unit_result(&self, record: &UnitResultRecord) -> Result<(), StorageError>;

    /// All unit results for a session ordered by unit index.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the records cannot be read.
    async fn list_unit_results(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<UnitResultRecord>, StorageError>;
}

#[async_trait]
pub trait SessionSummaryRepository: Send + Sync {
    /// Store the summary of a completed session. Saving the same session twice
    /// keeps the first summary and returns its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the summary cannot be stored.
    async fn save_summary(&self, summary: &SessionSummary) -> Result<i64, StorageError>;

    /// Fetch a summary by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_summary(&self, id: i64) -> Result<SessionSummary, StorageError>;

    /// Fetch the summary saved for a session, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the summary cannot be read.
    async fn summary_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionSummaryRow>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Snapshots are kept as JSON text so decoding behaves like the `SQLite` backend.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    snapshots: Arc<Mutex<HashMap<SessionId, String>>>,
    unit_results: Arc<Mutex<BTreeMap<(SessionId, usize), UnitResultRecord>>>,
    summaries: Arc<Mutex<Vec<SessionSummary>>>,
    snapshot_writes: Arc<Mutex<usize>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an arbitrary payload as a snapshot, bypassing encoding.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn put_raw_snapshot(&self, id: &SessionId, payload: &str) -> Result<(), StorageError> {
        let mut guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(id.clone(), payload.to_owned());
        Ok(())
    }

    /// Number of snapshot writes so far.
    #[must_use]
    pub fn snapshot_writes(&self) -> usize {
        self.snapshot_writes.lock().map(|n| *n).unwrap_or(0)
    }
}

#[async_trait]
impl SessionStore for InMemoryRepository {
    async fn get_snapshot(&self, id: &SessionId) -> Result<Option<SessionSnapshot>, StorageError> {
        let guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .get(id)
            .map(|payload| {
                serde_json::from_str(payload)
                    .map_err(|e| StorageError::Serialization(e.to_string()))
            })
            .transpose()
    }

    async fn put_snapshot(
        &self,
        id: &SessionId,
        snapshot: &SessionSnapshot,
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_string(snapshot)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.put_raw_snapshot(id, &payload)?;
        let mut writes = self
            .snapshot_writes
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *writes += 1;
        Ok(())
    }
}

#[async_trait]
impl UnitResultRepository for InMemoryRepository {
    async fn upsert_unit_result(&self, record: &UnitResultRecord) -> Result<(), StorageError> {
        let mut guard = self
            .unit_results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(
            (record.session_id.clone(), record.unit_index),
            record.clone(),
        );
        Ok(())
    }

    async fn list_unit_results(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<UnitResultRecord>, StorageError> {
        let guard = self
            .unit_results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .iter()
            .filter(|((id, _), _)| id == session_id)
            .map(|(_, record)| record.clone())
            .collect())
    }
}

#[async_trait]
impl SessionSummaryRepository for InMemoryRepository {
    async fn save_summary(&self, summary: &SessionSummary) -> Result<i64, StorageError> {
        let mut guard = self
            .summaries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let position = match guard
            .iter()
            .position(|s| s.session_id() == summary.session_id())
        {
            Some(position) => position,
            None => {
                guard.push(summary.clone());
                guard.len() - 1
            }
        };
        i64::try_from(position + 1).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn get_summary(&self, id: i64) -> Result<SessionSummary, StorageError> {
        let guard = self
            .summaries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        usize::try_from(id - 1)
            .ok()
            .and_then(|idx| guard.get(idx).cloned())
            .ok_or(StorageError::NotFound)
    }

    async fn summary_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionSummaryRow>, StorageError> {
        let guard = self
            .summaries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .iter()
            .position(|s| s.session_id() == session_id)
            .map(|idx| {
                let id = i64::try_from(idx + 1)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(SessionSummaryRow::new(id, guard[idx].clone()))
            })
            .transpose()
    }
}

/// Aggregates the session repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionStore>,
    pub unit_results: Arc<dyn UnitResultRepository>,
    pub summaries: Arc<dyn SessionSummaryRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_in_memory(&InMemoryRepository::new())
    }

    /// Wrap an existing in-memory repository so callers can keep a handle to it.
    #[must_use]
    pub fn from_in_memory(repo: &InMemoryRepository) -> Self {
        let sessions: Arc<dyn SessionStore> = Arc::new(repo.clone());
        let unit_results: Arc<dyn UnitResultRepository> = Arc::new(repo.clone());
        let summaries: Arc<dyn SessionSummaryRepository> = Arc::new(repo.clone());
        Self {
            sessions,
            unit_results,
            summaries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::model::{
        AnalysisResult, PayloadRef, Session, SessionConfig, SessionKey, UnitScore,
    };
    use recall_core::time::fixed_now;

    fn session() -> Session {
        let config = SessionConfig::default_drill();
        let units = (0..config.unit_count())
            .map(|i| Unit::new(i, config.plan(), config.response_policy()))
            .collect();
        Session::new(
            SessionKey::part(1, 2, 3),
            config.flow(),
            units,
            fixed_now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn snapshot_round_trips() {
        let repo = InMemoryRepository::new();
        let session = session();
        let snapshot = session.snapshot();

        assert!(repo.get_snapshot(session.id()).await.unwrap().is_none());
        repo.put_snapshot(session.id(), &snapshot).await.unwrap();

        let fetched = repo.get_snapshot(session.id()).await.unwrap().unwrap();
        assert_eq!(fetched, snapshot);
        assert_eq!(repo.snapshot_writes(), 1);
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_a_serialization_error() {
        let repo = InMemoryRepository::new();
        let id = SessionKey::part(1, 1, 1).session_id();
        repo.put_raw_snapshot(&id, "{not json").unwrap();
        assert!(matches!(
            repo.get_snapshot(&id).await,
            Err(StorageError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn unit_results_overwrite_per_unit() {
        let repo = InMemoryRepository::new();
        let mut session = session();
        let id = session.id().clone();
        let unit = session.current_unit_mut();
        unit.capture_response(
            ResponseSlot::Before,
            CapturedResponse::audio(PayloadRef::new("a"), 320, fixed_now()),
        );
        repo.upsert_unit_result(&UnitResultRecord::from_unit(&id, unit, fixed_now()))
            .await
            .unwrap();

        unit.reset_for_retake();
        unit.set_analysis(AnalysisResult::fallback());
        repo.upsert_unit_result(&UnitResultRecord::from_unit(&id, unit, fixed_now()))
            .await
            .unwrap();

        let records = repo.list_unit_results(&id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attempt, 2);
        assert!(records[0].responses.is_empty());
        assert!(records[0].analysis.is_some());
    }

    #[tokio::test]
    async fn summary_saved_once_per_session() {
        let repo = InMemoryRepository::new();
        let id = SessionKey::part(1, 1, 1).session_id();
        let summary = SessionSummary::from_persisted(
            id.clone(),
            fixed_now(),
            fixed_now(),
            vec![UnitScore {
                unit_index: 0,
                score: 70,
                provenance: recall_core::model::Provenance::AiGenerated,
                attempts: 1,
            }],
        )
        .unwrap();

        let first = repo.save_summary(&summary).await.unwrap();
        let second = repo.save_summary(&summary).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(repo.get_summary(first).await.unwrap(), summary);
        let row = repo.summary_for_session(&id).await.unwrap().unwrap();
        assert_eq!(row.id, first);
    }
}
