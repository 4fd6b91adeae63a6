use std::sync::Arc;

use recall_core::Clock;
use recall_core::model::{Session, SessionConfig, SessionId, SessionKey, SessionSummary, Unit};
use recall_core::policy::BranchPolicy;
use storage::repository::{
    SessionStore, SessionSummaryRepository, StorageError, UnitResultRecord, UnitResultRepository,
};

use super::controller::{SessionController, SessionDeps};
use super::recorder::ResultRecorder;
use crate::analysis_service::AnalysisService;
use crate::completion::SessionCompletionHandler;
use crate::content::ContentProvider;
use crate::error::SessionError;

/// Opens sessions: resumes the persisted one or starts fresh.
#[derive(Clone)]
pub struct SessionLoopService {
    deps: SessionDeps,
}

impl SessionLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        sessions: Arc<dyn SessionStore>,
        unit_results: Arc<dyn UnitResultRepository>,
        summaries: Arc<dyn SessionSummaryRepository>,
        content: Arc<dyn ContentProvider>,
        analysis: Arc<dyn AnalysisService>,
        completion: Arc<dyn SessionCompletionHandler>,
    ) -> Self {
        Self {
            deps: SessionDeps {
                clock,
                store: sessions,
                recorder: ResultRecorder::new(unit_results, summaries),
                content,
                analysis,
                completion,
            },
        }
    }

    #[must_use]
    pub fn deps(&self) -> &SessionDeps {
        &self.deps
    }

    /// Load the session for `key`, or create one from `config` when nothing
    /// usable is stored. Call [`SessionController::start`] before driving it.
    ///
    /// A snapshot that cannot be decoded, breaks the aggregate's invariants or
    /// belongs to a different flow is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the store cannot be read.
    pub async fn open(
        &self,
        key: SessionKey,
        config: &SessionConfig,
    ) -> Result<SessionController, SessionError> {
        let id = key.session_id();
        let session = match self.load(&id, config).await? {
            Some(session) => {
                tracing::info!(
                    session = %id,
                    unit = session.active_unit_index(),
                    step = session.current_unit().active_step_index(),
                    completed = session.is_completed(),
                    "session resumed"
                );
                session
            }
            None => {
                let units = (0..config.unit_count())
                    .map(|index| Unit::new(index, config.plan(), config.response_policy()))
                    .collect();
                let session = Session::new(key, config.flow(), units, self.deps.clock.now())?;
                tracing::info!(session = %id, flow = %config.flow(), "session created");
                session
            }
        };

        Ok(SessionController::new(
            session,
            BranchPolicy::from_config(config),
            self.deps.clone(),
        ))
    }

    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the read fails.
    pub async fn summary(&self, key: SessionKey) -> Result<Option<SessionSummary>, SessionError> {
        self.deps.recorder.summary(&key.session_id()).await
    }

    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the read fails.
    pub async fn unit_results(&self, key: SessionKey) -> Result<Vec<UnitResultRecord>, SessionError> {
        self.deps.recorder.unit_results(&key.session_id()).await
    }

    async fn load(
        &self,
        id: &SessionId,
        config: &SessionConfig,
    ) -> Result<Option<Session>, SessionError> {
        let snapshot = match self.deps.store.get_snapshot(id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(None),
            Err(StorageError::Serialization(reason)) => {
                tracing::warn!(session = %id, %reason, "discarding unreadable snapshot");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        if snapshot.flow != config.flow() {
            tracing::warn!(
                session = %id,
                stored = %snapshot.flow,
                requested = %config.flow(),
                "discarding snapshot of another flow"
            );
            return Ok(None);
        }

        match Session::from_snapshot(snapshot) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                tracing::warn!(session = %id, error = %err, "discarding inconsistent snapshot");
                Ok(None)
            }
        }
    }
}
