use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::analysis_service::{AnalysisService, HttpAnalysisService};
use crate::completion::{LoggingCompletionHandler, SessionCompletionHandler};
use crate::content::{ContentProvider, StaticContentProvider};
use crate::error::AppServicesError;
use crate::sessions::SessionLoopService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    session_loop: Arc<SessionLoopService>,
    analysis_enabled: bool,
}

impl AppServices {
    /// Build services backed by `SQLite` storage, with analysis configured from
    /// the environment.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails or the HTTP
    /// client cannot be built.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        content: Arc<dyn ContentProvider>,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let analysis = HttpAnalysisService::from_env()?;
        let analysis_enabled = analysis.enabled();
        if !analysis_enabled {
            tracing::warn!("RECALL_AI_API_KEY not set; every unit will use the fallback analysis");
        }
        Ok(Self::from_parts(
            &storage,
            clock,
            content,
            Arc::new(analysis),
            Arc::new(LoggingCompletionHandler),
        )
        .with_analysis_enabled(analysis_enabled))
    }

    /// In-memory storage, placeholder content and the given analysis service.
    #[must_use]
    pub fn in_memory(clock: Clock, analysis: Arc<dyn AnalysisService>) -> Self {
        Self::from_parts(
            &Storage::in_memory(),
            clock,
            Arc::new(StaticContentProvider::default()),
            analysis,
            Arc::new(LoggingCompletionHandler),
        )
    }

    #[must_use]
    pub fn from_parts(
        storage: &Storage,
        clock: Clock,
        content: Arc<dyn ContentProvider>,
        analysis: Arc<dyn AnalysisService>,
        completion: Arc<dyn SessionCompletionHandler>,
    ) -> Self {
        let session_loop = Arc::new(SessionLoopService::new(
            clock,
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.unit_results),
            Arc::clone(&storage.summaries),
            content,
            analysis,
            completion,
        ));
        Self {
            session_loop,
            analysis_enabled: true,
        }
    }

    #[must_use]
    fn with_analysis_enabled(mut self, enabled: bool) -> Self {
        self.analysis_enabled = enabled;
        self
    }

    #[must_use]
    pub fn session_loop(&self) -> Arc<SessionLoopService> {
        Arc::clone(&self.session_loop)
    }

    /// False when the analysis service has no credentials.
    #[must_use]
    pub fn analysis_enabled(&self) -> bool {
        self.analysis_enabled
    }
}
