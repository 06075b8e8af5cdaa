use std::sync::Arc;

use prep_core::model::{Course, CurriculumNode, ProgressScope, Standard, UserId};
use storage::ProgressCache;
use storage::repository::Storage;

use crate::Clock;
use crate::config::SyncConfig;
use crate::error::{AppServicesError, RemoteError};
use crate::remote::{ApiClient, ContentSource, RemoteProgress};
use crate::sync::{ProgressBus, SyncContext, SyncController};

/// Assembles the storage, HTTP clients and event bus the app works with.
#[derive(Clone)]
pub struct AppServices {
    ctx: SyncContext,
    content: Arc<dyn ContentSource>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage and the HTTP API named in
    /// `config`.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        config: SyncConfig,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let api = Arc::new(ApiClient::new(config.base_url.clone()));
        Ok(Self::from_parts(
            &storage,
            Arc::clone(&api) as Arc<dyn RemoteProgress>,
            api,
            config,
            clock,
        ))
    }

    /// Wire services from explicit collaborators (tests, alternative backends).
    #[must_use]
    pub fn from_parts(
        storage: &Storage,
        remote: Arc<dyn RemoteProgress>,
        content: Arc<dyn ContentSource>,
        config: SyncConfig,
        clock: Clock,
    ) -> Self {
        Self {
            ctx: SyncContext::new(
                clock,
                ProgressCache::new(Arc::clone(&storage.local)),
                remote,
                config,
                ProgressBus::new(),
            ),
            content,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.ctx.config
    }

    #[must_use]
    pub fn bus(&self) -> &ProgressBus {
        &self.ctx.bus
    }

    /// Fetch the topics of one subject.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the content service cannot be reached.
    pub async fn fetch_curriculum(
        &self,
        course: Course,
        subject: &str,
        standard: Standard,
    ) -> Result<Vec<CurriculumNode>, RemoteError> {
        self.content.fetch_units(course, subject, standard).await
    }

    /// A controller for `scope` that has not loaded yet.
    #[must_use]
    pub fn controller(
        &self,
        user: UserId,
        scope: ProgressScope,
        topics: Vec<CurriculumNode>,
    ) -> SyncController {
        SyncController::new(user, scope, topics, self.ctx.clone())
    }

    /// Fetch a subject's curriculum and load its progress.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Remote` if the curriculum cannot be fetched.
    /// Progress load failures fall back to local data instead.
    pub async fn open_subject(
        &self,
        user: UserId,
        scope: ProgressScope,
    ) -> Result<SyncController, AppServicesError> {
        let topics = self
            .fetch_curriculum(scope.course, &scope.subject, scope.standard)
            .await?;
        let controller = self.controller(user, scope, topics);
        controller.load().await;
        Ok(controller)
    }
}
