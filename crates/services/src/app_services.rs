use std::sync::Arc;

use learn_core::model::{Curriculum, DailyLimit};
use storage::repository::Storage;

use crate::credit_service::CreditService;
use crate::error::AppServicesError;
use crate::progress_service::ProgressService;
use crate::{Clock, DayBoundary};

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    credits: Arc<CreditService>,
    progress: Arc<ProgressService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        boundary: DayBoundary,
        limit: DailyLimit,
        curriculum: Curriculum,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(
            &storage, clock, boundary, limit, curriculum,
        ))
    }

    /// Build services over in-memory storage, for demos and tests.
    #[must_use]
    pub fn in_memory(
        clock: Clock,
        boundary: DayBoundary,
        limit: DailyLimit,
        curriculum: Curriculum,
    ) -> Self {
        Self::from_storage(&Storage::in_memory(), clock, boundary, limit, curriculum)
    }

    #[must_use]
    pub fn from_storage(
        storage: &Storage,
        clock: Clock,
        boundary: DayBoundary,
        limit: DailyLimit,
        curriculum: Curriculum,
    ) -> Self {
        let credits = Arc::new(CreditService::new(
            clock,
            boundary,
            limit,
            Arc::clone(&storage.kv),
        ));
        let progress = Arc::new(ProgressService::new(
            clock,
            Arc::new(curriculum),
            Arc::clone(&storage.completions),
        ));
        Self { credits, progress }
    }

    #[must_use]
    pub fn credits(&self) -> Arc<CreditService> {
        Arc::clone(&self.credits)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }
}
