//! Shared error types for the services crate.

use chrono::{DateTime, Utc};
use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `CreditService`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CreditError {
    /// Recoverable: retry after `reset_at`.
    #[error("daily credits used up; more available at {reset_at}")]
    QuotaExceeded { reset_at: DateTime<Utc> },
}

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error("week {0} is not part of the curriculum")]
    UnknownWeek(u32),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
