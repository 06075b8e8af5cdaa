//! Shared error types for the services crate.

use thiserror::Error;

use prep_core::quiz::QuizError as AttemptError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors talking to the progress or content service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    #[error("request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("base url cannot carry a path: {0}")]
    InvalidBaseUrl(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted by `SyncController`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error("topic {index} does not exist (subject has {len})")]
    UnknownTopic { index: usize, len: usize },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Errors emitted by `QuizSession`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizError {
    #[error("node {0:?} has no attached test")]
    NoTest(String),
    #[error("quiz already submitted")]
    AlreadySubmitted,
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Errors reading `SyncConfig` from the environment.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{var} is not a valid url: {source}")]
    InvalidUrl {
        var: &'static str,
        source: url::ParseError,
    },
    #[error("{var} must be a non-negative integer, got {raw:?}")]
    InvalidNumber { var: &'static str, raw: String },
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}
