#![forbid(unsafe_code)]

pub mod app_services;
pub mod config;
pub mod debounce;
pub mod error;
pub mod quiz;
pub mod remote;
pub mod retry;
pub mod sync;

pub use prep_core::Clock;

pub use app_services::AppServices;
pub use config::SyncConfig;
pub use error::{AppServicesError, ConfigError, QuizError, RemoteError, SyncError};
pub use quiz::{QuizCountdown, QuizSession};
pub use remote::{ApiClient, ContentSource, RemoteProgress, RemoteSnapshot, SaveProgress};
pub use sync::{LoadOutcome, ProgressBus, ProgressEvent, SyncContext, SyncController, SyncPhase};
