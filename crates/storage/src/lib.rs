#![forbid(unsafe_code)]

pub mod keys;
pub mod progress_cache;
pub mod repository;
pub mod sqlite;

pub use progress_cache::ProgressCache;
pub use repository::{InMemoryRepository, LocalStore, Storage, StorageError};
