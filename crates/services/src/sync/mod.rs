//! Keeps one subject's progress consistent between memory, the device cache
//! and the remote progress service.

mod controller;
mod events;

pub use controller::{LoadOutcome, SyncContext, SyncController, SyncPhase};
pub use events::{ProgressBus, ProgressEvent};
