//! Names of the locally persisted entries.
//!
//! These strings are shared with earlier clients that wrote the same cache,
//! so their shape must not change.

use prep_core::model::{Course, Standard, UserId};

/// `completedSubtopics_{userId}_{course}_{standard}`
#[must_use]
pub fn completed_subtopics_key(user: &UserId, course: Course, standard: Standard) -> String {
    format!("completedSubtopics_{user}_{course}_{standard}")
}

/// `subjectCompletion_{course}_{standard}`
#[must_use]
pub fn subject_completion_key(course: Course, standard: Standard) -> String {
    format!("subjectCompletion_{course}_{standard}")
}
