pub mod curriculum;
mod ids;
mod progress;
mod subject;

pub use curriculum::{
    ASSESSMENT_PREFIX, CurriculumNode, Question, Test, assessment_key, parse_units,
};
pub use ids::{Course, ParseIdError, ProgressKey, ProgressScope, Standard, UserId};
pub use progress::{
    CompletedSubtopics, CompletionState, DOT_SENTINEL, MergeReport, TopicProgress, escape_key,
    unescape_key,
};
pub use subject::{SubjectCompletion, SubjectCompletions};
