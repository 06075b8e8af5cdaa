use crate::matching::{find_completed, find_completed_lesson};
use crate::model::{CompletedSubtopics, CurriculumNode, ProgressScope, TopicProgress, assessment_key};
use crate::traversal::{TestLeaf, collect_leaves, collect_tests};

/// Rounded percentage, clamped to 0..=100. Zero total yields 0.
#[must_use]
pub fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = (completed.min(total) as f64) * 100.0 / (total as f64);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rounded = ratio.round().clamp(0.0, 100.0) as u8;
    rounded
}

/// True if the lesson is credited in `progress`, by id, name or fuzzy match.
#[must_use]
pub fn is_leaf_complete(leaf: &CurriculumNode, progress: &TopicProgress) -> bool {
    let mut candidates = vec![leaf.leaf_key()];
    if leaf.leaf_key() != leaf.unit_name {
        candidates.push(leaf.unit_name.as_str());
    }
    find_completed_lesson(progress, &candidates).is_some()
}

/// True if the assessment is credited under its test name, its owner's name
/// or the enclosing topic's name.
#[must_use]
pub fn is_test_complete(
    test: &TestLeaf<'_>,
    topic: &CurriculumNode,
    progress: &TopicProgress,
) -> bool {
    let mut names = vec![
        assessment_key(&test.test.test_name),
        test.name(),
        assessment_key(&topic.unit_name),
    ];
    names.dedup();
    let candidates: Vec<&str> = names.iter().map(String::as_str).collect();
    find_completed(progress, &candidates).is_some()
}

/// Completed and total leaf counts of a topic.
#[must_use]
pub fn topic_counts(topic: &CurriculumNode, progress: Option<&TopicProgress>) -> (usize, usize) {
    let leaves = collect_leaves(topic);
    let tests = collect_tests(topic);
    let total = leaves.len() + tests.len();

    let Some(progress) = progress.filter(|p| !p.is_empty()) else {
        return (0, total);
    };

    let lessons_done = leaves
        .iter()
        .filter(|leaf| is_leaf_complete(leaf, progress))
        .count();
    let tests_done = tests
        .iter()
        .filter(|test| is_test_complete(test, topic, progress))
        .count();
    (lessons_done + tests_done, total)
}

/// Completion percentage of one topic from its bucket.
#[must_use]
pub fn calculate_topic_progress(topic: &CurriculumNode, progress: Option<&TopicProgress>) -> u8 {
    let (completed, total) = topic_counts(topic, progress);
    percent(completed, total)
}

/// Per-topic percentages of a subject, in topic order.
#[must_use]
pub fn topic_percentages(
    topics: &[CurriculumNode],
    scope: &ProgressScope,
    store: &CompletedSubtopics,
) -> Vec<u8> {
    topics
        .iter()
        .map(|topic| calculate_topic_progress(topic, store.topic(&scope.key_for(topic))))
        .collect()
}

/// Mean of the topic percentages, rounded. An empty subject is 0.
#[must_use]
pub fn calculate_subject_progress(
    topics: &[CurriculumNode],
    scope: &ProgressScope,
    store: &CompletedSubtopics,
) -> u8 {
    let per_topic = topic_percentages(topics, scope, store);
    let sum: usize = per_topic.iter().map(|p| usize::from(*p)).sum();
    percent(sum, per_topic.len() * 100)
}

/// True if the subject has topics and every one is at 100%.
#[must_use]
pub fn is_subject_complete(
    topics: &[CurriculumNode],
    scope: &ProgressScope,
    store: &CompletedSubtopics,
) -> bool {
    !topics.is_empty()
        && topic_percentages(topics, scope, store)
            .iter()
            .all(|p| *p == 100)
}
