use crate::model::{CompletedSubtopics, CurriculumNode, ProgressScope, TopicProgress};
use crate::percent::{calculate_topic_progress, is_leaf_complete, is_test_complete};
use crate::traversal::{EntryKind, NavEntry, TestLeaf, flatten_navigable};

/// Whether navigation is gated on prerequisites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Gating {
    #[default]
    Enforced,
    /// Everything is navigable (content review, development).
    Disabled,
}

/// Decides which topics and leaves of one subject are navigable.
pub struct UnlockEvaluator<'a> {
    topics: &'a [CurriculumNode],
    scope: &'a ProgressScope,
    store: &'a CompletedSubtopics,
    gating: Gating,
    order: Vec<NavEntry<'a>>,
}

impl<'a> UnlockEvaluator<'a> {
    #[must_use]
    pub fn new(
        topics: &'a [CurriculumNode],
        scope: &'a ProgressScope,
        store: &'a CompletedSubtopics,
    ) -> Self {
        Self {
            topics,
            scope,
            store,
            gating: Gating::Enforced,
            order: flatten_navigable(topics),
        }
    }

    #[must_use]
    pub fn with_gating(mut self, gating: Gating) -> Self {
        self.gating = gating;
        self
    }

    /// The linear navigation order this evaluator gates.
    #[must_use]
    pub fn entries(&self) -> &[NavEntry<'a>] {
        &self.order
    }

    fn topic_bucket(&self, topic: &CurriculumNode) -> Option<&'a TopicProgress> {
        self.store.topic(&self.scope.key_for(topic))
    }

    #[must_use]
    pub fn topic_progress(&self, topic_index: usize) -> u8 {
        self.topics.get(topic_index).map_or(0, |topic| {
            calculate_topic_progress(topic, self.topic_bucket(topic))
        })
    }

    /// Topic 0 is always open; topic `i` opens once topic `i - 1` is at 100%.
    /// An index past the end is locked.
    #[must_use]
    pub fn is_topic_unlocked(&self, topic_index: usize) -> bool {
        if self.gating == Gating::Disabled || topic_index == 0 {
            return true;
        }
        if topic_index >= self.topics.len() {
            return false;
        }
        self.topic_progress(topic_index - 1) == 100
    }

    /// True if the entry is credited in its owning topic's bucket.
    #[must_use]
    pub fn is_entry_complete(&self, entry: &NavEntry<'_>) -> bool {
        let Some(topic) = self.topics.get(entry.topic_index) else {
            return false;
        };
        let Some(progress) = self.topic_bucket(topic) else {
            return false;
        };
        match entry.kind {
            EntryKind::Lesson => is_leaf_complete(entry.node, progress),
            EntryKind::Test => match entry.node.attached_test() {
                Some(test) => is_test_complete(
                    &TestLeaf {
                        owner: entry.node,
                        test,
                    },
                    topic,
                    progress,
                ),
                None => false,
            },
        }
    }

    fn position(&self, target: &str) -> Option<usize> {
        self.order.iter().position(|entry| entry.answers_to(target))
    }

    /// The first entry is always open; any other opens once its predecessor
    /// in the navigation order is complete.
    ///
    /// A name missing from the order is reported unlocked so content drift
    /// can never strand a student.
    #[must_use]
    pub fn is_leaf_unlocked(&self, target: &str) -> bool {
        if self.gating == Gating::Disabled {
            return true;
        }
        match self.position(target) {
            Some(0) => true,
            Some(pos) => self.is_entry_complete(&self.order[pos - 1]),
            None => {
                tracing::debug!(leaf = target, scope = %self.scope, "unknown leaf, failing open");
                true
            }
        }
    }

    /// The entry after `current`, if any.
    #[must_use]
    pub fn next_entry(&self, current: &str) -> Option<&NavEntry<'a>> {
        self.position(current).and_then(|pos| self.order.get(pos + 1))
    }

    /// The entry before `current`, if any.
    #[must_use]
    pub fn previous_entry(&self, current: &str) -> Option<&NavEntry<'a>> {
        self.position(current)
            .and_then(|pos| pos.checked_sub(1))
            .and_then(|pos| self.order.get(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Course, Standard, Test};
    use crate::time::fixed_now;

    fn scope() -> ProgressScope {
        ProgressScope::new(Course::Neet, Standard::Eleventh, "Biology")
    }

    fn topics() -> Vec<CurriculumNode> {
        vec![
            CurriculumNode::branch(
                "Unit 1",
                vec![
                    CurriculumNode::lesson("L1"),
                    CurriculumNode::lesson("L2"),
                    CurriculumNode::lesson("L3"),
                ],
            ),
            CurriculumNode::branch("Unit 2", vec![CurriculumNode::lesson("M1")])
                .with_test(Test::new("Unit 2 Test", Vec::new())),
        ]
    }

    fn mark(store: &mut CompletedSubtopics, topic: &CurriculumNode, leaf: &str) {
        store.mark_leaf_complete(scope().key_for(topic), leaf, fixed_now());
    }

    #[test]
    fn completing_unit_one_unlocks_unit_two() {
        let topics = topics();
        let scope = scope();
        let mut store = CompletedSubtopics::new();
        mark(&mut store, &topics[0], "L1");
        mark(&mut store, &topics[0], "L2");

        let eval = UnlockEvaluator::new(&topics, &scope, &store);
        assert_eq!(eval.topic_progress(0), 67);
        assert!(eval.is_topic_unlocked(0));
        assert!(!eval.is_topic_unlocked(1));

        mark(&mut store, &topics[0], "L3");
        let eval = UnlockEvaluator::new(&topics, &scope, &store);
        assert_eq!(eval.topic_progress(0), 100);
        assert!(eval.is_topic_unlocked(1));
    }

    #[test]
    fn lesson_quiz_opens_after_its_lesson() {
        let topics = vec![CurriculumNode::branch(
            "Cells",
            vec![
                CurriculumNode::lesson("Cell Theory").with_test(Test::new("Theory Quiz", Vec::new())),
                CurriculumNode::lesson("Cell Wall"),
            ],
        )];
        let scope = scope();
        let mut store = CompletedSubtopics::new();

        let eval = UnlockEvaluator::new(&topics, &scope, &store);
        assert!(eval.is_leaf_unlocked("Cell Theory"));
        assert!(!eval.is_leaf_unlocked("Assessment - Cell Theory"));

        mark(&mut store, &topics[0], "Cell Theory");
        let eval = UnlockEvaluator::new(&topics, &scope, &store);
        assert!(eval.is_leaf_unlocked("Assessment - Cell Theory"));
        assert!(!eval.is_leaf_unlocked("Cell Wall"));
    }

    #[test]
    fn leaf_opens_after_predecessor() {
        let topics = topics();
        let scope = scope();
        let mut store = CompletedSubtopics::new();

        let eval = UnlockEvaluator::new(&topics, &scope, &store);
        assert!(eval.is_leaf_unlocked("L1"));
        assert!(!eval.is_leaf_unlocked("L2"));

        mark(&mut store, &topics[0], "L1");
        let eval = UnlockEvaluator::new(&topics, &scope, &store);
        assert!(eval.is_leaf_unlocked("L2"));
        assert!(!eval.is_leaf_unlocked("L3"));
    }

    #[test]
    fn gating_crosses_topic_boundaries() {
        let topics = topics();
        let scope = scope();
        let mut store = CompletedSubtopics::new();
        for leaf in ["L1", "L2", "L3"] {
            mark(&mut store, &topics[0], leaf);
        }
        let eval = UnlockEvaluator::new(&topics, &scope, &store);
        assert!(eval.is_leaf_unlocked("M1"));
        assert!(!eval.is_leaf_unlocked("Assessment - Unit 2"));

        mark(&mut store, &topics[1], "M1");
        let eval = UnlockEvaluator::new(&topics, &scope, &store);
        assert!(eval.is_leaf_unlocked("Assessment - Unit 2"));
    }

    #[test]
    fn unknown_leaf_fails_open() {
        let topics = topics();
        let scope = scope();
        let store = CompletedSubtopics::new();
        let eval = UnlockEvaluator::new(&topics, &scope, &store);
        assert!(eval.is_leaf_unlocked("A lesson that was deleted"));
    }

    #[test]
    fn disabled_gating_opens_everything() {
        let topics = topics();
        let scope = scope();
        let store = CompletedSubtopics::new();
        let eval = UnlockEvaluator::new(&topics, &scope, &store).with_gating(Gating::Disabled);
        assert!(eval.is_topic_unlocked(1));
        assert!(eval.is_leaf_unlocked("L3"));
    }

    #[test]
    fn unlocking_is_monotonic() {
        let topics = topics();
        let scope = scope();
        let mut store = CompletedSubtopics::new();
        let all_leaves = [
            (0, "L1"),
            (0, "L2"),
            (0, "L3"),
            (1, "M1"),
            (1, "Assessment - Unit 2"),
        ];
        let mut unlocked_before = vec![false; topics.len()];
        for (topic_index, leaf) in all_leaves {
            mark(&mut store, &topics[topic_index], leaf);
            let eval = UnlockEvaluator::new(&topics, &scope, &store);
            for (idx, was) in unlocked_before.iter_mut().enumerate() {
                let now = eval.is_topic_unlocked(idx);
                assert!(!*was || now, "topic {idx} re-locked after {leaf}");
                *was = now;
            }
        }
        assert!(unlocked_before.iter().all(|u| *u));
    }

    #[test]
    fn next_and_previous_follow_order() {
        let topics = topics();
        let scope = scope();
        let store = CompletedSubtopics::new();
        let eval = UnlockEvaluator::new(&topics, &scope, &store);
        assert_eq!(eval.next_entry("L3").unwrap().name(), "M1");
        assert_eq!(eval.previous_entry("M1").unwrap().name(), "L3");
        assert!(eval.previous_entry("L1").is_none());
        assert!(eval.next_entry("Assessment - Unit 2").is_none());
    }
}
