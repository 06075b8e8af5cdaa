//! Walks over a curriculum tree.
//!
//! All walks are depth-first in document order. Lessons are nodes without
//! children, whether or not they own a test; a branch's own completion is
//! always derived.

use crate::model::{CurriculumNode, Standard, Test, assessment_key};

/// Every descendant lesson of `node`, excluding `node` itself.
#[must_use]
pub fn collect_leaves(node: &CurriculumNode) -> Vec<&CurriculumNode> {
    let mut out = Vec::new();
    for child in &node.units {
        push_leaves(child, &mut out);
    }
    out
}

fn push_leaves<'a>(node: &'a CurriculumNode, out: &mut Vec<&'a CurriculumNode>) {
    if node.is_lesson() {
        out.push(node);
        return;
    }
    for child in &node.units {
        push_leaves(child, out);
    }
}

/// An assessment attached to some node of the tree.
#[derive(Debug, Clone, Copy)]
pub struct TestLeaf<'a> {
    pub owner: &'a CurriculumNode,
    pub test: &'a Test,
}

impl TestLeaf<'_> {
    /// `"Assessment - {owner}"`, the name completion is recorded under.
    #[must_use]
    pub fn name(&self) -> String {
        assessment_key(&self.owner.unit_name)
    }
}

/// One entry per non-empty `test` array at or below `node`.
#[must_use]
pub fn collect_tests(node: &CurriculumNode) -> Vec<TestLeaf<'_>> {
    let mut out = Vec::new();
    push_tests(node, &mut out);
    out
}

fn push_tests<'a>(node: &'a CurriculumNode, out: &mut Vec<TestLeaf<'a>>) {
    for child in &node.units {
        push_tests(child, out);
    }
    if let Some(test) = node.attached_test() {
        out.push(TestLeaf { owner: node, test });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Lesson,
    Test,
}

/// A stop in the linear "next/previous" order of a subject.
#[derive(Debug, Clone, Copy)]
pub struct NavEntry<'a> {
    pub kind: EntryKind,
    /// The lesson itself, or the node owning the test.
    pub node: &'a CurriculumNode,
    pub topic_index: usize,
    pub std: Option<Standard>,
}

impl NavEntry<'_> {
    /// Display name: the lesson's `unit_name` or the assessment name.
    #[must_use]
    pub fn name(&self) -> String {
        match self.kind {
            EntryKind::Lesson => self.node.unit_name.clone(),
            EntryKind::Test => self.node.assessment_key(),
        }
    }

    /// Name completion is recorded under.
    #[must_use]
    pub fn progress_name(&self) -> String {
        match self.kind {
            EntryKind::Lesson => self.node.leaf_key().to_string(),
            EntryKind::Test => self.node.assessment_key(),
        }
    }

    /// True if `target` names this entry by display name or stable id.
    #[must_use]
    pub fn answers_to(&self, target: &str) -> bool {
        match self.kind {
            EntryKind::Lesson => {
                self.node.unit_name == target || self.node.id.as_deref() == Some(target)
            }
            EntryKind::Test => self.node.assessment_key() == target,
        }
    }
}

/// Linear order across a subject's topics: each lesson, then its nested
/// children, then its test, before the next sibling. A topic's own test comes
/// after all of its descendants.
#[must_use]
pub fn flatten_navigable(topics: &[CurriculumNode]) -> Vec<NavEntry<'_>> {
    let mut out = Vec::new();
    for (topic_index, topic) in topics.iter().enumerate() {
        for child in &topic.units {
            push_navigable(child, topic_index, topic.std, &mut out);
        }
        if topic.attached_test().is_some() {
            out.push(NavEntry {
                kind: EntryKind::Test,
                node: topic,
                topic_index,
                std: topic.std,
            });
        }
    }
    out
}

fn push_navigable<'a>(
    node: &'a CurriculumNode,
    topic_index: usize,
    inherited: Option<Standard>,
    out: &mut Vec<NavEntry<'a>>,
) {
    let std = node.std.or(inherited);
    if node.is_lesson() {
        out.push(NavEntry {
            kind: EntryKind::Lesson,
            node,
            topic_index,
            std,
        });
    }
    for child in &node.units {
        push_navigable(child, topic_index, std, out);
    }
    if node.attached_test().is_some() {
        out.push(NavEntry {
            kind: EntryKind::Test,
            node,
            topic_index,
            std,
        });
    }
}
