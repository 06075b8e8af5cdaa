use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::model::ids::{ProgressKey, ProgressScope};

/// Token replacing `.` in keys sent to the remote store, which cannot carry
/// literal dots in object keys.
pub const DOT_SENTINEL: &str = "__DOT__";

#[must_use]
pub fn escape_key(raw: &str) -> String {
    raw.replace('.', DOT_SENTINEL)
}

#[must_use]
pub fn unescape_key(escaped: &str) -> String {
    escaped.replace(DOT_SENTINEL, ".")
}

//
// ─── COMPLETION STATE ──────────────────────────────────────────────────────────
//

/// Completion of a single leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    Incomplete,
    Complete { at: DateTime<Utc> },
}

impl CompletionState {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, CompletionState::Complete { .. })
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            CompletionState::Complete { at } => Some(*at),
            CompletionState::Incomplete => None,
        }
    }

    /// Normalizes the representations older clients stored for "done".
    ///
    /// `true`, numbers `>= 100`, the strings `"completed"`/`"complete"`/`"done"`
    /// /`"true"` and RFC 3339 timestamps are complete. Untimed legacy values are
    /// stamped with the Unix epoch so any timed completion outranks them.
    #[must_use]
    pub fn from_legacy(value: &Value) -> Self {
        let legacy = CompletionState::Complete {
            at: DateTime::<Utc>::default(),
        };
        match value {
            Value::Bool(true) => legacy,
            Value::Number(n) if n.as_f64().is_some_and(|v| v >= 100.0) => legacy,
            Value::String(s) => {
                let trimmed = s.trim();
                if let Ok(at) = DateTime::parse_from_rfc3339(trimmed) {
                    return CompletionState::Complete {
                        at: at.with_timezone(&Utc),
                    };
                }
                match trimmed.to_ascii_lowercase().as_str() {
                    "completed" | "complete" | "done" | "true" => legacy,
                    _ => CompletionState::Incomplete,
                }
            }
            _ => CompletionState::Incomplete,
        }
    }
}

//
// ─── TOPIC PROGRESS ────────────────────────────────────────────────────────────
//

/// Completed leaves of one topic, keyed by lesson name or
/// `"Assessment - {name}"`. Absence means incomplete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicProgress {
    leaves: BTreeMap<String, DateTime<Utc>>,
}

impl TopicProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a leaf complete. Returns `false` if it already was; the original
    /// completion time is kept.
    pub fn mark_complete(&mut self, leaf: impl Into<String>, at: DateTime<Utc>) -> bool {
        match self.leaves.entry(leaf.into()) {
            Entry::Vacant(slot) => {
                slot.insert(at);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Exact-name lookup.
    #[must_use]
    pub fn state(&self, leaf: &str) -> CompletionState {
        self.leaves
            .get(leaf)
            .map_or(CompletionState::Incomplete, |at| CompletionState::Complete { at: *at })
    }

    #[must_use]
    pub fn contains(&self, leaf: &str) -> bool {
        self.leaves.contains_key(leaf)
    }

    /// Stored leaf names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.leaves.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Union with `other`. A leaf present on both sides keeps the later
    /// completion time. Returns the number of leaves that were new here.
    pub fn merge_from(&mut self, other: &TopicProgress) -> usize {
        other
            .leaves
            .iter()
            .filter(|(leaf, at)| self.record_latest((*leaf).clone(), **at))
            .count()
    }

    fn from_object(object: &Map<String, Value>, unescape: bool) -> Self {
        let mut progress = Self::default();
        for (raw, value) in object {
            let CompletionState::Complete { at } = CompletionState::from_legacy(value) else {
                continue;
            };
            let name = if unescape {
                unescape_key(raw)
            } else {
                raw.clone()
            };
            progress.record_latest(name, at);
        }
        progress
    }

    fn record_latest(&mut self, leaf: String, at: DateTime<Utc>) -> bool {
        match self.leaves.entry(leaf) {
            Entry::Vacant(slot) => {
                slot.insert(at);
                true
            }
            Entry::Occupied(mut slot) => {
                if at > *slot.get() {
                    slot.insert(at);
                }
                false
            }
        }
    }

    fn to_object(&self, escape: bool) -> Map<String, Value> {
        self.leaves
            .iter()
            .map(|(leaf, at)| {
                let key = if escape { escape_key(leaf) } else { leaf.clone() };
                (key, Value::String(at.to_rfc3339()))
            })
            .collect()
    }
}

impl Serialize for TopicProgress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_object(false).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TopicProgress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Object(object) => Self::from_object(&object, false),
            _ => Self::default(),
        })
    }
}

//
// ─── COMPLETED SUBTOPICS ───────────────────────────────────────────────────────
//

/// Outcome of merging one progress map into another.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub new_topics: usize,
    pub new_leaves: usize,
}

/// Every topic bucket of one (course, standard) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletedSubtopics {
    topics: BTreeMap<ProgressKey, TopicProgress>,
}

impl CompletedSubtopics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn topic(&self, key: &ProgressKey) -> Option<&TopicProgress> {
        self.topics.get(key)
    }

    /// Marks `leaf` complete under `key`, creating the bucket on first use.
    pub fn mark_leaf_complete(
        &mut self,
        key: ProgressKey,
        leaf: impl Into<String>,
        at: DateTime<Utc>,
    ) -> bool {
        self.topics.entry(key).or_default().mark_complete(leaf, at)
    }

    /// Union against `other`; see `TopicProgress::merge_from` for precedence.
    pub fn merge(&mut self, other: &CompletedSubtopics) -> MergeReport {
        let mut report = MergeReport::default();
        for (key, incoming) in &other.topics {
            match self.topics.entry(key.clone()) {
                Entry::Vacant(slot) => {
                    report.new_topics += 1;
                    report.new_leaves += incoming.len();
                    slot.insert(incoming.clone());
                }
                Entry::Occupied(mut slot) => {
                    report.new_leaves += slot.get_mut().merge_from(incoming);
                }
            }
        }
        report
    }

    /// Drops every bucket belonging to `scope`. Returns how many were removed.
    pub fn clear_scope(&mut self, scope: &ProgressScope) -> usize {
        let before = self.topics.len();
        self.topics.retain(|key, _| !scope.owns(key));
        before - self.topics.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProgressKey, &TopicProgress)> {
        self.topics.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Remote wire form with dots escaped in both topic and leaf keys.
    #[must_use]
    pub fn to_remote(&self) -> Value {
        Value::Object(
            self.topics
                .iter()
                .map(|(key, progress)| {
                    (
                        escape_key(key.as_str()),
                        Value::Object(progress.to_object(true)),
                    )
                })
                .collect(),
        )
    }

    /// Parses the remote wire form. Anything that is not an object of objects
    /// is ignored.
    #[must_use]
    pub fn from_remote(value: &Value) -> Self {
        let mut subtopics = Self::default();
        let Value::Object(topics) = value else {
            return subtopics;
        };
        for (raw_key, raw_topic) in topics {
            let Value::Object(leaves) = raw_topic else {
                tracing::debug!(key = %raw_key, "ignoring non-object topic progress");
                continue;
            };
            let progress = TopicProgress::from_object(leaves, true);
            if progress.is_empty() {
                continue;
            }
            subtopics
                .topics
                .entry(ProgressKey::from_raw(unescape_key(raw_key)))
                .or_default()
                .merge_from(&progress);
        }
        subtopics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::{Course, Standard};
    use crate::time::fixed_now;
    use chrono::Duration;
    use serde_json::json;

    fn key(topic: &str) -> ProgressKey {
        ProgressKey::new(Course::Neet, Standard::Eleventh, "Biology", topic)
    }

    #[test]
    fn legacy_values_normalize() {
        assert!(CompletionState::from_legacy(&json!(true)).is_complete());
        assert!(CompletionState::from_legacy(&json!(100)).is_complete());
        assert!(CompletionState::from_legacy(&json!("Completed")).is_complete());
        assert!(!CompletionState::from_legacy(&json!(false)).is_complete());
        assert!(!CompletionState::from_legacy(&json!(40)).is_complete());
        assert!(!CompletionState::from_legacy(&json!("pending")).is_complete());

        let stamped = CompletionState::from_legacy(&json!("2024-03-01T10:00:00Z"));
        assert_eq!(
            stamped.completed_at().unwrap().to_rfc3339(),
            "2024-03-01T10:00:00+00:00"
        );
    }

    #[test]
    fn marking_twice_is_idempotent() {
        let mut once = CompletedSubtopics::new();
        once.mark_leaf_complete(key("Cells"), "L1", fixed_now());

        let mut twice = once.clone();
        let changed =
            twice.mark_leaf_complete(key("Cells"), "L1", fixed_now() + Duration::minutes(5));

        assert!(!changed);
        assert_eq!(once, twice);
    }

    #[test]
    fn disjoint_merge_keeps_both_leaves() {
        let mut local = CompletedSubtopics::new();
        local.mark_leaf_complete(key("Cells"), "A", fixed_now());
        let mut remote = CompletedSubtopics::new();
        remote.mark_leaf_complete(key("Cells"), "B", fixed_now());

        let report = local.merge(&remote);

        let topic = local.topic(&key("Cells")).unwrap();
        assert!(topic.contains("A"));
        assert!(topic.contains("B"));
        assert_eq!(report, MergeReport { new_topics: 0, new_leaves: 1 });
    }

    #[test]
    fn merge_keeps_latest_completion_time() {
        let early = fixed_now();
        let late = early + Duration::hours(1);

        let mut local = CompletedSubtopics::new();
        local.mark_leaf_complete(key("Cells"), "A", early);
        let mut remote = CompletedSubtopics::new();
        remote.mark_leaf_complete(key("Cells"), "A", late);

        local.merge(&remote);
        assert_eq!(
            local.topic(&key("Cells")).unwrap().state("A").completed_at(),
            Some(late)
        );

        // Merging the older side back in does not regress it.
        let mut stale = CompletedSubtopics::new();
        stale.mark_leaf_complete(key("Cells"), "A", early);
        local.merge(&stale);
        assert_eq!(
            local.topic(&key("Cells")).unwrap().state("A").completed_at(),
            Some(late)
        );
    }

    #[test]
    fn remote_form_escapes_dots_symmetrically() {
        let mut store = CompletedSubtopics::new();
        store.mark_leaf_complete(key("Unit 1.2"), "Lesson 1.1 Basics", fixed_now());

        let wire = store.to_remote();
        let text = wire.to_string();
        assert!(!text.contains("1.1"));
        assert!(text.contains("Lesson 1__DOT__1 Basics"));

        assert_eq!(CompletedSubtopics::from_remote(&wire), store);
    }

    #[test]
    fn remote_form_accepts_legacy_values() {
        let wire = json!({
            "NEET_11th_Biology_Cells": { "A": true, "B": 100, "C": false },
            "NEET_11th_Biology_Broken": "oops"
        });
        let store = CompletedSubtopics::from_remote(&wire);
        assert_eq!(store.len(), 1);
        let topic = store.topic(&key("Cells")).unwrap();
        assert_eq!(topic.names().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn clear_scope_only_touches_subject() {
        let mut store = CompletedSubtopics::new();
        store.mark_leaf_complete(key("Cells"), "A", fixed_now());
        store.mark_leaf_complete(
            ProgressKey::new(Course::Neet, Standard::Eleventh, "Physics", "Motion"),
            "A",
            fixed_now(),
        );

        let removed = store.clear_scope(&ProgressScope::new(
            Course::Neet,
            Standard::Eleventh,
            "Biology",
        ));

        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn local_form_round_trips_through_json() {
        let mut store = CompletedSubtopics::new();
        store.mark_leaf_complete(key("Cells"), "v1.0 intro", fixed_now());
        let text = serde_json::to_string(&store).unwrap();
        assert!(text.contains("v1.0 intro"));
        let back: CompletedSubtopics = serde_json::from_str(&text).unwrap();
        assert_eq!(back, store);
    }
}
