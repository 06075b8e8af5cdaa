//! Compatibility shim joining curriculum names to stored progress keys.
//!
//! Progress recorded before a curriculum edit (renamed lesson, changed case,
//! stray whitespace) is still credited by tolerant comparison. The match is not
//! injective: a stored `"Cells"` also credits a lesson named `"Cells II"`, so
//! two lessons whose names contain one another can double-count. New content
//! should carry stable ids, which always match exactly.

use crate::model::{ASSESSMENT_PREFIX, TopicProgress};

/// How a curriculum name was matched to a stored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    Exact,
    /// Case-insensitive containment in either direction.
    CaseInsensitive,
    /// Containment after lowercasing and removing all whitespace.
    WhitespaceInsensitive,
}

/// Compares a curriculum name against a stored progress key.
#[must_use]
pub fn legacy_name_match(curriculum_name: &str, stored_key: &str) -> Option<MatchKind> {
    if curriculum_name == stored_key {
        return Some(MatchKind::Exact);
    }

    let name = curriculum_name.to_lowercase();
    let key = stored_key.to_lowercase();
    if contains_either(&name, &key) {
        return Some(MatchKind::CaseInsensitive);
    }

    let name: String = name.chars().filter(|c| !c.is_whitespace()).collect();
    let key: String = key.chars().filter(|c| !c.is_whitespace()).collect();
    if contains_either(&name, &key) {
        return Some(MatchKind::WhitespaceInsensitive);
    }

    None
}

// An empty side would be "contained" in everything.
fn contains_either(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a))
}

/// Finds the stored entry crediting any of `candidates`.
///
/// Exact hits on any candidate win; otherwise stored keys are scanned in
/// sorted order, so the result is stable for fixed inputs.
#[must_use]
pub fn find_completed<'a>(
    progress: &'a TopicProgress,
    candidates: &[&str],
) -> Option<(&'a str, MatchKind)> {
    find_matching(progress, candidates, |_| true)
}

/// Like `find_completed`, but assessment records never fuzzily credit a
/// lesson. `"Assessment - Cell Theory"` contains `"Cell Theory"`, so a lesson
/// owning a quiz would otherwise complete with its quiz.
#[must_use]
pub fn find_completed_lesson<'a>(
    progress: &'a TopicProgress,
    candidates: &[&str],
) -> Option<(&'a str, MatchKind)> {
    find_matching(progress, candidates, |stored| {
        !stored.starts_with(ASSESSMENT_PREFIX)
    })
}

fn find_matching<'a>(
    progress: &'a TopicProgress,
    candidates: &[&str],
    fuzzy_eligible: impl Fn(&str) -> bool,
) -> Option<(&'a str, MatchKind)> {
    for candidate in candidates {
        if let Some(stored) = progress.names().find(|stored| stored == candidate) {
            return Some((stored, MatchKind::Exact));
        }
    }

    let mut best: Option<(&'a str, MatchKind)> = None;
    for stored in progress.names().filter(|stored| fuzzy_eligible(stored)) {
        for candidate in candidates {
            if let Some(kind) = legacy_name_match(candidate, stored) {
                if best.is_none_or(|(_, current)| kind < current) {
                    best = Some((stored, kind));
                }
            }
        }
    }

    if let Some((stored, kind)) = best {
        tracing::debug!(
            candidates = ?candidates,
            stored,
            ?kind,
            "credited progress through a fuzzy name match"
        );
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn progress(names: &[&str]) -> TopicProgress {
        let mut p = TopicProgress::new();
        for name in names {
            p.mark_complete(*name, fixed_now());
        }
        p
    }

    #[test]
    fn trailing_space_and_case_still_match() {
        assert_eq!(
            legacy_name_match("Introduction To Cells ", "introduction to cells"),
            Some(MatchKind::CaseInsensitive)
        );
    }

    #[test]
    fn whitespace_drift_matches_last() {
        assert_eq!(
            legacy_name_match("Cell  Division", "celldivision"),
            Some(MatchKind::WhitespaceInsensitive)
        );
    }

    #[test]
    fn unrelated_and_empty_names_do_not_match() {
        assert_eq!(legacy_name_match("Osmosis", "Diffusion"), None);
        assert_eq!(legacy_name_match("Osmosis", ""), None);
        assert_eq!(legacy_name_match("  ", "Osmosis"), None);
    }

    #[test]
    fn containment_is_not_injective() {
        // Documented tolerance: one stored key credits both lessons.
        let stored = progress(&["Cells"]);
        assert!(find_completed(&stored, &["Cells"]).is_some());
        assert!(find_completed(&stored, &["Cells II"]).is_some());
    }

    #[test]
    fn exact_hit_wins_over_earlier_fuzzy_key() {
        let stored = progress(&["Atoms", "atoms and molecules"]);
        let (name, kind) = find_completed(&stored, &["atoms and molecules"]).unwrap();
        assert_eq!(name, "atoms and molecules");
        assert_eq!(kind, MatchKind::Exact);
    }

    #[test]
    fn lesson_lookup_ignores_assessment_records() {
        let p = progress(&["Assessment - Cell Theory"]);
        assert!(find_completed(&p, &["Cell Theory"]).is_some());
        assert_eq!(find_completed_lesson(&p, &["Cell Theory"]), None);
        assert_eq!(
            find_completed_lesson(&p, &["Assessment - Cell Theory"]),
            Some(("Assessment - Cell Theory", MatchKind::Exact))
        );
    }

    #[test]
    fn repeated_lookups_are_stable() {
        let stored = progress(&["b lesson", "a lesson"]);
        let first = find_completed(&stored, &["Lesson"]);
        for _ in 0..5 {
            assert_eq!(find_completed(&stored, &["Lesson"]), first);
        }
        assert_eq!(first.unwrap().0, "a lesson");
    }
}
