use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::curriculum::CurriculumNode;

/// Exam track a curriculum belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Course {
    #[serde(rename = "NEET")]
    Neet,
    #[serde(rename = "JEE")]
    Jee,
}

impl Course {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Course::Neet => "NEET",
            Course::Jee => "JEE",
        }
    }
}

/// Grade a subject (or a single topic of a mixed subject) is taught in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Standard {
    #[serde(rename = "11th")]
    Eleventh,
    #[serde(rename = "12th")]
    Twelfth,
}

impl Standard {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Standard::Eleventh => "11th",
            Standard::Twelfth => "12th",
        }
    }
}

/// Identifier of the logged-in student, as handed over by the session check.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a `UserId`, rejecting blank values.
    ///
    /// # Errors
    ///
    /// Returns `ParseIdError` if the value is empty after trimming.
    pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ParseIdError {
                kind: "UserId".to_string(),
            });
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Composite key of one topic's progress bucket:
/// `{course}_{standard}_{subject}_{topicUnitName}`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressKey(String);

impl ProgressKey {
    #[must_use]
    pub fn new(course: Course, standard: Standard, subject: &str, topic: &str) -> Self {
        Self(format!("{course}_{standard}_{subject}_{topic}"))
    }

    /// Wraps a key read back from storage without re-deriving it.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The (course, standard, subject) triple a learning view operates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgressScope {
    pub course: Course,
    pub standard: Standard,
    pub subject: String,
}

impl ProgressScope {
    #[must_use]
    pub fn new(course: Course, standard: Standard, subject: impl Into<String>) -> Self {
        Self {
            course,
            standard,
            subject: subject.into(),
        }
    }

    /// Key for a topic of this subject. A topic tagged with its own `std`
    /// (mixed-grade subjects) is filed under that grade.
    #[must_use]
    pub fn key_for(&self, topic: &CurriculumNode) -> ProgressKey {
        let standard = topic.std.unwrap_or(self.standard);
        ProgressKey::new(self.course, standard, &self.subject, &topic.unit_name)
    }

    /// Prefix shared by every topic key of this subject, across both grades.
    #[must_use]
    pub fn owns(&self, key: &ProgressKey) -> bool {
        [Standard::Eleventh, Standard::Twelfth].iter().any(|standard| {
            key.as_str()
                .starts_with(&format!("{}_{}_{}_", self.course, standard, self.subject))
        })
    }
}

impl fmt::Display for Course {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Standard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for ProgressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ProgressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProgressKey({})", self.0)
    }
}

impl fmt::Display for ProgressScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.course, self.standard, self.subject)
    }
}

// ─── FromStr Implementations ───────────────────────────────────────────────────

/// Error type for parsing identifiers from strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from string", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

impl FromStr for Course {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEET" => Ok(Course::Neet),
            "JEE" => Ok(Course::Jee),
            _ => Err(ParseIdError {
                kind: "Course".to_string(),
            }),
        }
    }
}

impl FromStr for Standard {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "11th" | "11" => Ok(Standard::Eleventh),
            "12th" | "12" => Ok(Standard::Twelfth),
            _ => Err(ParseIdError {
                kind: "Standard".to_string(),
            }),
        }
    }
}

impl FromStr for UserId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UserId::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_key_joins_segments() {
        let key = ProgressKey::new(Course::Neet, Standard::Eleventh, "Biology", "Unit 1");
        assert_eq!(key.as_str(), "NEET_11th_Biology_Unit 1");
    }

    #[test]
    fn scope_uses_topic_standard_when_tagged() {
        let scope = ProgressScope::new(Course::Jee, Standard::Eleventh, "Physics");
        let mut topic = CurriculumNode::lesson("Optics");
        topic.std = Some(Standard::Twelfth);
        assert_eq!(scope.key_for(&topic).as_str(), "JEE_12th_Physics_Optics");
    }

    #[test]
    fn scope_owns_only_its_subject() {
        let scope = ProgressScope::new(Course::Neet, Standard::Eleventh, "Bio");
        assert!(scope.owns(&ProgressKey::from_raw("NEET_11th_Bio_Cells")));
        assert!(scope.owns(&ProgressKey::from_raw("NEET_12th_Bio_Genetics")));
        assert!(!scope.owns(&ProgressKey::from_raw("NEET_11th_Biology_Cells")));
        assert!(!scope.owns(&ProgressKey::from_raw("JEE_11th_Bio_Cells")));
    }

    #[test]
    fn course_and_standard_parse_loosely() {
        assert_eq!("neet".parse::<Course>().unwrap(), Course::Neet);
        assert_eq!("12".parse::<Standard>().unwrap(), Standard::Twelfth);
        assert!("13th".parse::<Standard>().is_err());
    }

    #[test]
    fn user_id_rejects_blank() {
        assert!(UserId::new("  ").is_err());
        assert_eq!(UserId::new("u-1").unwrap().to_string(), "u-1");
    }
}
