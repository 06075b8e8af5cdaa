use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::model::ids::Standard;

/// Prefix of the synthetic progress entry recorded for an attached test.
pub const ASSESSMENT_PREFIX: &str = "Assessment - ";

/// Progress entry name for a test owned by the node named `owner`.
#[must_use]
pub fn assessment_key(owner: &str) -> String {
    format!("{ASSESSMENT_PREFIX}{owner}")
}

/// A subject, topic or subtopic as served by the content service.
///
/// Children and tests are parsed leniently: a missing, `null` or non-array
/// field becomes empty and malformed elements are skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumNode {
    /// Stable authoring-time identifier. Preferred over `unit_name` as the
    /// progress join key when present.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_id"
    )]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub unit_name: String,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub units: Vec<CurriculumNode>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub test: Vec<Test>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_standard"
    )]
    pub std: Option<Standard>,
}

impl CurriculumNode {
    /// A terminal lesson with the given name.
    #[must_use]
    pub fn lesson(name: impl Into<String>) -> Self {
        Self {
            unit_name: name.into(),
            ..Self::default()
        }
    }

    /// A branch with the given children.
    #[must_use]
    pub fn branch(name: impl Into<String>, units: Vec<CurriculumNode>) -> Self {
        Self {
            unit_name: name.into(),
            units,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_test(mut self, test: Test) -> Self {
        self.test = vec![test];
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// True for a node without children. It may still own a test.
    #[must_use]
    pub fn is_lesson(&self) -> bool {
        self.units.is_empty()
    }

    /// The attached assessment, if any. Only the first entry of `test` counts.
    #[must_use]
    pub fn attached_test(&self) -> Option<&Test> {
        self.test.first()
    }

    /// Name under which completion of this lesson is recorded.
    #[must_use]
    pub fn leaf_key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.unit_name)
    }

    /// Name under which completion of this node's test is recorded.
    #[must_use]
    pub fn assessment_key(&self) -> String {
        assessment_key(&self.unit_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    #[serde(default, deserialize_with = "lenient_string")]
    pub test_name: String,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub questions_list: Vec<Question>,
}

impl Test {
    #[must_use]
    pub fn new(name: impl Into<String>, questions: Vec<Question>) -> Self {
        Self {
            test_name: name.into(),
            questions_list: questions,
        }
    }
}

/// A multiple-choice question. Text may carry `$...$` formula spans and
/// `**bold**` markers; they are passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(default, deserialize_with = "lenient_string")]
    pub question: String,
    #[serde(default)]
    pub option1: Option<String>,
    #[serde(default)]
    pub option2: Option<String>,
    #[serde(default)]
    pub option3: Option<String>,
    #[serde(default)]
    pub option4: Option<String>,
    #[serde(default)]
    pub option1_image: Option<String>,
    #[serde(default)]
    pub option2_image: Option<String>,
    #[serde(default)]
    pub option3_image: Option<String>,
    #[serde(default)]
    pub option4_image: Option<String>,
    #[serde(default, alias = "correctAnswer", deserialize_with = "lenient_index")]
    pub correct_index: Option<u8>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub images: Vec<String>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub tables: Vec<Value>,
}

impl Question {
    /// Number of selectable options: the highest filled slot.
    #[must_use]
    pub fn option_count(&self) -> u8 {
        let slots = [&self.option1, &self.option2, &self.option3, &self.option4];
        slots
            .iter()
            .rposition(|slot| slot.is_some())
            .map_or(0, |pos| u8::try_from(pos + 1).unwrap_or(4))
    }

    #[must_use]
    pub fn option(&self, index: u8) -> Option<&str> {
        match index {
            0 => self.option1.as_deref(),
            1 => self.option2.as_deref(),
            2 => self.option3.as_deref(),
            3 => self.option4.as_deref(),
            _ => None,
        }
    }

    /// The correct option index, if the content carries a usable one.
    #[must_use]
    pub fn answer_index(&self) -> Option<u8> {
        self.correct_index.filter(|idx| *idx < 4)
    }
}

// ─── Lenient field parsing ─────────────────────────────────────────────────────

fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        other => {
            tracing::debug!(found = %kind_of(&other), "non-array content field treated as empty");
            return Ok(Vec::new());
        }
    };
    Ok(items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| match serde_json::from_value(item) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                tracing::debug!(index = idx, error = %err, "skipping malformed content element");
                None
            }
        })
        .collect())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_standard<'de, D>(deserializer: D) -> Result<Option<Standard>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    })
}

fn lenient_index<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().and_then(|v| u8::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parses a content-service payload, tolerating a non-array body and
/// malformed entries.
#[must_use]
pub fn parse_units(value: Value) -> Vec<CurriculumNode> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        other => {
            tracing::warn!(found = %kind_of(&other), "curriculum payload is not an array");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_nested_units_and_tests() {
        let raw = json!({
            "unitName": "Cell Biology",
            "std": "11th",
            "units": [
                { "unitName": "Cell Wall" },
                { "unitName": "Organelles", "units": [{ "unitName": "Mitochondria" }] }
            ],
            "test": [{ "testName": "Cells Quiz", "questionsList": [
                { "question": "What is $ATP$?", "option1": "Energy", "option2": "Protein", "correctIndex": 0 }
            ]}]
        });
        let node: CurriculumNode = serde_json::from_value(raw).unwrap();
        assert_eq!(node.std, Some(Standard::Eleventh));
        assert_eq!(node.units.len(), 2);
        assert_eq!(node.units[1].units[0].unit_name, "Mitochondria");
        let test = node.attached_test().unwrap();
        assert_eq!(test.questions_list[0].option_count(), 2);
        assert_eq!(test.questions_list[0].answer_index(), Some(0));
    }

    #[test]
    fn malformed_fields_become_empty() {
        let raw = json!({
            "unitName": "Broken",
            "units": "not-a-list",
            "test": { "testName": "object instead of array" },
            "std": 13
        });
        let node: CurriculumNode = serde_json::from_value(raw).unwrap();
        assert!(node.units.is_empty());
        assert!(node.test.is_empty());
        assert_eq!(node.std, None);
        assert!(node.is_lesson());
    }

    #[test]
    fn malformed_children_are_skipped() {
        let raw = json!({
            "unitName": "Topic",
            "units": [ 42, { "unitName": "Ok" }, "junk" ]
        });
        let node: CurriculumNode = serde_json::from_value(raw).unwrap();
        assert_eq!(node.units.len(), 1);
        assert_eq!(node.units[0].unit_name, "Ok");
    }

    #[test]
    fn leaf_key_prefers_stable_id() {
        let lesson = CurriculumNode::lesson("Photosynthesis").with_id("bio-07");
        assert_eq!(lesson.leaf_key(), "bio-07");
        assert_eq!(CurriculumNode::lesson("Osmosis").leaf_key(), "Osmosis");
    }

    #[test]
    fn parse_units_tolerates_object_body() {
        assert!(parse_units(json!({ "error": "nope" })).is_empty());
        assert_eq!(parse_units(json!([{ "unitName": "A" }, 3])).len(), 1);
    }
}
