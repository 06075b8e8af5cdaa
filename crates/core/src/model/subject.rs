use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Dashboard record for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectCompletion {
    pub name: String,
    pub certified: bool,
}

/// Per-subject certification flags of one (course, standard) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectCompletions {
    entries: Vec<SubjectCompletion>,
}

impl SubjectCompletions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_certified(&self, subject: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.name == subject && entry.certified)
    }

    /// Marks `subject` certified. Returns `true` if that changed anything.
    pub fn certify(&mut self, subject: &str) -> bool {
        match self.entries.iter_mut().find(|entry| entry.name == subject) {
            Some(entry) if entry.certified => false,
            Some(entry) => {
                entry.certified = true;
                true
            }
            None => {
                self.entries.push(SubjectCompletion {
                    name: subject.to_string(),
                    certified: true,
                });
                true
            }
        }
    }

    /// Clears certification for `subject` (used by progress reset).
    pub fn revoke(&mut self, subject: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.name != subject);
        before != self.entries.len()
    }

    /// Certified subjects win over uncertified ones.
    pub fn merge(&mut self, other: &SubjectCompletions) {
        for entry in &other.entries {
            if entry.certified {
                self.certify(&entry.name);
            } else if !self.entries.iter().any(|e| e.name == entry.name) {
                self.entries.push(entry.clone());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubjectCompletion> {
        self.entries.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remote form: `{ subject: true | false }`.
    #[must_use]
    pub fn to_remote(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|entry| (entry.name.clone(), Value::Bool(entry.certified)))
                .collect::<Map<_, _>>(),
        )
    }

    /// Parses `{ subject: number | bool }`; `true` or a percentage of 100
    /// counts as certified.
    #[must_use]
    pub fn from_remote(value: &Value) -> Self {
        let Value::Object(map) = value else {
            return Self::default();
        };
        let entries = map
            .iter()
            .map(|(name, raw)| SubjectCompletion {
                name: name.clone(),
                certified: match raw {
                    Value::Bool(flag) => *flag,
                    Value::Number(n) => n.as_f64().is_some_and(|v| v >= 100.0),
                    _ => false,
                },
            })
            .collect();
        Self { entries }
    }
}
