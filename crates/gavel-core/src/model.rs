//! Core data model: records under evaluation, extracted scores, and the
//! conversation context handed to backend adapters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A structured score extracted from free-text judge output: either a single
/// captured value or a full metric-name → value mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreValue {
    Single(String),
    Metrics(BTreeMap<String, String>),
}

impl ScoreValue {
    pub fn as_single(&self) -> Option<&str> {
        match self {
            ScoreValue::Single(s) => Some(s),
            ScoreValue::Metrics(_) => None,
        }
    }

    pub fn metric(&self, name: &str) -> Option<&str> {
        match self {
            ScoreValue::Single(_) => None,
            ScoreValue::Metrics(m) => m.get(name).map(String::as_str),
        }
    }

    /// Numeric view of a single-value score.
    pub fn as_f64(&self) -> Option<f64> {
        self.as_single().and_then(|s| s.parse().ok())
    }
}

/// One conversation under evaluation. Annotation vectors (`responses`,
/// `extracted`, `errors`) are populated turn by turn and always end up the
/// same length as `prompts`, with absent entries as `None` / empty lists.
///
/// Absent values serialize as literal `null`, never omitted keys, so the
/// JSONL hand-off between the generate and judge phases has a fixed schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub prompts: Vec<String>,
    #[serde(default)]
    pub responses: Vec<Option<String>>,
    #[serde(default)]
    pub extracted: Vec<Option<ScoreValue>>,
    #[serde(default)]
    pub errors: Vec<Vec<String>>,
    /// Reference (gold) answer, when the dataset provides one.
    #[serde(default)]
    pub reference: Option<String>,
    /// Benchmark category (e.g. MT-Bench "math", "writing").
    #[serde(default)]
    pub category: Option<String>,
    /// Safety label ("safe" / "unsafe") for safety benchmarks.
    #[serde(default)]
    pub safety: Option<String>,
}

impl Record {
    pub fn new(id: impl Into<String>, prompts: Vec<String>) -> Self {
        Self {
            id: id.into(),
            prompts,
            responses: Vec::new(),
            extracted: Vec::new(),
            errors: Vec::new(),
            reference: None,
            category: None,
            safety: None,
        }
    }

    pub fn single_turn(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::new(id, vec![prompt.into()])
    }

    pub fn is_single_turn(&self) -> bool {
        self.prompts.len() == 1
    }

    /// First-turn response text, the common case for single-turn benchmarks.
    pub fn first_response(&self) -> Option<&str> {
        self.responses.first().and_then(|r| r.as_deref())
    }

    pub fn first_extracted(&self) -> Option<&ScoreValue> {
        self.extracted.first().and_then(|e| e.as_ref())
    }

    /// All error messages accumulated for this record, flattened over turns.
    pub fn all_errors(&self) -> Vec<String> {
        self.errors.iter().flatten().cloned().collect()
    }

    /// True when every turn already reached SUCCEEDED: responses (and
    /// extracted values, when extraction is required) are present for all
    /// prompts. Used by the turn engine's no-op fast path.
    pub fn is_complete(&self, needs_extraction: bool) -> bool {
        self.responses.len() == self.prompts.len()
            && self.errors.len() == self.prompts.len()
            && self.extracted.len() == self.prompts.len()
            && self.responses.iter().all(Option::is_some)
            && (!needs_extraction || self.extracted.iter().all(Option::is_some))
    }

    /// Clear annotations before reprocessing so turn slots are rebuilt from
    /// scratch and stay aligned with `prompts`.
    pub(crate) fn reset_annotations(&mut self) {
        self.responses.clear();
        self.extracted.clear();
        self.errors.clear();
    }
}

/// The conversation context a backend adapter receives for one turn:
/// prompts `0..=t` and responses `0..t`, plus the optional system
/// instruction. Derived per request, never persisted.
#[derive(Debug, Clone, Copy)]
pub struct TurnContext<'a> {
    pub system: Option<&'a str>,
    pub prompts: &'a [String],
    pub responses: &'a [Option<String>],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message in provider wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Provider-agnostic sampling configuration. Every field is optional;
/// adapters pass through what their provider supports and drop the rest
/// with a warning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub frequency_penalty: Option<f32>,
}
