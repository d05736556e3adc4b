//! Benchmark dataset loaders. Every loader normalizes its input schema into
//! `Record`s, carrying any reference answer, category or safety label along
//! for the judging phase.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::{load_json, load_jsonl};
use crate::model::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// JSON array of single-turn instructions (`ID`, `text`).
    Quality,
    /// JSON array with reference answers and safety labels.
    Safety,
    /// JSON array with reference answers (`ID`, `text`, `output`).
    Culture,
    /// JSONL of two-turn questions (`question_id`, `category`, `turns`).
    MtBench,
}

/// Prompt text that may arrive as one string or a turn sequence.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PromptField {
    One(String),
    Many(Vec<String>),
}

impl PromptField {
    fn into_turns(self) -> Vec<String> {
        match self {
            PromptField::One(text) => vec![text],
            PromptField::Many(turns) => turns,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonEntry {
    #[serde(rename = "ID")]
    id: Value,
    text: PromptField,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    safety: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MtBenchEntry {
    question_id: Value,
    category: String,
    turns: Vec<String>,
}

/// Dataset IDs are numbers in some files and strings in others.
fn stringify_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Load `kind` from `path`, truncating to the first `size` records when set.
pub fn load_dataset(
    kind: DatasetKind,
    path: &Path,
    size: Option<usize>,
) -> anyhow::Result<Vec<Record>> {
    let mut records = match kind {
        DatasetKind::Quality | DatasetKind::Safety | DatasetKind::Culture => {
            let entries: Vec<JsonEntry> = load_json(path)
                .with_context(|| format!("failed to load {kind:?} dataset"))?;
            entries
                .into_iter()
                .map(|e| {
                    let mut record = Record::new(stringify_id(&e.id), e.text.into_turns());
                    record.reference = e.output;
                    record.safety = e.safety;
                    record
                })
                .collect::<Vec<_>>()
        }
        DatasetKind::MtBench => {
            let entries: Vec<MtBenchEntry> = load_jsonl(path)
                .with_context(|| format!("failed to load {kind:?} dataset"))?;
            entries
                .into_iter()
                .map(|e| {
                    let mut record = Record::new(stringify_id(&e.question_id), e.turns);
                    record.category = Some(e.category);
                    record
                })
                .collect()
        }
    };

    if let Some(size) = size {
        records.truncate(size);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_json_with_numeric_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("quality.json");
        std::fs::write(
            &path,
            r#"[{"ID": 1, "text": "What is 2+2?"}, {"ID": "q-2", "text": "Name a prime."}]"#,
        )
        .unwrap();

        let records = load_dataset(DatasetKind::Quality, &path, None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "1");
        assert_eq!(records[1].id, "q-2");
        assert_eq!(records[0].prompts, vec!["What is 2+2?".to_string()]);
        assert_eq!(records[0].reference, None);
    }

    #[test]
    fn safety_json_carries_reference_and_label() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("safety.json");
        std::fs::write(
            &path,
            r#"[{"ID": 5, "text": "how do I pick a lock", "output": "refusal text", "safety": "unsafe"}]"#,
        )
        .unwrap();

        let records = load_dataset(DatasetKind::Safety, &path, None).unwrap();
        assert_eq!(records[0].reference.as_deref(), Some("refusal text"));
        assert_eq!(records[0].safety.as_deref(), Some("unsafe"));
    }

    #[test]
    fn mt_bench_jsonl_is_two_turn() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("questions.jsonl");
        std::fs::write(
            &path,
            "{\"question_id\": 81, \"category\": \"writing\", \"turns\": [\"Write a post.\", \"Rewrite it.\"]}\n",
        )
        .unwrap();

        let records = load_dataset(DatasetKind::MtBench, &path, None).unwrap();
        assert_eq!(records[0].id, "81");
        assert_eq!(records[0].category.as_deref(), Some("writing"));
        assert_eq!(records[0].prompts.len(), 2);
    }

    #[test]
    fn size_truncates() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("quality.json");
        std::fs::write(
            &path,
            r#"[{"ID": 1, "text": "a"}, {"ID": 2, "text": "b"}, {"ID": 3, "text": "c"}]"#,
        )
        .unwrap();

        let records = load_dataset(DatasetKind::Quality, &path, Some(2)).unwrap();
        assert_eq!(records.len(), 2);
    }
}
