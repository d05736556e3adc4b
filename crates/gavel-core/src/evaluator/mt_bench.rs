//! MT-Bench judging: single-answer grading of two-turn dialogues on a 1-10
//! scale, with reference-guided variants for categories that have a single
//! correct answer (math, reasoning, coding).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{error_rates, judged_score, mean, AspectOptions, EvalOutcome, Evaluator};
use crate::data::load_jsonl;
use crate::engine::{BatchRequest, BatchRunner};
use crate::extract::RegexScoreExtractor;
use crate::model::{Record, SamplingParams};
use crate::report::Dashboard;

const DEFAULT_SYSTEM: &str = "You are a helpful assistant.";

const DEFAULT_REFERENCE_CATEGORIES: [&str; 3] = ["math", "reasoning", "coding"];

const SINGLE_V1: &str = "[Instruction]
Please act as an impartial judge and evaluate the quality of the response provided by an AI assistant to the user question displayed below. Your evaluation should consider factors such as the helpfulness, relevance, accuracy, depth, creativity, and level of detail of the response. Begin your evaluation by providing a short explanation. Be as objective as possible. After providing your explanation, you must rate the response on a scale of 1 to 10 by strictly following this format: \"[[rating]]\", for example: \"Rating: [[5]]\".

[Question]
{question}

[The Start of Assistant's Answer]
{answer}
[The End of Assistant's Answer]";

const SINGLE_MATH_V1: &str = "[Instruction]
Please act as an impartial judge and evaluate the quality of the response provided by an AI assistant to the user question displayed below. Your evaluation should consider correctness and helpfulness. You will be given a reference answer and the assistant's answer. Begin your evaluation by comparing the assistant's answer with the reference answer. Identify and correct any mistakes. Be as objective as possible. After providing your explanation, you must rate the response on a scale of 1 to 10 by strictly following this format: \"[[rating]]\", for example: \"Rating: [[5]]\".

[Question]
{question}

[The Start of Reference Answer]
{ref_answer_1}
[The End of Reference Answer]

[The Start of Assistant's Answer]
{answer}
[The End of Assistant's Answer]";

const SINGLE_V1_MULTI_TURN: &str = "[Instruction]
Please act as an impartial judge and evaluate the quality of the response provided by an AI assistant to the user questions displayed below. Your evaluation should focus on the assistant's answer to the second user question. Your evaluation should consider factors such as the helpfulness, relevance, accuracy, depth, creativity, and level of detail of the response. Begin your evaluation by providing a short explanation. Be as objective as possible. After providing your explanation, you must rate the response on a scale of 1 to 10 by strictly following this format: \"[[rating]]\", for example: \"Rating: [[5]]\".

<|The Start of Assistant's Conversation with User|>

### User:
{question_1}

### Assistant:
{answer_1}

### User:
{question_2}

### Assistant:
{answer_2}

<|The End of Assistant's Conversation with User|>";

const SINGLE_MATH_V1_MULTI_TURN: &str = "[Instruction]
Please act as an impartial judge and evaluate the quality of the response provided by an AI assistant to the user questions displayed below. Your evaluation should focus on the assistant's answer to the second question. You will be given reference answers, written by a human expert. Begin your evaluation by comparing the assistant's answers with the reference answers. Identify and correct any mistakes. Be as objective as possible. After providing your explanation, you must rate the response on a scale of 1 to 10 by strictly following this format: \"[[rating]]\", for example: \"Rating: [[5]]\".

<|The Start of Reference Answer|>

### User:
{question_1}

### Reference answer:
{ref_answer_1}

### User:
{question_2}

### Reference answer:
{ref_answer_2}

<|The End of Reference Answer|>

<|The Start of Assistant's Conversation with User|>

### User:
{question_1}

### Assistant:
{answer_1}

### User:
{question_2}

### Assistant:
{answer_2}

<|The End of Assistant's Conversation with User|>";

const SCORE_PATTERN: &str = r"\[\[(10|[1-9])\]\]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JudgeKind {
    SingleV1,
    SingleMathV1,
    SingleV1MultiTurn,
    SingleMathV1MultiTurn,
}

impl JudgeKind {
    fn name(self) -> &'static str {
        match self {
            JudgeKind::SingleV1 => "single-v1",
            JudgeKind::SingleMathV1 => "single-math-v1",
            JudgeKind::SingleV1MultiTurn => "single-v1-multi-turn",
            JudgeKind::SingleMathV1MultiTurn => "single-math-v1-multi-turn",
        }
    }
}

/// One judge query: which source record, which turn, which template.
struct QueryMeta {
    source: usize,
    turn: u32,
    kind: JudgeKind,
}

#[derive(Debug, Deserialize)]
struct ReferenceChoice {
    turns: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReferenceAnswer {
    question_id: Value,
    choices: Vec<ReferenceChoice>,
}

fn response_text(record: &Record, turn: usize) -> &str {
    record
        .responses
        .get(turn)
        .and_then(|r| r.as_deref())
        .unwrap_or_default()
}

pub struct MtBenchEvaluator {
    runner: BatchRunner,
    dashboard: Arc<dyn Dashboard>,
    system: Option<String>,
    params: SamplingParams,
    references: BTreeMap<String, Vec<String>>,
    reference_categories: Vec<String>,
    generation_model: Option<String>,
    judge_model: Option<String>,
}

impl MtBenchEvaluator {
    pub fn new(
        runner: BatchRunner,
        dashboard: Arc<dyn Dashboard>,
        opts: AspectOptions,
    ) -> anyhow::Result<Self> {
        let mut references = BTreeMap::new();
        if let Some(path) = &opts.reference_path {
            let answers: Vec<ReferenceAnswer> = load_jsonl(path)?;
            for answer in answers {
                let id = match &answer.question_id {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                if let Some(choice) = answer.choices.into_iter().next() {
                    references.insert(id, choice.turns);
                }
            }
        }
        let reference_categories = if opts.reference_categories.is_empty() {
            DEFAULT_REFERENCE_CATEGORIES
                .iter()
                .map(|c| c.to_string())
                .collect()
        } else {
            opts.reference_categories
        };
        Ok(Self {
            runner,
            dashboard,
            system: opts.system_prompt.or_else(|| Some(DEFAULT_SYSTEM.into())),
            params: opts.sampling,
            references,
            reference_categories,
            generation_model: opts.generation_model,
            judge_model: opts.judge_model,
        })
    }

    fn reference_for(&self, record: &Record) -> Option<&[String]> {
        let category = record.category.as_deref()?;
        if !self.reference_categories.iter().any(|c| c == category) {
            return None;
        }
        self.references.get(&record.id).map(Vec::as_slice)
    }

    fn turn1_query(&self, record: &Record) -> (JudgeKind, String) {
        match self.reference_for(record) {
            Some(reference) => (
                JudgeKind::SingleMathV1,
                SINGLE_MATH_V1
                    .replace("{question}", &record.prompts[0])
                    .replace(
                        "{ref_answer_1}",
                        reference.first().map(String::as_str).unwrap_or_default(),
                    )
                    .replace("{answer}", response_text(record, 0)),
            ),
            None => (
                JudgeKind::SingleV1,
                SINGLE_V1
                    .replace("{question}", &record.prompts[0])
                    .replace("{answer}", response_text(record, 0)),
            ),
        }
    }

    fn turn2_query(&self, record: &Record) -> (JudgeKind, String) {
        let base = match self.reference_for(record) {
            Some(reference) => (
                JudgeKind::SingleMathV1MultiTurn,
                SINGLE_MATH_V1_MULTI_TURN
                    .replace(
                        "{ref_answer_1}",
                        reference.first().map(String::as_str).unwrap_or_default(),
                    )
                    .replace(
                        "{ref_answer_2}",
                        reference.get(1).map(String::as_str).unwrap_or_default(),
                    ),
            ),
            None => (JudgeKind::SingleV1MultiTurn, SINGLE_V1_MULTI_TURN.to_string()),
        };
        let (kind, template) = base;
        let prompt = template
            .replace("{question_1}", &record.prompts[0])
            .replace("{answer_1}", response_text(record, 0))
            .replace("{question_2}", &record.prompts[1])
            .replace("{answer_2}", response_text(record, 1));
        (kind, prompt)
    }

    fn model_columns(&self) -> (Value, Value) {
        (
            json!(self.generation_model.as_deref().unwrap_or("N/A")),
            json!(self.judge_model.as_deref().unwrap_or("N/A")),
        )
    }
}

#[async_trait]
impl Evaluator for MtBenchEvaluator {
    async fn evaluate(&self, records: Vec<Record>) -> anyhow::Result<EvalOutcome> {
        let mut metas: Vec<QueryMeta> = Vec::new();
        let mut queries: Vec<Record> = Vec::new();
        for (i, record) in records.iter().enumerate() {
            let (kind, prompt) = self.turn1_query(record);
            metas.push(QueryMeta {
                source: i,
                turn: 1,
                kind,
            });
            queries.push(Record::single_turn(record.id.clone(), prompt));

            if record.prompts.len() > 1 {
                let (kind, prompt) = self.turn2_query(record);
                metas.push(QueryMeta {
                    source: i,
                    turn: 2,
                    kind,
                });
                queries.push(Record::single_turn(record.id.clone(), prompt));
            }
        }

        let extractor = RegexScoreExtractor::new(SCORE_PATTERN)?;
        let request = BatchRequest {
            system: self.system.clone(),
            params: self.params.clone(),
            extractor: Some(Arc::new(extractor)),
        };
        let judged = self.runner.run(queries, &request, None).await?;

        let mut all = Vec::new();
        let mut per_turn: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
        let mut per_category: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut rows = Vec::new();
        for (meta, judge) in metas.iter().zip(&judged) {
            let source = &records[meta.source];
            let score = judged_score(judge);
            if let Some(score) = score {
                all.push(score);
                per_turn.entry(meta.turn).or_default().push(score);
                if let Some(category) = &source.category {
                    per_category.entry(category.clone()).or_default().push(score);
                }
            }
            rows.push(vec![
                json!(source.id),
                json!(source.category),
                json!(meta.kind.name()),
                json!(meta.turn),
                json!(judge.prompts[0]),
                json!(judge.first_response()),
                json!(score),
                json!(source.all_errors()),
                json!(judge.all_errors()),
            ]);
        }

        self.dashboard.log_table(
            "mt_bench_raw_output_table",
            &[
                "id",
                "category",
                "metric",
                "turn",
                "evaluation prompt",
                "evaluation response",
                "score",
                "generation errors",
                "evaluation errors",
            ],
            rows,
        );

        let overall = mean(&all);
        let turn1 = per_turn.get(&1).and_then(|v| mean(v));
        let turn2 = per_turn.get(&2).and_then(|v| mean(v));
        let (generation_model, judge_model) = self.model_columns();
        self.dashboard.log_table(
            "mt_bench_turn_score_table",
            &[
                "generation_model",
                "evaluation_model",
                "turn 1",
                "turn 2",
                "average",
            ],
            vec![vec![
                generation_model.clone(),
                judge_model.clone(),
                json!(turn1),
                json!(turn2),
                json!(overall),
            ]],
        );

        let mut category_columns = vec!["generation_model".to_string(), "evaluation_model".to_string()];
        let mut category_row = vec![generation_model, judge_model];
        let mut scores: BTreeMap<String, Option<f64>> = BTreeMap::new();
        for (category, values) in &per_category {
            let score = mean(values);
            category_columns.push(category.clone());
            category_row.push(json!(score));
            scores.insert(format!("mt_bench:category:{category}"), score);
        }
        category_columns.push("average".to_string());
        category_row.push(json!(overall));
        let category_columns: Vec<&str> =
            category_columns.iter().map(String::as_str).collect();
        self.dashboard.log_table(
            "mt_bench_category_score_table",
            &category_columns,
            vec![category_row],
        );

        scores.insert("mt_bench".to_string(), overall);
        scores.insert("mt_bench:turn1".to_string(), turn1);
        scores.insert("mt_bench:turn2".to_string(), turn2);
        info!(?scores, "mt_bench scores");

        Ok(EvalOutcome {
            scores,
            error_rates: error_rates("mt_bench", &judged),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::providers::fake::{FakeBackend, FakeReply};
    use crate::report::NullDashboard;

    fn two_turn(id: &str, category: &str, answers: [&str; 2]) -> Record {
        let mut record = Record::new(id, vec!["first question".into(), "follow-up".into()]);
        record.category = Some(category.into());
        for answer in answers {
            record.responses.push(Some(answer.into()));
            record.extracted.push(None);
            record.errors.push(vec![]);
        }
        record
    }

    fn evaluator(backend: Arc<FakeBackend>) -> MtBenchEvaluator {
        let runner = BatchRunner::new(backend, EngineConfig::immediate(1));
        MtBenchEvaluator::new(runner, Arc::new(NullDashboard), AspectOptions::default())
            .unwrap()
    }

    #[tokio::test]
    async fn grades_both_turns_and_aggregates() {
        let backend = Arc::new(FakeBackend::script(vec![
            FakeReply::Text("Rating: [[8]]".into()),
            FakeReply::Text("Rating: [[6]]".into()),
        ]));
        let evaluator = evaluator(backend);

        let outcome = evaluator
            .evaluate(vec![two_turn("81", "writing", ["a post", "a rewrite"])])
            .await
            .unwrap();

        assert_eq!(outcome.scores["mt_bench:turn1"], Some(8.0));
        assert_eq!(outcome.scores["mt_bench:turn2"], Some(6.0));
        assert_eq!(outcome.scores["mt_bench"], Some(7.0));
        assert_eq!(outcome.scores["mt_bench:category:writing"], Some(7.0));
    }

    #[tokio::test]
    async fn reference_categories_use_reference_templates() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("references.jsonl");
        std::fs::write(
            &path,
            "{\"question_id\": 101, \"choices\": [{\"turns\": [\"ref one\", \"ref two\"]}]}\n",
        )
        .unwrap();

        let runner = BatchRunner::new(
            Arc::new(FakeBackend::fixed("Rating: [[9]]")),
            EngineConfig::immediate(1),
        );
        let evaluator = MtBenchEvaluator::new(
            runner,
            Arc::new(NullDashboard),
            AspectOptions {
                reference_path: Some(path),
                ..Default::default()
            },
        )
        .unwrap();

        let record = two_turn("101", "math", ["x = 4", "x = 5"]);
        let (kind, prompt) = evaluator.turn1_query(&record);
        assert_eq!(kind.name(), "single-math-v1");
        assert!(prompt.contains("ref one"));

        let (kind, prompt) = evaluator.turn2_query(&record);
        assert_eq!(kind.name(), "single-math-v1-multi-turn");
        assert!(prompt.contains("ref two"));
    }

    #[tokio::test]
    async fn non_reference_category_without_reference_answers() {
        let backend = Arc::new(FakeBackend::fixed("Rating: [[7]]"));
        let evaluator = evaluator(backend);

        // "math" is a reference category by default, but no reference file
        // was configured, so the plain templates apply.
        let record = two_turn("1", "math", ["x = 4", "x = 5"]);
        let (kind, _) = evaluator.turn1_query(&record);
        assert_eq!(kind.name(), "single-v1");
    }

    #[tokio::test]
    async fn missing_judge_scores_are_excluded_from_means() {
        let backend = Arc::new(FakeBackend::script(vec![
            FakeReply::Text("Rating: [[8]]".into()),
            FakeReply::Text("no rating".into()),
        ]));
        let evaluator = evaluator(backend);

        let outcome = evaluator
            .evaluate(vec![two_turn("81", "writing", ["a", "b"])])
            .await
            .unwrap();

        assert_eq!(outcome.scores["mt_bench"], Some(8.0));
        assert_eq!(outcome.scores["mt_bench:turn2"], None);
        assert_eq!(outcome.error_rates["mt_bench:pattern_match(%)"], 50.0);
    }
}
