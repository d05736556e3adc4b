//! Multi-metric quality rubric: accuracy, fluency, detail, relevance and an
//! overall grade, each scored 1-5 in one judge call per record.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{error_rates, mean, AspectOptions, EvalOutcome, Evaluator};
use crate::engine::{BatchRequest, BatchRunner};
use crate::extract::MetricSetExtractor;
use crate::model::{Record, SamplingParams};
use crate::report::Dashboard;

pub const METRICS: [&str; 5] = ["accuracy", "fluency", "detail", "relevance", "overall"];

const PROMPT_TEMPLATE: &str = "[Instruction]
Evaluate the AI assistant's answer to the question below on the following criteria.

accuracy: Does the answer state facts correctly? Give a low rating to answers containing falsehoods or misleading claims, except for questions asking for fiction or subjective opinion.
fluency: Is the answer natural, well-formed text? Give a low rating to grammatically broken answers.
detail: Does the answer address the question in sufficient depth? Give a low rating when the answer is incomplete.
relevance: Does the answer stay on topic? Give a low rating when it contains material unrelated to the question.
overall: An overall judgement across the criteria above.

Each rating is an integer from 1 to 5, where 1 is very poor and 5 is very good.
State your reasoning first, then the rating. Wrap each rating in double square brackets (example: [[3]]) and use exactly this format:

accuracy (reasoning): your reasoning
accuracy: [[rating]]

fluency (reasoning): your reasoning
fluency: [[rating]]

detail (reasoning): your reasoning
detail: [[rating]]

relevance (reasoning): your reasoning
relevance: [[rating]]

overall (reasoning): your reasoning
overall: [[rating]]

[Question]
{question}

[The Start of Assistant's Answer]
{response}
[The End of Assistant's Answer]";

fn judge_prompt(question: &str, response: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{question}", question)
        .replace("{response}", response)
}

pub struct QualityEvaluator {
    runner: BatchRunner,
    dashboard: Arc<dyn Dashboard>,
    system: Option<String>,
    params: SamplingParams,
    empty_response_score: Option<f64>,
}

impl QualityEvaluator {
    pub fn new(runner: BatchRunner, dashboard: Arc<dyn Dashboard>, opts: AspectOptions) -> Self {
        Self {
            runner,
            dashboard,
            system: opts.system_prompt,
            params: opts.sampling,
            empty_response_score: opts.empty_response_score,
        }
    }
}

#[async_trait]
impl Evaluator for QualityEvaluator {
    async fn evaluate(&self, records: Vec<Record>) -> anyhow::Result<EvalOutcome> {
        // Empty generations are optionally credited a fixed score instead of
        // being judged.
        let mut skipped: Vec<usize> = Vec::new();
        let mut sources: Vec<usize> = Vec::new();
        let mut queries: Vec<Record> = Vec::new();
        for (i, record) in records.iter().enumerate() {
            let response = record.first_response().unwrap_or_default();
            if response.trim().is_empty() && self.empty_response_score.is_some() {
                skipped.push(i);
                continue;
            }
            sources.push(i);
            queries.push(Record::single_turn(
                record.id.clone(),
                judge_prompt(&record.prompts[0], response),
            ));
        }

        let extractor = MetricSetExtractor::new(&METRICS, "[1-5]")?;
        let request = BatchRequest {
            system: self.system.clone(),
            params: self.params.clone(),
            extractor: Some(Arc::new(extractor)),
        };
        let judged = self.runner.run(queries, &request, None).await?;

        let mut per_metric: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        let mut rows = Vec::new();
        for (&src, judge) in sources.iter().zip(&judged) {
            let source = &records[src];
            let mut row = vec![
                json!(judge.id),
                json!(source.prompts[0]),
                json!(source.first_response()),
                json!(judge.prompts[0]),
                json!(judge.first_response()),
            ];
            for metric in METRICS {
                let value = judge
                    .first_extracted()
                    .and_then(|v| v.metric(metric))
                    .and_then(|s| s.parse::<f64>().ok());
                if let Some(value) = value {
                    per_metric.entry(metric).or_default().push(value);
                }
                row.push(json!(value));
            }
            row.push(json!(source.all_errors()));
            row.push(json!(judge.all_errors()));
            rows.push(row);
        }
        for &src in &skipped {
            let source = &records[src];
            let score = self.empty_response_score.unwrap_or_default();
            let mut row = vec![
                json!(source.id),
                json!(source.prompts[0]),
                json!(source.first_response()),
                json!(null),
                json!(null),
            ];
            for metric in METRICS {
                per_metric.entry(metric).or_default().push(score);
                row.push(json!(score));
            }
            row.push(json!(source.all_errors()));
            row.push(json!(Vec::<String>::new()));
            rows.push(row);
        }

        let mut columns = vec![
            "id",
            "generation prompt",
            "generation response",
            "evaluation prompt",
            "evaluation response",
        ];
        let score_columns: Vec<String> =
            METRICS.iter().map(|m| format!("score:{m}")).collect();
        columns.extend(score_columns.iter().map(String::as_str));
        columns.extend(["generation errors", "evaluation errors"]);
        self.dashboard
            .log_table("quality_raw_output_table", &columns, rows);

        let scores: BTreeMap<String, Option<f64>> = METRICS
            .iter()
            .map(|&metric| {
                let values = per_metric.get(metric).map(Vec::as_slice).unwrap_or(&[]);
                (format!("quality:{metric}"), mean(values))
            })
            .collect();
        info!(?scores, "quality scores");

        Ok(EvalOutcome {
            scores,
            error_rates: error_rates("quality", &judged),
        })
    }
}
