//! Reference-compared correctness grading on a 1-10 scale.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{error_rates, judged_score, mean, AspectOptions, EvalOutcome, Evaluator};
use crate::engine::{BatchRequest, BatchRunner};
use crate::extract::RegexScoreExtractor;
use crate::model::{Record, SamplingParams};
use crate::report::Dashboard;

const PROMPT_TEMPLATE: &str = "[Instruction]
Please act as an impartial judge and evaluate the quality of the response provided by an AI assistant to the user question displayed below. Your evaluation should consider correctness and helpfulness. You will be given a reference answer and the assistant's answer. Begin your evaluation by comparing the assistant's answer with the reference answer. Identify and correct any mistakes. Be as objective as possible. After providing your explanation, you must rate the response on a scale of 1 to 10 by strictly following this format: \"[[rating]]\", for example: \"Rating: [[5]]\".

[Question]
{question}

[The Start of Reference Answer]
{reference}
[The End of Reference Answer]

[The Start of Assistant's Answer]
{response}
[The End of Assistant's Answer]";

const SCORE_PATTERN: &str = r"\[\[(10|[1-9])\]\]";

fn judge_prompt(record: &Record) -> String {
    PROMPT_TEMPLATE
        .replace("{question}", &record.prompts[0])
        .replace("{reference}", record.reference.as_deref().unwrap_or_default())
        .replace("{response}", record.first_response().unwrap_or_default())
}

pub struct CultureEvaluator {
    runner: BatchRunner,
    dashboard: Arc<dyn Dashboard>,
    system: Option<String>,
    params: SamplingParams,
    api_error_score: Option<f64>,
}

impl CultureEvaluator {
    pub fn new(runner: BatchRunner, dashboard: Arc<dyn Dashboard>, opts: AspectOptions) -> Self {
        Self {
            runner,
            dashboard,
            system: opts.system_prompt,
            params: opts.sampling,
            api_error_score: opts.api_error_score,
        }
    }
}

#[async_trait]
impl Evaluator for CultureEvaluator {
    async fn evaluate(&self, records: Vec<Record>) -> anyhow::Result<EvalOutcome> {
        let queries: Vec<Record> = records
            .iter()
            .map(|r| Record::single_turn(r.id.clone(), judge_prompt(r)))
            .collect();

        let extractor = RegexScoreExtractor::new(SCORE_PATTERN)?;
        let request = BatchRequest {
            system: self.system.clone(),
            params: self.params.clone(),
            extractor: Some(Arc::new(extractor)),
        };
        let judged = self.runner.run(queries, &request, None).await?;

        let mut scored = Vec::new();
        let mut rows = Vec::new();
        for (source, judge) in records.iter().zip(&judged) {
            let score = if judge.first_response().is_none() {
                self.api_error_score
            } else {
                judged_score(judge)
            };
            if let Some(score) = score {
                scored.push(score);
            }
            rows.push(vec![
                json!(source.id),
                json!(source.prompts[0]),
                json!(source.first_response()),
                json!(source.reference),
                json!(judge.first_response()),
                json!(score),
                json!(source.all_errors()),
                json!(judge.all_errors()),
            ]);
        }

        self.dashboard.log_table(
            "culture_raw_output_table",
            &[
                "id",
                "generation prompt",
                "generation response",
                "reference response",
                "evaluation response",
                "score",
                "generation errors",
                "evaluation errors",
            ],
            rows,
        );

        let mut scores = BTreeMap::new();
        scores.insert("culture:score".to_string(), mean(&scored));
        info!(?scores, "culture scores");

        Ok(EvalOutcome {
            scores,
            error_rates: error_rates("culture", &judged),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::providers::fake::{FakeBackend, FakeReply};
    use crate::report::NullDashboard;

    fn generation(id: &str, response: &str, reference: &str) -> Record {
        let mut record = Record::single_turn(id, "what is a traditional new year dish?");
        record.responses.push(Some(response.into()));
        record.extracted.push(None);
        record.errors.push(vec![]);
        record.reference = Some(reference.into());
        record
    }

    #[tokio::test]
    async fn averages_reference_compared_scores() {
        let backend = Arc::new(FakeBackend::script(vec![
            FakeReply::Text("Close to the reference. Rating: [[10]]".into()),
            FakeReply::Text("Misses the reference. Rating: [[2]]".into()),
        ]));
        let runner = BatchRunner::new(backend, EngineConfig::immediate(1));
        let evaluator =
            CultureEvaluator::new(runner, Arc::new(NullDashboard), AspectOptions::default());

        let outcome = evaluator
            .evaluate(vec![
                generation("1", "osechi", "osechi"),
                generation("2", "birthday cake", "osechi"),
            ])
            .await
            .unwrap();

        assert_eq!(outcome.scores["culture:score"], Some(6.0));
        assert_eq!(outcome.error_rates["culture:pattern_match(%)"], 0.0);
    }

    #[test]
    fn prompt_embeds_the_reference() {
        let record = generation("1", "an answer", "the gold answer");
        let prompt = judge_prompt(&record);
        assert!(prompt.contains("the gold answer"));
        assert!(prompt.contains("an answer"));
    }
}
