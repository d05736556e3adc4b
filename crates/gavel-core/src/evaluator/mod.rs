//! Judge-side evaluators: each aspect turns generation records into judge
//! prompts, runs them through a batch runner with a score extractor, and
//! aggregates the extracted scores.

pub mod borderline;
pub mod culture;
pub mod mt_bench;
pub mod quality;
pub mod safety;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engine::BatchRunner;
use crate::model::{Record, SamplingParams};
use crate::report::Dashboard;

pub use borderline::BorderlineEvaluator;
pub use culture::CultureEvaluator;
pub use mt_bench::MtBenchEvaluator;
pub use quality::QualityEvaluator;
pub use safety::SafetyEvaluator;

/// Aggregated result of one evaluation run. Scores are `None` when no
/// record produced a usable value for that key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvalOutcome {
    pub scores: BTreeMap<String, Option<f64>>,
    pub error_rates: BTreeMap<String, f64>,
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, records: Vec<Record>) -> anyhow::Result<EvalOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectKind {
    Quality,
    MtBench,
    Safety,
    Borderline,
    Culture,
}

/// Per-aspect knobs, populated from the judge config. Unused fields are
/// ignored by aspects they do not apply to.
#[derive(Debug, Clone, Default)]
pub struct AspectOptions {
    pub system_prompt: Option<String>,
    pub sampling: SamplingParams,
    pub use_reference: bool,
    /// Fixed score credited when the candidate model produced an empty
    /// response, instead of judging it.
    pub empty_response_score: Option<f64>,
    /// Fixed score credited when the candidate API refused to answer; a
    /// refusal on a dangerous input can mean the guardrail worked.
    pub api_error_score: Option<f64>,
    /// Gold judge answers for reference-guided grading (MT-Bench).
    pub reference_path: Option<PathBuf>,
    /// Categories graded against the reference answers (MT-Bench).
    pub reference_categories: Vec<String>,
    /// Candidate model name, for score tables.
    pub generation_model: Option<String>,
    /// Judge model name, for score tables.
    pub judge_model: Option<String>,
}

pub fn load_evaluator(
    kind: AspectKind,
    runner: BatchRunner,
    dashboard: Arc<dyn Dashboard>,
    opts: AspectOptions,
) -> anyhow::Result<Box<dyn Evaluator>> {
    Ok(match kind {
        AspectKind::Quality => Box::new(QualityEvaluator::new(runner, dashboard, opts)),
        AspectKind::MtBench => Box::new(MtBenchEvaluator::new(runner, dashboard, opts)?),
        AspectKind::Safety => Box::new(SafetyEvaluator::new(runner, dashboard, opts)),
        AspectKind::Borderline => Box::new(BorderlineEvaluator::new(runner, dashboard, opts)),
        AspectKind::Culture => Box::new(CultureEvaluator::new(runner, dashboard, opts)),
    })
}

/// API error rate (no judge response) and pattern-match error rate (no
/// extractable score), as percentages over the judged records.
pub(crate) fn error_rates(name: &str, judged: &[Record]) -> BTreeMap<String, f64> {
    let total = judged.len().max(1) as f64;
    let api = judged.iter().filter(|r| r.first_response().is_none()).count() as f64;
    let pattern = judged
        .iter()
        .filter(|r| r.first_extracted().is_none())
        .count() as f64;

    let api_rate = api / total * 100.0;
    let pattern_rate = pattern / total * 100.0;
    tracing::info!(
        aspect = name,
        api_error_rate = format_args!("{api_rate:.2}%"),
        pattern_match_error_rate = format_args!("{pattern_rate:.2}%"),
    );

    let mut rates = BTreeMap::new();
    rates.insert(format!("{name}:api(%)"), api_rate);
    rates.insert(format!("{name}:pattern_match(%)"), pattern_rate);
    rates
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Numeric score of a single-value judged record.
pub(crate) fn judged_score(record: &Record) -> Option<f64> {
    record.first_extracted().and_then(|v| v.as_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScoreValue;

    #[test]
    fn error_rates_count_api_and_pattern_separately() {
        let mut responded = Record::single_turn("1", "q");
        responded.responses.push(Some("Rating: [[4]]".into()));
        responded.extracted.push(Some(ScoreValue::Single("4".into())));
        responded.errors.push(vec![]);

        let mut unmatched = Record::single_turn("2", "q");
        unmatched.responses.push(Some("no score".into()));
        unmatched.extracted.push(None);
        unmatched.errors.push(vec!["pattern".into()]);

        let mut failed = Record::single_turn("3", "q");
        failed.responses.push(None);
        failed.extracted.push(None);
        failed.errors.push(vec!["api".into()]);

        let rates = error_rates("safety", &[responded, unmatched, failed]);
        let api = rates["safety:api(%)"];
        let pattern = rates["safety:pattern_match(%)"];
        assert!((api - 100.0 / 3.0).abs() < 1e-9);
        assert!((pattern - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn mean_of_empty_is_none() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[2.0, 4.0]), Some(3.0));
    }
}
