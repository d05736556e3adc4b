//! `gavel judge`: load generation JSONL, grade each configured aspect with
//! the judge model, and flush score tables and summaries to the report
//! directory.

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use gavel_core::config::{load_config, JudgeConfig};
use gavel_core::data::{load_json, load_jsonl};
use gavel_core::engine::BatchRunner;
use gavel_core::evaluator::load_evaluator;
use gavel_core::model::Record;
use gavel_core::report::{Dashboard, JsonDashboard};

use crate::cli::JudgeArgs;

pub async fn run(args: &JudgeArgs) -> anyhow::Result<()> {
    let config: JudgeConfig = load_config(&args.config)?;
    if config.client.is_local() {
        anyhow::bail!("the judge phase requires a hosted provider");
    }
    let engine = config.client.engine();
    let backend = config.client.provider_config()?.build();
    let dashboard: Arc<dyn Dashboard> = Arc::new(JsonDashboard::new(&config.report.dir));

    // The generate phase records which model produced the responses.
    let generation_model = load_json::<serde_json::Value>(&config.input.dir.join("metadata.json"))
        .ok()
        .and_then(|meta| meta["model"].as_str().map(String::from));

    for aspect in &config.aspects {
        let path = config.input.dir.join(format!("{}.jsonl", aspect.name));
        let records: Vec<Record> = load_jsonl(&path)?;
        info!(
            aspect = %aspect.name,
            total = records.len(),
            judge = %config.client.model,
            "judging"
        );

        let runner = BatchRunner::new(Arc::clone(&backend), engine.clone());
        let evaluator = load_evaluator(
            aspect.aspect,
            runner,
            Arc::clone(&dashboard),
            aspect.options(
                generation_model.clone(),
                Some(config.client.model.clone()),
            ),
        )?;
        let outcome = evaluator.evaluate(records).await?;

        for (key, value) in &outcome.scores {
            dashboard.log_summary(key, json!(value));
        }
        for (key, value) in &outcome.error_rates {
            dashboard.log_summary(key, json!(value));
        }
    }

    dashboard.flush()?;
    info!(report = %config.report.dir.display(), "judging finished");
    Ok(())
}
