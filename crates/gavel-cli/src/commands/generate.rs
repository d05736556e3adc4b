//! `gavel generate`: run every configured benchmark through the candidate
//! model and persist responses as JSONL for the judge phase.

use std::sync::Arc;

use anyhow::Context;
use serde_json::json;
use tracing::info;

use gavel_core::config::{load_config, GenerateConfig};
use gavel_core::data::{save_json, save_jsonl};
use gavel_core::dataset::load_dataset;
use gavel_core::engine::{
    BatchRequest, BatchRunner, LocalRunner, ProgressEvent, ProgressSink,
};
use gavel_core::model::Record;
use gavel_core::providers::local::LocalServerBackend;

use crate::cli::GenerateArgs;

fn progress_sink(benchmark: String) -> ProgressSink {
    Arc::new(move |ev: ProgressEvent| {
        info!(benchmark = %benchmark, done = ev.done, total = ev.total, "progress");
    })
}

pub async fn run(args: &GenerateArgs) -> anyhow::Result<()> {
    let config: GenerateConfig = load_config(&args.config)?;
    let engine = config.client.engine();

    for bench in &config.benchmarks {
        let out_path = config.output.dir.join(format!("{}.jsonl", bench.name));
        if out_path.exists() && !config.output.overwrite {
            info!(
                benchmark = %bench.name,
                path = %out_path.display(),
                "output exists, skipping (set output.overwrite to regenerate)"
            );
            continue;
        }

        let records = load_dataset(bench.dataset, &bench.path, bench.size)?;
        let total = records.len();
        info!(benchmark = %bench.name, total, model = %config.client.model, "generating");

        let request = BatchRequest {
            system: bench.system_prompt.clone(),
            params: bench.sampling.clone(),
            extractor: None,
        };
        let progress = Some(progress_sink(bench.name.clone()));
        let results: Vec<Record> = if config.client.is_local() {
            let base_url = config
                .client
                .base_url
                .clone()
                .context("client.base_url is required for the local provider")?;
            let backend = Arc::new(LocalServerBackend::new(
                base_url,
                config.client.model.clone(),
                config.client.disable_system_prompt,
            ));
            LocalRunner::new(backend, engine.clone())
                .run(records, &request, progress)
                .await?
        } else {
            let backend = config.client.provider_config()?.build();
            BatchRunner::new(backend, engine.clone())
                .run(records, &request, progress)
                .await?
        };

        let succeeded = results.iter().filter(|r| r.is_complete(false)).count();
        let success_rate = if total == 0 {
            100.0
        } else {
            succeeded as f64 / total as f64 * 100.0
        };
        info!(
            benchmark = %bench.name,
            succeeded,
            total,
            success_rate = format_args!("{success_rate:.1}%"),
            "generation finished"
        );
        save_jsonl(&out_path, &results)?;
    }

    save_json(
        &config.output.dir.join("metadata.json"),
        &json!({
            "model": config.client.model,
            "created_at": chrono::Utc::now().to_rfc3339(),
        }),
    )?;
    Ok(())
}
