//! Batch runners: drive a whole list of records to completion.
//!
//! `BatchRunner` runs one task per record against a hosted backend, with
//! staggered starts for rate smoothing. `LocalRunner` instead batches one
//! call per turn generation across all records for local inference servers.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::info;

use super::{drive_record, EngineConfig};
use crate::extract::ScoreExtractor;
use crate::model::{Record, SamplingParams, TurnContext};
use crate::providers::{BatchBackend, ChatBackend};

/// One progress update: records finished so far and total count.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent {
    pub done: usize,
    pub total: usize,
}

/// Sink for progress events, called each time a record reaches terminal
/// state. Implementations may throttle.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Shared parameters for one batch call.
#[derive(Clone, Default)]
pub struct BatchRequest {
    pub system: Option<String>,
    pub params: SamplingParams,
    pub extractor: Option<Arc<dyn ScoreExtractor>>,
}

/// Concurrent per-record runner for network-backed providers.
pub struct BatchRunner {
    backend: Arc<dyn ChatBackend>,
    cfg: EngineConfig,
}

impl BatchRunner {
    pub fn new(backend: Arc<dyn ChatBackend>, cfg: EngineConfig) -> Self {
        Self { backend, cfg }
    }

    pub fn provider_name(&self) -> &'static str {
        self.backend.provider_name()
    }

    /// Run every record to a terminal state and return them in input order.
    ///
    /// One tokio task per record; task starts are staggered by
    /// `request_interval × (prompts already scheduled)` so issuance stays
    /// roughly rate-bounded. Results land in index-stable slots, so output
    /// order never depends on completion order. Returns an error only for
    /// unclassified backend failures, which abort the whole batch.
    pub async fn run(
        &self,
        records: Vec<Record>,
        request: &BatchRequest,
        progress: Option<ProgressSink>,
    ) -> anyhow::Result<Vec<Record>> {
        let total = records.len();
        let mut join_set = JoinSet::new();
        let mut stagger = Duration::ZERO;

        for (idx, mut record) in records.into_iter().enumerate() {
            let backend = Arc::clone(&self.backend);
            let cfg = self.cfg.clone();
            let request = request.clone();
            let delay = stagger;
            stagger += cfg.request_interval * record.prompts.len() as u32;

            join_set.spawn(async move {
                tokio::time::sleep(delay).await;
                drive_record(
                    backend.as_ref(),
                    &cfg,
                    &mut record,
                    request.system.as_deref(),
                    &request.params,
                    request.extractor.as_deref(),
                )
                .await?;
                Ok::<_, crate::errors::BackendError>((idx, record))
            });
        }

        let mut slots: Vec<Option<Record>> = (0..total).map(|_| None).collect();
        let mut done = 0usize;
        while let Some(joined) = join_set.join_next().await {
            let (idx, record) = joined??;
            slots[idx] = Some(record);
            done += 1;
            if let Some(sink) = &progress {
                sink(ProgressEvent { done, total });
            }
        }

        info!(total, provider = self.backend.provider_name(), "batch complete");
        Ok(slots
            .into_iter()
            .map(|slot| slot.expect("every record task returns exactly one slot"))
            .collect())
    }
}

/// Breadth-over-records runner for batched local backends: for each turn
/// index, one batched call covers every still-pending record, and extraction
/// failures are re-batched until the shared per-turn budget is consumed.
pub struct LocalRunner {
    backend: Arc<dyn BatchBackend>,
    cfg: EngineConfig,
}

impl LocalRunner {
    pub fn new(backend: Arc<dyn BatchBackend>, cfg: EngineConfig) -> Self {
        Self { backend, cfg }
    }

    pub async fn run(
        &self,
        mut records: Vec<Record>,
        request: &BatchRequest,
        progress: Option<ProgressSink>,
    ) -> anyhow::Result<Vec<Record>> {
        let needs_extraction = request.extractor.is_some();
        let active: Vec<usize> = records
            .iter_mut()
            .enumerate()
            .filter_map(|(i, r)| {
                if r.is_complete(needs_extraction) {
                    None
                } else {
                    r.reset_annotations();
                    Some(i)
                }
            })
            .collect();

        let max_turns = active
            .iter()
            .map(|&i| records[i].prompts.len())
            .max()
            .unwrap_or(0);

        for turn in 0..max_turns {
            let mut pending: Vec<usize> = active
                .iter()
                .copied()
                .filter(|&i| records[i].prompts.len() > turn)
                .collect();
            for &i in &pending {
                records[i].responses.push(None);
                records[i].extracted.push(None);
                records[i].errors.push(Vec::new());
            }

            let mut attempts = 0u32;
            while attempts < self.cfg.max_retries && !pending.is_empty() {
                let texts = {
                    let contexts: Vec<TurnContext<'_>> = pending
                        .iter()
                        .map(|&i| TurnContext {
                            system: request.system.as_deref(),
                            prompts: &records[i].prompts[..=turn],
                            responses: &records[i].responses[..turn],
                        })
                        .collect();
                    self.backend.batch_request(&contexts, &request.params).await?
                };

                let mut still_pending = Vec::new();
                for (&i, text) in pending.iter().zip(texts) {
                    records[i].responses[turn] = Some(text);
                    let Some(extractor) = &request.extractor else {
                        continue;
                    };
                    let response = records[i].responses[turn].as_deref().unwrap_or_default();
                    match extractor.extract(response) {
                        Ok(value) => records[i].extracted[turn] = Some(value),
                        Err(e) => {
                            records[i].errors[turn].push(e.to_string());
                            still_pending.push(i);
                        }
                    }
                }
                pending = still_pending;
                attempts += 1;
            }
        }

        if let Some(sink) = &progress {
            sink(ProgressEvent {
                done: records.len(),
                total: records.len(),
            });
        }
        info!(total = records.len(), "local batch complete");
        Ok(records)
    }
}
