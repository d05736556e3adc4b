//! Adapter for a local OpenAI-compatible inference server (e.g. vLLM serve).
//!
//! Local inference has no rate limits, so this adapter exposes the batched
//! interface: one call fans out a whole generation of requests and the
//! server's own scheduler provides the parallelism. Turn reconstruction is
//! identical to the hosted adapters.

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::json;

use super::messages::build_messages;
use super::BatchBackend;
use crate::model::{SamplingParams, TurnContext};

pub struct LocalServerBackend {
    base_url: String,
    model: String,
    disable_system_prompt: bool,
    client: reqwest::Client,
}

impl LocalServerBackend {
    pub fn new(base_url: String, model: String, disable_system_prompt: bool) -> Self {
        Self {
            base_url,
            model,
            disable_system_prompt,
            client: reqwest::Client::new(),
        }
    }

    async fn one_request(
        &self,
        ctx: &TurnContext<'_>,
        params: &SamplingParams,
    ) -> anyhow::Result<String> {
        let url = format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        );
        let messages = build_messages(ctx, self.disable_system_prompt);

        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(max_tokens) = params.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = params.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = params.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(seed) = params.seed {
            body["seed"] = json!(seed);
        }

        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("local server error ({status}): {body}");
        }

        let json: serde_json::Value = resp.json().await?;
        json.pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("local server response missing message content"))
    }
}

#[async_trait]
impl BatchBackend for LocalServerBackend {
    async fn batch_request(
        &self,
        contexts: &[TurnContext<'_>],
        params: &SamplingParams,
    ) -> anyhow::Result<Vec<String>> {
        try_join_all(contexts.iter().map(|ctx| self.one_request(ctx, params))).await
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }
}
