//! Anthropic messages-API adapter.

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use super::messages::build_messages;
use super::{AnthropicCredentials, ChatBackend};
use crate::errors::BackendError;
use crate::model::{Role, SamplingParams, TurnContext};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

// The messages API requires max_tokens; used when sampling params omit it.
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicBackend {
    model: String,
    credentials: AnthropicCredentials,
    disable_system_prompt: bool,
    client: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(
        model: String,
        credentials: AnthropicCredentials,
        disable_system_prompt: bool,
    ) -> Self {
        Self {
            model,
            credentials,
            disable_system_prompt,
            client: reqwest::Client::new(),
        }
    }

    fn body(&self, ctx: &TurnContext<'_>, params: &SamplingParams) -> serde_json::Value {
        // System goes in a top-level field, never a message role. When the
        // system prompt is disabled, the builder flattens it into turn 0.
        let flatten = self.disable_system_prompt;
        let wire_ctx = TurnContext {
            system: if flatten { ctx.system } else { None },
            ..*ctx
        };
        let messages = build_messages(&wire_ctx, flatten);
        debug_assert!(messages.iter().all(|m| m.role != Role::System));
        let system = if flatten { None } else { ctx.system };

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if let Some(temperature) = params.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = params.top_p {
            body["top_p"] = json!(top_p);
        }
        if params.seed.is_some() {
            warn!("anthropic does not support the seed parameter; ignoring");
        }
        if params.frequency_penalty.is_some() {
            warn!("anthropic does not support the frequency_penalty parameter; ignoring");
        }

        body
    }
}

#[async_trait]
impl ChatBackend for AnthropicBackend {
    async fn request(
        &self,
        ctx: &TurnContext<'_>,
        params: &SamplingParams,
    ) -> Result<String, BackendError> {
        let base = self
            .credentials
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL);
        let url = format!("{}/v1/messages", base.trim_end_matches('/'));

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.credentials.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.body(ctx, params))
            .send()
            .await
            .map_err(super::openai::classify_request_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                // 529 is Anthropic's "overloaded" response.
                429 | 529 => {
                    BackendError::Transient(format!("anthropic: {status}: {body}"))
                }
                400 | 413 => BackendError::Rejected(format!("anthropic: {status}: {body}")),
                _ => BackendError::Fatal(anyhow::anyhow!("anthropic: API error ({status}): {body}")),
            });
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| {
            BackendError::Fatal(anyhow::anyhow!("anthropic: invalid response body: {e}"))
        })?;

        json.pointer("/content/0/text")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                BackendError::Fatal(anyhow::anyhow!("anthropic: response missing content text"))
            })
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_is_top_level_and_unsupported_keys_are_dropped() {
        let backend = AnthropicBackend::new(
            "claude-sonnet".to_string(),
            AnthropicCredentials {
                api_key: "test".to_string(),
                base_url: None,
            },
            false,
        );
        let prompts = vec!["q".to_string()];
        let ctx = TurnContext {
            system: Some("judge fairly"),
            prompts: &prompts,
            responses: &[],
        };
        let params = SamplingParams {
            seed: Some(7),
            frequency_penalty: Some(0.5),
            ..Default::default()
        };

        let body = backend.body(&ctx, &params);
        assert_eq!(body["system"], "judge fairly");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert!(body.get("seed").is_none());
        assert!(body.get("frequency_penalty").is_none());
    }

    #[test]
    fn disabled_system_prompt_flattens_into_first_turn() {
        let backend = AnthropicBackend::new(
            "claude-sonnet".to_string(),
            AnthropicCredentials {
                api_key: "test".to_string(),
                base_url: None,
            },
            true,
        );
        let prompts = vec!["q".to_string()];
        let ctx = TurnContext {
            system: Some("judge fairly"),
            prompts: &prompts,
            responses: &[],
        };

        let body = backend.body(&ctx, &SamplingParams::default());
        assert!(body.get("system").is_none());
        assert_eq!(body["messages"][0]["content"], "judge fairly\n\nq");
    }
}
