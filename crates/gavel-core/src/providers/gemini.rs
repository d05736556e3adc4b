//! Google Gemini generateContent adapter.
//!
//! Gemini has no rejected-request class in our taxonomy: the original
//! integration retries 429/500/502/503 and aborts on everything else, and
//! this adapter keeps that policy.

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use super::messages::build_messages;
use super::{ChatBackend, GeminiCredentials};
use crate::errors::BackendError;
use crate::model::{Role, SamplingParams, TurnContext};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiBackend {
    model: String,
    credentials: GeminiCredentials,
    disable_system_prompt: bool,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(model: String, credentials: GeminiCredentials, disable_system_prompt: bool) -> Self {
        Self {
            model,
            credentials,
            disable_system_prompt,
            client: reqwest::Client::new(),
        }
    }

    fn body(&self, ctx: &TurnContext<'_>, params: &SamplingParams) -> serde_json::Value {
        let flatten = self.disable_system_prompt;
        let wire_ctx = TurnContext {
            system: if flatten { ctx.system } else { None },
            ..*ctx
        };

        // Gemini tags assistant turns as "model" and wraps text in parts.
        let contents: Vec<serde_json::Value> = build_messages(&wire_ctx, flatten)
            .into_iter()
            .map(|m| {
                let role = match m.role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut generation_config = json!({});
        if let Some(max_tokens) = params.max_tokens {
            // Gemini names this maxOutputTokens.
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }
        if let Some(temperature) = params.temperature {
            generation_config["temperature"] = json!(temperature);
        }
        if let Some(top_p) = params.top_p {
            generation_config["topP"] = json!(top_p);
        }
        if let Some(seed) = params.seed {
            generation_config["seed"] = json!(seed);
        }
        if params.frequency_penalty.is_some() {
            warn!("gemini does not support the frequency_penalty parameter; ignoring");
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": generation_config,
        });
        if !flatten {
            if let Some(system) = ctx.system {
                body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
            }
        }

        body
    }
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    async fn request(
        &self,
        ctx: &TurnContext<'_>,
        params: &SamplingParams,
    ) -> Result<String, BackendError> {
        let url = format!("{}/models/{}:generateContent", BASE_URL, self.model);

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.credentials.api_key)
            .json(&self.body(ctx, params))
            .send()
            .await
            .map_err(super::openai::classify_request_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 | 500 | 502 | 503 => {
                    BackendError::Transient(format!("gemini: {status}: {body}"))
                }
                _ => BackendError::Fatal(anyhow::anyhow!("gemini: API error ({status}): {body}")),
            });
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| {
            BackendError::Fatal(anyhow::anyhow!("gemini: invalid response body: {e}"))
        })?;

        json.pointer("/candidates/0/content/parts/0/text")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                BackendError::Fatal(anyhow::anyhow!("gemini: response missing candidate text"))
            })
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(disable_system_prompt: bool) -> GeminiBackend {
        GeminiBackend::new(
            "gemini-2.0-flash".to_string(),
            GeminiCredentials {
                api_key: "test".to_string(),
            },
            disable_system_prompt,
        )
    }

    #[test]
    fn assistant_turns_use_the_model_role() {
        let prompts = vec!["p0".to_string(), "p1".to_string()];
        let responses = vec![Some("r0".to_string())];
        let ctx = TurnContext {
            system: None,
            prompts: &prompts,
            responses: &responses,
        };

        let body = backend(false).body(&ctx, &SamplingParams::default());
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][1]["parts"][0]["text"], "r0");
        assert_eq!(body["contents"][2]["role"], "user");
    }

    #[test]
    fn max_tokens_is_renamed_for_gemini() {
        let prompts = vec!["p".to_string()];
        let ctx = TurnContext {
            system: Some("sys"),
            prompts: &prompts,
            responses: &[],
        };
        let params = SamplingParams {
            max_tokens: Some(256),
            ..Default::default()
        };

        let body = backend(false).body(&ctx, &params);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
    }

    #[test]
    fn disabled_system_prompt_omits_system_instruction() {
        let prompts = vec!["p".to_string()];
        let ctx = TurnContext {
            system: Some("sys"),
            prompts: &prompts,
            responses: &[],
        };

        let body = backend(true).body(&ctx, &SamplingParams::default());
        assert!(body.get("systemInstruction").is_none());
        assert_eq!(body["contents"][0]["parts"][0]["text"], "sys\n\np");
    }
}
