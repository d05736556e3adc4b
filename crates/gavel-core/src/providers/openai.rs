//! OpenAI chat-completions adapter, plus the Azure deployment variant.
//! Both share the same wire body; only endpoint and auth differ.

use async_trait::async_trait;
use serde_json::json;

use super::messages::build_messages;
use super::{AzureOpenAiCredentials, ChatBackend, OpenAiCredentials};
use crate::errors::BackendError;
use crate::model::{SamplingParams, TurnContext};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiBackend {
    model: String,
    credentials: OpenAiCredentials,
    disable_system_prompt: bool,
    client: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(
        model: String,
        credentials: OpenAiCredentials,
        disable_system_prompt: bool,
    ) -> Self {
        Self {
            model,
            credentials,
            disable_system_prompt,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
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
        let url = format!("{}/chat/completions", base.trim_end_matches('/'));

        let body = chat_completions_body(&self.model, ctx, params, self.disable_system_prompt);

        let mut req = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.credentials.api_key))
            .json(&body);
        if let Some(org) = &self.credentials.organization {
            req = req.header("OpenAI-Organization", org);
        }
        if let Some(project) = &self.credentials.project {
            req = req.header("OpenAI-Project", project);
        }

        let resp = req.send().await.map_err(classify_request_error)?;
        let json = read_chat_response("openai", resp).await?;
        extract_chat_content("openai", &json)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Azure serves the same chat-completions contract under a deployment URL
/// with `api-key` auth. The model name doubles as the deployment name.
pub struct AzureOpenAiBackend {
    model: String,
    credentials: AzureOpenAiCredentials,
    disable_system_prompt: bool,
    client: reqwest::Client,
}

impl AzureOpenAiBackend {
    pub fn new(
        model: String,
        credentials: AzureOpenAiCredentials,
        disable_system_prompt: bool,
    ) -> Self {
        Self {
            model,
            credentials,
            disable_system_prompt,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatBackend for AzureOpenAiBackend {
    async fn request(
        &self,
        ctx: &TurnContext<'_>,
        params: &SamplingParams,
    ) -> Result<String, BackendError> {
        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.credentials.endpoint.trim_end_matches('/'),
            self.model,
            self.credentials.api_version
        );

        let body = chat_completions_body(&self.model, ctx, params, self.disable_system_prompt);

        let resp = self
            .client
            .post(&url)
            .header("api-key", &self.credentials.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_request_error)?;
        let json = read_chat_response("azure", resp).await?;
        extract_chat_content("azure", &json)
    }

    fn provider_name(&self) -> &'static str {
        "azure"
    }
}

pub(crate) fn chat_completions_body(
    model: &str,
    ctx: &TurnContext<'_>,
    params: &SamplingParams,
    disable_system_prompt: bool,
) -> serde_json::Value {
    let messages = build_messages(ctx, disable_system_prompt);
    let mut body = json!({
        "model": model,
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
    if let Some(penalty) = params.frequency_penalty {
        body["frequency_penalty"] = json!(penalty);
    }

    body
}

/// Transport-level classification: request timeouts are transient, other
/// connection failures are unanticipated and abort.
pub(crate) fn classify_request_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Transient(format!("request timeout: {err}"))
    } else {
        BackendError::Fatal(err.into())
    }
}

async fn read_chat_response(
    provider: &str,
    resp: reqwest::Response,
) -> Result<serde_json::Value, BackendError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(classify_status(provider, status, &body));
    }
    resp.json()
        .await
        .map_err(|e| BackendError::Fatal(anyhow::anyhow!("{provider}: invalid response body: {e}")))
}

/// HTTP status classification for the chat-completions providers: 429 is
/// rate limiting, 400/413 are request rejections, everything else aborts.
pub(crate) fn classify_status(
    provider: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> BackendError {
    match status.as_u16() {
        429 => BackendError::Transient(format!("{provider}: rate limited ({status}): {body}")),
        400 | 413 => BackendError::Rejected(format!("{provider}: {status}: {body}")),
        _ => BackendError::Fatal(anyhow::anyhow!("{provider}: API error ({status}): {body}")),
    }
}

fn extract_chat_content(provider: &str, json: &serde_json::Value) -> Result<String, BackendError> {
    json.pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            BackendError::Fatal(anyhow::anyhow!("{provider}: response missing message content"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SamplingParams {
        SamplingParams {
            max_tokens: Some(1024),
            temperature: Some(0.0),
            seed: Some(42),
            ..Default::default()
        }
    }

    #[test]
    fn body_carries_messages_and_supported_params() {
        let prompts = vec!["q1".to_string()];
        let ctx = TurnContext {
            system: Some("judge fairly"),
            prompts: &prompts,
            responses: &[],
        };
        let body = chat_completions_body("gpt-4o", &ctx, &params(), false);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "q1");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["seed"], 42);
        assert!(body.get("top_p").is_none());
    }

    #[test]
    fn status_classification_matches_retry_classes() {
        let transient = classify_status("openai", reqwest::StatusCode::TOO_MANY_REQUESTS, "slow");
        assert!(matches!(transient, BackendError::Transient(_)));

        let rejected = classify_status("openai", reqwest::StatusCode::BAD_REQUEST, "too long");
        assert!(matches!(rejected, BackendError::Rejected(_)));

        let fatal = classify_status("openai", reqwest::StatusCode::UNAUTHORIZED, "bad key");
        assert!(fatal.is_fatal());
    }
}
