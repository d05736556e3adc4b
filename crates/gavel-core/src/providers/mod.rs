//! Backend adapters: one per LLM provider, all behind the same capability
//! traits so the turn engine never knows which provider it is driving.

pub mod anthropic;
pub mod fake;
pub mod gemini;
pub mod local;
pub mod messages;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::BackendError;
use crate::model::{SamplingParams, TurnContext};

/// One request round-trip against a hosted provider.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Perform exactly one request for the given conversation context and
    /// return the response text, or a classified error.
    async fn request(
        &self,
        ctx: &TurnContext<'_>,
        params: &SamplingParams,
    ) -> Result<String, BackendError>;

    fn provider_name(&self) -> &'static str;
}

/// Batched variant for local/self-hosted inference servers: one call covers
/// a whole generation of contexts. Same turn-reconstruction contract as
/// [`ChatBackend`]; there is no rate limiting locally, so failures are fatal.
#[async_trait]
pub trait BatchBackend: Send + Sync {
    async fn batch_request(
        &self,
        contexts: &[TurnContext<'_>],
        params: &SamplingParams,
    ) -> anyhow::Result<Vec<String>>;

    fn provider_name(&self) -> &'static str;
}

/// Credentials for the OpenAI API, resolved once at process start.
#[derive(Debug, Clone)]
pub struct OpenAiCredentials {
    pub api_key: String,
    pub base_url: Option<String>,
    pub organization: Option<String>,
    pub project: Option<String>,
}

impl OpenAiCredentials {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            api_key: require_env("OPENAI_API_KEY")?,
            base_url: std::env::var("OPENAI_BASE_URL").ok(),
            organization: std::env::var("OPENAI_ORGANIZATION").ok(),
            project: std::env::var("OPENAI_PROJECT").ok(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct AzureOpenAiCredentials {
    pub api_key: String,
    pub endpoint: String,
    pub api_version: String,
}

impl AzureOpenAiCredentials {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            api_key: require_env("AZURE_API_KEY")?,
            endpoint: require_env("AZURE_ENDPOINT")?,
            api_version: std::env::var("AZURE_API_VERSION")
                .unwrap_or_else(|_| "2024-06-01".to_string()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct AnthropicCredentials {
    pub api_key: String,
    pub base_url: Option<String>,
}

impl AnthropicCredentials {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            api_key: require_env("ANTHROPIC_API_KEY")?,
            base_url: std::env::var("ANTHROPIC_BASE_URL").ok(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct GeminiCredentials {
    pub api_key: String,
}

impl GeminiCredentials {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            api_key: require_env("GEMINI_API_KEY")?,
        })
    }
}

fn require_env(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("environment variable {key} is not set"))
}

/// Closed set of supported providers, each carrying its own configuration.
/// Replaces string-keyed dynamic dispatch with a tagged factory.
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    OpenAi {
        model: String,
        credentials: OpenAiCredentials,
        disable_system_prompt: bool,
    },
    AzureOpenAi {
        model: String,
        credentials: AzureOpenAiCredentials,
        disable_system_prompt: bool,
    },
    Anthropic {
        model: String,
        credentials: AnthropicCredentials,
        disable_system_prompt: bool,
    },
    Gemini {
        model: String,
        credentials: GeminiCredentials,
        disable_system_prompt: bool,
    },
}

impl ProviderConfig {
    pub fn model(&self) -> &str {
        match self {
            ProviderConfig::OpenAi { model, .. }
            | ProviderConfig::AzureOpenAi { model, .. }
            | ProviderConfig::Anthropic { model, .. }
            | ProviderConfig::Gemini { model, .. } => model,
        }
    }

    /// Construct the adapter behind the shared capability interface.
    pub fn build(&self) -> Arc<dyn ChatBackend> {
        match self.clone() {
            ProviderConfig::OpenAi {
                model,
                credentials,
                disable_system_prompt,
            } => Arc::new(openai::OpenAiBackend::new(
                model,
                credentials,
                disable_system_prompt,
            )),
            ProviderConfig::AzureOpenAi {
                model,
                credentials,
                disable_system_prompt,
            } => Arc::new(openai::AzureOpenAiBackend::new(
                model,
                credentials,
                disable_system_prompt,
            )),
            ProviderConfig::Anthropic {
                model,
                credentials,
                disable_system_prompt,
            } => Arc::new(anthropic::AnthropicBackend::new(
                model,
                credentials,
                disable_system_prompt,
            )),
            ProviderConfig::Gemini {
                model,
                credentials,
                disable_system_prompt,
            } => Arc::new(gemini::GeminiBackend::new(
                model,
                credentials,
                disable_system_prompt,
            )),
        }
    }
}
