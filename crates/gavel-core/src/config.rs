//! Run configuration for the two pipeline phases, loaded from YAML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::dataset::DatasetKind;
use crate::engine::EngineConfig;
use crate::evaluator::{AspectKind, AspectOptions};
use crate::model::SamplingParams;
use crate::providers::{
    AnthropicCredentials, AzureOpenAiCredentials, GeminiCredentials, OpenAiCredentials,
    ProviderConfig,
};

pub fn load_config<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
    Anthropic,
    Gemini,
    /// OpenAI-compatible local inference server (e.g. vLLM serve).
    Local,
}

/// Which model to call and how hard to push it.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub provider: ProviderKind,
    pub model: String,
    /// Required for `local`, optional base-url override for `openai`.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_request_interval")]
    pub request_interval_secs: f64,
    #[serde(default = "default_transient_cooldown")]
    pub transient_cooldown_secs: f64,
    #[serde(default)]
    pub disable_system_prompt: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_interval() -> f64 {
    1.0
}

fn default_transient_cooldown() -> f64 {
    60.0
}

impl ClientConfig {
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            max_retries: self.max_retries,
            request_interval: Duration::from_secs_f64(self.request_interval_secs),
            transient_cooldown: Duration::from_secs_f64(self.transient_cooldown_secs),
        }
    }

    pub fn is_local(&self) -> bool {
        self.provider == ProviderKind::Local
    }

    /// Resolve credentials from the environment and produce the provider
    /// configuration for hosted backends. `local` has no credentials and is
    /// constructed directly by the caller.
    pub fn provider_config(&self) -> anyhow::Result<ProviderConfig> {
        let model = self.model.clone();
        let disable_system_prompt = self.disable_system_prompt;
        Ok(match self.provider {
            ProviderKind::OpenAi => {
                let mut credentials = OpenAiCredentials::from_env()?;
                if self.base_url.is_some() {
                    credentials.base_url = self.base_url.clone();
                }
                ProviderConfig::OpenAi {
                    model,
                    credentials,
                    disable_system_prompt,
                }
            }
            ProviderKind::AzureOpenAi => ProviderConfig::AzureOpenAi {
                model,
                credentials: AzureOpenAiCredentials::from_env()?,
                disable_system_prompt,
            },
            ProviderKind::Anthropic => ProviderConfig::Anthropic {
                model,
                credentials: AnthropicCredentials::from_env()?,
                disable_system_prompt,
            },
            ProviderKind::Gemini => ProviderConfig::Gemini {
                model,
                credentials: GeminiCredentials::from_env()?,
                disable_system_prompt,
            },
            ProviderKind::Local => {
                anyhow::bail!("local provider has no hosted configuration")
            }
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub dir: PathBuf,
    #[serde(default)]
    pub overwrite: bool,
}

/// One benchmark section of the generate phase.
#[derive(Debug, Clone, Deserialize)]
pub struct BenchmarkConfig {
    /// Output file stem (`<name>.jsonl`).
    pub name: String,
    pub dataset: DatasetKind,
    pub path: PathBuf,
    #[serde(default)]
    pub size: Option<usize>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub sampling: SamplingParams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateConfig {
    pub client: ClientConfig,
    pub output: OutputConfig,
    pub benchmarks: Vec<BenchmarkConfig>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReferenceConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// One judged aspect: which generation file to load and how to grade it.
#[derive(Debug, Clone, Deserialize)]
pub struct AspectConfig {
    /// Input file stem (`<name>.jsonl` under the input directory).
    pub name: String,
    pub aspect: AspectKind,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub sampling: SamplingParams,
    #[serde(default)]
    pub use_reference: bool,
    #[serde(default)]
    pub empty_response_score: Option<f64>,
    #[serde(default)]
    pub api_error_score: Option<f64>,
    #[serde(default)]
    pub reference: ReferenceConfig,
}

impl AspectConfig {
    pub fn options(
        &self,
        generation_model: Option<String>,
        judge_model: Option<String>,
    ) -> AspectOptions {
        AspectOptions {
            system_prompt: self.system_prompt.clone(),
            sampling: self.sampling.clone(),
            use_reference: self.use_reference,
            empty_response_score: self.empty_response_score,
            api_error_score: self.api_error_score,
            reference_path: self.reference.path.clone(),
            reference_categories: self.reference.categories.clone(),
            generation_model,
            judge_model,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JudgeConfig {
    pub client: ClientConfig,
    /// Directory holding the generation phase's JSONL files.
    pub input: OutputConfig,
    /// Directory the dashboard sink flushes into.
    pub report: OutputConfig,
    pub aspects: Vec<AspectConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_config_parses_with_defaults() {
        let yaml = r#"
client:
  provider: openai
  model: gpt-4o-mini
output:
  dir: out/generate
benchmarks:
  - name: quality
    dataset: quality
    path: data/quality.json
    size: 100
    sampling:
      max_tokens: 1024
      temperature: 0.0
  - name: mt_bench
    dataset: mt_bench
    path: data/questions.jsonl
"#;
        let config: GenerateConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.client.max_retries, 3);
        assert_eq!(config.client.request_interval_secs, 1.0);
        assert!(!config.output.overwrite);
        assert_eq!(config.benchmarks.len(), 2);
        assert_eq!(config.benchmarks[0].sampling.max_tokens, Some(1024));
        assert_eq!(config.benchmarks[1].dataset, DatasetKind::MtBench);
    }

    #[test]
    fn judge_config_parses_aspects() {
        let yaml = r#"
client:
  provider: anthropic
  model: claude-sonnet-4-20250514
  max_retries: 5
input:
  dir: out/generate
report:
  dir: out/report
aspects:
  - name: quality
    aspect: quality
    empty_response_score: 1
  - name: mt_bench
    aspect: mt_bench
    reference:
      path: data/reference.jsonl
      categories: [math, coding]
"#;
        let config: JudgeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.client.max_retries, 5);
        assert_eq!(config.aspects[0].empty_response_score, Some(1.0));
        assert_eq!(config.aspects[1].aspect, AspectKind::MtBench);
        assert_eq!(config.aspects[1].reference.categories, vec!["math", "coding"]);
    }

    #[test]
    fn engine_config_converts_seconds() {
        let yaml = r#"
provider: gemini
model: gemini-2.0-flash
request_interval_secs: 0.5
"#;
        let client: ClientConfig = serde_yaml::from_str(yaml).unwrap();
        let engine = client.engine();
        assert_eq!(engine.request_interval, Duration::from_millis(500));
        assert_eq!(engine.transient_cooldown, Duration::from_secs(60));
    }

    #[test]
    fn local_provider_has_no_hosted_config() {
        let yaml = r#"
provider: local
model: llm-jp-3-13b
base_url: http://localhost:8000
"#;
        let client: ClientConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(client.is_local());
        assert!(client.provider_config().is_err());
    }
}
