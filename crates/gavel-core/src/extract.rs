//! Score extraction: converting free-text judge output into structured
//! score values.

use std::collections::BTreeMap;

use regex::Regex;

use crate::errors::ExtractionError;
use crate::model::ScoreValue;

/// Converts raw model output into a structured score, or signals that the
/// expected pattern is absent.
pub trait ScoreExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Result<ScoreValue, ExtractionError>;
}

/// Single-value extractor: the first match of `regex` wins, capture group 1
/// (or the whole match when the pattern has no group) is the score.
#[derive(Debug, Clone)]
pub struct RegexScoreExtractor {
    regex: Regex,
}

impl RegexScoreExtractor {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }
}

impl ScoreExtractor for RegexScoreExtractor {
    fn extract(&self, text: &str) -> Result<ScoreValue, ExtractionError> {
        let caps = self
            .regex
            .captures(text)
            .ok_or_else(|| ExtractionError::PatternMissing {
                pattern: self.regex.as_str().to_string(),
            })?;
        let value = caps
            .get(1)
            .or_else(|| caps.get(0))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ExtractionError::PatternMissing {
                pattern: self.regex.as_str().to_string(),
            })?;
        Ok(ScoreValue::Single(value))
    }
}

/// Multi-metric extractor for rubrics with a fixed metric set.
///
/// Scans every `<metric>: [[<value>]]` occurrence and overwrites on repeat,
/// so the LAST occurrence wins (models tend to quote a rubric line in their
/// explanation before the final scored line). Succeeds only when every named
/// metric is present at least once.
#[derive(Debug, Clone)]
pub struct MetricSetExtractor {
    regex: Regex,
    metrics: Vec<String>,
}

impl MetricSetExtractor {
    /// `value_pattern` constrains the scored value, e.g. `[1-5]`.
    pub fn new(metrics: &[&str], value_pattern: &str) -> Result<Self, regex::Error> {
        let names = metrics
            .iter()
            .map(|m| regex::escape(m))
            .collect::<Vec<_>>()
            .join("|");
        let regex = Regex::new(&format!(r"({names}):\s*\[\[({value_pattern})\]\]"))?;
        Ok(Self {
            regex,
            metrics: metrics.iter().map(|m| m.to_string()).collect(),
        })
    }
}

impl ScoreExtractor for MetricSetExtractor {
    fn extract(&self, text: &str) -> Result<ScoreValue, ExtractionError> {
        let mut scores = BTreeMap::new();
        for caps in self.regex.captures_iter(text) {
            scores.insert(caps[1].to_string(), caps[2].to_string());
        }

        let missing: Vec<String> = self
            .metrics
            .iter()
            .filter(|m| !scores.contains_key(*m))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ExtractionError::MissingMetrics { missing });
        }

        Ok(ScoreValue::Metrics(scores))
    }
}
