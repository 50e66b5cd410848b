//! Run configuration shared by the pipeline stages.
//!
//! The CLI fills these structs from flags and environment variables; the
//! library only ever sees the resolved values.

use crate::error::{MonographError, Result};
use std::time::Duration;

/// Default Ollama endpoint (local tunnel to the HPC node)
pub const DEFAULT_HOST: &str = "http://127.0.0.1:18199";

/// Default chat model
pub const DEFAULT_MODEL: &str = "llama3.3";

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// LLM configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub host: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
    /// Maximum prompts in flight at once
    pub concurrency: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            concurrency: 1,
        }
    }
}

impl LlmConfig {
    /// Check the host is an http(s) URL and the numeric settings are usable.
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.host)
            .map_err(|e| MonographError::Config(format!("Invalid host {:?}: {}", self.host, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(MonographError::Config(format!(
                "Host must be http or https, got {}",
                parsed.scheme()
            )));
        }
        if self.model.trim().is_empty() {
            return Err(MonographError::Config("Model name is empty".to_string()));
        }
        if self.concurrency == 0 {
            return Err(MonographError::Config("Concurrency must be at least 1".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(MonographError::Config(format!(
                "Temperature {} outside 0.0-2.0",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// Column layout of the specimen matrix.
///
/// Trait columns are addressed as inclusive header ranges, so new codes
/// added between the bounds are picked up without code changes.
#[derive(Debug, Clone)]
pub struct TraitLayout {
    /// Last quantitative column (the run starts right after `taxon_name`)
    pub quantitative_last: String,
    /// First qualitative column
    pub qualitative_first: String,
    /// Last qualitative column
    pub qualitative_last: String,
    /// Free-text fruit colour column
    pub fruit_colour: String,
    /// Code whose values are counts printed without decimals
    pub count_code: String,
}

impl Default for TraitLayout {
    fn default() -> Self {
        Self {
            quantitative_last: "fruitdiam".to_string(),
            qualitative_first: "solclu".to_string(),
            qualitative_last: "embryo".to_string(),
            fruit_colour: "frucol".to_string(),
            count_code: "numpin".to_string(),
        }
    }
}

/// Text markers of the monograph being processed.
#[derive(Debug, Clone)]
pub struct MonographLayout {
    /// Genus of every treated taxon
    pub genus: String,
    /// Author name that opens even-page headers
    pub author_header: String,
    /// Running title that opens odd-page headers
    pub running_title: String,
    /// Copyright line printed in the header
    pub copyright: String,
    /// Publisher mark printed at the end of footer lines
    pub publisher_mark: String,
}

impl Default for MonographLayout {
    fn default() -> Self {
        Self {
            genus: "Calamus".to_string(),
            author_header: "HENDERSON".to_string(),
            running_title: "A REVISION OF CALAMUS".to_string(),
            copyright: "© 2020 Magnolia Press".to_string(),
            publisher_mark: "Magnolia Press".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(LlmConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_host() {
        let config = LlmConfig {
            host: "ftp://example.org".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(MonographError::Config(_))));

        let config = LlmConfig {
            host: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let config = LlmConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
