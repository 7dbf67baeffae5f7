//! Connection settings for the chat completion service.

use serde::{Deserialize, Serialize};

pub const ENV_API_BASE: &str = "AEMPORT_API_BASE";
pub const ENV_API_KEY: &str = "AEMPORT_API_KEY";
pub const ENV_MODEL: &str = "AEMPORT_MODEL";
/// Accepted when [`ENV_API_KEY`] is unset.
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4";

/// OpenAI-compatible chat completion endpoint and sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL; `/chat/completions` is appended.
    pub api_base: String,
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            max_tokens: 4096,
            request_timeout_secs: 120,
        }
    }
}

impl ServiceConfig {
    pub fn new(api_base: &str, api_key: &str, model: &str) -> Self {
        Self {
            api_base: api_base.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `AEMPORT_API_BASE`, `AEMPORT_API_KEY`
    /// (or `OPENAI_API_KEY`) and `AEMPORT_MODEL`.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let mut config = Self::default();
        if let Some(base) = var(ENV_API_BASE) {
            config.api_base = base;
        }
        if let Some(key) = var(ENV_API_KEY).or_else(|| var(ENV_OPENAI_API_KEY)) {
            config.api_key = key;
        }
        if let Some(model) = var(ENV_MODEL) {
            config.model = model;
        }
        config
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Endpoint URL for chat completions.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    /// Every problem with these settings; empty when usable.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.api_key.trim().is_empty() {
            problems.push(format!("{ENV_API_KEY} (or {ENV_OPENAI_API_KEY}) is not set"));
        }
        let base = self.api_base.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            problems.push(format!("API base must be an http(s) URL: {base:?}"));
        }
        if self.model.trim().is_empty() {
            problems.push("model name is empty".to_string());
        }
        if self.request_timeout_secs == 0 {
            problems.push("request timeout must be at least one second".to_string());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            problems.push(format!(
                "temperature must be within 0..=2, got {}",
                self.temperature
            ));
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_need_only_a_key() {
        let config = ServiceConfig::default();
        assert_eq!(config.problems().len(), 1);

        let config = ServiceConfig::new(DEFAULT_API_BASE, "sk-test", DEFAULT_MODEL);
        assert!(config.problems().is_empty());
    }

    #[test]
    fn test_problems_are_all_reported() {
        let mut config = ServiceConfig::new("ftp://models", "", "");
        config.request_timeout_secs = 0;
        config.temperature = 3.5;
        assert_eq!(config.problems().len(), 5);
    }

    #[test]
    fn test_completions_url_trims_slash() {
        let config = ServiceConfig::new("http://localhost:8080/v1/", "k", "m");
        assert_eq!(
            config.completions_url(),
            "http://localhost:8080/v1/chat/completions"
        );
    }
}
