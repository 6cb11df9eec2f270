//! Application Configuration Module
//!
//! This module centralizes the configuration for the cafe quest service.
//! It loads settings from environment variables and turns them into the
//! settings structs the core crate expects.

use cafe_quest_core::orchestrator::OrchestratorConfig;
use cafe_quest_core::prompt::{GuardPolicy, LlmSettings};
use std::env;
use std::time::Duration;
use tracing::Level;

/// How NPC lines are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    /// Fixed Korean templates only.
    Template,
    /// Chat-completions rewrite of the template, guarded, with the template as fallback.
    Llm,
}

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: Level,
    pub mock_mode: bool,
    pub prompt_style: PromptStyle,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub chat_model: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub llm_timeout: Duration,
    /// `None` when `REPROMPT_SECS=0`.
    pub reprompt_after: Option<Duration>,
    pub payment_delay: Duration,
    pub handoff_delay: Duration,
    pub farewell_delay: Duration,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    // *   `MOCK_MODE`: (Optional) Complete payment, hand-off and farewell on timers. Defaults to true.
    // *   `PROMPT_STYLE`: (Optional) "template" or "llm". Defaults to "template".
    // *   `OPENAI_API_KEY`: Your secret key for the OpenAI API. Required if the prompt style is "llm".
    // *   `OPENAI_BASE_URL`, `CHAT_MODEL`, `LLM_TEMPERATURE`, `LLM_MAX_TOKENS`, `LLM_TIMEOUT_SECS`: LLM tuning.
    // *   `REPROMPT_SECS`: (Optional) Silence before the NPC asks again, 1-15s. 0 disables. Defaults to 6.
    // *   `PAYMENT_DELAY_MS`, `HANDOFF_DELAY_MS`, `FAREWELL_DELAY_MS`: (Optional) Mock device delays.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, so tests need not touch
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        let mock_mode = match var("MOCK_MODE") {
            Some(value) => parse_bool("MOCK_MODE", &value)?,
            None => true,
        };

        let prompt_style = match var("PROMPT_STYLE").map(|v| v.to_lowercase()).as_deref() {
            None | Some("template") => PromptStyle::Template,
            Some("llm") => PromptStyle::Llm,
            Some(other) => {
                return Err(invalid("PROMPT_STYLE", other));
            }
        };

        let openai_api_key = var("OPENAI_API_KEY");
        let openai_base_url =
            var("OPENAI_BASE_URL").unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let chat_model = var("CHAT_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let llm_temperature = parse_or("LLM_TEMPERATURE", var("LLM_TEMPERATURE"), 0.3_f32)?;
        let llm_max_tokens = parse_or("LLM_MAX_TOKENS", var("LLM_MAX_TOKENS"), 120_u32)?.clamp(16, 256);
        let llm_timeout_secs = parse_or("LLM_TIMEOUT_SECS", var("LLM_TIMEOUT_SECS"), 15_u64)?.clamp(5, 60);

        let reprompt_secs = parse_or("REPROMPT_SECS", var("REPROMPT_SECS"), 6_u64)?;

        let config = Self {
            log_level,
            mock_mode,
            prompt_style,
            openai_api_key,
            openai_base_url,
            chat_model,
            llm_temperature,
            llm_max_tokens,
            llm_timeout: Duration::from_secs(llm_timeout_secs),
            reprompt_after: reprompt_window(reprompt_secs),
            payment_delay: Duration::from_millis(parse_or("PAYMENT_DELAY_MS", var("PAYMENT_DELAY_MS"), 800)?),
            handoff_delay: Duration::from_millis(parse_or("HANDOFF_DELAY_MS", var("HANDOFF_DELAY_MS"), 600)?),
            farewell_delay: Duration::from_millis(parse_or("FAREWELL_DELAY_MS", var("FAREWELL_DELAY_MS"), 500)?),
        };

        // Validate that the API key is present when the LLM path is selected.
        if config.prompt_style == PromptStyle::Llm && config.openai_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "OPENAI_API_KEY must be set for PROMPT_STYLE=llm".to_string(),
            ));
        }

        Ok(config)
    }

    /// Applies a `--reprompt-secs` override with the same clamping as the env var.
    pub fn set_reprompt_secs(&mut self, secs: u64) {
        self.reprompt_after = reprompt_window(secs);
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            reprompt_after: self.reprompt_after,
            auto_complete_actions: self.mock_mode,
            payment_delay: self.payment_delay,
            handoff_delay: self.handoff_delay,
            farewell_delay: self.farewell_delay,
            mirror_transcript: true,
        }
    }

    pub fn llm_settings(&self) -> LlmSettings {
        LlmSettings {
            api_key: self.openai_api_key.clone(),
            base_url: self.openai_base_url.clone(),
            model: self.chat_model.clone(),
            temperature: self.llm_temperature,
            max_tokens: self.llm_max_tokens,
            timeout: self.llm_timeout,
        }
    }

    pub fn guard_policy(&self) -> GuardPolicy {
        GuardPolicy {
            model_max_output_tokens: self.llm_max_tokens,
            timeout: self.llm_timeout,
            ..GuardPolicy::default()
        }
    }
}

fn reprompt_window(secs: u64) -> Option<Duration> {
    match secs {
        0 => None,
        secs => Some(Duration::from_secs(secs.clamp(1, 15))),
    }
}

fn invalid(var: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.to_string(),
        value: value.to_string(),
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, value)),
    }
}

fn parse_or<T: std::str::FromStr>(var: &str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        Some(value) => value.parse().map_err(|_| invalid(var, &value)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = load(&[]).unwrap();

        assert_eq!(config.log_level, Level::INFO);
        assert!(config.mock_mode);
        assert_eq!(config.prompt_style, PromptStyle::Template);
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(config.llm_max_tokens, 120);
        assert_eq!(config.reprompt_after, Some(Duration::from_secs(6)));
        assert_eq!(config.payment_delay, Duration::from_millis(800));
        assert_eq!(config.handoff_delay, Duration::from_millis(600));
        assert_eq!(config.farewell_delay, Duration::from_millis(500));
    }

    #[test]
    fn llm_style_requires_an_api_key() {
        let err = load(&[("PROMPT_STYLE", "llm")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(_)));

        let config = load(&[("PROMPT_STYLE", "LLM"), ("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert_eq!(config.prompt_style, PromptStyle::Llm);
        assert_eq!(config.llm_settings().api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn numeric_settings_are_clamped() {
        let config = load(&[
            ("LLM_MAX_TOKENS", "4000"),
            ("LLM_TIMEOUT_SECS", "1"),
            ("REPROMPT_SECS", "60"),
        ])
        .unwrap();

        assert_eq!(config.llm_max_tokens, 256);
        assert_eq!(config.llm_timeout, Duration::from_secs(5));
        assert_eq!(config.reprompt_after, Some(Duration::from_secs(15)));
        assert_eq!(config.guard_policy().model_max_output_tokens, 256);
    }

    #[test]
    fn zero_reprompt_disables_it() {
        let mut config = load(&[("REPROMPT_SECS", "0")]).unwrap();
        assert_eq!(config.reprompt_after, None);

        config.set_reprompt_secs(3);
        assert_eq!(config.orchestrator_config().reprompt_after, Some(Duration::from_secs(3)));
    }

    #[test]
    fn mock_mode_off_waits_for_external_actions() {
        let config = load(&[("MOCK_MODE", "false")]).unwrap();
        assert!(!config.orchestrator_config().auto_complete_actions);
    }

    #[test]
    fn malformed_values_are_reported() {
        assert_eq!(
            load(&[("LLM_TEMPERATURE", "warm")]).unwrap_err(),
            ConfigError::InvalidValue {
                var: "LLM_TEMPERATURE".to_string(),
                value: "warm".to_string()
            }
        );
        assert!(matches!(
            load(&[("RUST_LOG", "loud")]).unwrap_err(),
            ConfigError::InvalidLogLevel(_)
        ));
        assert!(matches!(
            load(&[("PROMPT_STYLE", "poetry")]).unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }
}
