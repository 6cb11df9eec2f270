use crate::order::OrderState;
use crate::steps::{self, Step};
use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub content: String,
}

// Anything that can turn the system preamble plus a step template into a
// line for the NPC to say. The orchestrator only ever reaches it through
// `SafetyGuard`, so an implementation is free to fail; the template line is
// used instead.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PromptGenerator: Send + Sync {
    async fn generate(&self, system: &str, user: &str, max_tokens: u32) -> Result<String>;
}

/// Connection settings for [`ChatClient`].
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    /// e.g. `https://api.openai.com/v1`; `/v1` is appended when missing.
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            max_tokens: 120,
            timeout: Duration::from_secs(15),
        }
    }
}

impl LlmSettings {
    pub fn completions_url(&self) -> String {
        let mut base = self.base_url.trim_end_matches('/').to_string();
        if !base.ends_with("/v1") {
            base.push_str("/v1");
        }
        format!("{base}/chat/completions")
    }
}

/// Minimal chat-completions client.
pub struct ChatClient {
    client: Client,
    settings: LlmSettings,
}

impl ChatClient {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("Failed to build HTTP client for chat completions")?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    /// Chat-completions body. `max_tokens` is clamped to `16..=settings.max_tokens`.
    pub fn request_body(&self, system: &str, user: &str, max_tokens: u32) -> serde_json::Value {
        let max_tokens = max_tokens.clamp(16, self.settings.max_tokens.max(16));
        serde_json::json!({
            "model": self.settings.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ],
            "max_tokens": max_tokens,
            "temperature": self.settings.temperature
        })
    }
}

#[async_trait]
impl PromptGenerator for ChatClient {
    async fn generate(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| anyhow::anyhow!("OpenAI API key is missing (set OPENAI_API_KEY)"))?;

        let body = self.request_body(system, user, max_tokens);
        tracing::trace!("Chat request: {}", body);

        let resp = self
            .client
            .post(self.settings.completions_url())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .context("Chat completion request failed")?
            .error_for_status()
            .context("Chat completion returned an error status")?
            .json::<ChatResponse>()
            .await
            .context("Failed to decode chat completion response")?;

        let answer = &resp
            .choices
            .first()
            .ok_or_else(|| anyhow::anyhow!("No response from LLM"))?
            .message
            .content;
        Ok(answer.trim().to_string())
    }
}

/// Very rough token estimate for Korean text: `ceil(chars * 0.6)`.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count() as f64;
    ((chars * 0.6).ceil() as u32).min(128_000)
}

/// Caps and retry settings applied around every generation call.
#[derive(Debug, Clone)]
pub struct GuardPolicy {
    pub model_max_output_tokens: u32,
    pub max_input_tokens_per_turn: u32,
    pub max_output_tokens_per_turn: u32,
    pub price_in_per_1k: f64,
    pub price_out_per_1k: f64,
    pub max_cost_per_turn_usd: f64,
    pub max_cost_per_session_usd: f64,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub timeout: Duration,
    pub banned_phrases: Vec<String>,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            model_max_output_tokens: 120,
            max_input_tokens_per_turn: 1000,
            max_output_tokens_per_turn: 180,
            price_in_per_1k: 0.005,
            price_out_per_1k: 0.015,
            max_cost_per_turn_usd: 0.02,
            max_cost_per_session_usd: 0.50,
            max_retries: 1,
            backoff_base: Duration::from_millis(500),
            timeout: Duration::from_secs(15),
            banned_phrases: vec!["씨발".to_string(), "병신".to_string(), "개새끼".to_string()],
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GuardRejection {
    #[error("Input tokens over cap ({tokens}>{cap})")]
    InputTokensOverCap { tokens: u32, cap: u32 },
    #[error("Turn cost over cap (${cost:.3}>${cap:.3})")]
    TurnCostOverCap { cost: f64, cap: f64 },
    #[error("Session cost over cap (${cost:.3}>${cap:.3})")]
    SessionCostOverCap { cost: f64, cap: f64 },
}

/// Budget, retry and output-filter policy around a [`PromptGenerator`].
///
/// Each guard tracks the estimated spend of one session.
#[derive(Debug, Clone, Default)]
pub struct SafetyGuard {
    policy: GuardPolicy,
    session_cost_usd: f64,
}

impl SafetyGuard {
    pub fn new(policy: GuardPolicy) -> Self {
        Self {
            policy,
            session_cost_usd: 0.0,
        }
    }

    pub fn policy(&self) -> &GuardPolicy {
        &self.policy
    }

    pub fn session_cost_usd(&self) -> f64 {
        self.session_cost_usd
    }

    pub fn reset_session(&mut self) {
        self.session_cost_usd = 0.0;
    }

    fn output_cap(&self) -> u32 {
        self.policy
            .model_max_output_tokens
            .max(1)
            .min(self.policy.max_output_tokens_per_turn.max(1))
    }

    fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 / 1000.0) * self.policy.price_in_per_1k
            + (output_tokens as f64 / 1000.0) * self.policy.price_out_per_1k
    }

    /// Checks the token and cost caps before any request is made.
    pub fn preflight(&self, system: &str, user: &str) -> Result<(), GuardRejection> {
        let tokens = estimate_tokens(system) + estimate_tokens(user);
        if tokens > self.policy.max_input_tokens_per_turn {
            return Err(GuardRejection::InputTokensOverCap {
                tokens,
                cap: self.policy.max_input_tokens_per_turn,
            });
        }

        let turn_cost = self.cost(tokens, self.output_cap());
        if turn_cost > self.policy.max_cost_per_turn_usd {
            return Err(GuardRejection::TurnCostOverCap {
                cost: turn_cost,
                cap: self.policy.max_cost_per_turn_usd,
            });
        }
        if self.session_cost_usd + turn_cost > self.policy.max_cost_per_session_usd {
            return Err(GuardRejection::SessionCostOverCap {
                cost: self.session_cost_usd + turn_cost,
                cap: self.policy.max_cost_per_session_usd,
            });
        }
        Ok(())
    }

    pub fn contains_banned(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.policy
            .banned_phrases
            .iter()
            .any(|phrase| lowered.contains(&phrase.to_lowercase()))
    }

    pub fn filter_or_fallback(&self, text: &str, fallback: &str) -> String {
        if text.trim().is_empty() || self.contains_banned(text) {
            fallback.to_string()
        } else {
            text.trim().to_string()
        }
    }

    /// Runs `generator` under the policy. Always yields text: any rejection,
    /// error, timeout or filtered output falls back to `fallback`.
    pub async fn generate_with_policy<G>(
        &mut self,
        generator: &G,
        system: &str,
        user: &str,
        fallback: &str,
    ) -> String
    where
        G: PromptGenerator + ?Sized,
    {
        if let Err(rejection) = self.preflight(system, user) {
            tracing::warn!("[AI] Preflight block: {}", rejection);
            return fallback.to_string();
        }

        let mut attempt = 0;
        loop {
            let call = generator.generate(system, user, self.policy.model_max_output_tokens);
            let error = match tokio::time::timeout(self.policy.timeout, call).await {
                Ok(Ok(text)) if !text.trim().is_empty() => {
                    let input_tokens = estimate_tokens(system) + estimate_tokens(user);
                    self.session_cost_usd += self.cost(input_tokens, estimate_tokens(&text));
                    return self.filter_or_fallback(&text, fallback);
                }
                Ok(Ok(_)) => "empty completion".to_string(),
                Ok(Err(e)) => format!("{e:#}"),
                Err(_) => format!("timed out after {:?}", self.policy.timeout),
            };

            attempt += 1;
            if attempt > self.policy.max_retries {
                tracing::warn!("[AI] Retry exhausted: {}", error);
                return fallback.to_string();
            }
            tracing::debug!("[AI] attempt {} failed: {}; retrying", attempt, error);
            tokio::time::sleep(self.policy.backoff_base * attempt).await;
        }
    }
}

/// Produces the NPC line for a step, either straight from the template or
/// restyled by an LLM.
pub struct PromptComposer {
    generator: Option<Arc<dyn PromptGenerator>>,
    guard: SafetyGuard,
}

impl PromptComposer {
    pub fn template() -> Self {
        Self {
            generator: None,
            guard: SafetyGuard::default(),
        }
    }

    pub fn llm(generator: Arc<dyn PromptGenerator>, guard: SafetyGuard) -> Self {
        Self {
            generator: Some(generator),
            guard,
        }
    }

    pub fn uses_llm(&self) -> bool {
        self.generator.is_some()
    }

    pub fn guard(&self) -> &SafetyGuard {
        &self.guard
    }

    pub fn reset_session(&mut self) {
        self.guard.reset_session();
    }

    pub async fn compose(&mut self, step: Step, order: &OrderState) -> String {
        let fallback = steps::prompt_for(step, order);
        match &self.generator {
            Some(generator) => {
                self.guard
                    .generate_with_policy(generator.as_ref(), steps::system_preamble(), &fallback, &fallback)
                    .await
            }
            None => fallback,
        }
    }
}
