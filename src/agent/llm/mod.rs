//! Inference abstraction layer.
//!
//! This module provides:
//! - [`InferenceClient`] trait for swappable model backends
//! - [`ProviderRegistry`] resolving a `provider/model` id to a client
//! - [`OpenAiClient`], the Responses API client used for every provider
//!
//! # Adding a New Provider
//!
//! Providers speaking the OpenAI protocol only need defaults in
//! [`resolve_provider`]. Anything else:
//!
//! 1. Create a new file (e.g., `ollama.rs`)
//! 2. Implement `InferenceClient`
//! 3. Add it to `ProviderRegistry::create()`

mod types;

pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::response::{RawResponse, ResponseFormat};
use crate::Result;

pub use openai::OpenAiClient;

const LMS_DEFAULT_URL: &str = "http://127.0.0.1:1234/v1";
const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";

/// A model that turns a prompt into raw output.
///
/// Transport, retries and credentials belong to the implementation; callers
/// treat any `Err` as an ordinary, recoverable iteration failure.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Generate a reply. `format` is the encoding the prompt asked for.
    async fn generate(&self, prompt: &str, format: ResponseFormat) -> Result<RawResponse>;

    /// `provider/model` identifier, used in trace metadata.
    fn model_id(&self) -> &str;
}

/// Where and how to reach one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
}

/// Split `provider/model`. An id without `/` is an OpenAI model.
pub fn split_model_id(model_id: &str) -> (String, String) {
    let raw = model_id.trim();
    match raw.split_once('/') {
        Some((provider, model)) => (provider.trim().to_lowercase(), model.trim().to_string()),
        None => ("openai".to_string(), raw.to_string()),
    }
}

fn first_non_empty(values: impl IntoIterator<Item = Option<String>>) -> Option<String> {
    values
        .into_iter()
        .flatten()
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Resolve endpoint and key for `model_id`.
///
/// `<PROVIDER>_BASE_URL` and `<PROVIDER>_API_KEY` (looked up through `env`)
/// win over the built-in defaults. Providers other than OpenAI fall back to
/// their own name as the key.
pub fn resolve_provider(model_id: &str, env: impl Fn(&str) -> Option<String>) -> ProviderSettings {
    let (provider, model) = split_model_id(model_id);
    let key = provider.replace('-', "_");
    let prefix = key.to_uppercase();

    let (default_url, default_key) = match key.as_str() {
        "openai" => (Some(OPENAI_DEFAULT_URL.to_string()), env("OPENAI_API_KEY")),
        "lms" | "lmstudio" | "lm_studio" => (
            first_non_empty([env("LMS_BASE_URL"), Some(LMS_DEFAULT_URL.to_string())]),
            first_non_empty([env("LMS_API_KEY"), Some("lm-studio".to_string())]),
        ),
        _ => (None, None),
    };

    let base_url = first_non_empty([env(&format!("{prefix}_BASE_URL")), default_url])
        .unwrap_or_else(|| LMS_DEFAULT_URL.to_string());
    let mut api_key = first_non_empty([env(&format!("{prefix}_API_KEY")), default_key]);
    if api_key.is_none() && key != "openai" {
        api_key = Some(key.clone());
    }

    ProviderSettings {
        provider,
        model,
        base_url,
        api_key,
    }
}

/// Creates inference clients from configuration.
///
/// # Example
///
/// ```ignore
/// let client = ProviderRegistry::create(&config)?;
/// let raw = client.generate(&prompt, ResponseFormat::Toon).await?;
/// ```
pub struct ProviderRegistry;

impl ProviderRegistry {
    /// Build the client for `config.model_id`; explicit `base_url`/`api_key`
    /// in the config override anything resolved from the environment.
    pub fn create(config: &Config) -> Result<Arc<dyn InferenceClient>> {
        let mut settings = resolve_provider(&config.model_id, |name| std::env::var(name).ok());
        if let Some(url) = config.base_url.as_ref().filter(|u| !u.is_empty()) {
            settings.base_url = url.clone();
        }
        if let Some(key) = config.api_key.as_ref().filter(|k| !k.is_empty()) {
            settings.api_key = Some(key.clone());
        }
        if settings.model.is_empty() {
            return Err(crate::Error::Config(format!(
                "Model id '{}' names no model",
                config.model_id
            )));
        }
        Ok(Arc::new(OpenAiClient::new(
            settings,
            config.temperature,
            config.max_output_tokens,
        )))
    }
}

/// Scripted inference for tests: replays queued replies in order, then
/// repeats the fallback reply (or fails when there is none).
#[cfg(test)]
pub struct ScriptedInference {
    replies: std::sync::Mutex<std::collections::VecDeque<Result<RawResponse>>>,
    fallback: Option<RawResponse>,
    delay: Option<std::time::Duration>,
    calls: std::sync::atomic::AtomicUsize,
    prompts: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl ScriptedInference {
    pub fn new(replies: Vec<&str>) -> Self {
        Self::from_results(replies.into_iter().map(|r| Ok(RawResponse::from(r))).collect())
    }

    pub fn from_results(replies: Vec<Result<RawResponse>>) -> Self {
        Self {
            replies: std::sync::Mutex::new(replies.into()),
            fallback: None,
            delay: None,
            calls: std::sync::atomic::AtomicUsize::new(0),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `reply`.
    pub fn repeating(reply: &str) -> Self {
        Self::new(vec![]).with_fallback(reply)
    }

    pub fn with_fallback(mut self, reply: &str) -> Self {
        self.fallback = Some(RawResponse::from(reply));
        self
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl InferenceClient for ScriptedInference {
    async fn generate(&self, prompt: &str, _format: ResponseFormat) -> Result<RawResponse> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        match (next, &self.fallback) {
            (Some(reply), _) => reply,
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(crate::Error::Inference("No more scripted replies".to_string())),
        }
    }

    fn model_id(&self) -> &str {
        "test/scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_split_model_id() {
        assert_eq!(
            split_model_id("lms/qwen/qwen3-vl-30b"),
            ("lms".to_string(), "qwen/qwen3-vl-30b".to_string())
        );
        assert_eq!(split_model_id("gpt-4o"), ("openai".to_string(), "gpt-4o".to_string()));
    }

    #[test]
    fn test_lms_defaults() {
        let s = resolve_provider("lms/qwen/qwen3-vl-30b", env(&[]));
        assert_eq!(s.base_url, LMS_DEFAULT_URL);
        assert_eq!(s.api_key.as_deref(), Some("lm-studio"));
    }

    #[test]
    fn test_openai_uses_env_key() {
        let s = resolve_provider("gpt-4o", env(&[("OPENAI_API_KEY", "sk-test")]));
        assert_eq!(s.provider, "openai");
        assert_eq!(s.base_url, OPENAI_DEFAULT_URL);
        assert_eq!(s.api_key.as_deref(), Some("sk-test"));

        let s = resolve_provider("gpt-4o", env(&[]));
        assert_eq!(s.api_key, None);
    }

    #[test]
    fn test_provider_env_overrides() {
        let s = resolve_provider(
            "my-host/llama",
            env(&[("MY_HOST_BASE_URL", "http://gpu:8000/v1"), ("MY_HOST_API_KEY", " k ")]),
        );
        assert_eq!(s.base_url, "http://gpu:8000/v1");
        assert_eq!(s.api_key.as_deref(), Some("k"));

        let s = resolve_provider("my-host/llama", env(&[]));
        assert_eq!(s.api_key.as_deref(), Some("my_host"));
    }

    #[tokio::test]
    async fn test_scripted_inference_replays_then_falls_back() {
        let client = ScriptedInference::new(vec!["first"]).with_fallback("again");
        let a = client.generate("p1", ResponseFormat::Toon).await.unwrap();
        let b = client.generate("p2", ResponseFormat::Toon).await.unwrap();
        assert!(matches!(a, RawResponse::Text(t) if t == "first"));
        assert!(matches!(b, RawResponse::Text(t) if t == "again"));
        assert_eq!(client.calls(), 2);
        assert_eq!(client.prompts(), vec!["p1", "p2"]);
    }
}
