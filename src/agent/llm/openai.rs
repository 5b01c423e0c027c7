//! OpenAI-compatible inference client (Responses API).
//!
//! Serves every provider that speaks the same protocol: OpenAI itself and
//! local servers such as LM Studio.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::error::Error;
use crate::response::{RawResponse, ResponseFormat};
use crate::Result;

use super::types::{
    ErrorReply, InputContent, InputMessage, ResponsesReply, ResponsesRequest,
};
use super::{InferenceClient, ProviderSettings};

pub struct OpenAiClient {
    client: Client,
    settings: ProviderSettings,
    model_id: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl OpenAiClient {
    pub fn new(settings: ProviderSettings, temperature: f32, max_output_tokens: u32) -> Self {
        info!(
            "Inference client ready (provider={}, base_url={})",
            settings.provider, settings.base_url
        );
        Self {
            client: Client::new(),
            model_id: format!("{}/{}", settings.provider, settings.model),
            settings,
            temperature,
            max_output_tokens,
        }
    }

    fn build_url(&self) -> String {
        format!("{}/responses", self.settings.base_url.trim_end_matches('/'))
    }

    fn build_request<'a>(&'a self, prompt: &'a str) -> ResponsesRequest<'a> {
        ResponsesRequest {
            model: &self.settings.model,
            input: vec![InputMessage {
                role: "user",
                content: vec![InputContent::InputText { text: prompt }],
            }],
            temperature: self.temperature,
            max_output_tokens: (self.max_output_tokens > 0).then_some(self.max_output_tokens),
        }
    }

    /// `output_text` when present, else every `output[].content[].text` joined by newlines.
    pub(crate) fn extract_text(reply: &ResponsesReply) -> Option<String> {
        if let Some(text) = reply.output_text.as_deref().filter(|t| !t.trim().is_empty()) {
            return Some(text.to_string());
        }
        let parts: Vec<&str> = reply
            .output
            .iter()
            .flat_map(|item| item.content.iter())
            .filter_map(|c| c.text.as_ref().map(|t| t.as_str()))
            .collect();
        let joined = parts.join("\n").trim().to_string();
        (!joined.is_empty()).then_some(joined)
    }
}

#[async_trait]
impl InferenceClient for OpenAiClient {
    async fn generate(&self, prompt: &str, format: ResponseFormat) -> Result<RawResponse> {
        debug!(
            "[{}] invoking model={} format={} prompt_chars={}",
            self.settings.provider,
            self.settings.model,
            format,
            prompt.chars().count()
        );

        let mut request = self.client.post(self.build_url()).json(&self.build_request(prompt));
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            let message = serde_json::from_str::<ErrorReply>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(Error::Inference(format!("{status}: {message}")));
        }

        let reply: ResponsesReply = response.json().await?;
        let text = Self::extract_text(&reply)
            .ok_or_else(|| Error::Inference("Model returned no text output".to_string()))?;
        debug!("Raw model output ({} chars)", text.chars().count());
        Ok(RawResponse::Text(text))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiClient {
        OpenAiClient::new(
            ProviderSettings {
                provider: "lms".to_string(),
                model: "qwen/qwen3-vl-30b".to_string(),
                base_url: "http://127.0.0.1:1234/v1/".to_string(),
                api_key: Some("lm-studio".to_string()),
            },
            0.7,
            32_000,
        )
    }

    #[test]
    fn test_request_shape() {
        let client = client();
        assert_eq!(client.build_url(), "http://127.0.0.1:1234/v1/responses");
        assert_eq!(client.model_id(), "lms/qwen/qwen3-vl-30b");

        let body = serde_json::to_value(client.build_request("hi")).unwrap();
        assert_eq!(body["model"], "qwen/qwen3-vl-30b");
        assert_eq!(body["input"][0]["role"], "user");
        assert_eq!(body["input"][0]["content"][0]["type"], "input_text");
        assert_eq!(body["input"][0]["content"][0]["text"], "hi");
        assert_eq!(body["max_output_tokens"], 32_000);
    }

    #[test]
    fn test_extract_prefers_output_text() {
        let reply: ResponsesReply = serde_json::from_str(
            r#"{"output_text": "direct", "output": [{"content": [{"text": "nested"}]}]}"#,
        )
        .unwrap();
        assert_eq!(OpenAiClient::extract_text(&reply).as_deref(), Some("direct"));
    }

    #[test]
    fn test_extract_joins_content_parts() {
        let reply: ResponsesReply = serde_json::from_str(
            r#"{"output": [
                {"type": "reasoning", "content": []},
                {"content": [{"type": "output_text", "text": "line one"}, {"text": {"value": "line two"}}]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            OpenAiClient::extract_text(&reply).as_deref(),
            Some("line one\nline two")
        );
        assert_eq!(OpenAiClient::extract_text(&ResponsesReply::default()), None);
    }
}
