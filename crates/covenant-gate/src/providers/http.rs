//! OpenAI-compatible and Anthropic HTTP adapters.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{Completion, CompletionProvider, CompletionRequest, TokenUsage};
use crate::error::CompletionError;

const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ERROR_BODY_LIMIT: usize = 320;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(alias = "open_ai")]
    OpenAi,
    Anthropic,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Value,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

pub struct HttpCompletionProvider {
    name: String,
    kind: ProviderKind,
    endpoint: Option<String>,
    api_key: String,
    timeout: Duration,
    client: Client,
}

impl HttpCompletionProvider {
    /// `timeout` bounds the HTTP exchange itself; the gated client applies
    /// its own deadline on top.
    pub fn new(
        name: impl Into<String>,
        kind: ProviderKind,
        endpoint: Option<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let name = name.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CompletionError::Transport {
                provider: name.clone(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            name,
            kind,
            endpoint: endpoint.filter(|e| !e.trim().is_empty()),
            api_key: api_key.into(),
            timeout,
            client,
        })
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn transport(&self, err: reqwest::Error) -> CompletionError {
        if err.is_timeout() {
            return CompletionError::Timeout {
                provider: self.name.clone(),
                after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            };
        }
        CompletionError::Transport {
            provider: self.name.clone(),
            message: err.to_string(),
        }
    }

    fn invalid(&self, message: impl Into<String>) -> CompletionError {
        CompletionError::InvalidResponse {
            provider: self.name.clone(),
            message: message.into(),
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, CompletionError> {
        let response = request.send().await.map_err(|e| self.transport(e))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                provider: self.name.clone(),
                status,
                body: truncate(&body, ERROR_BODY_LIMIT),
            });
        }
        Ok(response)
    }

    async fn complete_openai(
        &self,
        request: &CompletionRequest,
    ) -> Result<Completion, CompletionError> {
        let url = resolve_endpoint(
            self.endpoint.as_deref(),
            DEFAULT_OPENAI_ENDPOINT,
            "/chat/completions",
        );

        let mut messages = Vec::new();
        if let Some(system) = non_blank(request.system_prompt.as_deref()) {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let mut payload = json!({
            "model": request.model,
            "messages": messages,
        });
        if let Some(temp) = request.temperature {
            payload["temperature"] = json!(temp);
        }
        if let Some(max_tokens) = request.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }

        let response = self
            .send(self.client.post(&url).bearer_auth(&self.api_key).json(&payload))
            .await?;
        let body: OpenAiResponse = response.json().await.map_err(|e| self.invalid(e.to_string()))?;
        let choice = body
            .choices
            .first()
            .ok_or_else(|| self.invalid("response did not include choices"))?;

        Ok(Completion {
            text: extract_text(&choice.message.content),
            finish_reason: choice.finish_reason.clone(),
            usage: body.usage.map(|u| TokenUsage {
                input_tokens: to_u32(u.prompt_tokens),
                output_tokens: to_u32(u.completion_tokens),
                total_tokens: to_u32(u.total_tokens),
            }),
        })
    }

    async fn complete_anthropic(
        &self,
        request: &CompletionRequest,
    ) -> Result<Completion, CompletionError> {
        let url =
            resolve_endpoint(self.endpoint.as_deref(), DEFAULT_ANTHROPIC_ENDPOINT, "/messages");

        let mut payload = json!({
            "model": request.model,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": [{ "role": "user", "content": request.prompt }],
        });
        if let Some(temp) = request.temperature {
            payload["temperature"] = json!(temp);
        }
        if let Some(system) = non_blank(request.system_prompt.as_deref()) {
            payload["system"] = json!(system);
        }

        let response = self
            .send(
                self.client
                    .post(&url)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&payload),
            )
            .await?;
        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| self.invalid(e.to_string()))?;

        let text = body
            .content
            .iter()
            .filter(|part| part.content_type == "text")
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(Completion {
            text: text.trim().to_string(),
            finish_reason: body.stop_reason,
            usage: body.usage.map(|u| TokenUsage {
                input_tokens: to_u32(u.input_tokens),
                output_tokens: to_u32(u.output_tokens),
                total_tokens: add_tokens(u.input_tokens, u.output_tokens),
            }),
        })
    }
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CompletionError> {
        if self.api_key.trim().is_empty() {
            return Err(CompletionError::Transport {
                provider: self.name.clone(),
                message: "api_key is not configured".to_string(),
            });
        }
        match self.kind {
            ProviderKind::OpenAi => self.complete_openai(request).await,
            ProviderKind::Anthropic => self.complete_anthropic(request).await,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn resolve_endpoint(endpoint: Option<&str>, default_endpoint: &str, suffix: &str) -> String {
    let endpoint = endpoint.unwrap_or(default_endpoint);
    if endpoint.trim_end_matches('/').ends_with(suffix) {
        endpoint.trim_end_matches('/').to_string()
    } else {
        format!("{}{}", endpoint.trim_end_matches('/'), suffix)
    }
}

fn extract_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.trim().to_string(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
        _ => String::new(),
    }
}

fn to_u32(value: Option<u64>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

fn add_tokens(a: Option<u64>, b: Option<u64>) -> Option<u32> {
    match (a, b) {
        (Some(a), Some(b)) => to_u32(a.checked_add(b)),
        (Some(v), None) | (None, Some(v)) => to_u32(Some(v)),
        (None, None) => None,
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_gain_their_path_once() {
        assert_eq!(
            resolve_endpoint(Some("http://localhost:8080/v1/"), DEFAULT_OPENAI_ENDPOINT, "/chat/completions"),
            "http://localhost:8080/v1/chat/completions"
        );
        assert_eq!(
            resolve_endpoint(None, DEFAULT_ANTHROPIC_ENDPOINT, "/messages"),
            DEFAULT_ANTHROPIC_ENDPOINT
        );
    }

    #[test]
    fn text_is_pulled_from_string_or_parts() {
        assert_eq!(extract_text(&json!("  hi ")), "hi");
        assert_eq!(
            extract_text(&json!([{ "type": "text", "text": "a" }, { "type": "text", "text": "b" }])),
            "a\nb"
        );
    }

    #[test]
    fn provider_kind_reads_config_spelling() {
        let kind: ProviderKind = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(kind, ProviderKind::OpenAi);
        let kind: ProviderKind = serde_json::from_str("\"anthropic\"").unwrap();
        assert_eq!(kind, ProviderKind::Anthropic);
    }

    #[tokio::test]
    async fn missing_key_fails_without_a_request() {
        let provider = HttpCompletionProvider::new(
            "openai",
            ProviderKind::OpenAi,
            None,
            "",
            Duration::from_secs(1),
        )
        .unwrap();
        let err = provider
            .complete(&CompletionRequest {
                model: "m".to_string(),
                prompt: "p".to_string(),
                system_prompt: None,
                max_tokens: None,
                temperature: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Transport { .. }));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(400);
        assert_eq!(truncate(&body, 10), "xxxxxxxxxx...");
    }
}
