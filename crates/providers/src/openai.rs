use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use skillsmith_core::{Ack, AuthType, Error, LlmConfig, Result};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::client::build_http_client;
use crate::sse::{SseParser, StreamItem};
use crate::{Completion, Generator};

const CONNECTION_TEST_PROMPT: &str = "Hello, are you there?";
const CONNECTION_TEST_SYSTEM: &str = "system";

/// Find the largest byte index <= `max_bytes` that is a valid char boundary.
fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> usize {
    if max_bytes >= s.len() {
        return s.len();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Client for any OpenAI-compatible chat-completions endpoint.
pub struct OpenAIClient {
    client: Client,
    /// Full URL; requests are posted here as-is.
    endpoint: String,
    api_key: String,
    auth_type: AuthType,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl OpenAIClient {
    pub fn from_config(config: &LlmConfig) -> Self {
        let endpoint = config.endpoint().to_string();
        let client = build_http_client(
            config.proxy.as_deref(),
            &endpoint,
            Duration::from_secs(config.timeout_secs),
        );
        Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            auth_type: config.auth_type,
            model: config.model().to_string(),
            max_tokens: config.max_tokens,
            temperature: config.temperature.filter(|t| t.is_finite()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request<'a>(
        &'a self,
        prompt: &'a str,
        system_prompt: Option<&'a str>,
        stream: bool,
    ) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        ChatRequest {
            model: &self.model,
            messages,
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    fn post(&self, body: &ChatRequest<'_>) -> RequestBuilder {
        let builder = self.client.post(&self.endpoint).json(body);
        match self.auth_type {
            AuthType::ApiKey => builder.header("api-key", &self.api_key),
            AuthType::Bearer => builder.header("Authorization", format!("Bearer {}", self.api_key)),
        }
    }

    async fn send(&self, body: &ChatRequest<'_>) -> Result<reqwest::Response> {
        info!(
            url = %self.endpoint,
            model = %self.model,
            stream = body.stream,
            "Calling LLM"
        );
        let response = self
            .post(body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let raw_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %raw_body, "LLM API error");
            return Err(Error::Provider(format!(
                "API Request failed: {} - {}",
                status, raw_body
            )));
        }
        Ok(response)
    }

    /// Send a fixed greeting and report whether the endpoint answered.
    pub async fn test_connection(&self) -> Ack {
        match self
            .generate(CONNECTION_TEST_PROMPT, Some(CONNECTION_TEST_SYSTEM))
            .await
        {
            Ok(_) => Ack::ok(),
            Err(e) => {
                warn!(error = %e, "Connection test failed");
                Ack::failed(e.to_string())
            }
        }
    }
}

#[async_trait]
impl Generator for OpenAIClient {
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        let body = self.build_request(prompt, system_prompt, false);
        let raw_body = self
            .send(&body)
            .await?
            .text()
            .await
            .map_err(|e| Error::Provider(format!("Failed to read response: {}", e)))?;

        {
            let end = truncate_at_char_boundary(&raw_body, 500);
            debug!(body_len = raw_body.len(), preview = %&raw_body[..end], "LLM raw response");
        }

        let chat_response: ChatResponse = serde_json::from_str(&raw_body).map_err(|e| {
            let end = truncate_at_char_boundary(&raw_body, 500);
            Error::Provider(format!("Failed to parse response: {}. Body: {}", e, &raw_body[..end]))
        })?;

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Provider("No choices in response".to_string()))?;
        Ok(choice.message.content.unwrap_or_default())
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<Completion> {
        let body = self.build_request(prompt, system_prompt, true);
        let response = self.send(&body).await?;

        let mut stream = response.bytes_stream();
        let mut parser = SseParser::new();
        let mut completion = Completion::default();
        let mut done = false;

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| Error::Provider(format!("Stream read failed: {}", e)))?;
            done = apply_items(parser.push(&bytes), &mut completion, on_chunk);
            if done {
                break;
            }
        }
        if !done {
            apply_items(parser.finish(), &mut completion, on_chunk);
        }

        info!(
            chars = completion.text.len(),
            total_tokens = completion.usage.map(|u| u.total).unwrap_or(0),
            "LLM stream finished"
        );
        Ok(completion)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Returns true once `[DONE]` was seen.
fn apply_items(
    items: Vec<StreamItem>,
    completion: &mut Completion,
    on_chunk: &mut (dyn FnMut(&str) + Send),
) -> bool {
    for item in items {
        match item {
            StreamItem::Delta(text) => {
                if !text.is_empty() {
                    on_chunk(&text);
                    completion.text.push_str(&text);
                }
            }
            StreamItem::Usage(usage) => completion.usage = Some(usage),
            StreamItem::Done => return true,
        }
    }
    false
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}
