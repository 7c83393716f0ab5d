pub mod client;
pub mod openai;
pub mod sse;

use async_trait::async_trait;
use skillsmith_core::{Result, TokenUsage};

/// Result of a streamed completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Present when the endpoint reports usage on the stream.
    pub usage: Option<TokenUsage>,
}

/// A chat-completion backend.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String>;

    /// Stream the completion, calling `on_chunk` for every content delta.
    async fn generate_stream(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<Completion>;

    fn model_name(&self) -> &str;
}

pub use client::build_http_client;
pub use openai::OpenAIClient;
