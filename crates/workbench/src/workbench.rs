use skillsmith_core::types::now_ms;
use skillsmith_core::{GeneratedPrompt, Result, TokenUsage};
use skillsmith_providers::Generator;
use skillsmith_storage::Store;
use std::sync::Arc;
use tracing::{info, warn};

use crate::context::WorkbenchContext;
use crate::template::{build_meta_prompt, META_PROMPT_ROLE};

/// Builds meta-prompts from recorded traffic, runs them through the model and
/// keeps a history of the results.
pub struct Workbench {
    generator: Arc<dyn Generator>,
    store: Arc<dyn Store>,
    template: Option<String>,
}

impl Workbench {
    pub fn new(generator: Arc<dyn Generator>, store: Arc<dyn Store>) -> Self {
        Self {
            generator,
            store,
            template: None,
        }
    }

    pub fn with_template(mut self, template: Option<String>) -> Self {
        self.template = template;
        self
    }

    pub fn meta_prompt(&self, ctx: &WorkbenchContext, goal: &str) -> Result<String> {
        build_meta_prompt(self.template.as_deref(), ctx, goal)
    }

    pub async fn generate(&self, ctx: &WorkbenchContext, goal: &str) -> Result<GeneratedPrompt> {
        let meta_prompt = self.meta_prompt(ctx, goal)?;
        let content = self
            .generator
            .generate(&meta_prompt, Some(META_PROMPT_ROLE))
            .await?;
        Ok(self.record(ctx, meta_prompt, content, None))
    }

    /// Like [`Workbench::generate`], forwarding each delta to `on_chunk`.
    pub async fn generate_streaming(
        &self,
        ctx: &WorkbenchContext,
        goal: &str,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<GeneratedPrompt> {
        let meta_prompt = self.meta_prompt(ctx, goal)?;
        let completion = self
            .generator
            .generate_stream(&meta_prompt, Some(META_PROMPT_ROLE), on_chunk)
            .await?;
        Ok(self.record(ctx, meta_prompt, completion.text, completion.usage))
    }

    /// Save to history. A failed save is logged; the result is still returned.
    fn record(
        &self,
        ctx: &WorkbenchContext,
        meta_prompt: String,
        content: String,
        usage: Option<TokenUsage>,
    ) -> GeneratedPrompt {
        let mut prompt = GeneratedPrompt {
            id: None,
            created_at: now_ms(),
            prompt_content: content,
            meta_prompt,
            context_name: ctx.name.clone(),
            model_name: self.generator.model_name().to_string(),
            token_usage: usage,
        };
        match self.store.add_generated_prompt(&prompt) {
            Ok(id) => {
                prompt.id = Some(id);
                info!(id, context = %ctx.name, model = %prompt.model_name, "Generated prompt saved");
            }
            Err(e) => warn!(error = %e, "Failed to save prompt history"),
        }
        prompt
    }

    /// Newest first.
    pub fn history(&self) -> Result<Vec<GeneratedPrompt>> {
        self.store.list_generated_prompts()
    }

    pub fn delete_history(&self, id: i64) -> Result<bool> {
        self.store.delete_generated_prompt(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextKind, SessionSummary};
    use async_trait::async_trait;
    use skillsmith_core::Error;
    use skillsmith_providers::Completion;
    use skillsmith_storage::SqliteStore;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeGenerator {
        calls: Mutex<Vec<(String, Option<String>)>>,
        fail: bool,
    }

    #[async_trait]
    impl Generator for FakeGenerator {
        async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((prompt.to_string(), system_prompt.map(|s| s.to_string())));
            if self.fail {
                return Err(Error::Provider("API Request failed: 401".to_string()));
            }
            Ok("You are an agent.".to_string())
        }

        async fn generate_stream(
            &self,
            prompt: &str,
            system_prompt: Option<&str>,
            on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
        ) -> Result<Completion> {
            let text = self.generate(prompt, system_prompt).await?;
            for part in text.split_inclusive(' ') {
                on_chunk(part);
            }
            Ok(Completion {
                text,
                usage: Some(TokenUsage {
                    prompt: 100,
                    completion: 4,
                    total: 104,
                }),
            })
        }

        fn model_name(&self) -> &str {
            "gpt-4o"
        }
    }

    fn context() -> WorkbenchContext {
        WorkbenchContext {
            kind: ContextKind::Single,
            name: "checkout".to_string(),
            sessions: vec![SessionSummary {
                id: "s1".to_string(),
                description: "checkout".to_string(),
                start_time: 0,
            }],
            records: Vec::new(),
        }
    }

    fn setup(fail: bool) -> (TempDir, Arc<FakeGenerator>, Workbench) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(&dir.path().join("w.db")).unwrap());
        let generator = Arc::new(FakeGenerator {
            fail,
            ..Default::default()
        });
        let workbench = Workbench::new(generator.clone(), store);
        (dir, generator, workbench)
    }

    #[tokio::test]
    async fn test_generate_saves_history() {
        let (_dir, generator, workbench) = setup(false);
        let result = workbench.generate(&context(), "automate checkout").await.unwrap();

        assert!(result.id.is_some());
        assert_eq!(result.prompt_content, "You are an agent.");
        assert_eq!(result.context_name, "checkout");
        assert_eq!(result.model_name, "gpt-4o");
        assert!(result.meta_prompt.contains("My Goal: automate checkout"));

        let calls = generator.calls.lock().unwrap();
        assert_eq!(calls[0].1.as_deref(), Some(META_PROMPT_ROLE));
        drop(calls);

        let history = workbench.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, result.id);
    }

    #[tokio::test]
    async fn test_streaming_records_usage() {
        let (_dir, _generator, workbench) = setup(false);
        let mut streamed = String::new();
        let mut on_chunk = |s: &str| streamed.push_str(s);
        let result = workbench
            .generate_streaming(&context(), "", &mut on_chunk)
            .await
            .unwrap();

        assert_eq!(streamed, "You are an agent.");
        assert_eq!(result.token_usage.map(|u| u.total), Some(104));
        assert_eq!(workbench.history().unwrap()[0].token_usage, result.token_usage);
    }

    #[tokio::test]
    async fn test_failed_generation_saves_nothing() {
        let (_dir, _generator, workbench) = setup(true);
        let err = workbench.generate(&context(), "").await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
        assert!(workbench.history().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_history() {
        let (_dir, _generator, workbench) = setup(false);
        let result = workbench.generate(&context(), "").await.unwrap();
        let id = result.id.unwrap();
        assert!(workbench.delete_history(id).unwrap());
        assert!(!workbench.delete_history(id).unwrap());
        assert!(workbench.history().unwrap().is_empty());
    }

    #[test]
    fn test_custom_template() {
        let (_dir, _generator, workbench) = setup(false);
        let workbench = workbench.with_template(Some("Goal={{goal}}".to_string()));
        assert_eq!(workbench.meta_prompt(&context(), "x").unwrap(), "Goal=x");
    }
}
