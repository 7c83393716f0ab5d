use skillsmith_core::{Config, Paths};
use skillsmith_providers::OpenAIClient;
use skillsmith_storage::Store;
use skillsmith_workbench::{Workbench, WorkbenchContext};
use std::io::Write;
use std::sync::Arc;

use super::{format_time, open_store};

/// Build a meta-prompt from a session or domain and run it through the model.
pub async fn generate(
    session: Option<String>,
    domain: Option<String>,
    goal: &str,
    stream: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let store = open_store(&paths)?;

    let ctx = match (session, domain) {
        (Some(id), _) => WorkbenchContext::for_session(store.as_ref(), &id)?,
        (None, Some(domain)) => WorkbenchContext::for_domain(store.as_ref(), &domain)?,
        (None, None) => anyhow::bail!("Pass --session or --domain"),
    };

    let generator = Arc::new(OpenAIClient::from_config(&config.llm));
    let workbench =
        Workbench::new(generator, store).with_template(config.llm.meta_prompt_template.clone());

    if dry_run {
        println!("{}", workbench.meta_prompt(&ctx, goal)?);
        return Ok(());
    }

    println!();
    println!(
        "✨ {} · {} sessions · {} records",
        ctx.name,
        ctx.sessions.len(),
        ctx.records.len()
    );
    println!();

    let result = if stream {
        let mut stdout = std::io::stdout();
        let mut on_chunk = |chunk: &str| {
            let _ = stdout.write_all(chunk.as_bytes());
            let _ = stdout.flush();
        };
        let result = workbench
            .generate_streaming(&ctx, goal, &mut on_chunk)
            .await?;
        println!();
        result
    } else {
        let result = workbench.generate(&ctx, goal).await?;
        println!("{}", result.prompt_content);
        result
    };

    println!();
    if let Some(id) = result.id {
        println!("  Saved to history as #{} ({})", id, result.model_name);
    }
    if let Some(usage) = result.token_usage {
        println!(
            "  Tokens: {} prompt + {} completion = {}",
            usage.prompt, usage.completion, usage.total
        );
    }
    Ok(())
}

/// List generated prompts, newest first.
pub async fn history() -> anyhow::Result<()> {
    let store = open_store(&Paths::new())?;
    let items = store.list_generated_prompts()?;

    println!();
    if items.is_empty() {
        println!("(No generated prompts yet)");
    } else {
        println!("📜 Prompt history ({})", items.len());
        for item in &items {
            let preview: String = item.prompt_content.chars().take(80).collect();
            println!(
                "  #{}  {}  {}  [{}]",
                item.id.unwrap_or_default(),
                format_time(item.created_at),
                item.context_name,
                item.model_name
            );
            println!("      {}", preview.replace('\n', " "));
        }
    }
    println!();
    Ok(())
}

/// Print one generated prompt in full.
pub async fn show(id: i64) -> anyhow::Result<()> {
    let store = open_store(&Paths::new())?;
    let Some(item) = store
        .list_generated_prompts()?
        .into_iter()
        .find(|p| p.id == Some(id))
    else {
        anyhow::bail!("Prompt #{} not found", id);
    };

    println!("{}", item.prompt_content);
    Ok(())
}

pub async fn delete(id: i64) -> anyhow::Result<()> {
    let store = open_store(&Paths::new())?;
    if store.delete_generated_prompt(id)? {
        println!("✓ Deleted prompt #{}", id);
    } else {
        anyhow::bail!("Prompt #{} not found", id);
    }
    Ok(())
}

/// Send a greeting to the configured endpoint.
pub async fn test_connection() -> anyhow::Result<()> {
    let config = Config::load_or_default(&Paths::new())?;
    let client = OpenAIClient::from_config(&config.llm);

    println!(
        "Testing {} ({:?}, {})...",
        client.endpoint(),
        config.llm.provider,
        config.llm.model()
    );
    let ack = client.test_connection().await;
    if ack.success {
        println!("✓ Connection OK");
        Ok(())
    } else {
        anyhow::bail!(
            "Connection failed: {}",
            ack.error.unwrap_or_else(|| "Unknown error".to_string())
        )
    }
}
