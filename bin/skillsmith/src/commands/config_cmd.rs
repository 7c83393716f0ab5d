use skillsmith_core::{Config, Paths};

/// Show the current configuration as pretty-printed JSON.
pub async fn show() -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let mut json = serde_json::to_value(&config)?;

    // Never echo the key itself.
    if let Some(key) = json.pointer_mut("/llm/apiKey") {
        if key.as_str().map(|k| !k.is_empty()).unwrap_or(false) {
            *key = serde_json::Value::String("********".to_string());
        }
    }

    println!();
    println!("📋 Current Configuration");
    println!("  File: {}", paths.config_file().display());
    println!();
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// Set a config value by dot-separated key path.
pub async fn set(key: &str, value: &str) -> anyhow::Result<()> {
    let paths = Paths::new();
    let mut config = Config::load_or_default(&paths)?;
    config.set_value(key, value)?;
    config.save(&paths.config_file())?;

    println!("✓ Set {} = {}", key, value);
    Ok(())
}
