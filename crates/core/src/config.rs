use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::paths::Paths;

/// Default chat-completions endpoint. `LlmConfig::base_url` is a full URL, not a prefix.
pub const DEFAULT_LLM_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderConfig {
    /// HTTP endpoint of the browser's remote debugging port.
    #[serde(default = "default_cdp_endpoint")]
    pub cdp_endpoint: String,
    /// Protocol version requested when attaching to a tab.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
}

fn default_cdp_endpoint() -> String {
    "http://127.0.0.1:9222".to_string()
}

fn default_protocol_version() -> String {
    "1.3".to_string()
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            cdp_endpoint: default_cdp_endpoint(),
            protocol_version: default_protocol_version(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderType {
    #[default]
    Openai,
    Custom,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AuthType {
    #[default]
    Bearer,
    ApiKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProviderType,
    #[serde(default)]
    pub api_key: String,
    /// Full chat-completions URL. Empty or missing means `DEFAULT_LLM_ENDPOINT`.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub auth_type: AuthType,
    #[serde(default)]
    pub meta_prompt_template: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// `None` follows the environment, `Some("")` forces a direct connection.
    #[serde(default)]
    pub proxy: Option<String>,
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderType::default(),
            api_key: String::new(),
            base_url: None,
            model_name: None,
            max_tokens: None,
            temperature: None,
            auth_type: AuthType::default(),
            meta_prompt_template: None,
            timeout_secs: default_timeout_secs(),
            proxy: None,
        }
    }
}

impl LlmConfig {
    pub fn endpoint(&self) -> &str {
        match self.base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url,
            _ => DEFAULT_LLM_ENDPOINT,
        }
    }

    pub fn model(&self) -> &str {
        match self.model_name.as_deref().map(str::trim) {
            Some(model) if !model.is_empty() => model,
            _ => DEFAULT_MODEL,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Set a single value by dotted key, e.g. `llm.modelName`.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let tree = serde_json::to_value(&*self)?;
        let parts: Vec<&str> = key.split('.').collect();
        if !has_key(&tree, &parts) {
            return Err(Error::Config(format!("unknown key: {}", key)));
        }

        // Numbers and booleans are tried as JSON first, then as a plain string.
        let mut candidates = Vec::new();
        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(value) {
            candidates.push(parsed);
        }
        candidates.push(serde_json::Value::String(value.to_string()));

        let mut last_err = None;
        for candidate in candidates {
            let mut updated = tree.clone();
            if let Some(slot) = slot_mut(&mut updated, &parts) {
                *slot = candidate;
            }
            match serde_json::from_value::<Config>(updated) {
                Ok(cfg) => {
                    *self = cfg;
                    return Ok(());
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(Error::Config(format!(
            "invalid value for {}: {}",
            key,
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

fn has_key(tree: &serde_json::Value, parts: &[&str]) -> bool {
    let mut node = tree;
    for part in parts {
        match node.as_object().and_then(|obj| obj.get(*part)) {
            Some(next) => node = next,
            None => return false,
        }
    }
    !parts.is_empty()
}

fn slot_mut<'a>(tree: &'a mut serde_json::Value, parts: &[&str]) -> Option<&'a mut serde_json::Value> {
    let mut node = tree;
    for part in parts {
        node = node.as_object_mut()?.get_mut(*part)?;
    }
    Some(node)
}
