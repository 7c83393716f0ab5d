pub mod config;
pub mod error;
pub mod message;
pub mod paths;
pub mod types;

pub use config::{AuthType, Config, LlmConfig, LlmProviderType, RecorderConfig};
pub use error::{Error, Result};
pub use message::{Ack, ControlMessage, ControlResponse, Notification, StatusSnapshot};
pub use paths::Paths;
pub use types::{GeneratedPrompt, Headers, PersistedRecord, PersistedSession, TabId, TokenUsage};
