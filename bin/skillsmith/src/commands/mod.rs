pub mod config_cmd;
pub mod prompt;
pub mod record;
pub mod sessions;

use chrono::{Local, TimeZone};
use skillsmith_core::Paths;
use skillsmith_storage::SqliteStore;
use std::sync::Arc;

/// Open the session database, creating `~/.skillsmith` on first use.
pub(crate) fn open_store(paths: &Paths) -> anyhow::Result<Arc<SqliteStore>> {
    paths.ensure_dirs()?;
    let store = SqliteStore::open(&paths.database())
        .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?;
    Ok(Arc::new(store))
}

pub(crate) fn format_time(ms: i64) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "-".to_string(),
    }
}
