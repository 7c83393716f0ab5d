use skillsmith_core::{Paths, PersistedSession};
use skillsmith_storage::{domain_key, export_session_to_file, group_by_domain, Store};
use std::path::PathBuf;

use super::{format_time, open_store};

fn print_session(session: &PersistedSession) {
    let end = session
        .end_time
        .map(format_time)
        .unwrap_or_else(|| "(recording)".to_string());
    let description = if session.description.is_empty() {
        "No Description"
    } else {
        session.description.as_str()
    };
    println!("  {}  {}", session.id, description);
    println!(
        "      {} → {}  ·  {} records  ·  {}",
        format_time(session.start_time),
        end,
        session.record_count,
        domain_key(&session.domain)
    );
}

/// List sessions, newest first, optionally grouped by domain.
pub async fn list(group: bool) -> anyhow::Result<()> {
    let store = open_store(&Paths::new())?;
    let sessions = store.list_sessions()?;

    println!();
    if sessions.is_empty() {
        println!("(No sessions recorded yet)");
        println!();
        return Ok(());
    }

    if group {
        for (domain, items) in group_by_domain(&sessions) {
            println!("📁 {} ({})", domain, items.len());
            for session in &items {
                print_session(session);
            }
            println!();
        }
    } else {
        println!("🎬 Sessions ({})", sessions.len());
        for session in &sessions {
            print_session(session);
        }
        println!();
    }
    Ok(())
}

/// Show a session and its records.
pub async fn show(id: &str) -> anyhow::Result<()> {
    let store = open_store(&Paths::new())?;
    let Some(session) = store.get_session(id)? else {
        anyhow::bail!("Session '{}' not found", id);
    };
    let records = store.records_for_session(id)?;

    println!();
    print_session(&session);
    println!();
    for record in &records {
        let status = record
            .response_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "---".to_string());
        println!(
            "  [{}] {} {:<6} {}",
            format_time(record.timestamp),
            status,
            record.method,
            record.url
        );
        println!("      id: {}", record.id);
    }
    if records.is_empty() {
        println!("  (No records)");
    }
    println!();
    Ok(())
}

/// Delete a session together with its records.
pub async fn delete(id: &str) -> anyhow::Result<()> {
    let store = open_store(&Paths::new())?;
    if store.get_session(id)?.is_none() {
        anyhow::bail!("Session '{}' not found", id);
    }
    let removed = store.delete_session(id)?;
    println!("✓ Deleted session {} ({} records)", id, removed);
    Ok(())
}

/// Delete selected records of a session.
pub async fn delete_records(session_id: &str, ids: &[String]) -> anyhow::Result<()> {
    let store = open_store(&Paths::new())?;
    let removed = store.delete_records(session_id, ids)?;
    let remaining = store
        .get_session(session_id)?
        .map(|s| s.record_count)
        .unwrap_or(0);
    println!(
        "✓ Deleted {} of {} records ({} left in session)",
        removed,
        ids.len(),
        remaining
    );
    Ok(())
}

/// Export a session as JSONL.
pub async fn export(session_id: &str, output: Option<PathBuf>) -> anyhow::Result<()> {
    let paths = Paths::new();
    let store = open_store(&paths)?;
    let path = output.unwrap_or_else(|| paths.session_export(session_id));
    let count = export_session_to_file(store.as_ref(), session_id, &path)?;
    println!("✓ Exported {} records to {}", count, path.display());
    Ok(())
}
