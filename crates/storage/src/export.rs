//! JSONL export and session grouping helpers for the session browser.

use serde::Serialize;
use skillsmith_core::{Error, Headers, PersistedSession, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

use crate::store::Store;

/// Grouping key used for sessions recorded without a domain.
pub const UNKNOWN_DOMAIN: &str = "Unknown";

#[derive(Debug, Serialize)]
struct ExportRequest<'a> {
    headers: &'a Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ExportResponse<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<&'a Headers>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ExportLine<'a> {
    description: &'a str,
    url: &'a str,
    method: &'a str,
    req: ExportRequest<'a>,
    res: ExportResponse<'a>,
    ts: i64,
}

/// Write one JSON object per record of `session_id` to `writer`.
/// Returns the number of lines written.
pub fn export_session_jsonl<W: Write>(
    store: &dyn Store,
    session_id: &str,
    writer: &mut W,
) -> Result<usize> {
    let session = store
        .get_session(session_id)?
        .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;
    let records = store.records_for_session(session_id)?;

    for record in &records {
        let line = ExportLine {
            description: &session.description,
            url: &record.url,
            method: &record.method,
            req: ExportRequest {
                headers: &record.request_headers,
                body: record.request_body.as_deref(),
            },
            res: ExportResponse {
                status: record.response_status,
                headers: record.response_headers.as_ref(),
                body: record.response_body.as_deref(),
            },
            ts: record.timestamp,
        };
        writeln!(writer, "{}", serde_json::to_string(&line)?)?;
    }
    Ok(records.len())
}

/// Export a session to a JSONL file, creating parent directories as needed.
pub fn export_session_to_file(store: &dyn Store, session_id: &str, path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    let count = export_session_jsonl(store, session_id, &mut writer)?;
    writer.flush()?;

    info!(session_id = %session_id, path = %path.display(), records = count, "Session exported");
    Ok(count)
}

/// Group sessions by domain, keeping each group's input order.
pub fn group_by_domain(sessions: &[PersistedSession]) -> BTreeMap<String, Vec<PersistedSession>> {
    let mut groups: BTreeMap<String, Vec<PersistedSession>> = BTreeMap::new();
    for session in sessions {
        groups
            .entry(domain_key(&session.domain).to_string())
            .or_default()
            .push(session.clone());
    }
    groups
}

pub fn domain_key(domain: &str) -> &str {
    if domain.is_empty() {
        UNKNOWN_DOMAIN
    } else {
        domain
    }
}
