use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use skillsmith_core::{
    Error, GeneratedPrompt, Headers, PersistedRecord, PersistedSession, Result, TokenUsage,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::store::Store;

/// SQLite-backed implementation of [`Store`].
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| Error::Storage(format!("Failed to open database: {}", e)))?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();

        let store = Self {
            inner: Arc::new(Mutex::new(conn)),
            db_path: db_path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.inner
            .lock()
            .map_err(|e| Error::Storage(format!("Lock error: {}", e)))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                description TEXT NOT NULL DEFAULT '',
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                domain TEXT NOT NULL DEFAULT '',
                record_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_start ON sessions(start_time);

            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                url TEXT NOT NULL,
                method TEXT NOT NULL,
                request_headers TEXT NOT NULL DEFAULT '{}',
                request_body TEXT,
                response_status INTEGER,
                response_headers TEXT,
                response_body TEXT,
                timestamp INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_session ON records(session_id);
            CREATE INDEX IF NOT EXISTS idx_records_url ON records(url);
            CREATE INDEX IF NOT EXISTS idx_records_method ON records(method);

            CREATE TABLE IF NOT EXISTS generated_prompts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at INTEGER NOT NULL,
                prompt_content TEXT NOT NULL,
                meta_prompt TEXT NOT NULL,
                context_name TEXT NOT NULL,
                model_name TEXT NOT NULL,
                prompt_tokens INTEGER,
                completion_tokens INTEGER,
                total_tokens INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_prompts_created ON generated_prompts(created_at);
            CREATE INDEX IF NOT EXISTS idx_prompts_context ON generated_prompts(context_name);
            ",
        )
        .map_err(|e| Error::Storage(format!("Failed to init schema: {}", e)))?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn session_from_row(row: &Row) -> rusqlite::Result<PersistedSession> {
    Ok(PersistedSession {
        id: row.get("id")?,
        description: row.get("description")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        domain: row.get("domain")?,
        record_count: row.get("record_count")?,
    })
}

fn parse_headers(raw: &str) -> Headers {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(error = %e, "Stored headers are not valid JSON, using empty map");
        Headers::new()
    })
}

fn record_from_row(row: &Row) -> rusqlite::Result<PersistedRecord> {
    let request_headers: String = row.get("request_headers")?;
    let response_headers: Option<String> = row.get("response_headers")?;
    Ok(PersistedRecord {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        url: row.get("url")?,
        method: row.get("method")?,
        request_headers: parse_headers(&request_headers),
        request_body: row.get("request_body")?,
        response_status: row.get("response_status")?,
        response_headers: response_headers.as_deref().map(parse_headers),
        response_body: row.get("response_body")?,
        timestamp: row.get("timestamp")?,
    })
}

fn prompt_from_row(row: &Row) -> rusqlite::Result<GeneratedPrompt> {
    let prompt: Option<i64> = row.get("prompt_tokens")?;
    let completion: Option<i64> = row.get("completion_tokens")?;
    let total: Option<i64> = row.get("total_tokens")?;
    let token_usage = match (prompt, completion, total) {
        (Some(p), Some(c), Some(t)) => Some(TokenUsage {
            prompt: p.max(0) as u64,
            completion: c.max(0) as u64,
            total: t.max(0) as u64,
        }),
        _ => None,
    };
    Ok(GeneratedPrompt {
        id: row.get("id")?,
        created_at: row.get("created_at")?,
        prompt_content: row.get("prompt_content")?,
        meta_prompt: row.get("meta_prompt")?,
        context_name: row.get("context_name")?,
        model_name: row.get("model_name")?,
        token_usage,
    })
}

/// Request and response header maps as stored JSON text.
fn encode_headers(record: &PersistedRecord) -> Result<(String, Option<String>)> {
    let request_headers = serde_json::to_string(&record.request_headers)?;
    let response_headers = record
        .response_headers
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    Ok((request_headers, response_headers))
}

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Store for SqliteStore {
    fn add_session(&self, session: &PersistedSession) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions (id, description, start_time, end_time, domain, record_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.id,
                session.description,
                session.start_time,
                session.end_time,
                session.domain,
                session.record_count
            ],
        )
        .map_err(|e| Error::Storage(format!("Insert session error: {}", e)))?;

        debug!(id = %session.id, domain = %session.domain, "Session inserted");
        Ok(())
    }

    fn get_session(&self, id: &str) -> Result<Option<PersistedSession>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM sessions WHERE id = ?1",
            params![id],
            session_from_row,
        )
        .optional()
        .map_err(|e| Error::Storage(format!("Get session error: {}", e)))
    }

    fn list_sessions(&self) -> Result<Vec<PersistedSession>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM sessions ORDER BY start_time DESC, rowid DESC")
            .map_err(|e| Error::Storage(format!("Prepare error: {}", e)))?;
        let rows = stmt
            .query_map([], session_from_row)
            .map_err(|e| Error::Storage(format!("Query error: {}", e)))?;

        let mut sessions = Vec::new();
        for row in rows {
            match row {
                Ok(s) => sessions.push(s),
                Err(e) => warn!(error = %e, "Error reading session row"),
            }
        }
        Ok(sessions)
    }

    fn set_end_time(&self, id: &str, end_time: i64) -> Result<bool> {
        let conn = self.conn()?;
        let affected = conn
            .execute(
                "UPDATE sessions SET end_time = ?1 WHERE id = ?2",
                params![end_time, id],
            )
            .map_err(|e| Error::Storage(format!("Update session error: {}", e)))?;
        Ok(affected > 0)
    }

    fn delete_session(&self, id: &str) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Storage(format!("Transaction error: {}", e)))?;
        tx.execute("DELETE FROM sessions WHERE id = ?1", params![id])
            .map_err(|e| Error::Storage(format!("Delete session error: {}", e)))?;
        let records = tx
            .execute("DELETE FROM records WHERE session_id = ?1", params![id])
            .map_err(|e| Error::Storage(format!("Delete records error: {}", e)))?;
        tx.commit()
            .map_err(|e| Error::Storage(format!("Commit error: {}", e)))?;

        info!(id = %id, records, "Session deleted");
        Ok(records)
    }

    fn add_record_and_increment(&self, record: &PersistedRecord) -> Result<Option<i64>> {
        let (request_headers, response_headers) = encode_headers(record)?;

        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Storage(format!("Transaction error: {}", e)))?;

        let inserted = tx
            .execute(
                "INSERT INTO records (id, session_id, url, method, request_headers, request_body,
                    response_status, response_headers, response_body, timestamp)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10
                 WHERE EXISTS (SELECT 1 FROM sessions WHERE id = ?2)",
                params![
                    record.id,
                    record.session_id,
                    record.url,
                    record.method,
                    request_headers,
                    record.request_body,
                    record.response_status,
                    response_headers,
                    record.response_body,
                    record.timestamp
                ],
            )
            .map_err(|e| Error::Storage(format!("Insert record error: {}", e)))?;
        if inserted == 0 {
            debug!(session_id = %record.session_id, "Record dropped, session is gone");
            return Ok(None);
        }

        let count: i64 = tx
            .query_row(
                "UPDATE sessions SET record_count = record_count + 1 WHERE id = ?1 RETURNING record_count",
                params![record.session_id],
                |row| row.get(0),
            )
            .map_err(|e| Error::Storage(format!("Increment error: {}", e)))?;
        tx.commit()
            .map_err(|e| Error::Storage(format!("Commit error: {}", e)))?;
        Ok(Some(count))
    }

    fn get_record(&self, id: &str) -> Result<Option<PersistedRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM records WHERE id = ?1",
            params![id],
            record_from_row,
        )
        .optional()
        .map_err(|e| Error::Storage(format!("Get record error: {}", e)))
    }

    fn records_for_session(&self, session_id: &str) -> Result<Vec<PersistedRecord>> {
        self.records_for_sessions(&[session_id.to_string()])
    }

    fn records_for_sessions(&self, session_ids: &[String]) -> Result<Vec<PersistedRecord>> {
        if session_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let sql = format!(
            "SELECT * FROM records WHERE session_id IN ({}) ORDER BY timestamp ASC, rowid ASC",
            placeholders(1, session_ids.len())
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Storage(format!("Prepare error: {}", e)))?;
        let rows = stmt
            .query_map(params_from_iter(session_ids.iter()), record_from_row)
            .map_err(|e| Error::Storage(format!("Query error: {}", e)))?;

        let mut records = Vec::new();
        for row in rows {
            match row {
                Ok(r) => records.push(r),
                Err(e) => warn!(error = %e, "Error reading record row"),
            }
        }
        Ok(records)
    }

    fn count_records(&self, session_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM records WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )
        .map_err(|e| Error::Storage(format!("Count error: {}", e)))
    }

    fn delete_records(&self, session_id: &str, record_ids: &[String]) -> Result<usize> {
        if record_ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Storage(format!("Transaction error: {}", e)))?;

        let sql = format!(
            "DELETE FROM records WHERE session_id = ?1 AND id IN ({})",
            placeholders(2, record_ids.len())
        );
        let mut bind: Vec<&str> = Vec::with_capacity(record_ids.len() + 1);
        bind.push(session_id);
        bind.extend(record_ids.iter().map(String::as_str));

        let deleted = tx
            .execute(&sql, params_from_iter(bind))
            .map_err(|e| Error::Storage(format!("Delete records error: {}", e)))?;
        tx.execute(
            "UPDATE sessions SET record_count = MAX(0, record_count - ?1) WHERE id = ?2",
            params![deleted as i64, session_id],
        )
        .map_err(|e| Error::Storage(format!("Update session error: {}", e)))?;
        tx.commit()
            .map_err(|e| Error::Storage(format!("Commit error: {}", e)))?;

        debug!(session_id = %session_id, deleted, "Records deleted");
        Ok(deleted)
    }

    fn add_generated_prompt(&self, prompt: &GeneratedPrompt) -> Result<i64> {
        let conn = self.conn()?;
        let usage = prompt.token_usage;
        conn.execute(
            "INSERT INTO generated_prompts (created_at, prompt_content, meta_prompt, context_name,
                model_name, prompt_tokens, completion_tokens, total_tokens)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                prompt.created_at,
                prompt.prompt_content,
                prompt.meta_prompt,
                prompt.context_name,
                prompt.model_name,
                usage.map(|u| u.prompt as i64),
                usage.map(|u| u.completion as i64),
                usage.map(|u| u.total as i64)
            ],
        )
        .map_err(|e| Error::Storage(format!("Insert prompt error: {}", e)))?;
        Ok(conn.last_insert_rowid())
    }

    fn list_generated_prompts(&self) -> Result<Vec<GeneratedPrompt>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM generated_prompts ORDER BY created_at DESC, id DESC")
            .map_err(|e| Error::Storage(format!("Prepare error: {}", e)))?;
        let rows = stmt
            .query_map([], prompt_from_row)
            .map_err(|e| Error::Storage(format!("Query error: {}", e)))?;

        let mut prompts = Vec::new();
        for row in rows {
            match row {
                Ok(p) => prompts.push(p),
                Err(e) => warn!(error = %e, "Error reading prompt row"),
            }
        }
        Ok(prompts)
    }

    fn delete_generated_prompt(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let affected = conn
            .execute("DELETE FROM generated_prompts WHERE id = ?1", params![id])
            .map_err(|e| Error::Storage(format!("Delete prompt error: {}", e)))?;
        Ok(affected > 0)
    }
}
