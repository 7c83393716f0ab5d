//! What the workbench feeds to the model: sessions plus their records.

use serde::Serialize;
use skillsmith_core::{Error, PersistedRecord, PersistedSession, Result};
use skillsmith_storage::{domain_key, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Single,
    Domain,
}

impl ContextKind {
    /// Phrase used for `{{context_type}}`.
    pub fn phrase(self) -> &'static str {
        match self {
            ContextKind::Single => "a user session",
            ContextKind::Domain => "multiple user sessions",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: String,
    pub description: String,
    pub start_time: i64,
}

impl From<&PersistedSession> for SessionSummary {
    fn from(s: &PersistedSession) -> Self {
        Self {
            id: s.id.clone(),
            description: s.description.clone(),
            start_time: s.start_time,
        }
    }
}

/// Trimmed view of a record as it appears in the prompt data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRecord<'a> {
    pub session_id: &'a str,
    pub url: &'a str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub req_body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub res_body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct WorkbenchContext {
    pub kind: ContextKind,
    pub name: String,
    pub sessions: Vec<SessionSummary>,
    pub records: Vec<PersistedRecord>,
}

impl WorkbenchContext {
    /// One session; named after its description.
    pub fn for_session(store: &dyn Store, session_id: &str) -> Result<Self> {
        let session = store
            .get_session(session_id)?
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;
        let records = store.records_for_session(session_id)?;
        let name = if session.description.is_empty() {
            "Session".to_string()
        } else {
            session.description.clone()
        };
        Ok(Self {
            kind: ContextKind::Single,
            name,
            sessions: vec![SessionSummary::from(&session)],
            records,
        })
    }

    /// Every session recorded under `domain` (`Unknown` selects sessions
    /// without a domain).
    pub fn for_domain(store: &dyn Store, domain: &str) -> Result<Self> {
        let sessions: Vec<PersistedSession> = store
            .list_sessions()?
            .into_iter()
            .filter(|s| domain_key(&s.domain) == domain)
            .collect();
        if sessions.is_empty() {
            return Err(Error::NotFound(format!("no sessions for domain {}", domain)));
        }
        let ids: Vec<String> = sessions.iter().map(|s| s.id.clone()).collect();
        let records = store.records_for_sessions(&ids)?;
        Ok(Self {
            kind: ContextKind::Domain,
            name: format!("Domain: {}", domain),
            sessions: sessions.iter().map(SessionSummary::from).collect(),
            records,
        })
    }

    pub fn data(&self) -> Vec<ContextRecord<'_>> {
        self.records
            .iter()
            .map(|r| ContextRecord {
                session_id: &r.session_id,
                url: &r.url,
                method: &r.method,
                req_body: r.request_body.as_deref(),
                res_body: r.response_body.as_deref(),
                status: r.response_status,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillsmith_core::Headers;
    use skillsmith_storage::SqliteStore;
    use tempfile::TempDir;

    fn seed(store: &SqliteStore, id: &str, domain: &str, description: &str, start: i64) {
        store
            .add_session(&PersistedSession {
                id: id.to_string(),
                description: description.to_string(),
                start_time: start,
                end_time: None,
                domain: domain.to_string(),
                record_count: 0,
            })
            .unwrap();
        store
            .add_record_and_increment(&PersistedRecord {
                id: format!("{}-r", id),
                session_id: id.to_string(),
                url: format!("https://{}/api", domain),
                method: "GET".to_string(),
                request_headers: Headers::new(),
                request_body: None,
                response_status: Some(200),
                response_headers: None,
                response_body: Some("{}".to_string()),
                timestamp: start,
            })
            .unwrap();
    }

    #[test]
    fn test_single_context() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&dir.path().join("w.db")).unwrap();
        seed(&store, "s1", "a.example.com", "", 10);

        let ctx = WorkbenchContext::for_session(&store, "s1").unwrap();
        assert_eq!(ctx.kind, ContextKind::Single);
        assert_eq!(ctx.name, "Session");
        assert_eq!(ctx.records.len(), 1);

        let data = serde_json::to_value(ctx.data()).unwrap();
        assert_eq!(
            data[0],
            serde_json::json!({
                "sessionId": "s1",
                "url": "https://a.example.com/api",
                "method": "GET",
                "resBody": "{}",
                "status": 200
            })
        );
    }

    #[test]
    fn test_domain_context() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&dir.path().join("w.db")).unwrap();
        seed(&store, "s1", "a.example.com", "login", 10);
        seed(&store, "s2", "a.example.com", "checkout", 20);
        seed(&store, "s3", "b.example.com", "other", 30);

        let ctx = WorkbenchContext::for_domain(&store, "a.example.com").unwrap();
        assert_eq!(ctx.kind, ContextKind::Domain);
        assert_eq!(ctx.name, "Domain: a.example.com");
        assert_eq!(ctx.sessions.len(), 2);
        assert_eq!(ctx.records.len(), 2);

        assert!(matches!(
            WorkbenchContext::for_domain(&store, "c.example.com"),
            Err(Error::NotFound(_))
        ));
    }
}
