//! Remote-debugging surface used by the recorder, and its CDP implementation.

use async_trait::async_trait;
use serde_json::json;
use skillsmith_core::TabId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::cdp::CdpClient;

/// Tab-level debugger operations. Errors are plain messages, as reported by
/// the browser.
#[async_trait]
pub trait Debugger: Send + Sync {
    async fn attach(&self, tab: &TabId, protocol_version: &str) -> Result<(), String>;

    async fn detach(&self, tab: &TabId) -> Result<(), String>;

    async fn enable_network(&self, tab: &TabId) -> Result<(), String>;

    async fn disable_network(&self, tab: &TabId) -> Result<(), String>;

    async fn get_response_body(&self, tab: &TabId, request_id: &str) -> Result<String, String>;

    /// Current URL of the tab, if the browser knows it.
    async fn tab_url(&self, tab: &TabId) -> Result<Option<String>, String>;
}

/// Maps flattened CDP session ids back to the tabs they belong to.
pub trait SessionLookup: Send + Sync {
    /// Tab owning a CDP session id.
    fn tab_for_session(&self, session_id: &str) -> Option<TabId>;

    /// Drop the mapping for a session the browser has already detached.
    /// Returns `None` when the session was detached by us.
    fn forget_session(&self, session_id: &str) -> Option<TabId>;
}

/// `required` is satisfied when `actual` has the same major version and an
/// equal or newer minor version.
pub fn protocol_supported(actual: &str, required: &str) -> bool {
    fn split(v: &str) -> Option<(u32, u32)> {
        let (major, minor) = v.trim().split_once('.')?;
        Some((major.parse().ok()?, minor.parse().ok()?))
    }
    match (split(actual), split(required)) {
        (Some((a_major, a_minor)), Some((r_major, r_minor))) => {
            a_major == r_major && a_minor >= r_minor
        }
        _ => false,
    }
}

/// Tab to flattened-session bookkeeping of a [`CdpDebugger`].
#[derive(Default)]
struct TargetSessions {
    by_tab: Mutex<HashMap<TabId, String>>,
}

impl TargetSessions {
    fn lock(&self) -> MutexGuard<'_, HashMap<TabId, String>> {
        self.by_tab.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn contains(&self, tab: &TabId) -> bool {
        self.lock().contains_key(tab)
    }

    fn insert(&self, tab: TabId, session_id: String) {
        self.lock().insert(tab, session_id);
    }

    fn remove(&self, tab: &TabId) -> Option<String> {
        self.lock().remove(tab)
    }

    fn session_for(&self, tab: &TabId) -> Result<String, String> {
        self.lock()
            .get(tab)
            .cloned()
            .ok_or_else(|| format!("Tab {} is not attached", tab))
    }
}

impl SessionLookup for TargetSessions {
    fn tab_for_session(&self, session_id: &str) -> Option<TabId> {
        self.lock()
            .iter()
            .find(|(_, sid)| sid.as_str() == session_id)
            .map(|(tab, _)| tab.clone())
    }

    fn forget_session(&self, session_id: &str) -> Option<TabId> {
        let mut sessions = self.lock();
        let tab = sessions
            .iter()
            .find(|(_, sid)| sid.as_str() == session_id)
            .map(|(tab, _)| tab.clone())?;
        sessions.remove(&tab);
        Some(tab)
    }
}

/// [`Debugger`] backed by one browser-level CDP connection. Each attached tab
/// gets its own flattened target session.
pub struct CdpDebugger {
    client: Arc<CdpClient>,
    sessions: TargetSessions,
}

impl CdpDebugger {
    pub fn new(client: Arc<CdpClient>) -> Self {
        Self {
            client,
            sessions: TargetSessions::default(),
        }
    }

    pub fn client(&self) -> &Arc<CdpClient> {
        &self.client
    }
}

impl SessionLookup for CdpDebugger {
    fn tab_for_session(&self, session_id: &str) -> Option<TabId> {
        self.sessions.tab_for_session(session_id)
    }

    fn forget_session(&self, session_id: &str) -> Option<TabId> {
        self.sessions.forget_session(session_id)
    }
}

#[async_trait]
impl Debugger for CdpDebugger {
    async fn attach(&self, tab: &TabId, protocol_version: &str) -> Result<(), String> {
        if self.sessions.contains(tab) {
            return Err(format!("Another debugger is already attached to tab {}", tab));
        }

        let version = self.client.send_command("Browser.getVersion", json!({})).await?;
        let actual = version
            .get("protocolVersion")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if !protocol_supported(actual, protocol_version) {
            return Err(format!(
                "Requested protocol version {} is not supported (browser speaks {})",
                protocol_version, actual
            ));
        }

        let result = self
            .client
            .send_command(
                "Target.attachToTarget",
                json!({ "targetId": tab.as_str(), "flatten": true }),
            )
            .await?;
        let session_id = result
            .get("sessionId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "No sessionId in Target.attachToTarget response".to_string())?
            .to_string();

        debug!(tab = %tab, session_id = %session_id, "Attached to target");
        self.sessions.insert(tab.clone(), session_id);
        Ok(())
    }

    async fn detach(&self, tab: &TabId) -> Result<(), String> {
        let removed = self.sessions.remove(tab);
        let Some(session_id) = removed else {
            debug!(tab = %tab, "Detach requested for a tab that is not attached");
            return Ok(());
        };
        self.client
            .send_command("Target.detachFromTarget", json!({ "sessionId": session_id }))
            .await?;
        Ok(())
    }

    async fn enable_network(&self, tab: &TabId) -> Result<(), String> {
        let session_id = self.sessions.session_for(tab)?;
        self.client
            .send_session_command(&session_id, "Network.enable", json!({}))
            .await?;
        Ok(())
    }

    async fn disable_network(&self, tab: &TabId) -> Result<(), String> {
        let Ok(session_id) = self.sessions.session_for(tab) else {
            debug!(tab = %tab, "Network already off for detached tab");
            return Ok(());
        };
        self.client
            .send_session_command(&session_id, "Network.disable", json!({}))
            .await?;
        Ok(())
    }

    async fn get_response_body(&self, tab: &TabId, request_id: &str) -> Result<String, String> {
        let session_id = self.sessions.session_for(tab)?;
        let result = self
            .client
            .send_session_command(
                &session_id,
                "Network.getResponseBody",
                json!({ "requestId": request_id }),
            )
            .await?;
        result
            .get("body")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| format!("No body for request {}", request_id))
    }

    async fn tab_url(&self, tab: &TabId) -> Result<Option<String>, String> {
        let result = self
            .client
            .send_command("Target.getTargetInfo", json!({ "targetId": tab.as_str() }))
            .await?;
        Ok(result
            .get("targetInfo")
            .and_then(|info| info.get("url"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_supported() {
        assert!(protocol_supported("1.3", "1.3"));
        assert!(protocol_supported("1.4", "1.3"));
        assert!(!protocol_supported("1.2", "1.3"));
        assert!(!protocol_supported("2.0", "1.3"));
        assert!(!protocol_supported("", "1.3"));
    }

    #[test]
    fn test_target_sessions_lookup() {
        let sessions = TargetSessions::default();
        sessions.insert(TabId::from("A1"), "S-1".to_string());
        sessions.insert(TabId::from("B2"), "S-2".to_string());

        assert_eq!(sessions.tab_for_session("S-2"), Some(TabId::from("B2")));
        assert_eq!(sessions.tab_for_session("S-9"), None);
        assert_eq!(sessions.session_for(&TabId::from("A1")).unwrap(), "S-1");
        assert!(sessions.session_for(&TabId::from("C3")).is_err());
    }

    #[test]
    fn test_forget_session_only_reports_live_sessions() {
        let sessions = TargetSessions::default();
        sessions.insert(TabId::from("A1"), "S-1".to_string());
        sessions.insert(TabId::from("B2"), "S-2".to_string());

        // Browser-side detach: mapping still present.
        assert_eq!(sessions.forget_session("S-1"), Some(TabId::from("A1")));
        assert!(!sessions.contains(&TabId::from("A1")));
        assert_eq!(sessions.forget_session("S-1"), None);

        // Our own detach removes the mapping before the event arrives.
        assert_eq!(sessions.remove(&TabId::from("B2")), Some("S-2".to_string()));
        assert_eq!(sessions.forget_session("S-2"), None);
        assert_eq!(sessions.tab_for_session("S-2"), None);
    }
}
