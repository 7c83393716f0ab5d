//! Attach/detach of the remote debugger and network instrumentation.

use skillsmith_core::{Error, Result, TabId};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::debugger::Debugger;

/// Wraps a [`Debugger`] with the recorder's failure policy: attach is all or
/// nothing, detach is best-effort.
pub struct AttachmentManager {
    debugger: Arc<dyn Debugger>,
    protocol_version: String,
}

impl AttachmentManager {
    pub fn new(debugger: Arc<dyn Debugger>, protocol_version: impl Into<String>) -> Self {
        Self {
            debugger,
            protocol_version: protocol_version.into(),
        }
    }

    /// Attach and enable network events. On failure nothing stays attached.
    pub async fn attach(&self, tab: &TabId) -> Result<()> {
        self.debugger
            .attach(tab, &self.protocol_version)
            .await
            .map_err(|e| Error::Attachment(format!("attach to tab {} failed: {}", tab, e)))?;

        if let Err(e) = self.debugger.enable_network(tab).await {
            if let Err(detach_err) = self.debugger.detach(tab).await {
                warn!(tab = %tab, error = %detach_err, "Detach after failed Network.enable failed");
            }
            return Err(Error::Attachment(format!(
                "enabling network events on tab {} failed: {}",
                tab, e
            )));
        }
        Ok(())
    }

    /// Disable network events and detach. Errors are logged only; the tab may
    /// already be gone.
    pub async fn detach(&self, tab: &TabId) {
        if let Err(e) = self.debugger.disable_network(tab).await {
            warn!(tab = %tab, error = %e, "Network.disable failed");
        }
        if let Err(e) = self.debugger.detach(tab).await {
            warn!(tab = %tab, error = %e, "Detach failed");
        }
    }

    pub async fn response_body(&self, tab: &TabId, request_id: &str) -> Option<String> {
        match self.debugger.get_response_body(tab, request_id).await {
            Ok(body) => Some(body),
            Err(e) => {
                debug!(tab = %tab, request_id = %request_id, error = %e, "Response body unavailable");
                None
            }
        }
    }

    pub async fn tab_url(&self, tab: &TabId) -> Option<String> {
        match self.debugger.tab_url(tab).await {
            Ok(url) => url,
            Err(e) => {
                debug!(tab = %tab, error = %e, "Could not read tab URL");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeDebugger;

    #[tokio::test]
    async fn test_attach_failure_maps_to_attachment_error() {
        let fake = Arc::new(FakeDebugger::new());
        fake.fail_attach("Another debugger is already attached");
        let manager = AttachmentManager::new(fake.clone(), "1.3");

        let err = manager.attach(&TabId::from("T1")).await.unwrap_err();
        assert!(matches!(err, Error::Attachment(_)));
        assert!(fake.attached_tabs().is_empty());
    }

    #[tokio::test]
    async fn test_enable_failure_rolls_back_attach() {
        let fake = Arc::new(FakeDebugger::new());
        fake.fail_enable("Network domain unavailable");
        let manager = AttachmentManager::new(fake.clone(), "1.3");

        let err = manager.attach(&TabId::from("T1")).await.unwrap_err();
        assert!(matches!(err, Error::Attachment(_)));
        assert!(fake.attached_tabs().is_empty());
    }

    #[tokio::test]
    async fn test_detach_swallows_errors() {
        let fake = Arc::new(FakeDebugger::new());
        let manager = AttachmentManager::new(fake.clone(), "1.3");
        fake.fail_detach("No tab with given id");
        manager.detach(&TabId::from("gone")).await;
    }

    #[tokio::test]
    async fn test_response_body_failure_is_none() {
        let fake = Arc::new(FakeDebugger::new());
        let manager = AttachmentManager::new(fake.clone(), "1.3");
        let tab = TabId::from("T1");
        fake.set_body("r1", "payload");

        assert_eq!(manager.response_body(&tab, "r1").await.as_deref(), Some("payload"));
        assert_eq!(manager.response_body(&tab, "r2").await, None);
    }
}
