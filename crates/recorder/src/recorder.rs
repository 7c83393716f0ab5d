//! Recording service: session lifecycle, event correlation and persistence.

use skillsmith_core::types::now_ms;
use skillsmith_core::{
    Ack, ControlMessage, ControlResponse, Error, Notification, PersistedRecord, PersistedSession,
    Result, StatusSnapshot, TabId,
};
use skillsmith_storage::Store;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::attach::AttachmentManager;
use crate::correlator::{self, hostname_of, Finalization, NetworkEvent};
use crate::debugger::Debugger;
use crate::registry::{RecordingSession, Reservation, SessionRegistry};

const NOTIFICATION_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { session_id: String },
    /// The tab already records (or is starting); nothing was changed.
    AlreadyRecording { session_id: Option<String> },
}

/// Process-wide recorder shared by the control bus and the event pump.
pub struct Recorder {
    attachments: AttachmentManager,
    store: Arc<dyn Store>,
    registry: SessionRegistry,
    notifications: broadcast::Sender<Notification>,
}

impl Recorder {
    pub fn new(
        debugger: Arc<dyn Debugger>,
        store: Arc<dyn Store>,
        protocol_version: impl Into<String>,
    ) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            attachments: AttachmentManager::new(debugger, protocol_version),
            store,
            registry: SessionRegistry::new(),
            notifications,
        }
    }

    /// Receive `RECORD_ADDED` notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Begin recording a tab. Attach happens before anything is persisted or
    /// registered, so a failed attach leaves no trace.
    pub async fn start(&self, tab: &TabId, description: &str) -> Result<StartOutcome> {
        if tab.as_str().trim().is_empty() {
            return Err(Error::Validation("tab id is empty".to_string()));
        }
        let guard = match self.registry.reserve(tab) {
            Reservation::Reserved(guard) => guard,
            Reservation::Active { session_id } => {
                warn!(tab = %tab, session_id = %session_id, "Tab is already recording");
                return Ok(StartOutcome::AlreadyRecording {
                    session_id: Some(session_id),
                });
            }
            Reservation::Starting => {
                warn!(tab = %tab, "Recording is already starting for this tab");
                return Ok(StartOutcome::AlreadyRecording { session_id: None });
            }
        };

        self.attachments.attach(tab).await?;

        let domain = self
            .attachments
            .tab_url(tab)
            .await
            .and_then(|url| hostname_of(&url))
            .unwrap_or_default();

        let session = RecordingSession::new(
            uuid::Uuid::new_v4().to_string(),
            tab.clone(),
            description.to_string(),
            domain,
            now_ms(),
        );
        let persisted = PersistedSession {
            id: session.session_id.clone(),
            description: session.description.clone(),
            start_time: session.start_time,
            end_time: None,
            domain: session.domain.clone(),
            record_count: 0,
        };
        if let Err(e) = self.store.add_session(&persisted) {
            self.attachments.detach(tab).await;
            return Err(e);
        }

        let session_id = session.session_id.clone();
        info!(
            tab = %tab,
            session_id = %session_id,
            domain = %session.domain,
            "Started recording"
        );
        self.registry.insert(guard, session);
        Ok(StartOutcome::Started { session_id })
    }

    /// Stop recording a tab. Returns false when the tab was not recording.
    pub async fn stop(&self, tab: &TabId) -> Result<bool> {
        // Removing first makes a concurrent second stop a no-op.
        let Some(session) = self.registry.remove(tab) else {
            debug!(tab = %tab, "Stop requested for a tab that is not recording");
            return Ok(false);
        };

        self.attachments.detach(tab).await;
        if !self.store.set_end_time(&session.session_id, now_ms())? {
            warn!(session_id = %session.session_id, "Stopped session no longer exists in storage");
        }

        info!(
            tab = %tab,
            session_id = %session.session_id,
            records = session.record_count,
            abandoned = session.pending.len(),
            "Stopped recording"
        );
        Ok(true)
    }

    /// The debugger was detached outside the recorder's own stop flow.
    pub async fn on_external_detach(&self, tab: &TabId) {
        info!(tab = %tab, "Debugger detached externally");
        if let Err(e) = self.stop(tab).await {
            warn!(tab = %tab, error = %e, "Cleanup after external detach failed");
        }
    }

    pub fn status(&self, tab: &TabId) -> StatusSnapshot {
        self.registry.status(tab)
    }

    pub fn active_tabs(&self) -> Vec<TabId> {
        self.registry.active_tabs()
    }

    pub fn is_recording(&self, tab: &TabId) -> bool {
        self.registry.is_recording(tab)
    }

    /// Stop every active recording, e.g. on shutdown.
    pub async fn stop_all(&self) {
        for tab in self.active_tabs() {
            if let Err(e) = self.stop(&tab).await {
                warn!(tab = %tab, error = %e, "Failed to stop recording");
            }
        }
    }

    pub fn pending_count(&self, tab: &TabId) -> usize {
        self.registry.pending_count(tab)
    }

    /// Apply an event synchronously. A returned [`Finalization`] must be
    /// passed to [`Recorder::finalize`].
    pub fn apply_event(&self, tab: &TabId, event: NetworkEvent) -> Option<Finalization> {
        self.registry
            .with_session(tab, |session| correlator::apply(session, event))
            .flatten()
    }

    /// Fetch the body, persist the record, bump both counts and notify.
    pub async fn finalize(&self, fin: Finalization) {
        let Finalization {
            tab_id,
            session_id,
            request_id,
            record,
        } = fin;

        let response_body = self.attachments.response_body(&tab_id, &request_id).await;
        let persisted = PersistedRecord {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.clone(),
            url: record.url,
            method: record.method,
            request_headers: record.request_headers,
            request_body: record.request_body,
            response_status: record.response_status,
            response_headers: record.response_headers,
            response_body,
            timestamp: record.timestamp.unwrap_or_else(now_ms),
        };

        let stored_count = match self.store.add_record_and_increment(&persisted) {
            Ok(Some(count)) => count,
            Ok(None) => {
                debug!(session_id = %session_id, request_id = %request_id, "Session deleted, record dropped");
                self.registry.abandon(&tab_id, &session_id, &request_id);
                return;
            }
            Err(e) => {
                warn!(session_id = %session_id, request_id = %request_id, error = %e, "Failed to persist record");
                self.registry.abandon(&tab_id, &session_id, &request_id);
                return;
            }
        };
        let live_count = self.registry.complete(&tab_id, &session_id, &request_id);

        debug!(session_id = %session_id, url = %persisted.url, "Record captured");
        let count = live_count.unwrap_or(stored_count);
        // No receivers is fine.
        let _ = self
            .notifications
            .send(Notification::RecordAdded { session_id, count });
    }

    /// Apply an event and, if it completes a request, finalize it inline.
    pub async fn handle_event(&self, tab: &TabId, event: NetworkEvent) {
        if let Some(fin) = self.apply_event(tab, event) {
            self.finalize(fin).await;
        }
    }

    /// Serve one control-bus request.
    pub async fn handle_message(&self, msg: ControlMessage) -> ControlResponse {
        match msg {
            ControlMessage::StartRecording {
                tab_id,
                description,
            } => match self.start(&tab_id, &description).await {
                Ok(_) => ControlResponse::Ack(Ack::ok()),
                Err(e) => ControlResponse::Ack(Ack::failed(e.to_string())),
            },
            ControlMessage::StopRecording { tab_id } => match self.stop(&tab_id).await {
                Ok(_) => ControlResponse::Ack(Ack::ok()),
                Err(e) => ControlResponse::Ack(Ack::failed(e.to_string())),
            },
            ControlMessage::GetStatus { tab_id } => ControlResponse::Status(self.status(&tab_id)),
        }
    }
}
