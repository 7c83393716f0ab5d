//! Routes browser events to the recorder.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cdp::CdpEvent;
use crate::correlator::NetworkEvent;
use crate::debugger::{CdpDebugger, SessionLookup};
use crate::recorder::Recorder;

/// Events the pump needs from the browser connection.
pub const SUBSCRIBED_EVENTS: &[&str] = &[
    "Network.requestWillBeSent",
    "Network.responseReceived",
    "Network.loadingFinished",
    "Network.loadingFailed",
    "Target.detachedFromTarget",
];

/// Reads the ordered CDP event stream and drives the [`Recorder`].
///
/// Request and response events are applied inline so per-request order is
/// kept; each finalization runs as its own task so a slow body fetch only
/// delays its own record.
pub struct EventPump<S = CdpDebugger> {
    recorder: Arc<Recorder>,
    sessions: Arc<S>,
}

impl EventPump<CdpDebugger> {
    /// Subscribe to [`SUBSCRIBED_EVENTS`] on the debugger's connection.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<CdpEvent> {
        self.sessions.client().subscribe_events(SUBSCRIBED_EVENTS).await
    }
}

impl<S: SessionLookup + 'static> EventPump<S> {
    pub fn new(recorder: Arc<Recorder>, sessions: Arc<S>) -> Self {
        Self { recorder, sessions }
    }

    /// Run until the event stream ends (browser connection closed).
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<CdpEvent>) {
        while let Some(event) = events.recv().await {
            self.dispatch(event);
        }
        info!("Browser event stream closed");
    }

    /// Returns the spawned follow-up task, if the event started one.
    fn dispatch(&self, event: CdpEvent) -> Option<JoinHandle<()>> {
        if event.method == "Target.detachedFromTarget" {
            let session_id = event.params.get("sessionId").and_then(|v| v.as_str())?;
            // Our own detach already dropped the mapping, so only external
            // detaches reach the recorder.
            let tab = self.sessions.forget_session(session_id)?;
            let recorder = self.recorder.clone();
            return Some(tokio::spawn(async move {
                recorder.on_external_detach(&tab).await;
            }));
        }

        let Some(tab) = event
            .session_id
            .as_deref()
            .and_then(|sid| self.sessions.tab_for_session(sid))
        else {
            debug!(method = %event.method, "Event for an unknown target session");
            return None;
        };
        let network_event = NetworkEvent::from_cdp(&event.method, &event.params)?;

        let fin = self.recorder.apply_event(&tab, network_event)?;
        let recorder = self.recorder.clone();
        Some(tokio::spawn(async move {
            recorder.finalize(fin).await;
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeDebugger;
    use serde_json::{json, Value};
    use skillsmith_core::TabId;
    use skillsmith_storage::{SqliteStore, Store};
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        fake: Arc<FakeDebugger>,
        store: Arc<SqliteStore>,
        recorder: Arc<Recorder>,
        pump: EventPump<FakeDebugger>,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(&dir.path().join("pump.db")).unwrap());
        let fake = Arc::new(FakeDebugger::new());
        let recorder = Arc::new(Recorder::new(fake.clone(), store.clone(), "1.3"));
        let pump = EventPump::new(recorder.clone(), fake.clone());
        Harness {
            _dir: dir,
            fake,
            store,
            recorder,
            pump,
        }
    }

    async fn start(h: &Harness, tab: &TabId) -> String {
        h.fake.set_url(tab, "https://shop.example.com/cart");
        match h.recorder.start(tab, "checkout").await.unwrap() {
            crate::StartOutcome::Started { session_id } => session_id,
            other => panic!("unexpected {:?}", other),
        }
    }

    fn event(method: &str, session_id: Option<String>, params: Value) -> CdpEvent {
        CdpEvent {
            method: method.to_string(),
            session_id,
            params,
        }
    }

    fn detached(session_id: &str) -> CdpEvent {
        event(
            "Target.detachedFromTarget",
            None,
            json!({ "sessionId": session_id, "targetId": "ignored" }),
        )
    }

    #[tokio::test]
    async fn test_network_events_reach_the_tab_session() {
        let h = harness();
        let tab = TabId::from("T1");
        let sid = start(&h, &tab).await;
        let cdp_session = Some(FakeDebugger::session_id(&tab));
        h.fake.set_body("42.1", "{\"items\":[]}");

        let sent = h.pump.dispatch(event(
            "Network.requestWillBeSent",
            cdp_session.clone(),
            json!({
                "requestId": "42.1",
                "wallTime": 1_700_000_000.5,
                "request": {
                    "url": "https://api.shop.example.com/cart",
                    "method": "POST",
                    "headers": { "Content-Type": "application/json" },
                    "postData": "{\"sku\":7}"
                }
            }),
        ));
        assert!(sent.is_none());
        let responded = h.pump.dispatch(event(
            "Network.responseReceived",
            cdp_session.clone(),
            json!({ "requestId": "42.1", "response": { "status": 201, "headers": {} } }),
        ));
        assert!(responded.is_none());
        assert_eq!(h.recorder.pending_count(&tab), 1);

        let finalize = h
            .pump
            .dispatch(event(
                "Network.loadingFinished",
                cdp_session,
                json!({ "requestId": "42.1" }),
            ))
            .expect("loadingFinished spawns a finalization");
        finalize.await.unwrap();

        let records = h.store.records_for_session(&sid).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].method, "POST");
        assert_eq!(records[0].request_body.as_deref(), Some("{\"sku\":7}"));
        assert_eq!(records[0].response_status, Some(201));
        assert_eq!(records[0].response_body.as_deref(), Some("{\"items\":[]}"));
        assert_eq!(records[0].timestamp, 1_700_000_000_500);
        assert_eq!(h.recorder.status(&tab).count, Some(1));
        assert_eq!(h.recorder.pending_count(&tab), 0);
    }

    #[tokio::test]
    async fn test_unknown_session_events_are_dropped() {
        let h = harness();
        let tab = TabId::from("T1");
        start(&h, &tab).await;

        let params = json!({ "requestId": "1", "request": { "url": "https://shop.example.com/" } });
        assert!(h
            .pump
            .dispatch(event("Network.requestWillBeSent", Some("session-other".into()), params.clone()))
            .is_none());
        assert!(h
            .pump
            .dispatch(event("Network.requestWillBeSent", None, params))
            .is_none());
        assert_eq!(h.recorder.pending_count(&tab), 0);
    }

    #[tokio::test]
    async fn test_external_detach_stops_recording() {
        let h = harness();
        let tab = TabId::from("T1");
        let sid = start(&h, &tab).await;

        let cleanup = h
            .pump
            .dispatch(detached(&FakeDebugger::session_id(&tab)))
            .expect("external detach spawns cleanup");
        cleanup.await.unwrap();

        assert!(!h.recorder.is_recording(&tab));
        assert!(h.store.get_session(&sid).unwrap().unwrap().end_time.is_some());

        // A repeated detach event for the same session is ignored.
        assert!(h.pump.dispatch(detached(&FakeDebugger::session_id(&tab))).is_none());
    }

    #[tokio::test]
    async fn test_own_detach_is_not_treated_as_external() {
        let h = harness();
        let tab = TabId::from("T1");
        let other = TabId::from("T2");
        start(&h, &tab).await;
        start(&h, &other).await;

        assert!(h.recorder.stop(&tab).await.unwrap());
        let detaches = h.fake.detach_calls();

        assert!(h.pump.dispatch(detached(&FakeDebugger::session_id(&tab))).is_none());
        assert_eq!(h.fake.detach_calls(), detaches);
        assert!(h.recorder.is_recording(&other));
    }

    #[tokio::test]
    async fn test_detach_event_without_session_id_is_ignored() {
        let h = harness();
        let tab = TabId::from("T1");
        start(&h, &tab).await;

        assert!(h
            .pump
            .dispatch(event("Target.detachedFromTarget", None, json!({})))
            .is_none());
        assert!(h.recorder.is_recording(&tab));
    }
}
