//! In-memory map of tabs that are currently recording.

use skillsmith_core::{StatusSnapshot, TabId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::correlator::{PendingRecord, PendingState};

/// State of one active recording, owned by the registry.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub session_id: String,
    pub tab_id: TabId,
    pub description: String,
    /// Hostname filter; empty admits every request.
    pub domain: String,
    pub start_time: i64,
    /// In-flight requests keyed by the transport request id.
    pub pending: HashMap<String, PendingRecord>,
    pub record_count: i64,
}

impl RecordingSession {
    pub fn new(
        session_id: String,
        tab_id: TabId,
        description: String,
        domain: String,
        start_time: i64,
    ) -> Self {
        Self {
            session_id,
            tab_id,
            description,
            domain,
            start_time,
            pending: HashMap::new(),
            record_count: 0,
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            recording: true,
            session_id: Some(self.session_id.clone()),
            description: Some(self.description.clone()),
            count: Some(self.record_count),
            start_time: Some(self.start_time),
        }
    }
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<TabId, RecordingSession>,
    /// Tabs whose start is in progress (attach not finished yet).
    starting: HashSet<TabId>,
}

/// Result of trying to claim a tab for a new recording.
pub enum Reservation {
    Reserved(StartGuard),
    Active { session_id: String },
    Starting,
}

/// Holds a tab's start slot; released on drop.
pub struct StartGuard {
    state: Arc<Mutex<RegistryState>>,
    tab_id: TabId,
}

impl Drop for StartGuard {
    fn drop(&mut self) {
        lock(&self.state).starting.remove(&self.tab_id);
    }
}

fn lock(state: &Mutex<RegistryState>) -> MutexGuard<'_, RegistryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Thread-safe tab -> session map. At most one session per tab.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&self, tab_id: &TabId) -> Reservation {
        let mut state = lock(&self.state);
        if let Some(session) = state.sessions.get(tab_id) {
            return Reservation::Active {
                session_id: session.session_id.clone(),
            };
        }
        if !state.starting.insert(tab_id.clone()) {
            return Reservation::Starting;
        }
        Reservation::Reserved(StartGuard {
            state: self.state.clone(),
            tab_id: tab_id.clone(),
        })
    }

    /// Register a session for the reserved tab.
    pub fn insert(&self, guard: StartGuard, session: RecordingSession) {
        let mut state = lock(&self.state);
        state.starting.remove(&guard.tab_id);
        state.sessions.insert(guard.tab_id.clone(), session);
        drop(state);
        drop(guard);
    }

    pub fn remove(&self, tab_id: &TabId) -> Option<RecordingSession> {
        lock(&self.state).sessions.remove(tab_id)
    }

    pub fn status(&self, tab_id: &TabId) -> StatusSnapshot {
        lock(&self.state)
            .sessions
            .get(tab_id)
            .map(|s| s.status())
            .unwrap_or_else(StatusSnapshot::idle)
    }

    pub fn active_tabs(&self) -> Vec<TabId> {
        let mut tabs: Vec<TabId> = lock(&self.state).sessions.keys().cloned().collect();
        tabs.sort();
        tabs
    }

    pub fn is_recording(&self, tab_id: &TabId) -> bool {
        lock(&self.state).sessions.contains_key(tab_id)
    }

    /// Run `f` against the tab's session, if any.
    pub fn with_session<R>(
        &self,
        tab_id: &TabId,
        f: impl FnOnce(&mut RecordingSession) -> R,
    ) -> Option<R> {
        lock(&self.state).sessions.get_mut(tab_id).map(f)
    }

    /// Drop a claimed pending entry and bump the in-memory count. Returns the
    /// new count, or `None` when the session was stopped or replaced meanwhile.
    pub fn complete(&self, tab_id: &TabId, session_id: &str, request_id: &str) -> Option<i64> {
        self.with_session(tab_id, |session| {
            if session.session_id != session_id {
                return None;
            }
            release_claim(session, request_id);
            session.record_count += 1;
            Some(session.record_count)
        })
        .flatten()
    }

    /// Drop a claimed pending entry without counting it.
    pub fn abandon(&self, tab_id: &TabId, session_id: &str, request_id: &str) {
        self.with_session(tab_id, |session| {
            if session.session_id == session_id {
                release_claim(session, request_id);
            }
        });
    }

    pub fn pending_count(&self, tab_id: &TabId) -> usize {
        self.with_session(tab_id, |s| s.pending.len()).unwrap_or(0)
    }
}

fn release_claim(session: &mut RecordingSession, request_id: &str) {
    let claimed = session
        .pending
        .get(request_id)
        .map(|p| p.state == PendingState::Finalizing)
        .unwrap_or(false);
    if claimed {
        session.pending.remove(request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str, tab: &str) -> RecordingSession {
        RecordingSession::new(
            id.to_string(),
            TabId::from(tab),
            "d".to_string(),
            String::new(),
            5,
        )
    }

    #[test]
    fn test_reserve_blocks_second_start() {
        let registry = SessionRegistry::new();
        let tab = TabId::from("T1");

        let Reservation::Reserved(guard) = registry.reserve(&tab) else {
            panic!("expected reservation");
        };
        assert!(matches!(registry.reserve(&tab), Reservation::Starting));

        registry.insert(guard, session("s1", "T1"));
        match registry.reserve(&tab) {
            Reservation::Active { session_id } => assert_eq!(session_id, "s1"),
            _ => panic!("expected active session"),
        }
    }

    #[test]
    fn test_dropped_guard_releases_tab() {
        let registry = SessionRegistry::new();
        let tab = TabId::from("T1");
        {
            let _guard = registry.reserve(&tab);
        }
        assert!(matches!(registry.reserve(&tab), Reservation::Reserved(_)));
    }

    #[test]
    fn test_status_snapshot() {
        let registry = SessionRegistry::new();
        let tab = TabId::from("T1");
        assert_eq!(registry.status(&tab), StatusSnapshot::idle());

        if let Reservation::Reserved(guard) = registry.reserve(&tab) {
            registry.insert(guard, session("s1", "T1"));
        }
        let status = registry.status(&tab);
        assert!(status.recording);
        assert_eq!(status.session_id.as_deref(), Some("s1"));
        assert_eq!(status.count, Some(0));
        assert_eq!(status.start_time, Some(5));
    }

    #[test]
    fn test_complete_ignores_replaced_session() {
        let registry = SessionRegistry::new();
        let tab = TabId::from("T1");
        if let Reservation::Reserved(guard) = registry.reserve(&tab) {
            registry.insert(guard, session("s2", "T1"));
        }
        assert_eq!(registry.complete(&tab, "s1", "r1"), None);
        assert_eq!(registry.complete(&tab, "s2", "r1"), Some(1));
        assert_eq!(registry.status(&tab).count, Some(1));
    }
}
