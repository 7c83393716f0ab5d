//! In-memory [`Debugger`] for tests.

use async_trait::async_trait;
use skillsmith_core::TabId;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::debugger::{Debugger, SessionLookup};

#[derive(Default)]
struct FakeState {
    attached: HashSet<TabId>,
    network: HashSet<TabId>,
    bodies: HashMap<String, String>,
    urls: HashMap<TabId, String>,
    attach_error: Option<String>,
    enable_error: Option<String>,
    detach_error: Option<String>,
    detach_calls: usize,
    calls: Vec<&'static str>,
}

#[derive(Default)]
pub struct FakeDebugger {
    state: Mutex<FakeState>,
}

impl FakeDebugger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_attach(&self, msg: &str) {
        self.state.lock().unwrap().attach_error = Some(msg.to_string());
    }

    pub fn fail_enable(&self, msg: &str) {
        self.state.lock().unwrap().enable_error = Some(msg.to_string());
    }

    pub fn fail_detach(&self, msg: &str) {
        self.state.lock().unwrap().detach_error = Some(msg.to_string());
    }

    pub fn set_body(&self, request_id: &str, body: &str) {
        self.state
            .lock()
            .unwrap()
            .bodies
            .insert(request_id.to_string(), body.to_string());
    }

    pub fn set_url(&self, tab: &TabId, url: &str) {
        self.state.lock().unwrap().urls.insert(tab.clone(), url.to_string());
    }

    pub fn attached_tabs(&self) -> Vec<TabId> {
        self.state.lock().unwrap().attached.iter().cloned().collect()
    }

    pub fn network_enabled(&self, tab: &TabId) -> bool {
        self.state.lock().unwrap().network.contains(tab)
    }

    pub fn detach_calls(&self) -> usize {
        self.state.lock().unwrap().detach_calls
    }

    /// Debugger operations in the order they were called.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    /// CDP session id the fake hands out for a tab.
    pub fn session_id(tab: &TabId) -> String {
        format!("session-{}", tab)
    }
}

impl SessionLookup for FakeDebugger {
    fn tab_for_session(&self, session_id: &str) -> Option<TabId> {
        let tab = TabId::from(session_id.strip_prefix("session-")?);
        self.state.lock().unwrap().attached.contains(&tab).then_some(tab)
    }

    fn forget_session(&self, session_id: &str) -> Option<TabId> {
        let tab = TabId::from(session_id.strip_prefix("session-")?);
        let mut state = self.state.lock().unwrap();
        state.network.remove(&tab);
        state.attached.remove(&tab).then_some(tab)
    }
}

#[async_trait]
impl Debugger for FakeDebugger {
    async fn attach(&self, tab: &TabId, _protocol_version: &str) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("attach");
        if let Some(err) = state.attach_error.clone() {
            return Err(err);
        }
        if !state.attached.insert(tab.clone()) {
            return Err("Another debugger is already attached".to_string());
        }
        Ok(())
    }

    async fn detach(&self, tab: &TabId) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        state.detach_calls += 1;
        state.calls.push("detach");
        state.attached.remove(tab);
        match state.detach_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn enable_network(&self, tab: &TabId) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("enable_network");
        if let Some(err) = state.enable_error.clone() {
            return Err(err);
        }
        state.network.insert(tab.clone());
        Ok(())
    }

    async fn disable_network(&self, tab: &TabId) -> Result<(), String> {
        self.state.lock().unwrap().network.remove(tab);
        Ok(())
    }

    async fn get_response_body(&self, _tab: &TabId, request_id: &str) -> Result<String, String> {
        self.state
            .lock()
            .unwrap()
            .bodies
            .get(request_id)
            .cloned()
            .ok_or_else(|| "No resource with given identifier found".to_string())
    }

    async fn tab_url(&self, tab: &TabId) -> Result<Option<String>, String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("tab_url");
        Ok(state.urls.get(tab).cloned())
    }
}
