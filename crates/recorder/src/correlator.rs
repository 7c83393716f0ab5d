//! Turns per-tab network events into pending and finalized records.
//!
//! Each in-flight request goes `Started -> Responded -> Finalizing` and is
//! removed once its record is persisted. Only request-initiated events are
//! filtered by domain; everything after that is keyed on the request id and
//! silently ignored when the id is unknown.

use serde_json::Value;
use skillsmith_core::{Headers, TabId};
use tracing::debug;

use crate::registry::RecordingSession;

/// A network lifecycle event for one attached tab.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    RequestWillBeSent {
        request_id: String,
        url: String,
        method: String,
        headers: Headers,
        post_data: Option<String>,
        /// Seconds since the epoch.
        wall_time: Option<f64>,
    },
    ResponseReceived {
        request_id: String,
        status: Option<u16>,
        headers: Headers,
    },
    LoadingFinished {
        request_id: String,
    },
    LoadingFailed {
        request_id: String,
    },
}

impl NetworkEvent {
    /// Decode a `Network.*` CDP event. Returns `None` for other methods or
    /// events without a request id.
    pub fn from_cdp(method: &str, params: &Value) -> Option<Self> {
        let request_id = params.get("requestId")?.as_str()?.to_string();
        match method {
            "Network.requestWillBeSent" => {
                let request = params.get("request")?;
                Some(NetworkEvent::RequestWillBeSent {
                    request_id,
                    url: request.get("url")?.as_str()?.to_string(),
                    method: request
                        .get("method")
                        .and_then(|v| v.as_str())
                        .unwrap_or("GET")
                        .to_string(),
                    headers: headers_from(request.get("headers")),
                    post_data: request
                        .get("postData")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string()),
                    wall_time: params.get("wallTime").and_then(|v| v.as_f64()),
                })
            }
            "Network.responseReceived" => {
                let response = params.get("response");
                Some(NetworkEvent::ResponseReceived {
                    request_id,
                    status: response
                        .and_then(|r| r.get("status"))
                        .and_then(|v| v.as_f64())
                        .filter(|s| *s >= 0.0 && *s <= u16::MAX as f64)
                        .map(|s| s as u16),
                    headers: headers_from(response.and_then(|r| r.get("headers"))),
                })
            }
            "Network.loadingFinished" => Some(NetworkEvent::LoadingFinished { request_id }),
            "Network.loadingFailed" => Some(NetworkEvent::LoadingFailed { request_id }),
            _ => None,
        }
    }

    pub fn request_id(&self) -> &str {
        match self {
            NetworkEvent::RequestWillBeSent { request_id, .. }
            | NetworkEvent::ResponseReceived { request_id, .. }
            | NetworkEvent::LoadingFinished { request_id }
            | NetworkEvent::LoadingFailed { request_id } => request_id,
        }
    }
}

fn headers_from(value: Option<&Value>) -> Headers {
    let mut headers = Headers::new();
    if let Some(Value::Object(map)) = value {
        for (name, v) in map {
            let text = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            headers.insert(name.clone(), text);
        }
    }
    headers
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    Started,
    Responded,
    /// Body fetch and persistence are in flight.
    Finalizing,
}

/// A partially-built record keyed by the transport request id.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub url: String,
    pub method: String,
    pub request_headers: Headers,
    pub request_body: Option<String>,
    pub response_status: Option<u16>,
    pub response_headers: Option<Headers>,
    pub timestamp: Option<i64>,
    pub state: PendingState,
}

/// A pending record claimed for persistence.
#[derive(Debug, Clone)]
pub struct Finalization {
    pub tab_id: TabId,
    pub session_id: String,
    pub request_id: String,
    pub record: PendingRecord,
}

/// Hostname of `url`; empty for URLs without a host, `None` when malformed.
pub fn hostname_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    Some(parsed.host_str().unwrap_or("").to_string())
}

/// Plain suffix match: `example.com` admits `api.example.com` and also
/// `notexample.com`. An empty domain admits everything.
pub fn matches_domain(hostname: &str, domain: &str) -> bool {
    domain.is_empty() || hostname.ends_with(domain)
}

pub fn wall_time_to_ms(wall_time: f64) -> Option<i64> {
    if wall_time.is_finite() && wall_time > 0.0 {
        Some((wall_time * 1000.0).round() as i64)
    } else {
        None
    }
}

/// Apply one event to a session's pending set. Returns a claimed
/// [`Finalization`] when the event completes a request.
pub fn apply(session: &mut RecordingSession, event: NetworkEvent) -> Option<Finalization> {
    match event {
        NetworkEvent::RequestWillBeSent {
            request_id,
            url,
            method,
            headers,
            post_data,
            wall_time,
        } => {
            let Some(hostname) = hostname_of(&url) else {
                debug!(request_id = %request_id, url = %url, "Dropping request with malformed URL");
                return None;
            };
            if !matches_domain(&hostname, &session.domain) {
                debug!(request_id = %request_id, host = %hostname, "Dropping off-domain request");
                return None;
            }
            session.pending.insert(
                request_id,
                PendingRecord {
                    url,
                    method,
                    request_headers: headers,
                    request_body: post_data,
                    response_status: None,
                    response_headers: None,
                    timestamp: wall_time.and_then(wall_time_to_ms),
                    state: PendingState::Started,
                },
            );
            None
        }
        NetworkEvent::ResponseReceived {
            request_id,
            status,
            headers,
        } => {
            if let Some(pending) = session.pending.get_mut(&request_id) {
                if pending.state != PendingState::Finalizing {
                    pending.response_status = status;
                    pending.response_headers = Some(headers);
                    pending.state = PendingState::Responded;
                }
            }
            None
        }
        NetworkEvent::LoadingFinished { request_id } => {
            let pending = session.pending.get_mut(&request_id)?;
            if pending.state == PendingState::Finalizing {
                return None;
            }
            pending.state = PendingState::Finalizing;
            Some(Finalization {
                tab_id: session.tab_id.clone(),
                session_id: session.session_id.clone(),
                record: pending.clone(),
                request_id,
            })
        }
        NetworkEvent::LoadingFailed { request_id } => {
            let abandon = session
                .pending
                .get(&request_id)
                .map(|p| p.state != PendingState::Finalizing)
                .unwrap_or(false);
            if abandon {
                session.pending.remove(&request_id);
                debug!(request_id = %request_id, "Request failed, pending record abandoned");
            }
            None
        }
    }
}
