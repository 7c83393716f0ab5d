use serde::{Deserialize, Serialize};

use crate::types::TabId;

/// Requests accepted on the control bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    StartRecording {
        #[serde(rename = "tabId")]
        tab_id: TabId,
        #[serde(default)]
        description: String,
    },
    StopRecording {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
    GetStatus {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
}

/// Outcome of a start or stop request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Read-only snapshot of a tab's recording state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub recording: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
}

impl StatusSnapshot {
    pub fn idle() -> Self {
        Self {
            recording: false,
            session_id: None,
            description: None,
            count: None,
            start_time: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlResponse {
    Ack(Ack),
    Status(StatusSnapshot),
}

/// Broadcast to observers after state changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    RecordAdded {
        #[serde(rename = "sessionId")]
        session_id: String,
        count: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_message_wire_format() {
        let msg: ControlMessage =
            serde_json::from_str(r#"{"type":"START_RECORDING","tabId":"T1","description":"login"}"#)
                .unwrap();
        assert_eq!(
            msg,
            ControlMessage::StartRecording {
                tab_id: TabId::from("T1"),
                description: "login".to_string(),
            }
        );

        let msg: ControlMessage = serde_json::from_str(r#"{"type":"GET_STATUS","tabId":"T1"}"#).unwrap();
        assert!(matches!(msg, ControlMessage::GetStatus { .. }));
    }

    #[test]
    fn test_responses_serialize_flat() {
        let ack = serde_json::to_value(ControlResponse::Ack(Ack::failed("boom"))).unwrap();
        assert_eq!(ack, serde_json::json!({"success": false, "error": "boom"}));

        let idle = serde_json::to_value(ControlResponse::Status(StatusSnapshot::idle())).unwrap();
        assert_eq!(idle, serde_json::json!({"recording": false}));

        let note = serde_json::to_value(Notification::RecordAdded {
            session_id: "s".to_string(),
            count: 3,
        })
        .unwrap();
        assert_eq!(note, serde_json::json!({"type": "RECORD_ADDED", "sessionId": "s", "count": 3}));
    }
}
