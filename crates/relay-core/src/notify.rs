use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::decisions::{Decision, UserResponse};
use crate::events::Event;
use crate::sessions::Session;

/// State change pushed to observers. Serialized with a `type` tag.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    SessionStart { session: Session },
    SessionEnd {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// A pre-action event is waiting for a decision.
    PermissionRequest { event: Event },
    Event { event: Event },
    PermissionDecided {
        #[serde(rename = "eventId")]
        event_id: u64,
        decision: Decision,
    },
    ResponseSent { data: UserResponse },
    Clear,
}

impl Notification {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionStart { .. } => "session_start",
            Self::SessionEnd { .. } => "session_end",
            Self::PermissionRequest { .. } => "permission_request",
            Self::Event { .. } => "event",
            Self::PermissionDecided { .. } => "permission_decided",
            Self::ResponseSent { .. } => "response_sent",
            Self::Clear => "clear",
        }
    }
}

/// What a new observer sees before live notifications.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub messages: Vec<Event>,
    pub sessions: Vec<Session>,
    pub pending_permissions: Vec<u64>,
}

/// Point-in-time counts for the stats endpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_messages: usize,
    pub active_sessions: usize,
    pub pending_permissions: usize,
    pub event_counts: BTreeMap<String, usize>,
    pub connected_clients: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_tags() {
        let clear = serde_json::to_value(Notification::Clear).unwrap();
        assert_eq!(clear, json!({"type": "clear"}));

        let decided = serde_json::to_value(Notification::PermissionDecided {
            event_id: 4,
            decision: Decision::Deny,
        })
        .unwrap();
        assert_eq!(
            decided,
            json!({"type": "permission_decided", "eventId": 4, "decision": "deny"})
        );

        let ended = serde_json::to_value(Notification::SessionEnd {
            session_id: "S1".into(),
        })
        .unwrap();
        assert_eq!(ended["type"], "session_end");
        assert_eq!(ended["sessionId"], "S1");
    }

    #[test]
    fn snapshot_and_stats_are_camel_case() {
        let snapshot = serde_json::to_value(Snapshot {
            messages: Vec::new(),
            sessions: Vec::new(),
            pending_permissions: vec![2],
        })
        .unwrap();
        assert_eq!(snapshot["pendingPermissions"], json!([2]));

        let stats = serde_json::to_value(Stats {
            total_messages: 3,
            connected_clients: 1,
            ..Stats::default()
        })
        .unwrap();
        assert_eq!(stats["totalMessages"], 3);
        assert_eq!(stats["activeSessions"], 0);
        assert_eq!(stats["pendingPermissions"], 0);
        assert!(stats["eventCounts"].is_object());
        assert_eq!(stats["connectedClients"], 1);
    }

    #[test]
    fn event_type_matches_tag() {
        let all = [
            Notification::Clear,
            Notification::SessionEnd { session_id: "s".into() },
            Notification::PermissionDecided { event_id: 1, decision: Decision::Allow },
        ];
        for n in all {
            let json = serde_json::to_value(&n).unwrap();
            assert_eq!(json["type"], n.event_type());
        }
    }
}
