use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reason attached to a decision that nobody submitted in time.
pub const TIMEOUT_REASON: &str = "timeout";

/// Outcome of a permission request.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            other => Err(format!("unknown decision: {other}")),
        }
    }
}

/// A decision plus the reason surfaced to the agent.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecisionOutcome {
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DecisionOutcome {
    pub fn new(decision: Decision, reason: Option<String>) -> Self {
        Self { decision, reason }
    }

    /// Delivered when nobody decides before the deadline. Always `allow`:
    /// an unanswered request must never block the agent indefinitely.
    pub fn fail_open() -> Self {
        Self {
            decision: Decision::Allow,
            reason: Some(TIMEOUT_REASON.to_string()),
        }
    }
}

/// What the agent should do with a response from the dashboard.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseAction {
    /// Print the response text as additional context.
    InjectContext,
    /// Block the prompt, using the response text as the reason.
    Block,
    #[default]
    #[serde(other)]
    Continue,
}

impl ResponseAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InjectContext => "inject_context",
            Self::Block => "block",
            Self::Continue => "continue",
        }
    }
}

/// A response submitted by an observer for a session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserResponse {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default)]
    pub action: ResponseAction,
}

/// Sentinel returned when no response arrived: proceed normally.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContinueMarker {
    pub action: ResponseAction,
}

/// Result of waiting for a session response.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ResponseOutcome {
    Response(UserResponse),
    Continue(ContinueMarker),
}

impl ResponseOutcome {
    pub fn proceed() -> Self {
        Self::Continue(ContinueMarker::default())
    }

    pub fn response(&self) -> Option<&UserResponse> {
        match self {
            Self::Response(r) => Some(r),
            Self::Continue(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fail_open_is_allow() {
        let outcome = DecisionOutcome::fail_open();
        assert_eq!(outcome.decision, Decision::Allow);
        assert_ne!(outcome.decision, Decision::Deny);
        assert_eq!(outcome.reason.as_deref(), Some("timeout"));
    }

    #[test]
    fn decision_parses() {
        assert_eq!("allow".parse::<Decision>().unwrap(), Decision::Allow);
        assert_eq!("deny".parse::<Decision>().unwrap(), Decision::Deny);
        assert!("maybe".parse::<Decision>().is_err());
        assert!("Allow".parse::<Decision>().is_err());
    }

    #[test]
    fn outcome_wire_shape() {
        let json = serde_json::to_value(DecisionOutcome::new(Decision::Deny, Some("nope".into())))
            .unwrap();
        assert_eq!(json, json!({"decision": "deny", "reason": "nope"}));

        let bare = serde_json::to_value(DecisionOutcome::new(Decision::Allow, None)).unwrap();
        assert_eq!(bare, json!({"decision": "allow"}));
    }

    #[test]
    fn unknown_action_reads_as_continue() {
        let action: ResponseAction = serde_json::from_value(json!("shrug")).unwrap();
        assert_eq!(action, ResponseAction::Continue);
        let block: ResponseAction = serde_json::from_value(json!("block")).unwrap();
        assert_eq!(block, ResponseAction::Block);
    }

    #[test]
    fn continue_sentinel_wire_shape() {
        let json = serde_json::to_value(ResponseOutcome::proceed()).unwrap();
        assert_eq!(json, json!({"action": "continue"}));
    }

    #[test]
    fn outcome_deserializes_both_shapes() {
        let sentinel: ResponseOutcome =
            serde_json::from_value(json!({"action": "continue"})).unwrap();
        assert!(sentinel.response().is_none());

        let response: ResponseOutcome = serde_json::from_value(json!({
            "id": 3,
            "timestamp": "2026-01-01T00:00:00Z",
            "session_id": "s1",
            "response": "use tabs",
            "action": "inject_context"
        }))
        .unwrap();
        let inner = response.response().unwrap();
        assert_eq!(inner.session_id, "s1");
        assert_eq!(inner.action, ResponseAction::InjectContext);
        assert_eq!(inner.response.as_deref(), Some("use tabs"));
    }
}
