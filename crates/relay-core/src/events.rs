use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::decisions::Decision;

/// Keys owned by the log. Caller-supplied values under these names are
/// discarded at ingestion so they cannot shadow assigned fields.
const RESERVED_KEYS: &[&str] = &[
    "id",
    "timestamp",
    "kind",
    "hook_event_name",
    "session_id",
    "pendingPermission",
    "permissionDecision",
];

/// Lifecycle hook classification of an ingested event.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Session created.
    SessionStart,
    /// Session ending.
    SessionEnd,
    /// Blocking: the agent waits for an allow/deny decision.
    PreToolUse,
    /// Background: fired after an action completes.
    PostToolUse,
    /// Prompt submitted by the user; may poll for a response.
    UserPromptSubmit,
    Other,
}

impl EventKind {
    /// Classify a raw `hook_event_name`.
    pub fn from_hook_name(name: &str) -> Self {
        match name {
            "SessionStart" => Self::SessionStart,
            "SessionEnd" => Self::SessionEnd,
            "PreToolUse" => Self::PreToolUse,
            "PostToolUse" => Self::PostToolUse,
            "UserPromptSubmit" => Self::UserPromptSubmit,
            _ => Self::Other,
        }
    }

    pub fn requires_decision(&self) -> bool {
        matches!(self, Self::PreToolUse)
    }
}

/// An event as submitted by the agent, before the log assigns an id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewEvent {
    pub hook_event_name: Option<String>,
    pub session_id: Option<String>,
    pub payload: Map<String, Value>,
}

impl NewEvent {
    /// Build from an arbitrary JSON body. Returns `None` for anything that is
    /// not a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut map) = value else {
            return None;
        };

        let hook_event_name = take_string(&mut map, "hook_event_name");
        let session_id = take_string(&mut map, "session_id");
        for key in RESERVED_KEYS {
            let _ = map.remove(*key);
        }

        Some(Self {
            hook_event_name,
            session_id,
            payload: map,
        })
    }

    pub fn kind(&self) -> EventKind {
        self.hook_event_name
            .as_deref()
            .map_or(EventKind::Other, EventKind::from_hook_name)
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}

/// An ingested event. Only `pending_decision` and `decision` change after
/// creation, and only once.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook_event_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "pendingPermission", default)]
    pub pending_decision: bool,
    #[serde(
        rename = "permissionDecision",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub decision: Option<Decision>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Event {
    pub fn new(id: u64, timestamp: DateTime<Utc>, new: NewEvent) -> Self {
        let kind = new.kind();
        Self {
            id,
            timestamp,
            kind,
            hook_event_name: new.hook_event_name,
            session_id: new.session_id,
            pending_decision: kind.requires_decision(),
            decision: None,
            payload: new.payload,
        }
    }

    /// Name used in the per-kind histogram.
    pub fn histogram_key(&self) -> &str {
        self.hook_event_name.as_deref().unwrap_or("unknown")
    }

    /// Short human label for log lines: tool name, prompt prefix, or a
    /// generic fallback.
    pub fn label(&self) -> String {
        if let Some(tool) = self.payload.get("tool_name").and_then(Value::as_str) {
            return tool.to_string();
        }
        if let Some(prompt) = self.payload.get("prompt").and_then(Value::as_str) {
            return prompt.chars().take(50).collect();
        }
        "Session event".to_string()
    }

    /// Working directory reported by the agent, if any.
    pub fn working_context(&self) -> Option<&str> {
        self.payload
            .get("cwd")
            .and_then(Value::as_str)
            .or_else(|| self.payload.get("working_directory").and_then(Value::as_str))
    }

    /// Record the settled decision. Returns `false` if one was already set
    /// or this kind of event never asks for one.
    pub(crate) fn settle(&mut self, decision: Decision) -> bool {
        if !self.kind.requires_decision() || self.decision.is_some() {
            return false;
        }
        self.pending_decision = false;
        self.decision = Some(decision);
        true
    }
}
