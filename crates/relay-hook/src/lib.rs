//! # relay-hook
//!
//! Agent-side adapter. The agent runs the hook once per lifecycle event with
//! the hook JSON on stdin; [`run_hook`] forwards it to the relay server and
//! returns whatever should be printed on stdout.
//!
//! The hook never fails the agent. An unreachable server, a timeout or a
//! garbled reply all count as "no response", which for a pre-action event
//! means approval.

pub mod client;
pub mod errors;
pub mod output;

pub use client::BridgeClient;
pub use errors::HookError;
pub use output::{HookOutput, HookSpecificOutput};

use relay_core::EventKind;
use relay_settings::HookSettings;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::or_none;

/// Handle one hook invocation. Returns the stdout payload, if any.
pub async fn run_hook(input: &str, settings: HookSettings) -> Option<String> {
    let event: Value = match serde_json::from_str(input) {
        Ok(v @ Value::Object(_)) => v,
        Ok(_) => {
            debug!("hook input is not an object, ignoring");
            return None;
        }
        Err(e) => {
            debug!(error = %e, "unparseable hook input, ignoring");
            return None;
        }
    };

    let kind = event
        .get("hook_event_name")
        .and_then(Value::as_str)
        .map_or(EventKind::Other, EventKind::from_hook_name);
    let session_id = event
        .get("session_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned);

    let client = match BridgeClient::new(settings) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "hook disabled");
            return permission_fallback(kind);
        }
    };

    let event_id = or_none("send_event", client.send_event(&event).await).flatten();
    debug!(?kind, event_id, session_id = ?session_id, "hook event posted");

    match kind {
        EventKind::PreToolUse => {
            let outcome = match event_id {
                Some(id) => or_none("wait_for_permission", client.wait_for_permission(id).await),
                None => None,
            };
            encode(&output::permission(outcome.as_ref()))
        }
        EventKind::UserPromptSubmit => {
            let session_id = session_id?;
            let outcome = or_none("check_for_response", client.check_for_response(&session_id).await);
            output::prompt_response(outcome.as_ref())
        }
        EventKind::SessionStart => {
            let session_id = session_id?;
            let outcome = or_none("check_for_response", client.check_for_response(&session_id).await);
            output::session_start(outcome.as_ref()).and_then(|out| encode(&out))
        }
        _ => None,
    }
}

fn permission_fallback(kind: EventKind) -> Option<String> {
    if kind.requires_decision() {
        encode(&output::permission(None))
    } else {
        None
    }
}

fn encode(out: &HookOutput) -> Option<String> {
    serde_json::to_string(out).ok()
}
