//! What the hook prints for the agent.
//!
//! The agent reads these shapes from stdout; field names follow its hook
//! protocol (camelCase), not the relay wire format.

use relay_core::{Decision, DecisionOutcome, ResponseAction, ResponseOutcome, TIMEOUT_REASON};
use serde::Serialize;

pub const APPROVED_REASON: &str = "Approved via web interface";
pub const BLOCKED_REASON: &str = "Blocked by web interface";
pub const AUTO_APPROVED_REASON: &str = "Auto-approved (timeout)";

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    pub hook_specific_output: HookSpecificOutput,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    pub hook_event_name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_decision: Option<Decision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_decision_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct BlockOutput {
    pub decision: &'static str,
    pub reason: String,
}

/// Permission verdict. `None` (unreachable server) and the server's own
/// timeout default both render as an automatic approval.
pub fn permission(outcome: Option<&DecisionOutcome>) -> HookOutput {
    let (decision, reason) = match outcome {
        Some(o) if o.decision == Decision::Deny => (
            Decision::Deny,
            o.reason.clone().unwrap_or_else(|| BLOCKED_REASON.to_string()),
        ),
        Some(o) if o.reason.as_deref() != Some(TIMEOUT_REASON) => {
            (Decision::Allow, APPROVED_REASON.to_string())
        }
        _ => (Decision::Allow, AUTO_APPROVED_REASON.to_string()),
    };
    HookOutput {
        hook_specific_output: HookSpecificOutput {
            hook_event_name: "PreToolUse",
            permission_decision: Some(decision),
            permission_decision_reason: Some(reason),
            additional_context: None,
        },
    }
}

/// Output for a submitted prompt: injected text verbatim, a block decision,
/// or nothing.
pub fn prompt_response(outcome: Option<&ResponseOutcome>) -> Option<String> {
    let response = outcome?.response()?;
    match response.action {
        ResponseAction::InjectContext => response.response.clone().filter(|t| !t.is_empty()),
        ResponseAction::Block => serde_json::to_string(&BlockOutput {
            decision: "block",
            reason: response
                .response
                .clone()
                .unwrap_or_else(|| BLOCKED_REASON.to_string()),
        })
        .ok(),
        ResponseAction::Continue => None,
    }
}

/// Extra context for a starting session, if any text was queued.
pub fn session_start(outcome: Option<&ResponseOutcome>) -> Option<HookOutput> {
    let text = outcome?.response()?.response.clone()?;
    Some(HookOutput {
        hook_specific_output: HookSpecificOutput {
            hook_event_name: "SessionStart",
            permission_decision: None,
            permission_decision_reason: None,
            additional_context: Some(text),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::UserResponse;
    use serde_json::json;

    fn user_response(text: Option<&str>, action: ResponseAction) -> ResponseOutcome {
        let value = json!({
            "id": 1,
            "timestamp": "2026-01-01T00:00:00Z",
            "session_id": "S1",
            "response": text,
            "action": action,
        });
        ResponseOutcome::Response(serde_json::from_value::<UserResponse>(value).unwrap())
    }

    #[test]
    fn deny_carries_reason() {
        let out = permission(Some(&DecisionOutcome::new(Decision::Deny, Some("no rm".into()))));
        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            json!({"hookSpecificOutput": {
                "hookEventName": "PreToolUse",
                "permissionDecision": "deny",
                "permissionDecisionReason": "no rm",
            }})
        );
    }

    #[test]
    fn deny_without_reason() {
        let out = permission(Some(&DecisionOutcome::new(Decision::Deny, None)));
        assert_eq!(
            out.hook_specific_output.permission_decision_reason.as_deref(),
            Some(BLOCKED_REASON)
        );
    }

    #[test]
    fn explicit_allow() {
        let out = permission(Some(&DecisionOutcome::new(Decision::Allow, None)));
        assert_eq!(out.hook_specific_output.permission_decision, Some(Decision::Allow));
        assert_eq!(
            out.hook_specific_output.permission_decision_reason.as_deref(),
            Some(APPROVED_REASON)
        );
    }

    #[test]
    fn timeout_and_failure_auto_approve() {
        for outcome in [None, Some(DecisionOutcome::fail_open())] {
            let out = permission(outcome.as_ref());
            assert_eq!(out.hook_specific_output.permission_decision, Some(Decision::Allow));
            assert_eq!(
                out.hook_specific_output.permission_decision_reason.as_deref(),
                Some(AUTO_APPROVED_REASON)
            );
        }
    }

    #[test]
    fn prompt_injection_is_raw_text() {
        let r = user_response(Some("remember tests"), ResponseAction::InjectContext);
        assert_eq!(prompt_response(Some(&r)).as_deref(), Some("remember tests"));
    }

    #[test]
    fn prompt_block() {
        let r = user_response(None, ResponseAction::Block);
        let printed: serde_json::Value =
            serde_json::from_str(&prompt_response(Some(&r)).unwrap()).unwrap();
        assert_eq!(printed, json!({"decision": "block", "reason": BLOCKED_REASON}));
    }

    #[test]
    fn prompt_continue_prints_nothing() {
        assert!(prompt_response(Some(&ResponseOutcome::proceed())).is_none());
        assert!(prompt_response(None).is_none());
        let r = user_response(Some("x"), ResponseAction::Continue);
        assert!(prompt_response(Some(&r)).is_none());
    }

    #[test]
    fn session_start_context() {
        let r = user_response(Some("repo uses tabs"), ResponseAction::Continue);
        let out = session_start(Some(&r)).unwrap();
        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            json!({"hookSpecificOutput": {
                "hookEventName": "SessionStart",
                "additionalContext": "repo uses tabs",
            }})
        );
        assert!(session_start(Some(&ResponseOutcome::proceed())).is_none());
    }
}
