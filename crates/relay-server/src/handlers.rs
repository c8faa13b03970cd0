//! REST handlers. Each one parses its input, makes one broker call and
//! renders the result.

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use relay_core::{
    Decision, DecisionOutcome, Event, NewEvent, ResponseAction, ResponseOutcome, Session,
    Settled, Stats,
};
use relay_telemetry::MetricsSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::errors::ApiError;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct WaitParams {
    pub timeout: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DecisionBody {
    decision: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RespondBody {
    session_id: String,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    action: ResponseAction,
}

/// `/api/stats` body: broker counts plus process metrics.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: Stats,
    pub counters: MetricsSnapshot,
}

fn parse_json_object(body: &[u8]) -> Result<Value, ApiError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid JSON: {e}")))?;
    if !value.is_object() {
        return Err(ApiError::bad_request("expected a JSON object"));
    }
    Ok(value)
}

fn parse_event_id(raw: &str) -> Result<u64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("invalid event id: {raw}")))
}

/// POST /api/events
pub async fn ingest_event(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let value = parse_json_object(&body)?;
    let new = NewEvent::from_value(value).ok_or_else(|| ApiError::bad_request("expected a JSON object"))?;
    let event = state.broker.ingest_event(new).await?;

    state
        .metrics
        .counter_inc("events.ingested", &[("hook", event.histogram_key())], 1);
    Ok(Json(json!({ "success": true, "id": event.id })))
}

/// GET /api/permission/{event_id}
pub async fn await_decision(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Query(params): Query<WaitParams>,
) -> Result<Json<DecisionOutcome>, ApiError> {
    let event_id = parse_event_id(&event_id)?;
    let timeout = state
        .config
        .resolve_timeout(params.timeout.as_deref(), state.config.permission_timeout);

    debug!(event_id, timeout_ms = timeout.as_millis() as u64, "awaiting decision");
    let started = Instant::now();
    let settled = state.broker.await_decision(event_id, timeout).await;

    let source = if settled.is_timed_out() { "timeout" } else { "submitted" };
    let outcome = settled.into_value();
    state.metrics.counter_inc(
        "decisions.total",
        &[("decision", outcome.decision.as_str()), ("source", source)],
        1,
    );
    state.metrics.histogram_observe(
        "decision.wait_ms",
        &[],
        started.elapsed().as_secs_f64() * 1000.0,
    );
    info!(event_id, decision = %outcome.decision, source, "decision returned to agent");
    Ok(Json(outcome))
}

/// POST /api/permission/{event_id}
pub async fn submit_decision(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let event_id = parse_event_id(&event_id)?;
    let body: DecisionBody = serde_json::from_value(parse_json_object(&body)?)
        .map_err(|e| ApiError::bad_request(format!("invalid decision body: {e}")))?;
    let decision: Decision = body.decision.parse().map_err(ApiError::bad_request)?;

    let delivered = state
        .broker
        .submit_decision(event_id, DecisionOutcome::new(decision, body.reason))
        .await?;

    if delivered {
        Ok(Json(json!({ "success": true })))
    } else {
        Ok(Json(json!({
            "success": false,
            "error": "No pending permission for this event",
        })))
    }
}

/// POST /api/respond
pub async fn submit_response(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body: RespondBody = serde_json::from_value(parse_json_object(&body)?)
        .map_err(|e| ApiError::bad_request(format!("invalid response body: {e}")))?;

    let sent = state
        .broker
        .submit_response(body.session_id, body.response, body.action)
        .await?;

    state
        .metrics
        .counter_inc("responses.sent", &[("action", sent.action.as_str())], 1);
    Ok(Json(json!({ "success": true })))
}

/// GET /api/pending-response/{session_id}
pub async fn await_response(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<WaitParams>,
) -> Json<ResponseOutcome> {
    let timeout = state
        .config
        .resolve_timeout(params.timeout.as_deref(), state.config.response_timeout);
    let settled = state.broker.await_response(&session_id, timeout).await;
    if let Settled::Resolved(outcome) = &settled {
        debug!(session_id = %session_id, delivered = outcome.response().is_some(), "response delivered");
    }
    Json(settled.into_value())
}

/// GET /api/messages
pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let limit = params
        .limit
        .as_deref()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(state.config.default_list_limit);
    Ok(Json(state.broker.list_events(limit).await?))
}

/// DELETE /api/messages
pub async fn clear_events(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let removed = state.broker.clear_events().await?;
    Ok(Json(json!({ "success": true, "removed": removed })))
}

/// GET /api/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Result<Json<Vec<Session>>, ApiError> {
    Ok(Json(state.broker.list_sessions().await?))
}

/// GET /api/stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state.broker.stats().await?;
    Ok(Json(StatsResponse {
        stats,
        counters: state.metrics.snapshot(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_parsing() {
        assert_eq!(parse_event_id("42").unwrap(), 42);
        assert!(parse_event_id("abc").is_err());
        assert!(parse_event_id("-1").is_err());
        assert!(parse_event_id("").is_err());
    }

    #[test]
    fn json_object_required() {
        assert!(parse_json_object(br#"{"a":1}"#).is_ok());
        assert!(parse_json_object(b"[1,2]").is_err());
        assert!(parse_json_object(b"\"s\"").is_err());
        assert!(parse_json_object(b"not json").is_err());
        assert!(parse_json_object(b"").is_err());
    }

    #[test]
    fn respond_body_defaults() {
        let body: RespondBody = serde_json::from_str(r#"{"session_id": "S1"}"#).unwrap();
        assert_eq!(body.action, ResponseAction::Continue);
        assert!(body.response.is_none());

        let body: RespondBody =
            serde_json::from_str(r#"{"session_id": "S1", "action": "whatever"}"#).unwrap();
        assert_eq!(body.action, ResponseAction::Continue);
    }

    #[test]
    fn stats_response_is_flat() {
        let body = StatsResponse {
            stats: Stats::default(),
            counters: MetricsSnapshot::default(),
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["totalMessages"], 0);
        assert_eq!(v["connectedClients"], 0);
        assert!(v["counters"]["counters"].is_object());
    }
}
