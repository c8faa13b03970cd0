//! HTTP client for the relay API.

use std::time::Duration;

use relay_core::{DecisionOutcome, ResponseOutcome};
use relay_settings::HookSettings;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::errors::HookError;

/// Slack added to the client-side timeout of a long poll so the server's own
/// deadline fires first.
const POLL_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct IngestReply {
    #[serde(default)]
    id: Option<u64>,
}

pub struct BridgeClient {
    http: reqwest::Client,
    base: Url,
    settings: HookSettings,
}

impl BridgeClient {
    pub fn new(settings: HookSettings) -> Result<Self, HookError> {
        let base = Url::parse(&settings.bridge_url)
            .map_err(|e| HookError::InvalidUrl(format!("{}: {e}", settings.bridge_url)))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            settings,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, HookError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| HookError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T, HookError> {
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(HookError::Status(resp.status().as_u16()));
        }
        Ok(resp.json().await?)
    }

    /// Post a hook event. Returns the assigned id.
    pub async fn send_event(&self, event: &Value) -> Result<Option<u64>, HookError> {
        let url = self.url(&["api", "events"])?;
        let req = self
            .http
            .post(url)
            .json(event)
            .timeout(Duration::from_millis(self.settings.post_timeout_ms));
        let reply: IngestReply = self.fetch(req).await?;
        Ok(reply.id)
    }

    /// Block until the server returns a decision for `event_id`.
    pub async fn wait_for_permission(&self, event_id: u64) -> Result<DecisionOutcome, HookError> {
        let timeout_ms = self.settings.permission_timeout_ms;
        let mut url = self.url(&["api", "permission", &event_id.to_string()])?;
        url.query_pairs_mut()
            .append_pair("timeout", &timeout_ms.to_string());
        let req = self
            .http
            .get(url)
            .timeout(Duration::from_millis(timeout_ms) + POLL_GRACE);
        self.fetch(req).await
    }

    /// Short poll for a dashboard response to this session.
    pub async fn check_for_response(&self, session_id: &str) -> Result<ResponseOutcome, HookError> {
        let mut url = self.url(&["api", "pending-response", session_id])?;
        url.query_pairs_mut()
            .append_pair("timeout", &self.settings.response_poll_ms.to_string());
        let req = self
            .http
            .get(url)
            .timeout(Duration::from_millis(self.settings.response_request_timeout_ms));
        self.fetch(req).await
    }
}

/// Collapse any client failure into "no response".
pub(crate) fn or_none<T>(what: &str, result: Result<T, HookError>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            debug!(call = what, error = %e, timeout = e.is_timeout(), "bridge call failed");
            None
        }
    }
}
