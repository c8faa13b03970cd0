//! Hook client errors. None of these reach the agent: every failure is
//! reported as "no response".

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("invalid bridge URL: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {0}")]
    Status(u16),
}

impl HookError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http(e) if e.is_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(HookError::Status(503).to_string(), "server returned 503");
        assert!(HookError::InvalidUrl("x".into()).to_string().contains("invalid bridge URL"));
        assert!(!HookError::Status(500).is_timeout());
    }
}
