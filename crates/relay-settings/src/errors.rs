//! Settings error types.

use thiserror::Error;

/// Errors that can occur when loading or parsing settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the settings file from disk.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the settings file.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// An explicitly requested settings file does not exist.
    #[error("settings file not found: {0}")]
    NotFound(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
