//! # relay-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** ([`RelaySettings::default()`])
//! 2. **User file**: `~/.relay/settings.json` or `--config`, deep-merged
//! 3. **Environment variables** (`PORT`, `RELAY_*`, `CLAUDE_WEB_BRIDGE_*`)
//!
//! There is no global instance. The binary loads once at startup and hands
//! the value down.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, load_settings_required, settings_path};
pub use types::*;
