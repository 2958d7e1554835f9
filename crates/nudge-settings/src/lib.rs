//! Layered configuration for the nudge server.
//!
//! Settings are resolved from three layers (in priority order):
//! 1. Compiled defaults from [`NudgeSettings::default()`]
//! 2. The user file `~/.nudge/settings.json`, deep-merged over defaults
//! 3. `NUDGE_*` environment overrides (highest priority)

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, normalize, nudge_home, settings_path};
pub use types::*;
