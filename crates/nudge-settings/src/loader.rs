//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{NudgeSettings, SessionSettings};

/// `$NUDGE_HOME`, or `~/.nudge`.
pub fn nudge_home() -> PathBuf {
    if let Ok(home) = std::env::var("NUDGE_HOME") {
        return PathBuf::from(home);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".nudge")
}

pub fn settings_path() -> PathBuf {
    nudge_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<NudgeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<NudgeSettings> {
    let defaults = serde_json::to_value(NudgeSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: NudgeSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    normalize(&mut settings);
    Ok(settings)
}

/// Repair values that would make list queries or the pool unusable.
///
/// A zero `max_list_limit` falls back to its default, and
/// `default_list_limit` is brought within `1..=max_list_limit`.
pub fn normalize(settings: &mut NudgeSettings) {
    let defaults = SessionSettings::default();
    let sessions = &mut settings.sessions;
    if sessions.max_list_limit == 0 {
        warn!(fallback = defaults.max_list_limit, "sessions.maxListLimit is 0, using default");
        sessions.max_list_limit = defaults.max_list_limit;
    }
    if sessions.default_list_limit == 0 || sessions.default_list_limit > sessions.max_list_limit {
        let clamped = sessions.default_list_limit.clamp(1, sessions.max_list_limit);
        warn!(
            requested = sessions.default_list_limit,
            clamped, "sessions.defaultListLimit out of range"
        );
        sessions.default_list_limit = clamped;
    }
    if sessions.db_pool_size == 0 {
        sessions.db_pool_size = defaults.db_pool_size;
    }
}

pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment overrides read through `lookup`.
///
/// Integers must parse and fall within range; booleans accept
/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`. Invalid values are
/// ignored. The unprefixed names (`PORT`, `API_KEY`, `DEPLOYMENT_ID`,
/// `API_VERSION`) are honoured for older deployments; the `NUDGE_*` form
/// wins when both are set.
pub fn apply_env_overrides(settings: &mut NudgeSettings, lookup: impl Fn(&str) -> Option<String>) {
    let string = |keys: &[&str]| {
        keys.iter()
            .filter_map(|k| lookup(*k))
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
    };
    let int = |keys: &[&str], min: u64, max: u64| {
        string(keys)
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| (min..=max).contains(v))
    };

    if let Some(v) = string(&["NUDGE_HOST"]) {
        settings.server.host = v;
    }
    if let Some(v) = int(&["NUDGE_PORT", "PORT"], 1, 65_535) {
        settings.server.port = v as u16;
    }
    if let Some(v) = int(&["NUDGE_REQUEST_TIMEOUT_SECS"], 1, 3_600) {
        settings.server.request_timeout_secs = v;
    }

    if let Some(v) = string(&["NUDGE_DB_PATH"]) {
        settings.sessions.db_path = v;
    }
    if let Some(v) = int(&["NUDGE_DB_POOL_SIZE"], 1, 64) {
        settings.sessions.db_pool_size = v as u32;
    }
    if let Some(v) = int(&["NUDGE_LOCK_WAIT_MS"], 10, 600_000) {
        settings.sessions.lock_wait_ms = v;
    }
    if let Some(v) = int(&["NUDGE_RETENTION_DAYS"], 1, 3_650) {
        settings.sessions.retention_days = v as u32;
    }
    if let Some(v) = int(&["NUDGE_CLEANUP_INTERVAL_SECS"], 10, 604_800) {
        settings.sessions.cleanup_interval_secs = v;
    }

    if let Some(v) = string(&["NUDGE_LLM_BASE_URL"]) {
        settings.llm.base_url = v;
    }
    if let Some(v) = string(&["NUDGE_LLM_DEPLOYMENT", "DEPLOYMENT_ID"]) {
        settings.llm.deployment = v;
    }
    if let Some(v) = string(&["NUDGE_LLM_API_VERSION", "API_VERSION"]) {
        settings.llm.api_version = v;
    }
    if let Some(v) = string(&["NUDGE_LLM_API_KEY", "API_KEY"]) {
        settings.llm.api_key = Some(v);
    }

    if let Some(v) = string(&["NUDGE_LOG_LEVEL"]) {
        settings.logging.level = v;
    }
    if let Some(v) = string(&["NUDGE_LOG_JSON"]).and_then(|v| parse_bool(&v)) {
        settings.logging.json = v;
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
