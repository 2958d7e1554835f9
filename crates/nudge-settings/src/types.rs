use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NudgeSettings {
    pub server: ServerSettings,
    pub sessions: SessionSettings,
    pub llm: LlmSettings,
    pub logging: LoggingSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionSettings {
    /// Empty means `<nudge home>/database/sessions.db`.
    pub db_path: String,
    /// Pooled connections for a file database.
    pub db_pool_size: u32,
    /// How long a mutation waits for its session's slot before giving up.
    pub lock_wait_ms: u64,
    pub default_list_limit: usize,
    pub max_list_limit: usize,
    /// Ended sessions older than this are deleted by the cleanup task.
    pub retention_days: u32,
    pub cleanup_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            db_path: String::new(),
            db_pool_size: 8,
            lock_wait_ms: 5_000,
            default_list_limit: 10,
            max_list_limit: 100,
            retention_days: 30,
            cleanup_interval_secs: 3_600,
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LlmSettings {
    pub base_url: String,
    pub deployment: String,
    pub api_version: String,
    /// Never written back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub default_model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub system_prompt: String,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://azureapi.zotgpt.uci.edu".into(),
            deployment: "gpt-4o".into(),
            api_version: "2024-02-01".into(),
            api_key: None,
            default_model: "gpt-3.5-turbo".into(),
            temperature: 1.0,
            max_tokens: 1024,
            system_prompt: "You are a chatbot assistant. You are helping a user with a task.".into(),
            timeout_secs: 60,
        }
    }
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("default_model", &self.default_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}
