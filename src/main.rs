use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use nudge_core::{ChatTurn, Completion, CompletionProvider, GatewayError, NudgeProvider};
use nudge_engine::{
    start_retention_task, ChatService, ListLimits, MutationEngine, RetentionPolicy,
    SessionCoordinator, SessionQueryService,
};
use nudge_llm::{OpenAiCompatConfig, OpenAiCompatProvider, ReliableProvider};
use nudge_server::{AppState, ServerConfig};
use nudge_settings::{LlmSettings, NudgeSettings};
use nudge_store::{
    Database, DatabaseConfig, NudgeRepo, SessionStore, SqliteSessionStore, StoreNudgeProvider,
};
use nudge_telemetry::{init_telemetry, parse_level, LogFormat, TelemetryConfig};

#[derive(Debug, Parser)]
#[command(name = "nudge", about = "Session recording and nudge server")]
struct Args {
    /// Port to listen on (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database path, or `:memory:`.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Settings file to load instead of `$NUDGE_HOME/settings.json`.
    #[arg(long)]
    settings: Option<PathBuf>,
}

/// Stand-in used when no API key is configured; every chat call fails as unauthenticated.
struct Unconfigured;

#[async_trait]
impl CompletionProvider for Unconfigured {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn complete(&self, _turns: &[ChatTurn]) -> Result<Completion, GatewayError> {
        Err(GatewayError::AuthenticationFailed("no LLM API key configured".into()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = match &args.settings {
        Some(path) => nudge_settings::load_settings_from_path(path),
        None => nudge_settings::load_settings(),
    }
    .context("failed to load settings")?;
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    let _ = init_telemetry(&TelemetryConfig {
        log_level: parse_level(&settings.logging.level).unwrap_or(tracing::Level::INFO),
        module_levels: Vec::new(),
        format: if settings.logging.json {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        },
    });

    tracing::info!("Starting nudge server");

    let db = open_database(&settings, args.db)?;
    let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(db.clone()));
    let nudges = Arc::new(NudgeRepo::new(db));

    let coordinator = Arc::new(SessionCoordinator::new(Duration::from_millis(
        settings.sessions.lock_wait_ms,
    )));
    let mutations = Arc::new(MutationEngine::new(Arc::clone(&store), coordinator));
    let queries = Arc::new(SessionQueryService::new(
        Arc::clone(&store),
        ListLimits {
            default: settings.sessions.default_list_limit,
            max: settings.sessions.max_list_limit,
        },
    ));
    let nudge_source: Arc<dyn NudgeProvider> = Arc::new(StoreNudgeProvider::new(Arc::clone(&nudges)));
    let chat = Arc::new(ChatService::new(
        completion_provider(&settings.llm)?,
        nudge_source,
        Arc::clone(&mutations),
    ));

    let cancel = CancellationToken::new();
    let retention = start_retention_task(
        Arc::clone(&store),
        RetentionPolicy::new(
            settings.sessions.retention_days,
            Duration::from_secs(settings.sessions.cleanup_interval_secs),
        ),
        cancel.clone(),
    );

    let config = ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        request_timeout: Duration::from_secs(settings.server.request_timeout_secs),
    };
    let state = AppState {
        mutations,
        queries,
        chat,
        nudges,
    };
    let handle = nudge_server::start(config, state)
        .await
        .context("failed to start server")?;

    tracing::info!(port = handle.port, "Nudge server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("Shutting down");
    cancel.cancel();
    handle.shutdown().await;
    let _ = retention.await;
    Ok(())
}

fn open_database(settings: &NudgeSettings, flag: Option<PathBuf>) -> anyhow::Result<Database> {
    let path = flag
        .or_else(|| Some(PathBuf::from(&settings.sessions.db_path)).filter(|p| !p.as_os_str().is_empty()))
        .unwrap_or_else(|| nudge_settings::nudge_home().join("database").join("sessions.db"));

    let db = if path.as_os_str() == ":memory:" {
        tracing::warn!("using in-memory database; sessions will not survive restart");
        Database::in_memory()
    } else {
        Database::open_with(
            &path,
            &DatabaseConfig {
                pool_size: settings.sessions.db_pool_size,
                ..DatabaseConfig::default()
            },
        )
    };
    db.with_context(|| format!("failed to open database at {}", path.display()))
}

fn completion_provider(llm: &LlmSettings) -> anyhow::Result<Arc<dyn CompletionProvider>> {
    let Some(key) = llm.api_key.clone() else {
        tracing::warn!("no LLM API key configured; /api/chat will return 502");
        return Ok(Arc::new(Unconfigured));
    };
    let provider = OpenAiCompatProvider::new(OpenAiCompatConfig {
        base_url: llm.base_url.clone(),
        deployment: llm.deployment.clone(),
        api_version: llm.api_version.clone(),
        api_key: SecretString::from(key),
        default_model: llm.default_model.clone(),
        temperature: llm.temperature,
        max_tokens: llm.max_tokens,
        system_prompt: llm.system_prompt.clone(),
        timeout: Duration::from_secs(llm.timeout_secs),
    })
    .context("failed to build LLM client")?;
    Ok(Arc::new(ReliableProvider::with_defaults(provider)))
}
