use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use hojokin_agent::{
    ChatRequest, ChatResponse, DraftGenerator, GeminiProvider, LlmProvider, ProviderError,
    ProviderRouter, ProviderSlot, RetryPolicy,
};
use hojokin_applications::{ApplicationManager, TemplateStore};
use hojokin_collab::{
    CollabHub, MemoryQueue, NoopMirror, NotificationQueue, PresenceMirror, RedisMirror, RedisQueue,
};
use hojokin_core::config::{HojokinConfig, HEARTBEAT_INTERVAL_SECS};
use hojokin_core::types::UserRole;
use hojokin_notifications::NotificationStore;
use hojokin_users::{NewUser, TokenSigner, UserManager};
use rusqlite::Connection;
use tracing::{info, warn};

mod app;
mod auth;
mod background;
mod error;
mod generation;
mod http;
mod notify;
mod ws;

#[cfg(test)]
mod test_support;

#[derive(Parser)]
#[command(name = "hojokin-gateway", version)]
#[command(about = "Subsidy application assistant: REST API, AI drafting and live collaboration")]
struct Cli {
    /// Config file (default: $HOJOKIN_CONFIG, then ~/.hojokin/hojokin.toml)
    #[arg(long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP + WebSocket server (default)
    Serve,
    /// Create an admin account
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        company: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hojokin_gateway=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    // config: --config > HOJOKIN_CONFIG env > ~/.hojokin/hojokin.toml
    let config_path = cli.config.or_else(|| std::env::var("HOJOKIN_CONFIG").ok());
    let config = HojokinConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        HojokinConfig::default()
    });

    ensure_parent_dir(&config.database.path);
    init_database(&config.database.path)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::CreateAdmin {
            email,
            password,
            company,
        } => create_admin(&config, email, password, company),
    }
}

async fn serve(config: HojokinConfig) -> anyhow::Result<()> {
    if config.gateway.auth.uses_default_secret() {
        warn!("gateway.auth.token_secret is the built-in default; set HOJOKIN_GATEWAY__AUTH__TOKEN_SECRET");
    }

    let provider = build_provider(&config);
    let hub = Arc::new(build_hub(&config)?);
    let state = Arc::new(build_state(config, provider, hub)?);
    state.applications.recover_interrupted()?;

    let router = app::build_router(Arc::clone(&state));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(background::run_lock_sweeper(
        Arc::clone(&state.hub),
        state.config.collab.sweep_interval_secs,
        shutdown_rx.clone(),
    ));
    tokio::spawn(background::run_heartbeat(
        Arc::clone(&state.hub),
        HEARTBEAT_INTERVAL_SECS,
        shutdown_rx,
    ));

    let addr: SocketAddr = format!("{}:{}", state.config.gateway.bind, state.config.gateway.port).parse()?;
    info!(
        provider = state.drafts.provider_name(),
        queue = state.hub.queue_backend(),
        "Hojokin gateway listening on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // stop background loops
    let _ = shutdown_tx.send(true);
    Ok(())
}

fn create_admin(config: &HojokinConfig, email: String, password: String, company: String) -> anyhow::Result<()> {
    let users = UserManager::new(open_connection(&config.database.path)?);
    let new = NewUser {
        email,
        password,
        company_name: company,
        representative_name: String::new(),
        industry: String::new(),
        employee_count: None,
        capital_yen: None,
        prefecture: String::new(),
        phone: None,
    };
    let user = users.register(&new, UserRole::Admin)?;
    info!(user_id = %user.id, email = %user.email, "admin account created");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

/// One SQLite file for all subsystems; every connection gets the same pragmas.
fn open_connection(path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")?;
    Ok(conn)
}

/// Run all schema migrations (idempotent). Users first: the other tables
/// reference it.
fn init_database(path: &str) -> anyhow::Result<()> {
    info!(path, "opening SQLite database");
    let db = open_connection(path)?;
    hojokin_users::db::init_db(&db)?;
    hojokin_applications::db::init_db(&db)?;
    hojokin_notifications::db::init_db(&db)?;
    info!("database migrations complete");
    Ok(())
}

/// Build subsystems; each gets its own connection for thread safety.
fn build_state(
    config: HojokinConfig,
    provider: Arc<dyn LlmProvider>,
    hub: Arc<CollabHub>,
) -> anyhow::Result<app::AppState> {
    let path = config.database.path.clone();
    let tokens = TokenSigner::new(
        &config.gateway.auth.token_secret,
        config.gateway.auth.token_ttl_secs,
    );
    let drafts = match &config.providers.gemini {
        Some(gemini) => DraftGenerator::from_config(provider, gemini),
        None => DraftGenerator::new(provider, "unconfigured", 2048),
    };
    Ok(app::AppState {
        tokens,
        users: UserManager::new(open_connection(&path)?),
        applications: ApplicationManager::new(open_connection(&path)?),
        templates: TemplateStore::new(open_connection(&path)?),
        notifications: NotificationStore::new(open_connection(&path)?),
        drafts,
        hub,
        config,
    })
}

/// Offline queue and presence mirror live in Redis when configured,
/// otherwise in process memory.
fn build_hub(config: &HojokinConfig) -> anyhow::Result<CollabHub> {
    let (queue, mirror): (Arc<dyn NotificationQueue>, Arc<dyn PresenceMirror>) =
        match &config.collab.redis {
            Some(redis) => {
                info!(prefix = %redis.prefix, "collaboration state mirrored to Redis");
                (
                    Arc::new(RedisQueue::new(&redis.url, &redis.prefix)?),
                    Arc::new(RedisMirror::new(&redis.url, &redis.prefix)?),
                )
            }
            None => (Arc::new(MemoryQueue::new()), Arc::new(NoopMirror)),
        };
    Ok(CollabHub::new(config.collab.lock_ttl_secs, queue, mirror))
}

/// Gemini primary model first, then each fallback model, behind one
/// retrying router.
fn build_provider(config: &HojokinConfig) -> Arc<dyn LlmProvider> {
    let Some(gemini) = config
        .providers
        .gemini
        .as_ref()
        .filter(|g| !g.api_key.trim().is_empty())
    else {
        warn!("no Gemini API key configured; AI drafting will fail until providers.gemini.api_key is set");
        return Arc::new(NullProvider);
    };

    let client: Arc<dyn LlmProvider> = Arc::new(GeminiProvider::from_config(gemini));
    let mut slots = vec![ProviderSlot::with_model(Arc::clone(&client), gemini.model.clone())];
    info!("LLM provider slot[0]: Gemini {} ({})", gemini.model, gemini.base_url);
    for model in &gemini.fallback_models {
        info!("LLM provider slot[{}]: Gemini {}", slots.len(), model);
        slots.push(ProviderSlot::with_model(Arc::clone(&client), model.clone()));
    }
    Arc::new(ProviderRouter::new(slots, RetryPolicy::from(&config.retry)))
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

/// Placeholder provider when no API key is available.
struct NullProvider;

#[async_trait::async_trait]
impl LlmProvider for NullProvider {
    fn name(&self) -> &str {
        "null"
    }

    async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        Err(ProviderError::Unavailable(
            "no LLM provider configured: set providers.gemini.api_key in hojokin.toml".into(),
        ))
    }
}
