use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// WebSocket protocol constants
pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const MAX_PAYLOAD_BYTES: usize = 128 * 1024; // 128 KB hard cap per frame
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000; // close if client doesn't auth in 10s
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30; // tick event cadence
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64; // per-connection pending frames

/// Section locks expire after five minutes unless refreshed.
pub const DEFAULT_LOCK_TTL_SECS: u64 = 300;
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Top-level config (hojokin.toml + HOJOKIN_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HojokinConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub collab: CollabConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            auth: AuthConfig::default(),
        }
    }
}

/// Access-token signing settings shared by REST and WebSocket auth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC key for access tokens. Rotating it invalidates every issued token.
    #[serde(default = "default_token_secret")]
    pub token_secret: String,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: default_token_secret(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
        }
    }
}

impl AuthConfig {
    /// True while the shipped placeholder secret is still in use.
    pub fn uses_default_secret(&self) -> bool {
        self.token_secret == default_token_secret()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    pub gemini: Option<GeminiConfig>,
}

/// Google Gemini (Generative Language API) with a plain API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    /// Models tried in order when the primary one keeps failing.
    #[serde(default)]
    pub fallback_models: Vec<String>,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    pub temperature: Option<f32>,
}

/// Exponential backoff around LLM calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollabConfig {
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,
    /// How often the background sweeper looks for expired section locks.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// When set, presence is mirrored to Redis and the offline
    /// notification queue lives there instead of in process memory.
    pub redis: Option<RedisConfig>,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            lock_ttl_secs: DEFAULT_LOCK_TTL_SECS,
            sweep_interval_secs: default_sweep_interval(),
            redis: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_token_secret() -> String {
    "change-me".to_string()
}
fn default_token_ttl() -> u64 {
    DEFAULT_TOKEN_TTL_SECS
}
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_gemini_model() -> String {
    "gemini-1.5-pro".to_string()
}
fn default_max_output_tokens() -> u32 {
    2048
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    8_000
}
fn default_lock_ttl() -> u64 {
    DEFAULT_LOCK_TTL_SECS
}
fn default_sweep_interval() -> u64 {
    15
}
fn default_redis_prefix() -> String {
    "hojokin".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.hojokin/hojokin.db", home)
}

impl HojokinConfig {
    /// Load config from a TOML file with HOJOKIN_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.hojokin/hojokin.toml
    ///
    /// A missing file is not an error; defaults and env vars still apply.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::HojokinError::Config(e.to_string()))
    }

    /// Provider chain: defaults, then the TOML file, then `HOJOKIN_` env vars.
    /// Nested keys use a double underscore: `HOJOKIN_GATEWAY__PORT=9000`.
    pub fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(HojokinConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("HOJOKIN_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.hojokin/hojokin.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = HojokinConfig::default();
        assert_eq!(config.gateway.port, DEFAULT_PORT);
        assert_eq!(config.collab.lock_ttl_secs, 300);
        assert!(config.providers.gemini.is_none());
        assert!(config.gateway.auth.uses_default_secret());
    }

    #[test]
    fn figment_builds_without_files() {
        let config: HojokinConfig = HojokinConfig::figment("/nonexistent/hojokin.toml")
            .extract()
            .expect("should extract defaults");
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.collab.redis.is_none());
    }

    #[test]
    fn toml_overrides_nested_sections() {
        let dir = std::env::temp_dir().join(format!("hojokin-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("hojokin.toml");
        std::fs::write(
            &path,
            r#"
[gateway]
port = 9100

[providers.gemini]
api_key = "k"
fallback_models = ["gemini-1.5-flash"]

[collab]
lock_ttl_secs = 60
"#,
        )
        .unwrap();

        let config: HojokinConfig = HojokinConfig::figment(path.to_str().unwrap())
            .extract()
            .unwrap();
        assert_eq!(config.gateway.port, 9100);
        assert_eq!(config.gateway.bind, DEFAULT_BIND);
        assert_eq!(config.collab.lock_ttl_secs, 60);
        let gemini = config.providers.gemini.unwrap();
        assert_eq!(gemini.model, "gemini-1.5-pro");
        assert_eq!(gemini.fallback_models, vec!["gemini-1.5-flash".to_string()]);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
