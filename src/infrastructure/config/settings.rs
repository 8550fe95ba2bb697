use std::env;
use std::time::Duration;

use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_run_mode")]
    pub run_mode: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Full connection string. Takes precedence over the discrete fields and
    /// always connects over TLS.
    pub url: Option<String>,
    pub host: Option<String>,
    #[serde(default = "default_db_port")]
    pub port: u16,
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    #[serde(default = "default_slow_query_ms")]
    pub slow_query_ms: u64,
    /// Interval for the development stats reporter
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines. Defaults to on in production.
    pub json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_run_mode() -> String {
    "development".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_max_connections() -> u32 {
    20
}

fn default_idle_timeout_ms() -> u64 {
    30_000
}

fn default_acquire_timeout_ms() -> u64 {
    10_000
}

fn default_slow_query_ms() -> u64 {
    1_000
}

fn default_stats_interval_secs() -> u64 {
    30
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "kitchen-database".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

/// Environment variables mapped onto configuration keys.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("POSTGRES_URL", "database.url"),
    ("DB_HOST", "database.host"),
    ("DB_PORT", "database.port"),
    ("DB_NAME", "database.name"),
    ("DB_USER", "database.user"),
    ("DB_PASSWORD", "database.password"),
    ("DB_SSL", "database.ssl"),
    ("DB_MAX_CONNECTIONS", "database.max_connections"),
    ("DB_IDLE_TIMEOUT_MS", "database.idle_timeout_ms"),
    ("DB_ACQUIRE_TIMEOUT_MS", "database.acquire_timeout_ms"),
    ("DB_SLOW_QUERY_MS", "database.slow_query_ms"),
    ("DB_STATS_INTERVAL_SECS", "database.stats_interval_secs"),
    ("SERVER_HOST", "server.host"),
    ("SERVER_PORT", "server.port"),
    ("LOG_JSON", "logging.json"),
    ("OTEL_ENABLED", "otel.enabled"),
    ("OTEL_ENDPOINT", "otel.endpoint"),
    ("OTEL_SERVICE_NAME", "otel.service_name"),
    ("OTEL_SAMPLING_RATIO", "otel.sampling_ratio"),
];

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        Self::build(&run_mode, |key| env::var(key).ok())
    }

    /// Build settings for a run mode, resolving overrides through `lookup`.
    pub fn build<F>(run_mode: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Config::builder()
            .set_default("run_mode", run_mode)?
            .set_default("database.port", 5432)?
            .set_default("database.ssl", false)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false));

        for (var, key) in ENV_OVERRIDES {
            builder = builder.set_override_option(*key, lookup(var))?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn is_development(&self) -> bool {
        self.run_mode == "development" || self.run_mode == "dev"
    }

    pub fn is_production(&self) -> bool {
        self.run_mode == "production" || self.run_mode == "prod"
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// JSON logs unless explicitly disabled; pretty output outside production.
    pub fn json_logs(&self) -> bool {
        self.logging.json.unwrap_or_else(|| self.is_production())
    }
}

impl DatabaseConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    /// Connection target suitable for logs, with any password masked.
    pub fn display_target(&self) -> String {
        match self.url {
            Some(ref url) => mask_url_password(url),
            None => format!(
                "{}@{}:{}/{}",
                self.user.as_deref().unwrap_or(""),
                self.host.as_deref().unwrap_or("localhost"),
                self.port,
                self.name.as_deref().unwrap_or(""),
            ),
        }
    }
}

/// Mask the password component of a connection URL.
pub fn mask_url_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0).min(at_pos);
        if let Some(colon_pos) = url[scheme_end..at_pos].rfind(':') {
            let colon_pos = scheme_end + colon_pos;
            let prefix = &url[..colon_pos + 1];
            let suffix = &url[at_pos..];
            return format!("{}***{}", prefix, suffix);
        }
    }
    url.to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: None,
            port: default_db_port(),
            name: None,
            user: None,
            password: None,
            ssl: false,
            max_connections: default_max_connections(),
            idle_timeout_ms: default_idle_timeout_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            slow_query_ms: default_slow_query_ms(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}
