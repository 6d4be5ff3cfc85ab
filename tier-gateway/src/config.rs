//! Layered gateway configuration.
//!
//! Sources, lowest priority first: `<dir>/default`, `<dir>/$ENV`, `<dir>/local`,
//! `TIERGATE__*` environment variables, and finally `JWT_SECRET` and `APP_PORT`.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tier_limit::TierCatalog;

/// Environment variable prefix for overrides, e.g. `TIERGATE__SERVER__PORT`.
pub const ENV_PREFIX: &str = "TIERGATE";

/// Conventional override for `credentials.secret`.
pub const SECRET_ENV: &str = "JWT_SECRET";

/// Conventional override for `server.port`.
pub const PORT_ENV: &str = "APP_PORT";

/// Checks a configuration section for values the gateway cannot run with.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Server configuration error: {message}")]
    Server { message: String },

    #[error("Logging configuration error: {message}")]
    Logging { message: String },

    #[error("Limits configuration error: {message}")]
    Limits { message: String },

    #[error("Credentials configuration error: {message}")]
    Credentials { message: String },

    #[error("Eviction configuration error: {message}")]
    Eviction { message: String },
}

impl ValidationError {
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }

    pub fn limits(message: impl Into<String>) -> Self {
        Self::Limits {
            message: message.into(),
        }
    }

    pub fn credentials(message: impl Into<String>) -> Self {
        Self::Credentials {
            message: message.into(),
        }
    }

    pub fn eviction(message: impl Into<String>) -> Self {
        Self::Eviction {
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Configuration file error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub limits: LimitsConfig,
    pub credentials: CredentialsConfig,
    pub eviction: EvictionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Hard deadline for an admitted request's handler.
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            request_timeout_seconds: 30,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    /// `json` or `pretty`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

/// Which [`tier_limit::CounterStore`] backs the gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Per-key sharded locking (`WindowStore`).
    #[default]
    Sharded,
    /// One lock around the whole table (`LockedStore`).
    Locked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub window_seconds: u64,
    pub store: StoreKind,
    /// Requests allowed per window, by tier name.
    pub tiers: BTreeMap<String, u64>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            window_seconds: 3600,
            store: StoreKind::default(),
            tiers: BTreeMap::from([
                ("guest".to_string(), 3),
                ("free".to_string(), 10),
                ("premium".to_string(), 20),
            ]),
        }
    }
}

impl LimitsConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    pub fn catalog(&self) -> Result<TierCatalog, tier_limit::CatalogError> {
        TierCatalog::new(
            self.tiers
                .iter()
                .map(|(name, limit)| (name.as_str(), *limit)),
        )
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// HMAC secret bearer tokens are signed with.
    pub secret: String,
    pub user_id_claim: String,
    pub tier_claim: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            user_id_claim: "id".to_string(),
            tier_claim: "tier".to_string(),
        }
    }
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("secret", &"<redacted>")
            .field("user_id_claim", &self.user_id_claim)
            .field("tier_claim", &self.tier_claim)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvictionConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    /// Windows idle for this many window lengths are dropped.
    pub idle_windows: u32,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 300,
            idle_windows: 2,
        }
    }
}

impl EvictionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn idle(&self, window: Duration) -> Duration {
        window.saturating_mul(self.idle_windows)
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.host.parse::<IpAddr>().is_err() {
            return Err(ValidationError::server(format!(
                "host `{}` is not an IP address",
                self.host
            )));
        }
        if self.port == 0 {
            return Err(ValidationError::server("port must be > 0"));
        }
        if self.request_timeout_seconds == 0 {
            return Err(ValidationError::server("request timeout must be > 0"));
        }
        Ok(())
    }
}

impl Validate for LoggingConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        match self.format.as_str() {
            "json" | "pretty" => Ok(()),
            other => Err(ValidationError::logging(format!(
                "format must be `json` or `pretty`, got `{other}`"
            ))),
        }
    }
}

impl Validate for LimitsConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.window_seconds == 0 {
            return Err(ValidationError::limits("window must be > 0"));
        }
        self.catalog()
            .map(|_| ())
            .map_err(|err| ValidationError::limits(err.to_string()))
    }
}

impl Validate for CredentialsConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.secret.is_empty() {
            return Err(ValidationError::credentials(format!(
                "secret is empty; set {SECRET_ENV} or credentials.secret"
            )));
        }
        if self.user_id_claim.is_empty() || self.tier_claim.is_empty() {
            return Err(ValidationError::credentials("claim names must not be empty"));
        }
        Ok(())
    }
}

impl Validate for EvictionConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if !self.enabled {
            return Ok(());
        }
        if self.interval_seconds == 0 {
            return Err(ValidationError::eviction("interval must be > 0"));
        }
        if self.idle_windows == 0 {
            return Err(ValidationError::eviction("idle_windows must be > 0"));
        }
        Ok(())
    }
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.logging.validate()?;
        self.limits.validate()?;
        self.credentials.validate()?;
        self.eviction.validate()?;
        Ok(())
    }
}

impl Config {
    /// Load and validate configuration from the `config` directory.
    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::load_from("config")
    }

    /// Load and validate configuration from files under `dir` and the environment.
    pub fn load_from(dir: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        let config = Self::read(dir.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    fn read(dir: &Path) -> Result<Self, ConfigLoadError> {
        let file = |name: &str| config::File::from(dir.join(name)).required(false);

        let mut builder = config::Config::builder().add_source(file("default"));

        if let Ok(env) = std::env::var("ENV") {
            builder = builder.add_source(file(&env));
        }

        builder = builder.add_source(file("local")).add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let mut config: Config = builder.build()?.try_deserialize()?;
        config.apply_overrides(std::env::var(SECRET_ENV).ok(), std::env::var(PORT_ENV).ok())?;
        Ok(config)
    }

    fn apply_overrides(
        &mut self,
        secret: Option<String>,
        port: Option<String>,
    ) -> Result<(), ValidationError> {
        if let Some(secret) = secret {
            self.credentials.secret = secret;
        }
        if let Some(port) = port {
            self.server.port = port.trim().parse().map_err(|_| {
                ValidationError::server(format!("{PORT_ENV} must be a port number, got `{port}`"))
            })?;
        }
        Ok(())
    }
}
