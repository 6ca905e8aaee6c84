//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [session]          # store behaviour and key namespacing
//! [session.retry]    # CAS retry bound and backoff
//! [logging]          # optional file log sink
//! [client]           # passed through to the cache client untouched
//! ```

use std::path::PathBuf;
use std::time::Duration;

use casket_session::{CompressionType, KeyPrefixes, ProviderSettings, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// Every section is optional in the file and falls back to its defaults.
/// Keys that are not part of the schema are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CasketConfig {
    /// Session store configuration.
    pub session: SessionConfig,

    /// Log sink configuration.
    pub logging: LoggingConfig,

    /// Cache client settings. Not interpreted here.
    pub client: toml::Table,
}

impl CasketConfig {
    /// Create a config with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: CasketConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check values that parse but cannot be used.
    pub fn validate(&self) -> Result<()> {
        self.session.compression()?;
        self.session.retry.validate()?;
        self.logging.validate()
    }

    /// Settings for the session store.
    pub fn provider_settings(&self) -> Result<ProviderSettings> {
        self.session.to_provider_settings()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Session store configuration.
///
/// ```toml
/// [session]
/// exclusive_access = true
/// compress = true
/// compression_type = "quicklz"
/// site_name = "Default Web Site"
/// app_path = "/"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Lock sessions for the duration of a request.
    pub exclusive_access: bool,
    /// Compress session bodies.
    pub compress: bool,
    /// Codec used when `compress` is on: none, gzip, lz4 or quicklz.
    pub compression_type: String,
    /// Site name used to namespace cache keys.
    pub site_name: String,
    /// Application path used to namespace cache keys.
    pub app_path: String,
    /// CAS retry settings.
    pub retry: RetryConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            exclusive_access: true,
            compress: false,
            compression_type: CompressionType::default().to_string(),
            site_name: String::new(),
            app_path: "/".to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl SessionConfig {
    /// The configured codec, parsed.
    pub fn compression(&self) -> Result<CompressionType> {
        self.compression_type
            .parse()
            .map_err(|e: casket_session::CodecError| {
                ConfigError::invalid("session.compression_type", e.to_string())
            })
    }

    /// Convert into the immutable settings the store runs with.
    pub fn to_provider_settings(&self) -> Result<ProviderSettings> {
        let mut settings = ProviderSettings::new()
            .with_exclusive_access(self.exclusive_access)
            .with_keys(KeyPrefixes::new(&self.site_name, &self.app_path))
            .with_retry(self.retry.to_policy()?);
        settings.compression_type = self.compression()?;
        settings.compress = self.compress;
        Ok(settings)
    }
}

/// CAS retry configuration.
///
/// ```toml
/// [session.retry]
/// max_attempts = 256
/// initial_backoff_ms = 1
/// max_backoff_ms = 50
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempts before a contended operation gives up.
    pub max_attempts: u32,
    /// Delay after the first conflict, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound on the delay between attempts, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: casket_session::DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: casket_session::DEFAULT_INITIAL_BACKOFF.as_millis() as u64,
            max_backoff_ms: casket_session::DEFAULT_MAX_BACKOFF.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "session.retry.max_attempts",
                "must be at least 1",
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::invalid(
                "session.retry.initial_backoff_ms",
                format!("must not exceed max_backoff_ms ({})", self.max_backoff_ms),
            ));
        }
        Ok(())
    }

    /// Convert into a [`RetryPolicy`].
    pub fn to_policy(&self) -> Result<RetryPolicy> {
        self.validate()?;
        Ok(RetryPolicy::default()
            .with_max_attempts(self.max_attempts)
            .with_backoff(
                Duration::from_millis(self.initial_backoff_ms),
                Duration::from_millis(self.max_backoff_ms),
            ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Log sink configuration.
///
/// ```toml
/// [logging]
/// enabled = true
/// filename = "logs/casket-session.log"
/// use_existing_config = false
/// level = "debug"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Write logs to `filename` in addition to the console.
    pub enabled: bool,
    /// Log file path.
    pub filename: PathBuf,
    /// The host already routes logs; do not install a file sink.
    pub use_existing_config: bool,
    /// Default level when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            filename: PathBuf::from("logs/casket-session.log"),
            use_existing_config: false,
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Whether a file sink should be installed.
    pub fn wants_file_sink(&self) -> bool {
        self.enabled && !self.use_existing_config
    }

    fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::invalid(
                "logging.level",
                format!("'{}' is not one of {}", self.level, LOG_LEVELS.join(", ")),
            ));
        }
        if self.enabled && self.filename.as_os_str().is_empty() {
            return Err(ConfigError::invalid(
                "logging.filename",
                "required when logging is enabled",
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
