// Configuration File Support
//
// This module provides configuration file parsing for the opswatch monitor.
// Supports TOML format with environment variable overrides.
// Configuration files are loaded from the platform config directory: ~/.config/opswatch/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::csrf::token::{CSRF_HEADER, MIN_TOKEN_BYTES};
use crate::rate_limit::RateLimitConfig;
use crate::realtime::CoalescePolicy;

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "OPSWATCH_";

/// Longest accepted refresh cadence (1 day)
pub const MAX_REFRESH_INTERVAL_SECS: u64 = 24 * 3600;
/// Longest accepted fetch or subscribe timeout (1 hour)
pub const MAX_TIMEOUT_SECS: u64 = 3600;
/// Longest accepted lookback (90 days)
pub const MAX_LOOKBACK_HOURS: u64 = 90 * 24;
/// Longest accepted coalescing window (1 minute)
pub const MAX_COALESCE_WINDOW_MS: u64 = 60_000;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Rate limiter configuration
    pub rate_limit: RateLimitConfig,

    /// Anti-forgery token configuration
    pub csrf: CsrfConfig,

    /// Snapshot refresh and change subscription configuration
    pub monitoring: MonitoringConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Anti-forgery token configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CsrfConfig {
    /// Header the token is attached under
    pub header_name: String,

    /// Random bytes per token
    pub token_bytes: usize,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            header_name: CSRF_HEADER.to_string(),
            token_bytes: MIN_TOKEN_BYTES,
        }
    }
}

/// Monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Fixed refresh cadence in seconds
    pub refresh_interval_secs: u64,

    /// Upper bound on one data fetch in seconds
    pub fetch_timeout_secs: u64,

    /// Upper bound on establishing the change subscription in seconds
    pub subscribe_timeout_secs: u64,

    /// Coalescing window in milliseconds (0 = one refresh per notification)
    pub coalesce_window_ms: u64,

    /// How far back records are fetched, in hours
    pub lookback_hours: u64,

    /// Maximum rows fetched per domain
    pub row_cap: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 60,
            fetch_timeout_secs: 5,
            subscribe_timeout_secs: 5,
            coalesce_window_ms: 250,
            lookback_hours: 24,
            row_cap: 50,
        }
    }
}

impl MonitoringConfig {
    /// Refresh cadence
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Fetch timeout
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Subscribe timeout
    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_secs(self.subscribe_timeout_secs)
    }

    /// Lookback window
    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_hours.saturating_mul(3600))
    }

    /// Coalescing policy
    pub fn coalesce_policy(&self) -> CoalescePolicy {
        CoalescePolicy::from_millis(self.coalesce_window_ms)
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to serve metrics over HTTP
    pub enabled: bool,

    /// Port for metrics server
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

impl Config {
    /// Load configuration from the default config directory
    ///
    /// If the config file does not exist, returns the default configuration
    /// with environment overrides applied.
    pub fn load() -> Result<Self> {
        Self::load_from_path(Self::config_path())
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if
    /// the resulting configuration is invalid.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Config::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/opswatch/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("dev", "opswatch", "opswatch") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config").join("opswatch").join("config.toml")
        }
    }

    /// Apply `OPSWATCH_*` environment variable overrides
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|name| std::env::var(format!("{}{}", ENV_PREFIX, name)).ok())
    }

    /// Apply overrides from `lookup`, keyed by variable name without prefix
    ///
    /// Unparseable values are ignored and the current value kept:
    /// - LOG_LEVEL, LOG_FORMAT
    /// - RATE_LIMIT_ENABLED, RATE_LIMIT_MAX, RATE_LIMIT_WINDOW_SECS
    /// - REFRESH_INTERVAL_SECS, COALESCE_WINDOW_MS
    /// - METRICS_ENABLED, METRICS_PORT
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
            value.and_then(|v| v.trim().parse().ok())
        }

        // Logging overrides
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = format;
        }

        // Rate limit overrides
        if let Some(enabled) = parsed(lookup("RATE_LIMIT_ENABLED")) {
            self.rate_limit.enabled = enabled;
        }
        if let Some(max) = parsed::<u32>(lookup("RATE_LIMIT_MAX")) {
            if max > 0 {
                self.rate_limit.default_max_requests = max;
            }
        }
        if let Some(secs) = parsed::<u64>(lookup("RATE_LIMIT_WINDOW_SECS")) {
            if secs > 0 {
                self.rate_limit.default_window_secs = secs;
            }
        }

        // Monitoring overrides
        if let Some(secs) = parsed::<u64>(lookup("REFRESH_INTERVAL_SECS")) {
            if secs > 0 {
                self.monitoring.refresh_interval_secs = secs;
            }
        }
        if let Some(ms) = parsed(lookup("COALESCE_WINDOW_MS")) {
            self.monitoring.coalesce_window_ms = ms;
        }

        // Metrics overrides
        if let Some(enabled) = parsed(lookup("METRICS_ENABLED")) {
            self.metrics.enabled = enabled;
        }
        if let Some(port) = parsed(lookup("METRICS_PORT")) {
            self.metrics.port = port;
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        self.rate_limit.validate()?;

        if self.csrf.header_name.trim().is_empty() {
            anyhow::bail!("CSRF header name must not be empty");
        }
        if self.csrf.token_bytes < MIN_TOKEN_BYTES {
            anyhow::bail!("CSRF tokens must carry at least {} bytes of entropy", MIN_TOKEN_BYTES);
        }

        let monitoring = &self.monitoring;
        if monitoring.refresh_interval_secs == 0 || monitoring.refresh_interval_secs > MAX_REFRESH_INTERVAL_SECS {
            anyhow::bail!(
                "Refresh interval must be between 1 and {} seconds",
                MAX_REFRESH_INTERVAL_SECS
            );
        }
        for timeout in [monitoring.fetch_timeout_secs, monitoring.subscribe_timeout_secs] {
            if timeout == 0 || timeout > MAX_TIMEOUT_SECS {
                anyhow::bail!(
                    "Fetch and subscribe timeouts must be between 1 and {} seconds",
                    MAX_TIMEOUT_SECS
                );
            }
        }
        if monitoring.lookback_hours == 0 || monitoring.lookback_hours > MAX_LOOKBACK_HOURS {
            anyhow::bail!("Lookback window must be between 1 and {} hours", MAX_LOOKBACK_HOURS);
        }
        if monitoring.coalesce_window_ms > MAX_COALESCE_WINDOW_MS {
            anyhow::bail!("Coalesce window must be at most {} ms", MAX_COALESCE_WINDOW_MS);
        }
        if monitoring.row_cap == 0 {
            anyhow::bail!("Row cap must be > 0");
        }

        if self.metrics.port == 0 {
            anyhow::bail!("Metrics port must be > 0");
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}
