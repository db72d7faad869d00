//! Configuration file parser for `budevents.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use crate::feed::{FeedClient, ListenerCursor, StreamSource};
use crate::util::validate_base_url;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// Parsed fine but describes something that cannot run.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of sections can be given.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client: ClientConfig,
    pub server: ServerConfig,
    /// Feeds consumed by `consume`, in order.
    pub listeners: Vec<ListenerCursor>,
    /// Feeds merged by `aggregate`.
    pub streams: Vec<StreamSource>,
}

/// Outbound HTTP settings shared by every feed fetch.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub timeout_secs: u64,
    pub max_document_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_document_bytes: crate::feed::DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }
}

impl ClientConfig {
    pub fn feed_client(&self) -> Result<FeedClient, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("budevents/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(FeedClient::new(http)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_max_document_bytes(self.max_document_bytes))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the `serve` and `aggregate` roles bind to.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 4] = ["client", "server", "listeners", "streams"];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to bound memory use
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            listeners = config.listeners.len(),
            streams = config.streams.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Checks what serde cannot: URLs, paths and intervals.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for listener in &self.listeners {
            check_feed(&listener.base_url, &listener.well_known_path)?;
            if listener.poll_interval.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "listener {}: poll_interval must be greater than zero",
                    listener.base_url
                )));
            }
        }
        for stream in &self.streams {
            check_feed(&stream.base_url, &stream.well_known_path)?;
        }
        if self.client.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "client.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_feed(base_url: &str, well_known_path: &str) -> Result<(), ConfigError> {
    validate_base_url(base_url)
        .map_err(|e| ConfigError::Invalid(format!("base_url {:?}: {}", base_url, e)))?;
    if !well_known_path.starts_with('/') {
        return Err(ConfigError::Invalid(format!(
            "{}: well_known_path {:?} must start with '/'",
            base_url, well_known_path
        )));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
