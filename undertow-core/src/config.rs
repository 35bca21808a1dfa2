//! Centralized configuration for Undertow.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all Undertow components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct UndertowConfig {
    pub session: SessionConfig,
    pub server: ServerConfig,
    pub subtitles: SubtitleConfig,
}

/// Session lifecycle configuration.
///
/// Controls where transfer data lands and how long idle sessions survive.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Scratch directory; each session owns `<data_dir>/<info_hash>`
    pub data_dir: PathBuf,
    /// How long to wait for transfer metadata before giving up
    pub metadata_timeout: Duration,
    /// Idle time after which a session is swept
    pub max_age: Duration,
    /// Period of the background sweep
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/tmp/undertow"),
            metadata_timeout: Duration::from_secs(60),
            max_age: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest subtitle upload accepted
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_upload_bytes: 10 * 1024 * 1024, // 10 MiB
        }
    }
}

/// Remote subtitle search configuration.
#[derive(Debug, Clone)]
pub struct SubtitleConfig {
    /// OpenSubtitles API key; searches fail with "not configured" when unset
    pub api_key: Option<String>,
    pub base_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
    /// Largest subtitle file fetched from a download link
    pub max_download_bytes: usize,
    pub default_language: String,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.opensubtitles.com/api/v1".to_string(),
            user_agent: "undertow v0.1.0".to_string(),
            request_timeout: Duration::from_secs(15),
            max_download_bytes: 10 * 1024 * 1024, // 10 MiB
            default_language: "en".to_string(),
        }
    }
}

impl UndertowConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("UNDERTOW_DATA_DIR").filter(|dir| !dir.is_empty()) {
            config.session.data_dir = PathBuf::from(dir);
        }

        if let Some(port) = lookup("UNDERTOW_PORT").and_then(|port| port.parse().ok()) {
            config.server.port = port;
        }

        if let Some(seconds) =
            lookup("UNDERTOW_METADATA_TIMEOUT").and_then(|seconds| seconds.parse::<u64>().ok())
        {
            config.session.metadata_timeout = Duration::from_secs(seconds);
        }

        if let Some(hours) =
            lookup("UNDERTOW_MAX_AGE_HOURS").and_then(|hours| hours.parse::<u64>().ok())
        {
            config.session.max_age = Duration::from_secs(hours * 60 * 60);
        }

        if let Some(key) = lookup("OPENSUBTITLES_API_KEY").filter(|key| !key.is_empty()) {
            config.subtitles.api_key = Some(key);
        }

        config
    }

    /// Creates a configuration optimized for testing.
    pub fn for_testing() -> Self {
        Self {
            session: SessionConfig {
                data_dir: std::env::temp_dir().join("undertow-test"),
                metadata_timeout: Duration::from_secs(5),
                max_age: Duration::from_secs(60 * 60),
                sweep_interval: Duration::from_secs(60),
            },
            server: ServerConfig {
                port: 0,
                ..ServerConfig::default()
            },
            subtitles: SubtitleConfig::default(),
        }
    }
}
