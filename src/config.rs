// Config loader and validator.
//
// Loads dugout.yaml, applies defaults, and validates values into typed
// structs. Config comes through a `ConfigSource` so tests can inject
// content directly without touching disk.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::stream::SessionOptions;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// All errors that can occur during config loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config source: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// ConfigSource trait (interface-first, dependency injection)
// ---------------------------------------------------------------------------

/// Abstraction over where config YAML comes from.
///
/// `FileSource` reads from disk; `StringSource` provides content directly
/// (used in tests to avoid file I/O).
pub trait ConfigSource {
    fn load(&self) -> Result<String, ConfigError>;
}

/// Loads config from a file on disk.
pub struct FileSource {
    pub path: PathBuf,
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<String, ConfigError> {
        Ok(std::fs::read_to_string(&self.path)?)
    }
}

/// Provides config content directly as a string. Used for testing.
pub struct StringSource {
    pub content: String,
}

impl ConfigSource for StringSource {
    fn load(&self) -> Result<String, ConfigError> {
        Ok(self.content.clone())
    }
}

// ---------------------------------------------------------------------------
// Typed config
// ---------------------------------------------------------------------------

/// Top-level parsed and validated dugout config.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub stream: StreamConfig,
    pub upstream: UpstreamConfig,
}

/// HTTP surface settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on.
    pub port: u16,
    /// Sports accepted by the insights endpoint.
    pub supported_sports: Vec<String>,
}

/// Session streaming settings.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Idle gap after which a heartbeat is emitted.
    pub heartbeat_interval_secs: u64,
    /// Capacity of the per-session channels.
    pub channel_capacity: usize,
    /// Worker pool size: the deployment's maximum concurrent sessions.
    pub max_concurrent_sessions: usize,
}

/// Upstream generative API settings. The API key itself stays in the
/// environment, never in config.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 8000,
                supported_sports: default_sports(),
            },
            stream: StreamConfig {
                heartbeat_interval_secs: 10,
                channel_capacity: 64,
                max_concurrent_sessions: 5,
            },
            upstream: UpstreamConfig {
                base_url: default_base_url(),
                model: default_model(),
                api_key_env: default_api_key_env(),
            },
        }
    }
}

impl StreamConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            channel_capacity: self.channel_capacity,
        }
    }
}

// ---------------------------------------------------------------------------
// Raw deserialization types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    server: RawServer,
    #[serde(default)]
    stream: RawStream,
    #[serde(default)]
    upstream: RawUpstream,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawServer {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_sports")]
    supported_sports: Vec<String>,
}

impl Default for RawServer {
    fn default() -> Self {
        Self {
            port: default_port(),
            supported_sports: default_sports(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStream {
    #[serde(default = "default_heartbeat_secs")]
    heartbeat_interval_secs: u64,
    #[serde(default = "default_channel_capacity")]
    channel_capacity: usize,
    #[serde(default = "default_max_sessions")]
    max_concurrent_sessions: usize,
}

impl Default for RawStream {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_secs(),
            channel_capacity: default_channel_capacity(),
            max_concurrent_sessions: default_max_sessions(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawUpstream {
    #[serde(default = "default_base_url")]
    base_url: String,
    #[serde(default = "default_model")]
    model: String,
    #[serde(default = "default_api_key_env")]
    api_key_env: String,
}

impl Default for RawUpstream {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_port() -> u16 {
    8000
}

fn default_sports() -> Vec<String> {
    ["nba", "afl", "nrl", "epl", "ipl"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_heartbeat_secs() -> u64 {
    10
}

fn default_channel_capacity() -> usize {
    64
}

fn default_max_sessions() -> usize {
    5
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a dugout config from the given source.
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let raw: RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.stream.heartbeat_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "stream.heartbeat_interval_secs must be greater than zero".to_string(),
        ));
    }
    if raw.stream.channel_capacity == 0 {
        return Err(ConfigError::Validation(
            "stream.channel_capacity must be greater than zero".to_string(),
        ));
    }
    if raw.stream.max_concurrent_sessions == 0 {
        return Err(ConfigError::Validation(
            "stream.max_concurrent_sessions must be greater than zero".to_string(),
        ));
    }
    if raw.server.supported_sports.is_empty() {
        return Err(ConfigError::Validation(
            "server.supported_sports must not be empty".to_string(),
        ));
    }

    Ok(Config {
        server: ServerConfig {
            port: raw.server.port,
            supported_sports: raw.server.supported_sports,
        },
        stream: StreamConfig {
            heartbeat_interval_secs: raw.stream.heartbeat_interval_secs,
            channel_capacity: raw.stream.channel_capacity,
            max_concurrent_sessions: raw.stream.max_concurrent_sessions,
        },
        upstream: UpstreamConfig {
            base_url: raw.upstream.base_url,
            model: raw.upstream.model,
            api_key_env: raw.upstream.api_key_env,
        },
    })
}
