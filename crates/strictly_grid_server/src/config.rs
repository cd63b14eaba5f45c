//! Server configuration.

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use strictly_grid::{MAX_BOARD_SIZE, MIN_BOARD_SIZE};
use tracing::{debug, info, instrument};

/// What happens to a match when a participant's connection drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DisconnectPolicy {
    /// Hold the slot for the grace period and allow a reconnect.
    Grace,
    /// End the match at once.
    Immediate,
}

/// Configuration for the game server.
#[derive(Debug, Clone, PartialEq, Getters, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    port: u16,

    /// Board edge used when a join does not request one.
    #[serde(default = "default_board_size")]
    default_board_size: usize,

    /// Largest board edge a join may request.
    #[serde(default = "default_max_board_size")]
    max_board_size: usize,

    /// Seconds a disconnected slot is held open.
    #[serde(default = "default_grace_period_secs")]
    grace_period_secs: u64,

    /// Disconnect handling.
    #[serde(default = "default_disconnect_policy")]
    disconnect_policy: DisconnectPolicy,

    /// Delay before the computer answers a move.
    #[serde(default = "default_ai_think_delay_ms")]
    ai_think_delay_ms: u64,

    /// Display name of the computer player.
    #[serde(default = "default_ai_name")]
    ai_name: String,

    /// Allow single-player games on boards larger than 3x3 (random opponent).
    #[serde(default)]
    ai_any_size: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_board_size() -> usize {
    MIN_BOARD_SIZE
}

fn default_max_board_size() -> usize {
    10
}

fn default_grace_period_secs() -> u64 {
    15
}

fn default_disconnect_policy() -> DisconnectPolicy {
    DisconnectPolicy::Grace
}

fn default_ai_think_delay_ms() -> u64 {
    600
}

fn default_ai_name() -> String {
    "Computer".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            default_board_size: default_board_size(),
            max_board_size: default_max_board_size(),
            grace_period_secs: default_grace_period_secs(),
            disconnect_policy: default_disconnect_policy(),
            ai_think_delay_ms: default_ai_think_delay_ms(),
            ai_name: default_ai_name(),
            ai_any_size: false,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_toml_str(&content)?;
        info!(port = config.port, policy = %config.disconnect_policy, "Config loaded successfully");
        Ok(config)
    }

    /// Parses and validates configuration from TOML text.
    #[instrument(skip(content))]
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads from `path` if it exists, otherwise returns defaults.
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) if path.exists() => Self::from_file(path),
            Some(path) => {
                info!(
                    "Config file not found at {}, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Checks that sizes and limits are coherent.
    #[instrument(skip(self))]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_BOARD_SIZE..=MAX_BOARD_SIZE).contains(&self.max_board_size) {
            return Err(ConfigError::new(format!(
                "max_board_size must be within {}..={}, got {}",
                MIN_BOARD_SIZE, MAX_BOARD_SIZE, self.max_board_size
            )));
        }
        if !(MIN_BOARD_SIZE..=self.max_board_size).contains(&self.default_board_size) {
            return Err(ConfigError::new(format!(
                "default_board_size must be within {}..={}, got {}",
                MIN_BOARD_SIZE, self.max_board_size, self.default_board_size
            )));
        }
        Ok(())
    }

    /// Applies command-line overrides.
    #[instrument(skip(self))]
    pub fn with_overrides(
        mut self,
        host: Option<String>,
        port: Option<u16>,
        disconnect_policy: Option<DisconnectPolicy>,
    ) -> Self {
        if let Some(host) = host {
            debug!(%host, "Overriding host");
            self.host = host;
        }
        if let Some(port) = port {
            debug!(port, "Overriding port");
            self.port = port;
        }
        if let Some(policy) = disconnect_policy {
            debug!(%policy, "Overriding disconnect policy");
            self.disconnect_policy = policy;
        }
        self
    }

    /// `host:port` for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Grace period as a duration.
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// AI thinking delay as a duration.
    pub fn ai_think_delay(&self) -> Duration {
        Duration::from_millis(self.ai_think_delay_ms)
    }

    /// Whether a board edge may be requested by a join.
    pub fn allows_board_size(&self, size: usize) -> bool {
        (MIN_BOARD_SIZE..=self.max_board_size).contains(&size)
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
