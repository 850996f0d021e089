//! Client configuration parsing and validation.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::rpc::codec::DEFAULT_MAX_LINE_BYTES;
use crate::rpc::transport::TransportOptions;
use crate::{ClientError, Result};

/// Environment variable that overrides `[launch] binary`.
pub const BINARY_ENV_VAR: &str = "AGENT_CONDUIT_BINARY";

/// Smallest accepted `[framing] max_line_bytes`.
pub const MIN_LINE_BYTES: usize = 1024;

/// Environment variables the app server inherits by default.
///
/// Everything else is stripped with `env_clear()` before launch; API keys the
/// server needs must be named in `inherit_env` or set through `env`.
pub const DEFAULT_INHERITED_ENV: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// How to launch the app server process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct LaunchConfig {
    /// Executable name or path.
    pub binary: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Working directory; inherited from the caller when unset.
    pub cwd: Option<PathBuf>,
    /// Names of variables copied from the caller's environment.
    pub inherit_env: Vec<String>,
    /// Extra variables set explicitly.
    pub env: BTreeMap<String, String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            binary: "codex".into(),
            args: vec!["app-server".into()],
            cwd: None,
            inherit_env: DEFAULT_INHERITED_ENV.iter().map(|&v| v.to_owned()).collect(),
            env: BTreeMap::new(),
        }
    }
}

/// Identity reported in the `initialize` handshake.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct ClientInfoConfig {
    /// Client name.
    pub name: String,
    /// Optional display title.
    pub title: Option<String>,
    /// Client version.
    pub version: String,
}

impl Default for ClientInfoConfig {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").into(),
            title: Some("Agent Conduit".into()),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Deadlines, in seconds.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Ordinary request deadline.
    #[serde(default = "default_request_seconds")]
    pub request_seconds: u64,
    /// Deadline for turn, review and command execution requests.
    #[serde(default = "default_long_running_seconds")]
    pub long_running_seconds: u64,
    /// Grace period between closing stdin and killing the process.
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_seconds: default_request_seconds(),
            long_running_seconds: default_long_running_seconds(),
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
        }
    }
}

fn default_request_seconds() -> u64 {
    30
}

fn default_long_running_seconds() -> u64 {
    300
}

fn default_shutdown_grace_seconds() -> u64 {
    5
}

/// Inbound framing limits.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct FramingConfig {
    /// Maximum accepted line length in bytes.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

fn default_max_line_bytes() -> usize {
    DEFAULT_MAX_LINE_BYTES
}

/// Configuration parsed from `agent-conduit.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClientConfig {
    /// Process launch settings.
    #[serde(default)]
    pub launch: LaunchConfig,
    /// Handshake identity.
    #[serde(default)]
    pub client: ClientInfoConfig,
    /// Request and shutdown deadlines.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Framing limits.
    #[serde(default)]
    pub framing: FramingConfig,
}

impl ClientConfig {
    /// Load configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the file cannot be read or parsed, or
    /// fails validation.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|err| ClientError::Config(format!("failed to read {}: {err}", path.display())))?;
        let config = Self::from_toml_str(&raw)?;
        info!(path = %path.display(), binary = config.launch.binary.as_str(), "configuration loaded");
        Ok(config)
    }

    /// Parse configuration from a TOML string, apply the environment
    /// override and validate.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Replace the launch binary with `AGENT_CONDUIT_BINARY` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(binary) = env::var(BINARY_ENV_VAR) {
            if !binary.trim().is_empty() {
                self.launch.binary = binary;
            }
        }
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.launch.binary.trim().is_empty() {
            return Err(ClientError::Config("launch.binary must not be empty".into()));
        }
        if self.client.name.trim().is_empty() {
            return Err(ClientError::Config("client.name must not be empty".into()));
        }
        for (field, value) in [
            ("timeouts.request_seconds", self.timeouts.request_seconds),
            ("timeouts.long_running_seconds", self.timeouts.long_running_seconds),
        ] {
            if value == 0 {
                return Err(ClientError::Config(format!("{field} must be greater than 0")));
            }
        }
        if self.framing.max_line_bytes < MIN_LINE_BYTES {
            return Err(ClientError::Config(format!(
                "framing.max_line_bytes must be at least {MIN_LINE_BYTES}"
            )));
        }
        Ok(())
    }

    /// Transport tunables derived from this configuration.
    #[must_use]
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            request_timeout: Duration::from_secs(self.timeouts.request_seconds),
            long_running_timeout: Duration::from_secs(self.timeouts.long_running_seconds),
            shutdown_grace: Duration::from_secs(self.timeouts.shutdown_grace_seconds),
            max_line_bytes: self.framing.max_line_bytes,
            ..TransportOptions::default()
        }
    }
}
