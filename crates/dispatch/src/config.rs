use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::wire::DEFAULT_MAX_FRAME_BYTES;

// ── Top-level config ────────────────────────────────────────────────

/// Configuration for the task-dispatch layer.
///
/// Usually embedded as the `[dispatch]` table of an application config, with
/// environment variable overrides applied after parsing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Listener settings for the manager.
    #[serde(default)]
    pub manager: ManagerConfig,

    /// Framing limits shared by both ends of a connection.
    #[serde(default)]
    pub wire: WireConfig,
}

// ── Section configs ─────────────────────────────────────────────────

/// Manager section: where to listen and how many sessions to serve at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Interface to bind the listener on.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on. `0` picks an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on concurrently served sessions. Unset = one session per
    /// connection with no limit.
    #[serde(default)]
    pub max_sessions: Option<usize>,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    5570
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_sessions: None,
        }
    }
}

impl ManagerConfig {
    /// `host:port` string handed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Wire section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireConfig {
    /// Largest accepted frame payload in bytes.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

// ── Loading & Validation ────────────────────────────────────────────

impl DispatchConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, DispatchError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DispatchError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults with the manager listening on `127.0.0.1:port`.
    pub fn local(port: u16) -> Self {
        Self {
            manager: ManagerConfig {
                host: "127.0.0.1".into(),
                port,
                max_sessions: None,
            },
            wire: WireConfig::default(),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Convention: `TASKFARM_SECTION_KEY` overrides `section.key`:
    /// - `TASKFARM_MANAGER_HOST` → `manager.host`
    /// - `TASKFARM_MANAGER_PORT` → `manager.port`
    /// - `TASKFARM_MANAGER_MAX_SESSIONS` → `manager.max_sessions`
    /// - `TASKFARM_WIRE_MAX_FRAME_BYTES` → `wire.max_frame_bytes`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TASKFARM_MANAGER_HOST") {
            self.manager.host = v;
        }
        if let Ok(v) = std::env::var("TASKFARM_MANAGER_PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.manager.port = port;
            }
        }
        if let Ok(v) = std::env::var("TASKFARM_MANAGER_MAX_SESSIONS") {
            if let Ok(limit) = v.parse::<usize>() {
                self.manager.max_sessions = Some(limit);
            }
        }
        if let Ok(v) = std::env::var("TASKFARM_WIRE_MAX_FRAME_BYTES") {
            if let Ok(bytes) = v.parse::<usize>() {
                self.wire.max_frame_bytes = bytes;
            }
        }
    }

    /// Validate value ranges.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.manager.host.trim().is_empty() {
            return Err(DispatchError::Config("manager.host must not be empty".into()));
        }
        if self.manager.max_sessions == Some(0) {
            return Err(DispatchError::Config(
                "manager.max_sessions must be at least 1 when set".into(),
            ));
        }
        let max = self.wire.max_frame_bytes;
        if max == 0 || max > u32::MAX as usize {
            return Err(DispatchError::Config(format!(
                "wire.max_frame_bytes must be between 1 and {}, got {max}",
                u32::MAX
            )));
        }
        Ok(())
    }
}
