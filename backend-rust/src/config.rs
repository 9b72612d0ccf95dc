//! Tracker configuration.
//!
//! Layering, lowest first: built-in defaults, `UWB_*` environment variables,
//! an optional TOML file, then explicit CLI flags (applied in `main`).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::state::DEFAULT_HISTORY_CAPACITY;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    /// Anchor layout + floorplan calibration (default `anchors.json`)
    pub anchors_file: PathBuf,
    /// Positions kept in the history (default 500)
    pub history_capacity: usize,
    /// Consumer drain cadence (default 200 ms)
    pub poll_interval_ms: u64,
    /// Pause between replayed log lines (default 10 ms)
    pub replay_delay_ms: u64,
    /// Query API listen address (default 0.0.0.0:5000)
    pub http_addr: SocketAddr,
    /// UDP port for live range lines (default 5555)
    pub udp_port: u16,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::builtin().with_env(|key| std::env::var(key).ok())
    }
}

impl TrackerConfig {
    /// Defaults without any environment lookups.
    pub fn builtin() -> Self {
        Self {
            anchors_file: PathBuf::from("anchors.json"),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            poll_interval_ms: 200,
            replay_delay_ms: 10,
            http_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            udp_port: 5555,
        }
    }

    /// Override fields from `UWB_*` variables. Unparseable values are ignored.
    pub fn with_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(v: Option<String>) -> Option<T> {
            v.and_then(|s| s.trim().parse().ok())
        }

        if let Some(v) = var("UWB_ANCHORS_FILE").filter(|s| !s.is_empty()) {
            self.anchors_file = PathBuf::from(v);
        }
        self.history_capacity = parsed(var("UWB_HISTORY")).unwrap_or(self.history_capacity);
        self.poll_interval_ms = parsed(var("UWB_POLL_MS")).unwrap_or(self.poll_interval_ms);
        self.replay_delay_ms = parsed(var("UWB_REPLAY_DELAY_MS")).unwrap_or(self.replay_delay_ms);
        self.http_addr = parsed(var("UWB_HTTP_ADDR")).unwrap_or(self.http_addr);
        self.udp_port = parsed(var("UWB_UDP_PORT")).unwrap_or(self.udp_port);
        self
    }

    /// Defaults + env, then the TOML file at `path` if given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Self::default().validate();
        };
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }

    /// Fields absent from `text` keep their default (env included).
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()
    }

    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "history_capacity",
                reason: "must be at least 1".into(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                reason: "must be at least 1".into(),
            });
        }
        Ok(self)
    }

    pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms) }

    pub fn replay_delay(&self) -> Duration { Duration::from_millis(self.replay_delay_ms) }

    pub fn udp_addr(&self) -> SocketAddr { SocketAddr::from(([0, 0, 0, 0], self.udp_port)) }
}
