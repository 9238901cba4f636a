// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dalledress::OrchestratorOptions;
use inflight::ManagerOptions;
use serde::Deserialize;

/// Environment variable naming a JSON configuration file.
pub const CONFIG_ENV: &str = "DALLEDRESS_CONFIG";
/// Environment variable overriding [`ServerConfig::port`].
pub const PORT_ENV: &str = "DALLEDRESS_PORT";
/// Environment variable overriding [`ServerConfig::data_dir`].
pub const DATA_DIR_ENV: &str = "DALLEDRESS_DATA_DIR";

/// Why the configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read configuration file {}: {source}", path.display())]
    Read {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`ServerConfig`].
    #[error("invalid configuration file {}: {source}", path.display())]
    Parse {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The port override is not a port number.
    #[error("invalid port '{0}'")]
    InvalidPort(String),
}

/// Settings of the HTTP server.
///
/// Every field is optional in the configuration file; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct ServerConfig {
    /// TCP port to listen on.
    pub port: u16,
    /// Directory holding generated artifacts under `output/`.
    pub data_dir: PathBuf,
    /// Accepted series. Empty accepts any well-formed series.
    pub series: Vec<String>,
    /// Most generations tracked at once; zero disables the limit.
    pub max_contexts: usize,
    /// Seconds a finished generation stays visible; zero disables expiry.
    pub context_ttl_secs: u64,
    /// Deadline of a single generation attempt, in seconds.
    pub attempt_timeout_secs: u64,
    /// Seconds between background eviction sweeps.
    pub sweep_interval_secs: u64,
    /// Milliseconds between status reports of active generations.
    pub status_interval_ms: u64,
    /// Milliseconds each simulated generation step takes.
    pub step_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            data_dir: PathBuf::from("data"),
            series: Vec::new(),
            max_contexts: 1000,
            context_ttl_secs: 600,
            attempt_timeout_secs: 120,
            sweep_interval_secs: 60,
            status_interval_ms: 2000,
            step_ms: 500,
        }
    }
}

impl ServerConfig {
    /// Loads the configuration from the environment.
    ///
    /// Reads the file named by `DALLEDRESS_CONFIG` if set, then applies `DALLEDRESS_PORT`
    /// and `DALLEDRESS_DATA_DIR`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or parsed, or the port override is
    /// not a number.
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let port = std::env::var(PORT_ENV).ok();
        let data_dir = std::env::var_os(DATA_DIR_ENV).map(PathBuf::from);

        Self::from_sources(file.as_deref(), port.as_deref(), data_dir)
    }

    /// Builds the configuration from an optional file and optional overrides.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn from_sources(file: Option<&Path>, port: Option<&str>, data_dir: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(port) = port.map(str::trim).filter(|p| !p.is_empty()) {
            config.port = port.parse().map_err(|_parse| ConfigError::InvalidPort(port.to_string()))?;
        }
        if let Some(data_dir) = data_dir {
            config.data_dir = data_dir;
        }

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The orchestrator settings described by this configuration.
    #[must_use]
    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions::default()
            .series(&self.series)
            .manager(ManagerOptions::new(self.max_contexts, Duration::from_secs(self.context_ttl_secs)))
            .attempt_timeout(Duration::from_secs(self.attempt_timeout_secs))
    }

    /// Interval between eviction sweeps.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Interval between status reports.
    #[must_use]
    pub const fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    /// Duration of each simulated generation step.
    #[must_use]
    pub const fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }
}
