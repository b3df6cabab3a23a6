//! Controller settings
//!
//! Sources, lowest precedence first: built-in defaults, a TOML file,
//! `CAPSULE_*` environment variables, command line overrides.

use crate::error::{Error, Result};
use crate::logging::LogConfig;
use crate::operator::{ManagerSettings, DEFAULT_CONFIGURATION_NAME};
use config::{Config, Environment, File, Value};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// File looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "capsule-config";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CAPSULE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Name of the CapsuleConfiguration instance to reconcile
    pub configuration_name: String,

    /// Periodic resync of the watched objects, 0 disables it
    pub resync_interval_secs: u64,

    /// Upper bound for a single reconciliation
    pub reconcile_timeout_secs: u64,

    /// Delay before a retryable failure is reconciled again
    pub error_requeue_secs: u64,

    pub logging: LogConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            configuration_name: DEFAULT_CONFIGURATION_NAME.to_string(),
            resync_interval_secs: 0,
            reconcile_timeout_secs: 30,
            error_requeue_secs: 60,
            logging: LogConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then(|| Duration::from_secs(self.resync_interval_secs))
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            reconcile_timeout: self.reconcile_timeout(),
            error_requeue: self.error_requeue(),
            resync_interval: self.resync_interval(),
        }
    }

    /// Reject settings the controller cannot run with.
    ///
    /// An empty configuration name is accepted: the controller then idles.
    pub fn validate(&self) -> Result<()> {
        if self.reconcile_timeout_secs == 0 {
            return Err(Error::InvalidConfiguration(
                "reconcile_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.error_requeue_secs == 0 {
            return Err(Error::InvalidConfiguration(
                "error_requeue_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings loader (builder pattern)
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_file: Option<PathBuf>,
    load_env: bool,
    overrides: Vec<(String, Value)>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read settings from `path`. Without one, an optional `capsule-config.*`
    /// in the working directory is used.
    pub fn load_from_file(mut self, path: Option<impl Into<PathBuf>>) -> Self {
        self.config_file = path.map(Into::into);
        self
    }

    /// Read `CAPSULE_*` environment variables
    pub fn load_from_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Override a single key, for command line arguments. `None` is ignored.
    pub fn with_override<V: Into<Value>>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.overrides.push((key.to_string(), value.into()));
        }
        self
    }

    /// Merge every source and validate the result
    pub fn build(self) -> Result<ControllerConfig> {
        let mut builder = Config::builder().add_source(Config::try_from(&ControllerConfig::default())?);

        builder = match &self.config_file {
            Some(path) => builder.add_source(File::from(path.as_path()).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        if self.load_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        for (key, value) in self.overrides {
            builder = builder.set_override(key, value)?;
        }

        let config: ControllerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}
