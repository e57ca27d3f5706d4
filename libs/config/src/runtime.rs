//! Runtime configuration
//!
//! Environment-boundary settings for a Hive process. All keys are optional;
//! the defaults run a service against a local broker with console logging.
//!
//! | Variable                | Default | Meaning                              |
//! |-------------------------|---------|--------------------------------------|
//! | `HIVE_NAMESPACE`        | `hive`  | leading topic-path segment           |
//! | `HIVE_LOG_LEVEL`        | `info`  | base log verbosity                   |
//! | `HIVE_LOG_LEVEL_ACTOR`  | unset   | override for the actor subsystem     |
//! | `HIVE_LOG_TRANSPORT`    | `false` | also publish log lines to the `/log` topic |
//! | `HIVE_TRANSPORT`        | `mqtt`  | transport name used in announcements |

use anyhow::{Context, Result};
use config_crate::{Config, Environment};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Process-level configuration, read once at startup
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Leading segment of every topic path
    #[serde(default = "defaults::namespace")]
    pub namespace: String,

    /// Base log verbosity (tracing filter directive)
    #[serde(default = "defaults::log_level")]
    pub log_level: String,

    /// Optional override for the actor subsystem's verbosity
    #[serde(default)]
    pub log_level_actor: Option<String>,

    /// Publish log lines to the service's `/log` topic as well as the console
    #[serde(default)]
    pub log_transport: bool,

    /// Transport name advertised in registrar announcements
    #[serde(default = "defaults::transport")]
    pub transport: String,
}

mod defaults {
    pub fn namespace() -> String {
        "hive".to_string()
    }

    pub fn log_level() -> String {
        "info".to_string()
    }

    pub fn transport() -> String {
        "mqtt".to_string()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            namespace: defaults::namespace(),
            log_level: defaults::log_level(),
            log_level_actor: None,
            log_transport: false,
            transport: defaults::transport(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from `HIVE_*` environment variables
    pub fn from_env() -> Result<Self> {
        let config = Config::builder()
            .add_source(Environment::with_prefix("HIVE").try_parsing(true))
            .build()
            .context("Failed to build configuration from environment")?;

        let runtime: Self = config
            .try_deserialize()
            .context("Failed to deserialize HIVE_* configuration")?;
        debug!(
            namespace = %runtime.namespace,
            log_level = %runtime.log_level,
            log_transport = runtime.log_transport,
            transport = %runtime.transport,
            "Loaded runtime configuration"
        );
        Ok(runtime)
    }

    /// Filter directive string for the tracing subscriber
    ///
    /// The actor-subsystem override, when present, is appended after the
    /// base level so it wins for `actors::*` targets.
    pub fn log_directives(&self) -> String {
        match &self.log_level_actor {
            Some(actor_level) => format!("{},actors={}", self.log_level, actor_level),
            None => self.log_level.clone(),
        }
    }
}
