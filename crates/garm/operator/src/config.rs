//! Configuration for garm-operator

use crate::error::{OperatorError, OperatorResult};
use garm_client::GarmClientConfig;
use garm_reconciler::{Backoff, ReconcilerConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main operator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Backend connection
    #[serde(default)]
    pub garm: GarmConfig,

    /// Reconciliation settings
    #[serde(default)]
    pub operator: ReconcileSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// GARM server connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GarmConfig {
    /// Base URL of the GARM API
    #[serde(default)]
    pub server_url: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Pre-issued token; skips login when set
    #[serde(default)]
    pub token: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for GarmConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            username: String::new(),
            password: String::new(),
            token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Reconciliation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileSettings {
    /// Periodic resync of healthy pools in seconds
    #[serde(default = "default_sync_period")]
    pub sync_period_secs: u64,

    /// Concurrent passes per controller
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Idle runners younger than this are never evicted
    #[serde(default = "default_min_idle_runner_age")]
    pub min_idle_runner_age_secs: u64,

    /// Runner poll interval in seconds
    #[serde(default = "default_runner_poll_interval")]
    pub runner_poll_interval_secs: u64,

    /// Deadline of one reconcile pass in seconds
    #[serde(default = "default_reconcile_timeout")]
    pub reconcile_timeout_secs: u64,

    /// Retry interval while a scope has no backend ID
    #[serde(default = "default_scope_retry")]
    pub scope_retry_secs: u64,

    /// First retry delay after a failed pass
    #[serde(default = "default_backoff_base")]
    pub backoff_base_millis: u64,

    /// Retry delay cap
    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,

    /// YAML manifests loaded into the store at startup
    #[serde(default)]
    pub manifests: Vec<String>,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            sync_period_secs: default_sync_period(),
            workers: default_workers(),
            min_idle_runner_age_secs: default_min_idle_runner_age(),
            runner_poll_interval_secs: default_runner_poll_interval(),
            reconcile_timeout_secs: default_reconcile_timeout(),
            scope_retry_secs: default_scope_retry(),
            backoff_base_millis: default_backoff_base(),
            backoff_max_secs: default_backoff_max(),
            manifests: Vec::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_request_timeout() -> u64 {
    30
}

fn default_sync_period() -> u64 {
    300
}

fn default_workers() -> usize {
    4
}

fn default_min_idle_runner_age() -> u64 {
    300
}

fn default_runner_poll_interval() -> u64 {
    5
}

fn default_reconcile_timeout() -> u64 {
    60
}

fn default_scope_retry() -> u64 {
    10
}

fn default_backoff_base() -> u64 {
    500
}

fn default_backoff_max() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

impl OperatorConfig {
    /// Load configuration: defaults, then the file, then `GARM_OPERATOR_*`
    ///
    /// Nested keys use a double underscore, e.g.
    /// `GARM_OPERATOR_GARM__SERVER_URL`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&OperatorConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("GARM_OPERATOR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Reject settings the operator cannot run with
    pub fn validate(&self) -> OperatorResult<()> {
        if self.garm.server_url.trim().is_empty() {
            return Err(OperatorError::Config("garm.server_url is required".into()));
        }
        if self.garm.token.is_none() && self.garm.username.is_empty() {
            return Err(OperatorError::Config(
                "either garm.token or garm.username/password must be set".into(),
            ));
        }
        if self.operator.workers == 0 {
            return Err(OperatorError::Config("operator.workers must be at least 1".into()));
        }
        for (name, value) in [
            ("operator.sync_period_secs", self.operator.sync_period_secs),
            (
                "operator.runner_poll_interval_secs",
                self.operator.runner_poll_interval_secs,
            ),
            ("operator.reconcile_timeout_secs", self.operator.reconcile_timeout_secs),
            ("garm.request_timeout_secs", self.garm.request_timeout_secs),
        ] {
            if value == 0 {
                return Err(OperatorError::Config(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    pub fn client_config(&self) -> GarmClientConfig {
        GarmClientConfig {
            base_url: self.garm.server_url.clone(),
            username: self.garm.username.clone(),
            password: self.garm.password.clone(),
            token: self.garm.token.clone().filter(|t| !t.is_empty()),
            timeout: Duration::from_secs(self.garm.request_timeout_secs),
        }
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            sync_period: Duration::from_secs(self.operator.sync_period_secs),
            min_idle_runner_age: Duration::from_secs(self.operator.min_idle_runner_age_secs),
            scope_retry: Duration::from_secs(self.operator.scope_retry_secs),
            pass_timeout: Duration::from_secs(self.operator.reconcile_timeout_secs),
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            base: Duration::from_millis(self.operator.backoff_base_millis),
            max: Duration::from_secs(self.operator.backoff_max_secs),
        }
    }

    pub fn runner_poll_interval(&self) -> Duration {
        Duration::from_secs(self.operator.runner_poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> OperatorConfig {
        let mut config = OperatorConfig::default();
        config.garm.server_url = "http://garm:9997".into();
        config.garm.token = Some("jwt".into());
        config
    }

    #[test]
    fn test_defaults() {
        let config = OperatorConfig::default();
        assert_eq!(config.garm.request_timeout_secs, 30);
        assert_eq!(config.operator.sync_period_secs, 300);
        assert_eq!(config.operator.workers, 4);
        assert_eq!(config.operator.min_idle_runner_age_secs, 300);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());
        assert!(OperatorConfig::default().validate().is_err());

        let mut config = valid();
        config.operator.workers = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.garm.token = None;
        assert!(config.validate().is_err());
        config.garm.username = "admin".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "garm-operator-config-{}.yaml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "garm:\n  server_url: http://garm:9997\n  token: abc\noperator:\n  workers: 8\n",
        )
        .unwrap();

        let config = OperatorConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.garm.server_url, "http://garm:9997");
        assert_eq!(config.operator.workers, 8);
        assert_eq!(config.operator.sync_period_secs, 300);
        assert_eq!(config.reconciler_config().pass_timeout, Duration::from_secs(60));
    }
}
