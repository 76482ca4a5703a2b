use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use taskstat_core::error::{Result, TaskStatError};

use crate::exporter::DEFAULT_METRIC_NAME;
use crate::obs::metrics::is_valid_metric_name;
use crate::router::validate_pattern;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    pub version: u32,

    /// Value of the `service` label on every series.
    pub service: String,

    #[serde(default)]
    pub exporter: ExporterSection,
}

impl ExporterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(TaskStatError::UnsupportedVersion);
        }
        if self.service.trim().is_empty() {
            return Err(TaskStatError::BadRequest("service must not be empty".into()));
        }

        self.exporter.validate()?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_metric_name")]
    pub metric_name: String,

    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,

    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for ExporterSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            metric_name: default_metric_name(),
            sync_interval_ms: default_sync_interval_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl ExporterSection {
    pub fn validate(&self) -> Result<()> {
        self.listen.parse::<SocketAddr>().map_err(|e| {
            TaskStatError::BadRequest(format!("exporter.listen must be a SocketAddr: {e}"))
        })?;
        validate_pattern(&self.path)?;
        if !is_valid_metric_name(&self.metric_name) {
            return Err(TaskStatError::BadRequest(format!(
                "exporter.metric_name is not a valid metric name: {:?}",
                self.metric_name
            )));
        }
        if !(100..=600000).contains(&self.sync_interval_ms) {
            return Err(TaskStatError::BadRequest(
                "exporter.sync_interval_ms must be between 100 and 600000".into(),
            ));
        }
        if !(100..=60000).contains(&self.shutdown_timeout_ms) {
            return Err(TaskStatError::BadRequest(
                "exporter.shutdown_timeout_ms must be between 100 and 60000".into(),
            ));
        }
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

fn default_listen() -> String {
    "0.0.0.0:9090".into()
}
fn default_path() -> String {
    "/metrics".into()
}
fn default_metric_name() -> String {
    DEFAULT_METRIC_NAME.into()
}
fn default_sync_interval_ms() -> u64 {
    5000
}
fn default_shutdown_timeout_ms() -> u64 {
    5000
}
