use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::Layout;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Kubelet registration socket; its presence gates the plugin lifecycle
    #[serde(default = "default_kubelet_socket")]
    pub kubelet_socket: PathBuf,

    /// Socket this plugin serves the device plugin API on
    #[serde(default = "default_plugin_socket")]
    pub plugin_socket: PathBuf,

    /// Extended resource name, also used as the CDI kind
    #[serde(default = "default_resource_name")]
    pub resource_name: String,

    #[serde(default = "default_cdi_dir")]
    pub cdi_dir: PathBuf,

    #[serde(default = "default_cdi_file_name")]
    pub cdi_file_name: String,

    #[serde(default)]
    pub layout: Layout,

    #[serde(default)]
    pub timings: Timings,
}

fn default_kubelet_socket() -> PathBuf {
    PathBuf::from("/var/lib/kubelet/device-plugins/kubelet.sock")
}
fn default_plugin_socket() -> PathBuf {
    PathBuf::from("/var/lib/kubelet/device-plugins/hailo.sock")
}
fn default_resource_name() -> String {
    "hailo.ai/npu".to_string()
}
fn default_cdi_dir() -> PathBuf {
    PathBuf::from("/etc/cdi")
}
fn default_cdi_file_name() -> String {
    "hailo.json".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kubelet_socket: default_kubelet_socket(),
            plugin_socket: default_plugin_socket(),
            resource_name: default_resource_name(),
            cdi_dir: default_cdi_dir(),
            cdi_file_name: default_cdi_file_name(),
            layout: Layout::default(),
            timings: Timings::default(),
        }
    }
}

impl Config {
    /// Root every path under `base`, keeping default names and timings.
    #[must_use]
    pub fn with_base(base: &Path) -> Self {
        Self {
            kubelet_socket: base.join("kubelet.sock"),
            plugin_socket: base.join("hailo.sock"),
            cdi_dir: base.join("cdi"),
            layout: Layout::with_base(base),
            ..Self::default()
        }
    }

    /// Load config from file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, contains invalid JSON,
    /// or fails [`Config::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        super::validation::warn_unknown_fields(&content, &path.display().to_string());
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        let Some((vendor, class)) = self.resource_name.split_once('/') else {
            return Err(Error::Config(format!(
                "resourceName '{}' must have the form <vendor>/<class>",
                self.resource_name
            )));
        };
        if vendor.is_empty() || class.is_empty() || class.contains('/') {
            return Err(Error::Config(format!(
                "resourceName '{}' must have the form <vendor>/<class>",
                self.resource_name
            )));
        }

        if self.plugin_socket.file_name().is_none() {
            return Err(Error::Config(format!(
                "pluginSocket '{}' has no file name",
                self.plugin_socket.display()
            )));
        }

        if self.cdi_file_name.is_empty() || self.cdi_file_name.contains('/') {
            return Err(Error::Config(format!(
                "cdiFileName '{}' must be a plain file name",
                self.cdi_file_name
            )));
        }

        if self.timings.registration_attempts == 0 {
            return Err(Error::Config(
                "timings.registrationAttempts must be at least 1".to_string(),
            ));
        }

        if self.timings.discovery_interval_secs == 0 || self.timings.list_and_watch_interval_secs == 0
        {
            return Err(Error::Config(
                "timings.discoveryIntervalSecs and timings.listAndWatchIntervalSecs must be non-zero"
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Full path of the CDI descriptor file.
    #[must_use]
    pub fn cdi_file(&self) -> PathBuf {
        self.cdi_dir.join(&self.cdi_file_name)
    }
}

/// Intervals, timeouts and retry budgets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_secs: u64,

    #[serde(default = "default_list_and_watch_interval")]
    pub list_and_watch_interval_secs: u64,

    /// Pause after the gRPC server starts, before registering
    #[serde(default = "default_server_settle")]
    pub server_settle_ms: u64,

    #[serde(default = "default_registration_attempts")]
    pub registration_attempts: u32,

    /// Attempt `n` failing waits `n * registrationBackoffSecs` before the next one
    #[serde(default = "default_registration_backoff")]
    pub registration_backoff_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_graceful_stop")]
    pub graceful_stop_secs: u64,

    /// Pause before re-arming the kubelet socket wait after a watcher failure
    #[serde(default = "default_wait_retry")]
    pub wait_retry_ms: u64,
}

fn default_discovery_interval() -> u64 {
    60
}
fn default_list_and_watch_interval() -> u64 {
    30
}
fn default_server_settle() -> u64 {
    500
}
fn default_registration_attempts() -> u32 {
    5
}
fn default_registration_backoff() -> u64 {
    2
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    10
}
fn default_graceful_stop() -> u64 {
    5
}
fn default_wait_retry() -> u64 {
    1000
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            discovery_interval_secs: default_discovery_interval(),
            list_and_watch_interval_secs: default_list_and_watch_interval(),
            server_settle_ms: default_server_settle(),
            registration_attempts: default_registration_attempts(),
            registration_backoff_secs: default_registration_backoff(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            graceful_stop_secs: default_graceful_stop(),
            wait_retry_ms: default_wait_retry(),
        }
    }
}

impl Timings {
    #[must_use]
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }

    #[must_use]
    pub fn list_and_watch_interval(&self) -> Duration {
        Duration::from_secs(self.list_and_watch_interval_secs)
    }

    #[must_use]
    pub fn server_settle(&self) -> Duration {
        Duration::from_millis(self.server_settle_ms)
    }

    #[must_use]
    pub fn registration_backoff(&self) -> Duration {
        Duration::from_secs(self.registration_backoff_secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn graceful_stop(&self) -> Duration {
        Duration::from_secs(self.graceful_stop_secs)
    }

    #[must_use]
    pub fn wait_retry(&self) -> Duration {
        Duration::from_millis(self.wait_retry_ms)
    }
}
