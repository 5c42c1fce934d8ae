//! Registration with the kubelet.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use hailo_core::Config;
use hailo_rpc::v1beta1::RegisterRequest;
use hailo_rpc::v1beta1::registration_client::RegistrationClient;
use hailo_rpc::{API_VERSION, connect_unix, endpoint_name};
use tracing::{debug, info, warn};

use crate::error::{PluginError, Result};

/// Announces the plugin to the kubelet; the lifecycle's seam for registration.
pub trait Registration: Send + Sync {
    /// Try up to `attempts` times, backing off between failures.
    fn register(&self, attempts: u32) -> impl Future<Output = Result<()>> + Send;
}

/// Registers over the kubelet's Unix socket
#[derive(Debug, Clone)]
pub struct Registrar {
    kubelet_socket: PathBuf,
    endpoint: String,
    resource_name: String,
    connect_timeout: Duration,
    request_timeout: Duration,
    backoff_step: Duration,
}

impl Registrar {
    /// # Errors
    ///
    /// Returns an error if the plugin socket path has no usable file name.
    pub fn from_config(config: &Config) -> Result<Self> {
        let endpoint = endpoint_name(&config.plugin_socket).ok_or_else(|| {
            PluginError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "plugin socket {} has no file name",
                    config.plugin_socket.display()
                ),
            ))
        })?;

        Ok(Self {
            kubelet_socket: config.kubelet_socket.clone(),
            endpoint,
            resource_name: config.resource_name.clone(),
            connect_timeout: config.timings.connect_timeout(),
            request_timeout: config.timings.request_timeout(),
            backoff_step: config.timings.registration_backoff(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// A single registration handshake.
    ///
    /// # Errors
    ///
    /// Fails without dialing if the kubelet socket is missing; otherwise
    /// returns the connection, timeout or RPC failure.
    pub async fn register_once(&self) -> Result<()> {
        if !self.kubelet_socket.exists() {
            return Err(PluginError::ControlSocketMissing(self.kubelet_socket.clone()));
        }

        let channel = connect_unix(&self.kubelet_socket, self.connect_timeout).await?;
        let mut client = RegistrationClient::new(channel);
        let request = RegisterRequest {
            version: API_VERSION.to_string(),
            endpoint: self.endpoint.clone(),
            resource_name: self.resource_name.clone(),
            options: None,
        };
        debug!(
            "Registering {} at endpoint {}",
            self.resource_name, self.endpoint
        );

        match tokio::time::timeout(self.request_timeout, client.register(request)).await {
            Ok(response) => {
                response?;
            }
            Err(_) => return Err(PluginError::Timeout(self.request_timeout)),
        }

        info!(
            resource = %self.resource_name,
            endpoint = %self.endpoint,
            "Registered with kubelet"
        );
        Ok(())
    }

    /// Call [`Registrar::register_once`] up to `attempts` times.
    ///
    /// After failed attempt `n` the next one waits `n * backoff_step`.
    ///
    /// # Errors
    ///
    /// Returns `PluginError::RegistrationExhausted` carrying the last failure.
    pub async fn register_with_retry(&self, attempts: u32) -> Result<()> {
        let attempts = attempts.max(1);
        let mut last = None;

        for attempt in 1..=attempts {
            match self.register_once().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(attempt, attempts, "Registration failed: {e}");
                    last = Some(e);
                }
            }

            if attempt < attempts {
                let delay = self.backoff_step * attempt;
                debug!("Retrying registration in {delay:?}");
                tokio::time::sleep(delay).await;
            }
        }

        Err(PluginError::RegistrationExhausted {
            attempts,
            last: Box::new(last.unwrap_or(PluginError::ControlSocketMissing(
                self.kubelet_socket.clone(),
            ))),
        })
    }
}

impl Registration for Registrar {
    fn register(&self, attempts: u32) -> impl Future<Output = Result<()>> + Send {
        self.register_with_retry(attempts)
    }
}
