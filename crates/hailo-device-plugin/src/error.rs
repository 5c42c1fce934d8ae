//! Error types for the device plugin daemon.

use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur while driving the plugin lifecycle
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File watcher error
    #[error("Watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// Dialing a Unix socket failed
    #[error("Transport error: {0}")]
    Transport(#[from] hailo_rpc::Error),

    /// Serving the device plugin API failed
    #[error("Server error: {0}")]
    Server(#[from] tonic::transport::Error),

    /// The kubelet answered an RPC with an error status
    #[error("RPC error: {0}")]
    Rpc(Box<tonic::Status>),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] hailo_core::Error),

    #[error("Kubelet socket not found: {}", .0.display())]
    ControlSocketMissing(PathBuf),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Every registration attempt failed; carries the last failure
    #[error("Registration failed after {attempts} attempts: {last}")]
    RegistrationExhausted {
        attempts: u32,
        last: Box<PluginError>,
    },

    /// The watcher's event stream ended before the awaited event
    #[error("Watcher closed")]
    WatcherClosed,

    /// The server task exited without reporting a result
    #[error("Server task aborted")]
    ServerAborted,

    #[error("Server already started")]
    AlreadyStarted,
}

impl From<tonic::Status> for PluginError {
    fn from(status: tonic::Status) -> Self {
        PluginError::Rpc(Box::new(status))
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;
