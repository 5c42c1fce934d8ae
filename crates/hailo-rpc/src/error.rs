//! Error types for the hailo-rpc crate.

use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while dialing a gRPC service over a Unix socket
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("Socket not found: {}", .0.display())]
    SocketNotFound(PathBuf),

    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, Error>;
