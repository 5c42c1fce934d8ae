//! Unix socket channel helper.
//!
//! tonic only dials TCP/HTTP URIs on its own, so connections to the kubelet and
//! to device plugin sockets go through a custom connector that ignores the URI
//! and opens the socket path instead.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::debug;

use crate::error::{Error, Result};

// Placeholder authority; the connector never resolves it.
const UNIX_ENDPOINT_URI: &str = "http://[::]:50051";

/// Open a gRPC channel to a service listening on a Unix socket.
///
/// # Errors
///
/// Returns `Error::SocketNotFound` if nothing exists at `path`,
/// `Error::Timeout` if the connection is not established within `timeout`,
/// or `Error::Transport` if the socket cannot be dialed.
pub async fn connect_unix(path: impl AsRef<Path>, timeout: Duration) -> Result<Channel> {
    let path: PathBuf = path.as_ref().to_path_buf();
    if !path.exists() {
        return Err(Error::SocketNotFound(path));
    }
    debug!("Dialing unix socket {}", path.display());

    let endpoint = Endpoint::from_static(UNIX_ENDPOINT_URI).connect_timeout(timeout);
    let connect = endpoint.connect_with_connector(service_fn(move |_: Uri| {
        let path = path.clone();
        async move { Ok::<_, std::io::Error>(TokioIo::new(UnixStream::connect(path).await?)) }
    }));

    match tokio::time::timeout(timeout, connect).await {
        Ok(channel) => Ok(channel?),
        Err(_) => Err(Error::Timeout(timeout)),
    }
}

/// The socket file name the kubelet should dial back, relative to
/// [`DEVICE_PLUGIN_PATH`](crate::DEVICE_PLUGIN_PATH).
#[must_use]
pub fn endpoint_name(socket: &Path) -> Option<String> {
    socket
        .file_name()
        .and_then(|name| name.to_str())
        .map(String::from)
}
