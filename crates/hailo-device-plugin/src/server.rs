//! Device plugin gRPC server on a Unix socket.
//!
//! The server owns its socket file: [`ProtocolServer::start`] replaces any
//! stale file left by a previous run and [`ProtocolServer::stop`] removes it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hailo_rpc::v1beta1::device_plugin_server::DevicePluginServer;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnixListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::{debug, info, warn};

use crate::error::{PluginError, Result};
use crate::handlers::DevicePluginService;

pub struct ProtocolServer {
    socket_path: PathBuf,
    service: Option<DevicePluginService>,
    graceful_stop: Duration,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
    done_tx: Option<mpsc::Sender<Result<()>>>,
    done_rx: mpsc::Receiver<Result<()>>,
    reported: bool,
}

impl ProtocolServer {
    #[must_use]
    pub fn new(
        socket_path: impl Into<PathBuf>,
        service: DevicePluginService,
        graceful_stop: Duration,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::channel(1);
        Self {
            socket_path: socket_path.into(),
            service: Some(service),
            graceful_stop,
            shutdown: CancellationToken::new(),
            task: None,
            done_tx: Some(done_tx),
            done_rx,
            reported: false,
        }
    }

    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind the socket and launch the serve loop in its own task.
    ///
    /// # Errors
    ///
    /// Returns `PluginError::AlreadyStarted` on a second call, or an I/O error
    /// if the stale socket cannot be removed or the new one cannot be bound.
    pub fn start(&mut self) -> Result<()> {
        let (Some(service), Some(done_tx)) = (self.service.take(), self.done_tx.take()) else {
            return Err(PluginError::AlreadyStarted);
        };

        remove_socket(&self.socket_path)?;
        let listener = UnixListener::bind(&self.socket_path)?;
        let incoming = UnixListenerStream::new(listener);
        info!("Device plugin listening on {}", self.socket_path.display());

        let service = service.with_shutdown(self.shutdown.clone());
        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(async move {
            let result = Server::builder()
                .add_service(DevicePluginServer::new(service))
                .serve_with_incoming_shutdown(incoming, shutdown.cancelled_owned())
                .await;

            match &result {
                Ok(()) => debug!("Device plugin server exited"),
                Err(e) => warn!("Device plugin server failed: {e}"),
            }
            let _ = done_tx.try_send(result.map_err(PluginError::from));
        });

        self.task = Some(task);
        Ok(())
    }

    /// Resolves once when the serve loop ends on its own; pending forever after that.
    pub async fn done(&mut self) -> Result<()> {
        if self.reported {
            return std::future::pending().await;
        }
        let result = self
            .done_rx
            .recv()
            .await
            .unwrap_or(Err(PluginError::ServerAborted));
        self.reported = true;
        result
    }

    /// Stop serving and remove the socket file. Later calls do nothing.
    ///
    /// In-flight calls get `graceful_stop` to finish before the task is aborted.
    /// The task handle is only released once the task has ended, so a stop
    /// interrupted by cancellation is completed by the next call.
    pub async fn stop(&mut self) {
        let graceful_stop = self.graceful_stop;
        let Some(task) = self.task.as_mut() else {
            return;
        };

        self.shutdown.cancel();
        if tokio::time::timeout(graceful_stop, &mut *task).await.is_err() {
            warn!("Device plugin server did not stop within {graceful_stop:?}, aborting");
            task.abort();
            let _ = (&mut *task).await;
        }
        self.task = None;

        if let Err(e) = remove_socket(&self.socket_path) {
            warn!(
                "Failed to remove socket file {}: {e}",
                self.socket_path.display()
            );
        }
        info!("Device plugin server stopped");
    }

    /// End the serve loop without going through [`ProtocolServer::stop`].
    #[cfg(test)]
    pub(crate) fn interrupt(&self) {
        self.shutdown.cancel();
    }
}

fn remove_socket(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed socket at {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hailo_core::DescriptorStore;
    use hailo_core::config::Layout;
    use std::os::unix::fs::FileTypeExt;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn service(temp: &TempDir) -> DevicePluginService {
        let store = DescriptorStore::new(
            temp.path().join("cdi"),
            "hailo.json",
            "hailo.ai/npu",
            Layout::with_base(temp.path()),
        );
        DevicePluginService::new(Arc::new(store), "hailo.ai/npu", Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_start_replaces_stale_socket() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hailo.sock");
        std::fs::write(&path, "stale").unwrap();

        let mut server = ProtocolServer::new(&path, service(&temp), Duration::from_secs(5));
        server.start().unwrap();
        assert!(std::fs::metadata(&path).unwrap().file_type().is_socket());

        server.stop().await;
    }

    #[tokio::test]
    async fn test_second_start_fails() {
        let temp = TempDir::new().unwrap();
        let mut server = ProtocolServer::new(
            temp.path().join("hailo.sock"),
            service(&temp),
            Duration::from_secs(5),
        );

        server.start().unwrap();
        assert!(matches!(server.start(), Err(PluginError::AlreadyStarted)));
        server.stop().await;
    }

    #[tokio::test]
    async fn test_stop_twice_removes_socket() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hailo.sock");
        let mut server = ProtocolServer::new(&path, service(&temp), Duration::from_secs(5));

        server.start().unwrap();
        assert!(path.exists());

        server.stop().await;
        assert!(!path.exists());
        server.stop().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let temp = TempDir::new().unwrap();
        let mut server = ProtocolServer::new(
            temp.path().join("hailo.sock"),
            service(&temp),
            Duration::from_secs(5),
        );
        server.stop().await;
    }

    #[tokio::test]
    async fn test_done_reports_serve_exit_once() {
        let temp = TempDir::new().unwrap();
        let mut server = ProtocolServer::new(
            temp.path().join("hailo.sock"),
            service(&temp),
            Duration::from_secs(5),
        );
        server.start().unwrap();

        server.interrupt();

        let first = tokio::time::timeout(Duration::from_secs(5), server.done())
            .await
            .expect("serve loop did not report its exit");
        assert!(first.is_ok());

        let second = tokio::time::timeout(Duration::from_millis(100), server.done()).await;
        assert!(second.is_err(), "exit must be reported only once");

        server.stop().await;
    }

    #[tokio::test]
    async fn test_done_pending_while_serving() {
        let temp = TempDir::new().unwrap();
        let mut server = ProtocolServer::new(
            temp.path().join("hailo.sock"),
            service(&temp),
            Duration::from_secs(5),
        );
        server.start().unwrap();

        let result = tokio::time::timeout(Duration::from_millis(100), server.done()).await;
        assert!(result.is_err());

        server.stop().await;
    }

    #[tokio::test]
    async fn test_bind_into_missing_dir_fails() {
        let temp = TempDir::new().unwrap();
        let mut server = ProtocolServer::new(
            temp.path().join("missing/hailo.sock"),
            service(&temp),
            Duration::from_secs(5),
        );
        assert!(matches!(server.start(), Err(PluginError::Io(_))));
    }
}
