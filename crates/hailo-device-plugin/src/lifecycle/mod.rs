//! Plugin lifecycle state machine.
//!
//! ```text
//! WaitingForControlSocket -> InitializingServer -> Registering -> Running
//!          ^                        |                  |            |
//!          |                        +--(start failed)  v            v
//!          +------------------------------------- Cleanup <---------+
//! ```
//!
//! Cancellation moves any state straight to `Shutdown`, which runs the same
//! teardown as `Cleanup` and ends [`Lifecycle::run`].

mod states;

pub use states::LifecycleState;

use std::sync::Arc;

use hailo_core::cdi::ensure_isolation_helpers;
use hailo_core::{Config, DescriptorStore};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::handlers::DevicePluginService;
use crate::registration::{Registrar, Registration};
use crate::server::ProtocolServer;
use crate::watcher::{SocketWatcher, WatchEvent};

const TRANSITION_BUFFER: usize = 64;

/// Supervises socket discovery, the gRPC server and kubelet registration.
///
/// The state loop is the only writer of the current state; observers get a
/// copy of every state entered through [`Lifecycle::subscribe`].
pub struct Lifecycle<R = Registrar> {
    state: LifecycleState,
    config: Config,
    cancel: CancellationToken,
    registrar: R,
    store: Arc<DescriptorStore>,
    server: Option<ProtocolServer>,
    watcher: Option<SocketWatcher>,
    transitions: broadcast::Sender<LifecycleState>,
}

impl Lifecycle<Registrar> {
    /// # Errors
    ///
    /// Returns an error if a registrar cannot be built from `config`.
    pub fn new(config: Config, cancel: CancellationToken) -> Result<Self> {
        let registrar = Registrar::from_config(&config)?;
        Ok(Self::with_registrar(config, cancel, registrar))
    }
}

impl<R: Registration> Lifecycle<R> {
    #[must_use]
    pub fn with_registrar(config: Config, cancel: CancellationToken, registrar: R) -> Self {
        let store = Arc::new(DescriptorStore::from_config(&config));
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        Self {
            state: LifecycleState::WaitingForControlSocket,
            config,
            cancel,
            registrar,
            store,
            server: None,
            watcher: None,
            transitions,
        }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleState> {
        self.transitions.subscribe()
    }

    /// Drive the state machine until cancellation, then tear down.
    pub async fn run(&mut self) {
        info!("Lifecycle starting in {}", self.state);
        let _ = self.transitions.send(self.state);

        while !self.state.is_terminal() {
            let cancel = self.cancel.clone();
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => LifecycleState::Shutdown,
                next = self.step() => next,
            };
            self.transition(next);
        }

        self.cleanup().await;
        info!("Device plugin shutdown complete");
    }

    fn transition(&mut self, next: LifecycleState) {
        info!(from = %self.state, to = %next, "State transition");
        self.state = next;
        let _ = self.transitions.send(next);
    }

    async fn step(&mut self) -> LifecycleState {
        match self.state {
            LifecycleState::WaitingForControlSocket => self.wait_for_control_socket().await,
            LifecycleState::InitializingServer => self.initialize_server().await,
            LifecycleState::Registering => self.register().await,
            LifecycleState::Running => self.serve().await,
            LifecycleState::Cleanup => {
                self.cleanup().await;
                LifecycleState::WaitingForControlSocket
            }
            LifecycleState::Shutdown => LifecycleState::Shutdown,
        }
    }

    async fn wait_for_control_socket(&mut self) -> LifecycleState {
        let socket = self.config.kubelet_socket.clone();
        if socket.exists() {
            debug!("Kubelet socket present at {}", socket.display());
            return LifecycleState::InitializingServer;
        }

        info!("Waiting for kubelet socket {}", socket.display());
        let result = match SocketWatcher::start(&socket, &self.cancel) {
            // Created between the existence check and arming the watch
            Ok(_) if socket.exists() => Ok(()),
            Ok(mut watcher) => watcher.wait_for(WatchEvent::Appeared).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => LifecycleState::InitializingServer,
            Err(e) => {
                warn!("Waiting for kubelet socket failed: {e}");
                tokio::time::sleep(self.config.timings.wait_retry()).await;
                LifecycleState::WaitingForControlSocket
            }
        }
    }

    async fn initialize_server(&mut self) -> LifecycleState {
        if !self.config.kubelet_socket.exists() {
            warn!("Kubelet socket disappeared before server start");
            return LifecycleState::WaitingForControlSocket;
        }

        // Leftover from a cycle that never reached Cleanup
        self.stop_server().await;

        let timings = &self.config.timings;
        let service = DevicePluginService::new(
            Arc::clone(&self.store),
            &self.config.resource_name,
            timings.list_and_watch_interval(),
        );
        let mut server =
            ProtocolServer::new(&self.config.plugin_socket, service, timings.graceful_stop());

        if let Err(e) = server.start() {
            error!("Failed to start device plugin server: {e}");
            tokio::time::sleep(timings.wait_retry()).await;
            return LifecycleState::WaitingForControlSocket;
        }
        self.server = Some(server);

        tokio::time::sleep(self.config.timings.server_settle()).await;
        LifecycleState::Registering
    }

    async fn register(&mut self) -> LifecycleState {
        if !self.config.kubelet_socket.exists() {
            warn!("Kubelet socket disappeared before registration");
            return LifecycleState::Cleanup;
        }

        match self
            .registrar
            .register(self.config.timings.registration_attempts)
            .await
        {
            Ok(()) => LifecycleState::Running,
            Err(e) => {
                error!("Registration failed: {e}");
                LifecycleState::Cleanup
            }
        }
    }

    async fn serve(&mut self) -> LifecycleState {
        if let Err(e) = ensure_isolation_helpers(&self.config.layout) {
            warn!("Failed to prepare isolation helpers: {e}");
        }

        let watcher = match SocketWatcher::start(&self.config.kubelet_socket, &self.cancel) {
            Ok(watcher) => self.watcher.insert(watcher),
            Err(e) => {
                error!("Failed to watch kubelet socket: {e}");
                return LifecycleState::Cleanup;
            }
        };
        if !self.config.kubelet_socket.exists() {
            info!("Kubelet socket gone before monitoring started");
            return LifecycleState::Cleanup;
        }
        let Some(server) = self.server.as_mut() else {
            error!("Running without a device plugin server");
            return LifecycleState::Cleanup;
        };

        info!("Device plugin running");
        let (events, errors) = watcher.streams();
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(WatchEvent::Disappeared) => {
                        info!("Kubelet socket deleted, restarting");
                        return LifecycleState::Cleanup;
                    }
                    Some(WatchEvent::Appeared) => {}
                    None => {
                        warn!("Kubelet socket watcher closed");
                        return LifecycleState::Cleanup;
                    }
                },
                Some(err) = errors.recv() => warn!("Watcher error: {err}"),
                result = server.done() => {
                    match result {
                        Ok(()) => warn!("Device plugin server exited"),
                        Err(e) => warn!("Device plugin server exited: {e}"),
                    }
                    return LifecycleState::Cleanup;
                }
            }
        }
    }

    async fn stop_server(&mut self) {
        if let Some(server) = self.server.as_mut() {
            server.stop().await;
        }
        self.server = None;
    }

    async fn cleanup(&mut self) {
        self.stop_server().await;
        if let Some(mut watcher) = self.watcher.take() {
            watcher.close();
        }
        debug!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::time::Duration;
    use tempfile::TempDir;

    const STEP_TIMEOUT: Duration = Duration::from_secs(5);

    struct Accepting;

    impl Registration for Accepting {
        fn register(&self, _attempts: u32) -> impl Future<Output = Result<()>> + Send {
            std::future::ready(Ok(()))
        }
    }

    fn test_config(temp: &TempDir) -> Config {
        let mut config = Config::with_base(temp.path());
        config.timings.server_settle_ms = 10;
        config.timings.wait_retry_ms = 50;
        config.timings.graceful_stop_secs = 1;
        config
    }

    async fn advance<R: Registration>(lifecycle: &mut Lifecycle<R>) -> LifecycleState {
        let next = tokio::time::timeout(STEP_TIMEOUT, lifecycle.step())
            .await
            .expect("state handler stalled");
        lifecycle.transition(next);
        next
    }

    #[tokio::test]
    async fn test_server_exit_while_running_restarts_cycle() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        std::fs::write(&config.kubelet_socket, "").unwrap();
        let plugin_socket = config.plugin_socket.clone();

        let mut lifecycle =
            Lifecycle::with_registrar(config, CancellationToken::new(), Accepting);
        let mut states = lifecycle.subscribe();

        assert_eq!(advance(&mut lifecycle).await, LifecycleState::InitializingServer);
        assert_eq!(advance(&mut lifecycle).await, LifecycleState::Registering);
        assert_eq!(advance(&mut lifecycle).await, LifecycleState::Running);

        lifecycle.server.as_ref().unwrap().interrupt();

        assert_eq!(advance(&mut lifecycle).await, LifecycleState::Cleanup);
        assert_eq!(
            advance(&mut lifecycle).await,
            LifecycleState::WaitingForControlSocket
        );
        assert!(lifecycle.server.is_none());
        assert!(lifecycle.watcher.is_none());
        assert!(!plugin_socket.exists());

        let seen: Vec<_> = std::iter::from_fn(|| states.try_recv().ok()).collect();
        assert_eq!(
            seen,
            [
                LifecycleState::InitializingServer,
                LifecycleState::Registering,
                LifecycleState::Running,
                LifecycleState::Cleanup,
                LifecycleState::WaitingForControlSocket,
            ]
        );
    }

    #[tokio::test]
    async fn test_watcher_failure_while_running_goes_to_cleanup() {
        let temp = TempDir::new().unwrap();
        let mut config = test_config(&temp);
        // Parent directory missing, so no watch can be armed
        config.kubelet_socket = temp.path().join("missing/kubelet.sock");

        let mut lifecycle =
            Lifecycle::with_registrar(config, CancellationToken::new(), Accepting);
        lifecycle.state = LifecycleState::Running;

        assert_eq!(advance(&mut lifecycle).await, LifecycleState::Cleanup);
        assert!(lifecycle.watcher.is_none());
        assert_eq!(
            advance(&mut lifecycle).await,
            LifecycleState::WaitingForControlSocket
        );
    }
}
