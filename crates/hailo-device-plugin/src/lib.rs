//! Kubernetes device plugin for Hailo NPUs.
//!
//! [`Lifecycle`] follows the kubelet through restarts: it waits for the
//! kubelet socket, serves the device plugin API on its own socket, registers,
//! and starts over whenever the kubelet socket goes away. Devices are taken
//! from the CDI descriptor that `hailo_core`'s discovery monitor maintains.

pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod registration;
pub mod server;
pub mod watcher;

pub use error::{PluginError, Result};
pub use handlers::DevicePluginService;
pub use lifecycle::{Lifecycle, LifecycleState};
pub use registration::{Registrar, Registration};
pub use server::ProtocolServer;
pub use watcher::{SocketWatcher, WatchEvent};
