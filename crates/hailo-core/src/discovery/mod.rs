//! Periodic device discovery feeding the CDI descriptor

mod sysfs;

pub use sysfs::SysfsDeviceSource;

use crate::Result;
use crate::cdi::DescriptorStore;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Something that can enumerate the accelerator devices present on the node.
pub trait DeviceSource: Send + Sync + 'static {
    /// Current device ids.
    ///
    /// # Errors
    ///
    /// Returns an error when the device inventory cannot be read.
    fn discover(&self) -> Result<Vec<String>>;
}

/// Rewrites the descriptor from a [`DeviceSource`] once at start, then on a fixed interval.
pub struct DiscoveryMonitor<S> {
    source: S,
    store: DescriptorStore,
    interval: Duration,
}

impl<S: DeviceSource> DiscoveryMonitor<S> {
    #[must_use]
    pub fn new(source: S, store: DescriptorStore, interval: Duration) -> Self {
        Self {
            source,
            store,
            interval,
        }
    }

    /// One discovery pass. A failed discovery leaves the previous descriptor in place.
    pub fn run_pass(&self) {
        let ids = match self.source.discover() {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Device discovery failed, keeping previous descriptor: {e}");
                return;
            }
        };

        debug!("Discovered {} devices: {ids:?}", ids.len());
        if let Err(e) = self.store.write(&ids) {
            warn!(
                "Failed to write CDI descriptor {}: {e}",
                self.store.path().display()
            );
        }
    }

    /// Run passes until `cancel` fires. The first pass happens immediately.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                "Discovery monitor started (interval {}s)",
                self.interval.as_secs()
            );
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => self.run_pass(),
                }
            }
            info!("Discovery monitor stopped");
        })
    }
}
