use std::sync::Arc;
use std::time::Duration;

use hailo_core::DescriptorStore;
use hailo_rpc::healthy_device;
use hailo_rpc::v1beta1::ListAndWatchResponse;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::ListAndWatchStream;

/// Current descriptor contents as a device list. An unreadable descriptor
/// advertises zero devices instead of failing the stream.
#[must_use]
pub fn device_snapshot(store: &DescriptorStore) -> ListAndWatchResponse {
    let devices = match store.read() {
        Ok(ids) => ids.into_iter().map(healthy_device).collect(),
        Err(e) => {
            warn!(
                "Cannot read CDI descriptor {}, advertising no devices: {e}",
                store.path().display()
            );
            Vec::new()
        }
    };
    ListAndWatchResponse { devices }
}

/// Snapshot immediately, then once per `interval`, until `shutdown` fires or
/// the kubelet drops the stream.
pub(super) fn device_stream(
    store: Arc<DescriptorStore>,
    interval: Duration,
    shutdown: CancellationToken,
) -> ListAndWatchStream {
    Box::pin(async_stream::stream! {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let snapshot = device_snapshot(&store);
            debug!("ListAndWatch sending {} devices", snapshot.devices.len());
            yield Ok(snapshot);
        }
        debug!("ListAndWatch stream closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hailo_core::config::Layout;
    use tempfile::TempDir;
    use tokio_stream::StreamExt;

    fn store(temp: &TempDir) -> Arc<DescriptorStore> {
        Arc::new(DescriptorStore::new(
            temp.path().join("cdi"),
            "hailo.json",
            "hailo.ai/npu",
            Layout::with_base(temp.path()),
        ))
    }

    #[test]
    fn test_snapshot_marks_devices_healthy() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store
            .write(&["hailo0".to_string(), "hailo1".to_string()])
            .unwrap();

        let snapshot = device_snapshot(&store);
        let ids: Vec<&str> = snapshot.devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["hailo0", "hailo1"]);
        assert!(snapshot.devices.iter().all(|d| d.health == "Healthy"));
    }

    #[test]
    fn test_snapshot_without_descriptor_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(device_snapshot(&store(&temp)).devices.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_resends_on_interval() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.write(&["hailo0".to_string()]).unwrap();
        let shutdown = CancellationToken::new();
        let mut stream = device_stream(
            Arc::clone(&store),
            Duration::from_secs(30),
            shutdown.clone(),
        );

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.devices.len(), 1);

        store
            .write(&["hailo0".to_string(), "hailo1".to_string()])
            .unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.devices.len(), 2);

        shutdown.cancel();
        assert!(stream.next().await.is_none());
    }
}
