//! Constants and small constructors for the device plugin protocol.

use crate::v1beta1::Device;

/// Device plugin API version sent in every registration request.
pub const API_VERSION: &str = "v1beta1";

/// Directory in which the kubelet expects device plugin sockets.
pub const DEVICE_PLUGIN_PATH: &str = "/var/lib/kubelet/device-plugins/";

/// Registration socket served by the kubelet.
pub const KUBELET_SOCKET: &str = "/var/lib/kubelet/device-plugins/kubelet.sock";

/// Health reported for every advertised device.
pub const HEALTHY: &str = "Healthy";

/// Build a healthy device entry with no topology hint.
#[must_use]
pub fn healthy_device(id: impl Into<String>) -> Device {
    Device {
        id: id.into(),
        health: HEALTHY.to_string(),
        topology: None,
    }
}
