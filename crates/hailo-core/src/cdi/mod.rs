//! Container Device Interface descriptor generation

mod helpers;
mod spec;
mod store;

pub use helpers::ensure_isolation_helpers;
pub use spec::{CdiSpec, ContainerEdits, DeviceNode, DeviceSpec, Hook, Mount};
pub use store::DescriptorStore;

/// CDI schema version written into every descriptor
pub const CDI_VERSION: &str = "0.5.0";

/// Annotation key the kubelet forwards to the container runtime on allocation
pub const CDI_ANNOTATION_KEY: &str = "cdi.k8s.io/hailo";

/// Fully qualified CDI device name, `<kind>=<id>`.
#[must_use]
pub fn qualified_name(kind: &str, device_id: &str) -> String {
    format!("{kind}={device_id}")
}
