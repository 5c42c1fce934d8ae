//! Device inventory side of the Hailo device plugin: configuration, CDI
//! descriptor generation and periodic discovery. Nothing here speaks gRPC.

pub mod cdi;
pub mod config;
pub mod discovery;

mod error;

#[cfg(test)]
mod tests;

pub use cdi::DescriptorStore;
pub use config::{Config, Layout, Timings};
pub use discovery::{DeviceSource, DiscoveryMonitor, SysfsDeviceSource};
pub use error::{Error, Result};
