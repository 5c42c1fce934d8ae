//! Kubelet device plugin protocol definitions for hailo.
//!
//! This crate provides the generated `v1beta1` gRPC types, the protocol
//! constants shared by the plugin and the kubelet, and a client helper for
//! dialing gRPC services over Unix sockets.
//!
//! # Architecture
//!
//! - [`v1beta1`]: messages and service stubs generated from `api.proto`
//! - [`protocol`]: API version, health values, well-known kubelet paths
//! - [`client`]: Unix socket channel connector
//! - [`error`]: connection error type and `Result` alias
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use hailo_rpc::v1beta1::registration_client::RegistrationClient;
//!
//! # async fn example() -> hailo_rpc::Result<()> {
//! let channel = hailo_rpc::connect_unix(hailo_rpc::KUBELET_SOCKET, Duration::from_secs(10)).await?;
//! let _client = RegistrationClient::new(channel);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod protocol;

// Generated from proto/deviceplugin/v1beta1/api.proto
pub mod v1beta1 {
    #![allow(clippy::pedantic)]
    #![allow(clippy::derive_partial_eq_without_eq)]

    tonic::include_proto!("v1beta1");
}

pub use client::{connect_unix, endpoint_name};
pub use error::{Error, Result};
pub use protocol::{API_VERSION, DEVICE_PLUGIN_PATH, HEALTHY, KUBELET_SOCKET, healthy_device};
