//! Device plugin API handlers.
//!
//! Every answer is derived from the CDI descriptor on disk:
//! - Options: fixed, no optional hooks advertised
//! - `ListAndWatch`: descriptor snapshot now, then on every interval tick
//! - Allocate: CDI annotation naming the requested devices
//! - `PreStartContainer` / `GetPreferredAllocation`: no-ops

mod allocate;
mod list_and_watch;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use hailo_core::DescriptorStore;
use hailo_rpc::v1beta1::device_plugin_server::DevicePlugin;
use hailo_rpc::v1beta1::{
    AllocateRequest, AllocateResponse, DevicePluginOptions, Empty, ListAndWatchResponse,
    PreStartContainerRequest, PreStartContainerResponse, PreferredAllocationRequest,
    PreferredAllocationResponse,
};
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

pub use allocate::allocate_response;
pub use list_and_watch::device_snapshot;

pub type ListAndWatchStream =
    Pin<Box<dyn Stream<Item = Result<ListAndWatchResponse, Status>> + Send + 'static>>;

/// gRPC service the kubelet calls on the plugin socket
#[derive(Clone)]
pub struct DevicePluginService {
    store: Arc<DescriptorStore>,
    resource_name: String,
    list_interval: Duration,
    shutdown: CancellationToken,
}

impl DevicePluginService {
    #[must_use]
    pub fn new(
        store: Arc<DescriptorStore>,
        resource_name: impl Into<String>,
        list_interval: Duration,
    ) -> Self {
        Self {
            store,
            resource_name: resource_name.into(),
            list_interval,
            shutdown: CancellationToken::new(),
        }
    }

    /// Tie open `ListAndWatch` streams to `shutdown` so a graceful stop can drain them.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

#[tonic::async_trait]
impl DevicePlugin for DevicePluginService {
    type ListAndWatchStream = ListAndWatchStream;

    async fn get_device_plugin_options(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<DevicePluginOptions>, Status> {
        Ok(Response::new(DevicePluginOptions::default()))
    }

    async fn list_and_watch(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListAndWatchStream>, Status> {
        info!("Kubelet opened ListAndWatch");
        let stream = list_and_watch::device_stream(
            Arc::clone(&self.store),
            self.list_interval,
            self.shutdown.clone(),
        );
        Ok(Response::new(stream))
    }

    async fn get_preferred_allocation(
        &self,
        _request: Request<PreferredAllocationRequest>,
    ) -> Result<Response<PreferredAllocationResponse>, Status> {
        Ok(Response::new(PreferredAllocationResponse::default()))
    }

    async fn allocate(
        &self,
        request: Request<AllocateRequest>,
    ) -> Result<Response<AllocateResponse>, Status> {
        let request = request.into_inner();
        let response = allocate_response(&self.resource_name, &request);
        info!(
            "Allocated devices for {} containers",
            response.container_responses.len()
        );
        Ok(Response::new(response))
    }

    async fn pre_start_container(
        &self,
        request: Request<PreStartContainerRequest>,
    ) -> Result<Response<PreStartContainerResponse>, Status> {
        debug!("PreStartContainer for {:?}", request.get_ref().devices_ids);
        Ok(Response::new(PreStartContainerResponse {}))
    }
}
