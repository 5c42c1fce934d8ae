use std::collections::HashMap;

use hailo_core::cdi::{CDI_ANNOTATION_KEY, qualified_name};
use hailo_rpc::v1beta1::{AllocateRequest, AllocateResponse, ContainerAllocateResponse};
use tracing::debug;

/// One response per container request, in request order.
///
/// Requested ids are not checked against the descriptor: the kubelet only
/// allocates ids that `ListAndWatch` advertised.
#[must_use]
pub fn allocate_response(resource_name: &str, request: &AllocateRequest) -> AllocateResponse {
    let container_responses = request
        .container_requests
        .iter()
        .map(|container| {
            let devices = container
                .devices_ids
                .iter()
                .map(|id| qualified_name(resource_name, id))
                .collect::<Vec<_>>()
                .join(",");
            debug!("Allocating {devices}");

            ContainerAllocateResponse {
                annotations: HashMap::from([(CDI_ANNOTATION_KEY.to_string(), devices)]),
                ..Default::default()
            }
        })
        .collect();

    AllocateResponse {
        container_responses,
    }
}
