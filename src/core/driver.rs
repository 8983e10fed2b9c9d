use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use log::{error, info, trace};

use super::error::{DriverError, Result};
use super::msg::*;
use super::network::Registry;

/// The remote network driver call set.
///
/// Only the lifecycle calls have to be provided; the discovery, allocation
/// and external connectivity hooks default to successful no-ops.
#[async_trait]
pub trait NetworkDriver: Send + Sync {
    async fn get_capabilities(&self) -> Result<CapabilitiesResponse>;

    async fn create_network(&self, req: CreateNetworkRequest) -> Result<()>;

    async fn delete_network(&self, req: NetworkRequest) -> Result<()>;

    async fn create_endpoint(&self, req: CreateEndpointRequest)
        -> Result<CreateEndpointResponse>;

    async fn delete_endpoint(&self, req: EndpointRequest) -> Result<()>;

    async fn endpoint_info(&self, req: EndpointRequest) -> Result<InfoResponse>;

    async fn join(&self, req: JoinRequest) -> Result<JoinResponse>;

    async fn leave(&self, req: EndpointRequest) -> Result<()>;

    async fn allocate_network(
        &self,
        req: AllocateNetworkRequest,
    ) -> Result<AllocateNetworkResponse> {
        trace!("AllocateNetwork({req:?})");
        Ok(AllocateNetworkResponse::default())
    }

    async fn free_network(&self, req: NetworkRequest) -> Result<()> {
        trace!("FreeNetwork({req:?})");
        Ok(())
    }

    async fn discover_new(&self, req: DiscoveryNotification) -> Result<()> {
        trace!("DiscoverNew({req:?})");
        Ok(())
    }

    async fn discover_delete(&self, req: DiscoveryNotification) -> Result<()> {
        trace!("DiscoverDelete({req:?})");
        Ok(())
    }

    async fn program_external_connectivity(
        &self,
        req: ExternalConnectivityRequest,
    ) -> Result<()> {
        trace!("ProgramExternalConnectivity({req:?})");
        Ok(())
    }

    async fn revoke_external_connectivity(&self, req: EndpointRequest) -> Result<()> {
        trace!("RevokeExternalConnectivity({req:?})");
        Ok(())
    }
}

/// Point-to-point driver: every network is one veth pair.
pub struct P2pDriver {
    registry: Arc<Registry>,
}

impl P2pDriver {
    /// Restores persisted networks before the driver is handed to a
    /// transport. Fails if any known network's pair cannot be recreated.
    pub async fn init(registry: Arc<Registry>) -> Result<Self> {
        let recovery = registry.recover().await?;
        info!(
            "Restored {} networks, skipped {} bad records",
            recovery.restored.len(),
            recovery.skipped.len()
        );

        Ok(P2pDriver { registry })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

#[async_trait]
impl NetworkDriver for P2pDriver {
    async fn get_capabilities(&self) -> Result<CapabilitiesResponse> {
        trace!("GetCapabilities()");
        Ok(CapabilitiesResponse {
            scope: "local".to_string(),
            connectivity_scope: "local".to_string(),
        })
    }

    async fn create_network(&self, req: CreateNetworkRequest) -> Result<()> {
        trace!("CreateNetwork({req:?})");
        self.registry.create_network(&req.network_id).await?;
        Ok(())
    }

    async fn delete_network(&self, req: NetworkRequest) -> Result<()> {
        trace!("DeleteNetwork({req:?})");
        self.registry.delete_network(&req.network_id).await
    }

    async fn create_endpoint(
        &self,
        req: CreateEndpointRequest,
    ) -> Result<CreateEndpointResponse> {
        trace!("CreateEndpoint({req:?})");
        self.registry
            .create_endpoint(&req.network_id, &req.endpoint_id, req.interface)
            .await?;

        Ok(CreateEndpointResponse::default())
    }

    async fn delete_endpoint(&self, req: EndpointRequest) -> Result<()> {
        trace!("DeleteEndpoint({req:?})");
        self.registry
            .delete_endpoint(&req.network_id, &req.endpoint_id)
            .await
    }

    async fn endpoint_info(&self, req: EndpointRequest) -> Result<InfoResponse> {
        trace!("EndpointInfo({req:?})");
        let endpoint = self
            .registry
            .endpoint(&req.network_id, &req.endpoint_id)
            .await?;

        let data = serde_json::to_string(&endpoint).map_err(|e| {
            DriverError::malformed(&req.endpoint_id, format!("marshal failed: {e}"))
        })?;

        Ok(InfoResponse {
            value: HashMap::from([("data".to_string(), data)]),
        })
    }

    async fn join(&self, req: JoinRequest) -> Result<JoinResponse> {
        trace!("Join({req:?})");
        let info = self
            .registry
            .join(&req.network_id, &req.endpoint_id, &req.sandbox_key)
            .await?;

        Ok(JoinResponse {
            interface_name: InterfaceName {
                src_name: info.src_name,
                dst_prefix: info.dst_prefix,
            },
            disable_gateway_service: true,
        })
    }

    async fn leave(&self, req: EndpointRequest) -> Result<()> {
        trace!("Leave({req:?})");
        self.registry.leave(&req.network_id, &req.endpoint_id).await
    }
}

/// Routes one decoded request to the driver and wraps the outcome.
pub async fn dispatch(driver: &dyn NetworkDriver, req: Request) -> Response {
    let result = match req {
        Request::GetCapabilities => driver.get_capabilities().await.map(Response::ok),
        Request::CreateNetwork(r) => driver.create_network(r).await.map(Response::ok),
        Request::DeleteNetwork(r) => driver.delete_network(r).await.map(Response::ok),
        Request::CreateEndpoint(r) => driver.create_endpoint(r).await.map(Response::ok),
        Request::DeleteEndpoint(r) => driver.delete_endpoint(r).await.map(Response::ok),
        Request::EndpointInfo(r) => driver.endpoint_info(r).await.map(Response::ok),
        Request::Join(r) => driver.join(r).await.map(Response::ok),
        Request::Leave(r) => driver.leave(r).await.map(Response::ok),
        Request::AllocateNetwork(r) => driver.allocate_network(r).await.map(Response::ok),
        Request::FreeNetwork(r) => driver.free_network(r).await.map(Response::ok),
        Request::DiscoverNew(r) => driver.discover_new(r).await.map(Response::ok),
        Request::DiscoverDelete(r) => driver.discover_delete(r).await.map(Response::ok),
        Request::ProgramExternalConnectivity(r) => driver
            .program_external_connectivity(r)
            .await
            .map(Response::ok),
        Request::RevokeExternalConnectivity(r) => driver
            .revoke_external_connectivity(r)
            .await
            .map(Response::ok),
    };

    result.unwrap_or_else(|e| {
        error!("{e}");
        Response::Err(e.to_string())
    })
}
