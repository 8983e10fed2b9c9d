use std::{collections::HashMap, sync::Arc};

use log::{debug, error, info, warn};
use tokio::sync::RwLock;

use super::{
    network::{interface_name, validate_id, Endpoint, Network, DST_PREFIX},
    ordinal::{OrdinalAllocator, MAX_NETWORKS},
    veth::LinkBackend,
};
use crate::core::error::{DriverError, Result};
use crate::core::records::StateStore;

/// Names handed back on join: the host-side interface to move and the
/// prefix for its name inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinInfo {
    pub src_name: String,
    pub dst_prefix: String,
}

/// Outcome of replaying the state store at startup.
#[derive(Debug, Default)]
pub struct Recovery {
    pub restored: Vec<String>,
    pub skipped: Vec<DriverError>,
}

struct State {
    alloc: OrdinalAllocator,
    networks: HashMap<String, Network>,
}

/// Authoritative map of networks and their endpoints.
///
/// Every mutation holds the write lock for its whole duration, including
/// the store and link backend calls, so memory, disk and kernel are never
/// seen half-updated.
pub struct Registry {
    state: RwLock<State>,
    store: Arc<dyn StateStore>,
    links: Arc<dyn LinkBackend>,
}

impl Registry {
    pub fn new(store: Arc<dyn StateStore>, links: Arc<dyn LinkBackend>) -> Self {
        Registry {
            state: RwLock::new(State {
                alloc: OrdinalAllocator::empty(),
                networks: HashMap::new(),
            }),
            store,
            links,
        }
    }

    /// Reloads every stored network, re-marks its ordinal and re-creates its
    /// veth pair, tolerating pairs left behind by a previous process.
    ///
    /// Malformed records are skipped. Any other link failure aborts, since a
    /// network without its kernel object cannot be served.
    pub async fn recover(&self) -> Result<Recovery> {
        let mut state = self.state.write().await;
        let mut recovery = Recovery::default();

        for record in self.store.load_all()? {
            let network = match record {
                Ok(network) => network,
                Err(e) => {
                    error!("Error loading network state: {e}");
                    recovery.skipped.push(e);
                    continue;
                }
            };

            if !state.alloc.mark(network.ordinal) {
                let e = DriverError::malformed(
                    &network.id,
                    format!("ordinal {} already claimed by another record", network.ordinal),
                );
                error!("Error loading network state: {e}");
                recovery.skipped.push(e);
                continue;
            }

            match self.links.create_pair(network.ordinal).await {
                Ok(()) => {}
                Err(DriverError::LinkExists(name)) => {
                    info!("Ignoring existing interface {name} on network recreate");
                }
                Err(e) => {
                    debug!("Error recreating veth pair for {}: {e}", network.id);
                    state.alloc.release(network.ordinal);
                    return Err(e);
                }
            }

            debug!("Restored network: p2p{}: {}", network.ordinal, network.id);
            recovery.restored.push(network.id.clone());
            state.networks.insert(network.id.clone(), network);
        }

        Ok(recovery)
    }

    pub async fn create_network(&self, network_id: &str) -> Result<Network> {
        validate_id(network_id)?;
        let mut state = self.state.write().await;

        if state.networks.contains_key(network_id) {
            return Err(DriverError::AlreadyExists(network_id.to_string()));
        }

        let ordinal = state
            .alloc
            .allocate()
            .ok_or(DriverError::ResourceExhausted(MAX_NETWORKS))?;

        debug!("Creating network: p2p{ordinal}: {network_id}");
        let network = Network::new(network_id, ordinal);

        if let Err(e) = self.store.save(&network) {
            state.alloc.release(ordinal);
            return Err(e);
        }

        // A pair that already exists here is a stale kernel object, not ours.
        if let Err(e) = self.links.create_pair(ordinal).await {
            debug!("Error creating veth interface pair for {network_id}: {e}");
            if let Err(del) = self.store.delete(network_id) {
                error!("Error removing state for network {network_id}: {del}");
            }
            state.alloc.release(ordinal);
            return Err(e);
        }

        state.networks.insert(network_id.to_string(), network.clone());
        Ok(network)
    }

    /// Forgets the network in memory and on disk before tearing the pair
    /// down, so a kernel failure is reported but never resurrects the id.
    pub async fn delete_network(&self, network_id: &str) -> Result<()> {
        let mut state = self.state.write().await;

        let network = state
            .networks
            .get(network_id)
            .ok_or_else(|| DriverError::NetworkNotFound(network_id.to_string()))?;

        if !network.endpoints.is_empty() {
            return Err(DriverError::HasEndpoints {
                network_id: network_id.to_string(),
                count: network.endpoints.len(),
            });
        }

        let ordinal = network.ordinal;
        debug!("Deleting network: p2p{ordinal}: {network_id}");

        state.alloc.release(ordinal);
        state.networks.remove(network_id);
        let persisted = self.store.delete(network_id);

        match self.links.delete_pair(ordinal).await {
            Ok(()) => {}
            Err(DriverError::LinkNotFound(name)) => {
                warn!("Interface {name} already gone while deleting {network_id}");
            }
            Err(e) => {
                if let Err(p) = persisted {
                    error!("Error removing state for network {network_id}: {p}");
                }
                return Err(e);
            }
        }

        persisted
    }

    pub async fn create_endpoint(
        &self,
        network_id: &str,
        endpoint_id: &str,
        interface: Option<serde_json::Value>,
    ) -> Result<Endpoint> {
        let mut state = self.state.write().await;

        let network = state
            .networks
            .get_mut(network_id)
            .ok_or_else(|| DriverError::NetworkNotFound(network_id.to_string()))?;

        if network.endpoints.contains_key(endpoint_id) {
            return Err(DriverError::EndpointExists {
                network_id: network_id.to_string(),
                endpoint_id: endpoint_id.to_string(),
            });
        }

        let side = network
            .free_side()
            .ok_or_else(|| DriverError::TooManyEndpoints(network_id.to_string()))?;

        debug!(
            "Creating endpoint: {side} on p2p{}: ({endpoint_id}, {network_id})",
            network.ordinal
        );

        let endpoint = Endpoint::new(endpoint_id, side, interface);
        network
            .endpoints
            .insert(endpoint_id.to_string(), endpoint.clone());

        if let Err(e) = self.store.save(network) {
            network.endpoints.remove(endpoint_id);
            return Err(e);
        }

        Ok(endpoint)
    }

    /// Removes the endpoint and re-saves the record right away. If that save
    /// fails the endpoint stays removed in memory and the error is returned.
    pub async fn delete_endpoint(&self, network_id: &str, endpoint_id: &str) -> Result<()> {
        let mut state = self.state.write().await;

        let network = state
            .networks
            .get_mut(network_id)
            .ok_or_else(|| DriverError::NetworkNotFound(network_id.to_string()))?;

        let endpoint = network
            .endpoints
            .remove(endpoint_id)
            .ok_or_else(|| DriverError::endpoint_not_found(network_id, endpoint_id))?;

        debug!(
            "Deleting endpoint {} on p2p{} ({endpoint_id}, {network_id})",
            endpoint.ordinal,
            network.ordinal
        );

        self.store.save(network).inspect_err(|e| {
            error!("Error saving state after deleting endpoint {endpoint_id}: {e}");
        })
    }

    /// Names the side of the pair the endpoint is bound to. Touches no
    /// kernel state; the pair exists since the network was created.
    pub async fn join(
        &self,
        network_id: &str,
        endpoint_id: &str,
        sandbox_key: &str,
    ) -> Result<JoinInfo> {
        let mut state = self.state.write().await;

        let network = state
            .networks
            .get_mut(network_id)
            .ok_or_else(|| DriverError::NetworkNotFound(network_id.to_string()))?;
        let network_ordinal = network.ordinal;

        let endpoint = network
            .endpoints
            .get_mut(endpoint_id)
            .ok_or_else(|| DriverError::endpoint_not_found(network_id, endpoint_id))?;

        endpoint.sandbox_key = Some(sandbox_key.to_string());

        Ok(JoinInfo {
            src_name: interface_name(network_ordinal, endpoint.ordinal),
            dst_prefix: DST_PREFIX.to_string(),
        })
    }

    /// Leave may race with delete, so unknown ids are not an error.
    pub async fn leave(&self, network_id: &str, endpoint_id: &str) -> Result<()> {
        let mut state = self.state.write().await;

        match state
            .networks
            .get_mut(network_id)
            .and_then(|n| n.endpoints.get_mut(endpoint_id))
        {
            Some(endpoint) => endpoint.sandbox_key = None,
            None => debug!("Leave for unknown endpoint ({endpoint_id}, {network_id})"),
        }

        Ok(())
    }

    pub async fn endpoint(&self, network_id: &str, endpoint_id: &str) -> Result<Endpoint> {
        let state = self.state.read().await;

        let network = state
            .networks
            .get(network_id)
            .ok_or_else(|| DriverError::NetworkNotFound(network_id.to_string()))?;

        network
            .endpoints
            .get(endpoint_id)
            .cloned()
            .ok_or_else(|| DriverError::endpoint_not_found(network_id, endpoint_id))
    }

    pub async fn network(&self, network_id: &str) -> Option<Network> {
        self.state.read().await.networks.get(network_id).cloned()
    }

    pub async fn networks(&self) -> Vec<Network> {
        let state = self.state.read().await;
        let mut networks: Vec<Network> = state.networks.values().cloned().collect();
        networks.sort_by_key(|n| n.ordinal);
        networks
    }

    pub async fn allocated_ordinals(&self) -> usize {
        self.state.read().await.alloc.count()
    }
}
