use thiserror::Error;

pub type Result<T> = std::result::Result<T, DriverError>;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("P2P: Network {0} already exists")]
    AlreadyExists(String),

    #[error("P2P: Endpoint {endpoint_id} already exists on network {network_id}")]
    EndpointExists {
        network_id: String,
        endpoint_id: String,
    },

    #[error("P2P: Network {0} does not exist")]
    NetworkNotFound(String),

    #[error("P2P: Endpoint {endpoint_id} on network {network_id} does not exist")]
    EndpointNotFound {
        network_id: String,
        endpoint_id: String,
    },

    #[error("P2P: Maximum ({0}) networks allocated")]
    ResourceExhausted(usize),

    #[error("P2P: 2 endpoints already attached to network {0}")]
    TooManyEndpoints(String),

    #[error("P2P: Network {network_id} still has {count} endpoints")]
    HasEndpoints { network_id: String, count: usize },

    #[error("P2P: Invalid id {0:?}")]
    InvalidId(String),

    #[error("P2P: Saving state for {message}")]
    PersistFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("P2P: Interface {0} already exists")]
    LinkExists(String),

    #[error("P2P: Interface {0} does not exist")]
    LinkNotFound(String),

    #[error("P2P: {message}")]
    LinkBackendFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("P2P: Malformed state record {record}: {reason}")]
    MalformedRecord { record: String, reason: String },
}

impl DriverError {
    pub fn persist_failed(
        message: &str,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        DriverError::PersistFailed {
            message: message.to_string(),
            source,
        }
    }

    pub fn link_failed(
        message: &str,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        DriverError::LinkBackendFailed {
            message: message.to_string(),
            source,
        }
    }

    pub fn malformed(record: &str, reason: impl Into<String>) -> Self {
        DriverError::MalformedRecord {
            record: record.to_string(),
            reason: reason.into(),
        }
    }

    pub fn endpoint_not_found(network_id: &str, endpoint_id: &str) -> Self {
        DriverError::EndpointNotFound {
            network_id: network_id.to_string(),
            endpoint_id: endpoint_id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DriverError::NetworkNotFound(_) | DriverError::EndpointNotFound { .. }
        )
    }
}
