pub mod core;

pub use crate::core::{daemon, list_networks};

// Re-export commonly used types for integration tests
pub use crate::core::{
    dispatch, serve, DriverError, FileStore, LinkBackend, NetworkDriver, P2pDriver, Registry,
    Request, Response, StateStore,
};
