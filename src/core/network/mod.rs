mod network;
mod ordinal;
mod registry;
mod veth;

pub use network::*;
pub use ordinal::{OrdinalAllocator, MAX_NETWORKS};
pub use registry::{JoinInfo, Recovery, Registry};
pub use veth::{LinkBackend, NetlinkLinks};

#[cfg(test)]
pub use veth::MockLinkBackend;
