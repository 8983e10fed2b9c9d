use std::num::NonZeroI32;

use async_trait::async_trait;
use futures::TryStreamExt;
use log::debug;
use netlink_packet_route::link::LinkMessage;
use nix::errno::Errno;

use super::network::interface_name;
use crate::core::error::{DriverError, Result};

/// Kernel side of a network: one veth pair per network ordinal, named
/// `p2pN-0` / `p2pN-1`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LinkBackend: Send + Sync {
    /// Fails with `LinkExists` if the side-0 name is already taken.
    async fn create_pair(&self, ordinal: usize) -> Result<()>;

    /// Fails with `LinkNotFound` if there is no pair for the ordinal.
    async fn delete_pair(&self, ordinal: usize) -> Result<()>;
}

/// Veth pairs through rtnetlink.
pub struct NetlinkLinks {}

#[async_trait]
impl LinkBackend for NetlinkLinks {
    async fn create_pair(&self, ordinal: usize) -> Result<()> {
        let host = interface_name(ordinal, 0);
        let peer = interface_name(ordinal, 1);

        let handle = Self::connect()?;
        handle
            .link()
            .add()
            .veth(host.clone(), peer.clone())
            .execute()
            .await
            .map_err(|e| {
                classify(
                    errno_of(&e),
                    &host,
                    format!("Creating veth interface pair {host}/{peer}: {e}"),
                )
            })?;

        debug!("Created veth pair {host}/{peer}");
        Ok(())
    }

    async fn delete_pair(&self, ordinal: usize) -> Result<()> {
        let host = interface_name(ordinal, 0);

        let handle = Self::connect()?;
        let link = Self::get_link_by_name(&host, &handle).await?;

        // Removing one side takes the peer with it.
        handle
            .link()
            .del(link.header.index)
            .execute()
            .await
            .map_err(|e| {
                classify(
                    errno_of(&e),
                    &host,
                    format!("Removing veth interface pair {host}: {e}"),
                )
            })?;

        debug!("Deleted veth pair {host}");
        Ok(())
    }
}

impl NetlinkLinks {
    fn connect() -> Result<rtnetlink::Handle> {
        let (connection, handle, _) = rtnetlink::new_connection()
            .map_err(|e| DriverError::link_failed("Opening netlink socket", Some(Box::new(e))))?;
        tokio::spawn(connection);

        Ok(handle)
    }

    async fn get_link_by_name(name: &str, handle: &rtnetlink::Handle) -> Result<LinkMessage> {
        handle
            .link()
            .get()
            .match_name(name.to_string())
            .execute()
            .try_next()
            .await
            .map_err(|e| classify(errno_of(&e), name, format!("Looking up link {name}: {e}")))?
            .ok_or_else(|| DriverError::LinkNotFound(name.to_string()))
    }
}

fn errno_of(e: &rtnetlink::Error) -> Option<Errno> {
    match e {
        rtnetlink::Error::NetlinkError(msg) => errno_from_code(msg.code),
        _ => None,
    }
}

/// Netlink NACKs carry the errno negated.
fn errno_from_code(code: Option<NonZeroI32>) -> Option<Errno> {
    code.map(|code| Errno::from_raw(-code.get()))
}

/// Recovery relies on `LinkExists` and delete on `LinkNotFound`; every
/// other failure is opaque.
fn classify(errno: Option<Errno>, name: &str, message: String) -> DriverError {
    match errno {
        Some(Errno::EEXIST) => DriverError::LinkExists(name.to_string()),
        Some(Errno::ENODEV) => DriverError::LinkNotFound(name.to_string()),
        _ => DriverError::link_failed(&message, None),
    }
}
