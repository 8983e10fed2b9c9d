use std::{future::Future, io, path::Path, sync::Arc};

use anyhow::Context;
use log::{debug, error, info, warn};
use tokio::{
    io::BufReader,
    net::{UnixListener, UnixStream},
    signal::unix::{signal, SignalKind},
    task,
};

mod cmd;
mod driver;
mod error;
mod list;
mod msg;
mod network;
mod records;

pub use cmd::*;
pub use driver::{dispatch, NetworkDriver, P2pDriver};
pub use error::{DriverError, Result};
pub use list::list_networks;
pub use msg::*;
pub use network::{
    interface_name, Endpoint, JoinInfo, LinkBackend, NetlinkLinks, Network, OrdinalAllocator,
    Recovery, Registry, DST_PREFIX, MAX_NETWORKS,
};
pub use records::{FileStore, Records, StateStore};

async fn run_daemon(args: ServeArgs) -> anyhow::Result<()> {
    if !nix::unistd::geteuid().is_root() {
        warn!("Not running as root, veth pairs can not be created");
    }

    let store = Arc::new(FileStore::init(&args.state_dir)?);
    let registry = Arc::new(Registry::new(store, Arc::new(NetlinkLinks {})));
    let driver = Arc::new(
        P2pDriver::init(registry)
            .await
            .context("Failed to start driver")?,
    );

    let listener = bind(&args.socket)?;
    info!(
        "[Daemon]: Driver is running and listening on {}",
        args.socket.display()
    );

    let mut sigterm = signal(SignalKind::terminate())?;
    let shutdown = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        info!("[Daemon]: Exiting due to signal");
    };

    let served = serve_until(serve(listener, driver), shutdown).await;
    let _ = std::fs::remove_file(&args.socket);
    info!("[Daemon]: Driver is exiting");
    served
}

/// Only a shutdown signal ends the daemon cleanly; an accept loop that
/// stops on its own is an error.
async fn serve_until(
    serving: impl Future<Output = io::Result<()>>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    tokio::select! {
        res = serving => {
            res.context("Accepting driver connections")?;
            anyhow::bail!("Accept loop stopped unexpectedly")
        }
        _ = shutdown => Ok(()),
    }
}

fn bind(path: &Path) -> anyhow::Result<UnixListener> {
    // Delete the old socket file
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    if let Some(parent_dir) = path.parent() {
        std::fs::create_dir_all(parent_dir)?;
    }

    UnixListener::bind(path).with_context(|| format!("Failed to bind {}", path.display()))
}

/// Accepts connections until the listener fails; one task per connection.
pub async fn serve(listener: UnixListener, driver: Arc<dyn NetworkDriver>) -> io::Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                debug!("[Daemon]: Accepted client connection");
                task::spawn(handler(stream, driver.clone()));
            }
            Err(e) => {
                error!("[Daemon]: Accept failed: {e}");
                return Err(e);
            }
        }
    }
}

async fn handler(stream: UnixStream, driver: Arc<dyn NetworkDriver>) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    while let Some(parsed) = Request::recv_from(&mut reader).await? {
        let response = match parsed {
            Ok(req) => dispatch(driver.as_ref(), req).await,
            Err(e) => {
                error!("[Daemon]: Invalid request: {e}");
                Response::Err(format!("P2P: Invalid request: {e}"))
            }
        };
        response.send_to(&mut writer).await?;
    }

    debug!("[Daemon]: Client disconnected");
    Ok(())
}

pub fn daemon(args: ServeArgs) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run_daemon(args))
}
