use std::io::Write;

use log::warn;
use tabwriter::TabWriter;

use super::cmd::NetworksArgs;
use super::network::Network;
use super::records::{FileStore, StateStore};

pub fn list_networks(args: &NetworksArgs) -> anyhow::Result<String> {
    let store = FileStore::init(&args.state_dir)?;

    let mut networks = Vec::new();
    for record in store.load_all()? {
        match record {
            Ok(network) => networks.push(network),
            Err(e) => warn!("{e}"),
        }
    }

    render(&networks)
}

fn render(networks: &[Network]) -> anyhow::Result<String> {
    let mut sorted: Vec<&Network> = networks.iter().collect();
    sorted.sort_by_key(|n| n.ordinal);

    let mut tw = TabWriter::new(vec![]);
    tw.write_all(b"NETWORK ID\tORDINAL\tINTERFACES\tENDPOINTS\n")?;

    for network in sorted {
        let (host, peer) = network.interface_names();
        writeln!(
            tw,
            "{}\t{}\t{}/{}\t{}",
            network.id,
            network.ordinal,
            host,
            peer,
            network.endpoints.len()
        )?;
    }

    tw.flush()?;
    let bytes = tw
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Flushing table: {}", e.error()))?;
    Ok(String::from_utf8(bytes)?)
}
