use std::process::exit;

use clap::Parser;
use log::{error, info};

use p2pnet::core::{Commands, CLI};
use p2pnet::{daemon, list_networks};

fn init_logging(level: log::LevelFilter) {
    // RUST_LOG, when set, wins over the command line.
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() {
    let cli = CLI::parse();

    match cli.command {
        Commands::Serve(args) => {
            init_logging(args.log_level());
            info!(
                "Initializing p2p network driver: version {}",
                env!("CARGO_PKG_VERSION")
            );

            if let Err(e) = daemon(args) {
                error!("Failed to run driver: {:?}", e);
                exit(-1);
            }
        }
        Commands::Networks(args) => {
            init_logging(log::LevelFilter::Warn);

            match list_networks(&args) {
                Ok(table) => print!("{table}"),
                Err(e) => {
                    error!("Failed to list networks: {:?}", e);
                    exit(-1);
                }
            }
        }
    }
}
