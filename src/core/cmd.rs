use std::path::PathBuf;

use clap::{builder::BoolishValueParser, Args, Parser, Subcommand};

pub const STATE_DIR: &str = "/etc/docker/docker-network-p2p";
pub const SOCKET_PATH: &str = "/run/docker/plugins/p2p.sock";

#[derive(Parser, Debug, Clone)]
#[command(name = "p2pnet", version)]
#[command(about = "p2pnet is a point-to-point container network driver backed by veth pairs.")]
pub struct CLI {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Restore persisted networks and serve driver requests.
    Serve(ServeArgs),
    /// List the networks recorded in the state directory.
    Networks(NetworksArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Directory holding one state record per network.
    #[arg(long, default_value = STATE_DIR)]
    pub state_dir: PathBuf,

    /// Unix socket to serve requests on.
    #[arg(long, default_value = SOCKET_PATH)]
    pub socket: PathBuf,

    /// Enable debug logging. `DEBUG` accepts 1/0, true/false, yes/no, on/off.
    #[arg(short, long, env = "DEBUG", value_parser = BoolishValueParser::new())]
    pub debug: bool,

    /// Log every driver request.
    #[arg(long)]
    pub trace: bool,
}

#[derive(Args, Debug, Clone)]
pub struct NetworksArgs {
    /// Directory holding one state record per network.
    #[arg(long, default_value = STATE_DIR)]
    pub state_dir: PathBuf,
}

impl ServeArgs {
    pub fn log_level(&self) -> log::LevelFilter {
        if self.trace {
            log::LevelFilter::Trace
        } else if self.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        }
    }
}
