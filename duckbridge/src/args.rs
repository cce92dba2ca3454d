use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Config file read when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "duckbridge.toml";

/// duckbridge command line
#[derive(Debug, Parser)]
#[command(name = "duckbridge", about = "OpenAI-compatible chat API backed by duck.ai")]
pub struct Args {
    /// Path to configuration file; built-in defaults apply when omitted and
    /// `duckbridge.toml` does not exist
    #[arg(short, long, env = "DUCKBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the listen address
    #[arg(long, env = "DUCKBRIDGE_LISTEN")]
    pub listen: Option<SocketAddr>,
}
