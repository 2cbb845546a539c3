use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

/// The Prism LLM gateway.
#[derive(Debug, Parser)]
#[command(name = "prism", version, about)]
pub(crate) struct Args {
    /// Path to the prism.toml configuration file. Without it the gateway
    /// runs on defaults plus environment overrides.
    #[arg(short, long, env = "PRISM_CONFIG")]
    pub(crate) config: Option<PathBuf>,

    /// Address to listen on. Overrides the configuration file.
    #[arg(short, long, env = "PRISM_LISTEN")]
    pub(crate) listen: Option<SocketAddr>,

    /// Log level: error, warn, info, debug or trace.
    #[arg(long, env = "PRISM_LOG", default_value = "info")]
    pub(crate) log: String,
}
