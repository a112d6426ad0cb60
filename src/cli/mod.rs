//! CLI argument definitions for Capstan.

use clap::{Parser, Subcommand};

/// Capstan - a per-project issue tracker served over HTTP.
#[derive(Parser, Debug)]
#[command(name = "cpn")]
#[command(author, version, about = "Track issues per project over a JSON HTTP API", long_about = None)]
pub struct Cli {
    /// Directory holding the issue store.
    /// Defaults to the platform data dir (e.g. ~/.local/share/capstan).
    /// Can also be set via the CPN_DATA_DIR environment variable.
    #[arg(short = 'd', long = "data-dir", global = true, env = "CPN_DATA_DIR")]
    pub data_dir: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the issue API server
    ///
    /// Initializes the store on first run, then serves
    /// /api/issues/{project} until interrupted.
    Serve {
        /// Port to listen on (default: 3030, or CPN_PORT env var)
        #[arg(short, long, env = "CPN_PORT", default_value_t = crate::server::DEFAULT_PORT)]
        port: u16,

        /// Host address to bind to (default: 127.0.0.1, use 0.0.0.0 for network access)
        #[arg(long, env = "CPN_HOST", default_value = "127.0.0.1")]
        host: String,
    },

    /// Print resolved storage paths as JSON
    Paths,
}
