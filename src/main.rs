//! Capstan CLI - serve the per-project issue tracker API.

use capstan::cli::{Cli, Commands};
use capstan::storage::{self, Storage};
use clap::Parser;
use std::process;

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_command(cli: Cli) -> Result<(), capstan::Error> {
    let data_dir = storage::resolve_data_dir(cli.data_dir.as_deref())?;

    match cli.command {
        Commands::Serve { port, host } => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| capstan::Error::Other(format!("Failed to create runtime: {}", e)))?
            .block_on(async {
                capstan::server::start_server(&data_dir, port, &host)
                    .await
                    .map_err(|e| capstan::Error::Other(format!("Server error: {}", e)))
            }),
        Commands::Paths => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": data_dir,
                    "issues_log": data_dir.join("issues.jsonl"),
                    "cache_db": data_dir.join("cache.db"),
                    "initialized": Storage::exists(&data_dir),
                })
            );
            Ok(())
        }
    }
}
