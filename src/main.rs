//! http-warden server binary.
//!
//! Loads the TOML configuration given with `--config` (defaults otherwise),
//! serves the built-in status page and runs until SIGINT or SIGTERM.

use std::path::PathBuf;

use clap::Parser;

use http_warden::lifecycle::startup;

#[derive(Parser)]
#[command(name = "http-warden")]
#[command(about = "HTTP server core with connection admission control", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Err(e) = startup::run(args.config).await {
        tracing::error!(error = %e, "Startup failed");
        return Err(e.into());
    }
    Ok(())
}
