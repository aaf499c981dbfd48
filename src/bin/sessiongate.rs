//! Shim binary that calls into the `sessiongate_server` library's `inner_main`.
use clap::Parser as _;
use eyre::Result;

use sessiongate_server::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Delegate to library entrypoint
    sessiongate_server::inner_main(Cli::parse()).await
}
