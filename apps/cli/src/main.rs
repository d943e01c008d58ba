//! kbsync CLI — push fetched documentation into remote knowledge bases.
//!
//! Reads fetched (url, content) pairs, diffs them against the persisted
//! state, and creates or updates documents on the configured destinations.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
