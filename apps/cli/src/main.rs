//! blockfeed CLI: mirror a content database into local JSON and assets.
//!
//! Pulls posts and block trees from the content API, downloads the files
//! they reference, and writes a snapshot a static site build can read.

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
