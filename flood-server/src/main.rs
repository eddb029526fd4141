//! Binary crate for the `flood-risk` service.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Serving the HTTP API
//! - Logging setup

use clap::Parser;

mod cli;
mod logging;
mod routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();
    logging::init_logger(cmd.verbose);
    cmd.run().await
}
