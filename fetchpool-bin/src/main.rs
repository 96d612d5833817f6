//! The `fetchpool` binary is a thin wrapper around `fetchpool-lib`.
//!
//! Fetch a batch of URLs and print latency statistics:
//!
//! ```sh
//! fetchpool fetch https://example.com https://example.org
//! fetchpool fetch --urls-file urls.txt --max-concurrency 20 --host-concurrency 4
//! ```
//!
//! Run the line-based command server (`PING`/`SHUTDOWN` over TCP):
//!
//! ```sh
//! fetchpool serve --port 5555
//! ```
//!
//! Log verbosity is controlled through `RUST_LOG`.
#![warn(clippy::all, clippy::pedantic)]

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

mod commands;
mod options;
mod protocol;

use options::{Command, Opts};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();
    match opts.command {
        Command::Fetch(args) => commands::fetch(&args).await,
        Command::Serve(args) => {
            commands::serve(&args).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
