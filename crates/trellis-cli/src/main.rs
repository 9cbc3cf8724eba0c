//! Trellis command-line interface
//!
//! Operational tooling around `trellis-core`:
//!
//! - `trellis validate` loads a configuration file and prints what it defines
//! - `trellis rate-limit` replays a burst of calls through the in-memory limiter
//! - `trellis probe` health-checks every endpoint of the rotation groups
//! - `trellis call` sends one request through a rotation group and reports
//!   the failover statistics and circuit states afterwards
//!
//! Logging goes to stderr so command output on stdout stays machine readable.
//! `RUST_LOG` overrides `--log-level` and the `[logging]` section.

mod args;
mod commands;
mod logging;
mod router;

use args::Cli;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    router::route(cli).await
}
