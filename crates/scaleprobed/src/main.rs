//! scaleprobed — the scaleprobe daemon.
//!
//! Single binary that assembles all scaleprobe subsystems:
//! - State store (redb, on disk or in memory)
//! - Simulated placement engine
//! - Recommendation engine
//! - REST API
//!
//! # Usage
//!
//! ```text
//! scaleprobed serve --descriptor scaleprobe.toml --prices prices.toml --port 8480
//! scaleprobed recommend --descriptor scaleprobe.toml --workload workload.toml scale-up
//! ```

mod cluster;
mod oneshot;
mod serve;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,scaleprobed=debug,scaleprobe=debug";

#[derive(Parser)]
#[command(name = "scaleprobed", about = "scaleprobe capacity recommendation daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

/// Inputs shared by every mode.
#[derive(Args, Debug, Clone)]
pub struct ClusterArgs {
    /// Cluster descriptor (TOML).
    #[arg(long, default_value = "scaleprobe.toml")]
    pub descriptor: PathBuf,

    /// Machine-type price table (TOML). Without it every type costs 0.
    #[arg(long)]
    pub prices: Option<PathBuf>,

    /// Workload manifest (TOML) submitted at startup.
    #[arg(long)]
    pub workload: Option<PathBuf>,

    /// Directory for persistent state; in-memory when omitted.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the REST API.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "8480")]
        port: u16,

        #[command(flatten)]
        cluster: ClusterArgs,
    },
    /// Run one scenario and print the result as JSON.
    Recommend {
        #[command(flatten)]
        cluster: ClusterArgs,

        #[command(subcommand)]
        scenario: oneshot::Scenario,
    },
}

fn init_tracing(json: bool, to_stderr: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (json, to_stderr) {
        (true, true) => builder.json().with_writer(std::io::stderr).init(),
        (true, false) => builder.json().init(),
        (false, true) => builder.with_writer(std::io::stderr).init(),
        (false, false) => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { port, cluster } => {
            init_tracing(cli.log_json, false);
            serve::run_server(port, cluster).await
        }
        Command::Recommend { cluster, scenario } => {
            // Keep stdout for the JSON result.
            init_tracing(cli.log_json, true);
            oneshot::run_scenario(cluster, scenario).await
        }
    }
}
