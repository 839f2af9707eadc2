//! branchsync CLI
//!
//! Edge daemon and operator tools for branch ledger synchronization.
//!
//! # Commands
//!
//! - `edge` - Run the background sync loop against the local store
//! - `sync-once` - Run a single probe → pull → push cycle
//! - `status` - Show connectivity and the unreconciled backlog
//! - `issue-credential` - Issue a branch credential from the cloud secret

mod commands;

use branchsync_engine::{SyncConfig, DEFAULT_SYNC_INTERVAL_SECS};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// branchsync edge/cloud ledger synchronization.
#[derive(Parser)]
#[command(name = "branchsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the edge SQLite database
    #[arg(global = true, long, env = "BRANCHSYNC_DB", default_value = "branchsync.db")]
    db: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Cloud connection settings shared by the edge commands.
#[derive(Args, Debug, Clone)]
struct CloudArgs {
    /// Cloud base URL; sync is disabled when absent
    #[arg(long, env = "CLOUD_API_URL")]
    cloud_url: Option<String>,

    /// Branch credential presented to the cloud; sync is disabled when absent
    #[arg(long, env = "BRANCH_API_KEY", hide_env_values = true)]
    branch_key: Option<String>,

    /// Seconds between sync cycles
    #[arg(long, env = "SYNC_INTERVAL", default_value_t = DEFAULT_SYNC_INTERVAL_SECS)]
    interval: u64,

    /// Maximum records of each kind pushed per cycle
    #[arg(long, default_value_t = 100)]
    batch_size: usize,

    /// Push/pull request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

impl CloudArgs {
    fn config(&self) -> SyncConfig {
        SyncConfig {
            cloud_url: self.cloud_url.clone(),
            branch_key: self.branch_key.clone(),
            ..SyncConfig::default()
        }
        .with_sync_interval(Duration::from_secs(self.interval))
        .with_push_batch_size(self.batch_size)
        .with_request_timeout(Duration::from_secs(self.timeout))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the background sync loop until interrupted
    Edge {
        #[command(flatten)]
        cloud: CloudArgs,
    },

    /// Run one sync cycle and print the outcome
    SyncOnce {
        #[command(flatten)]
        cloud: CloudArgs,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show connectivity and the unreconciled backlog
    Status {
        #[command(flatten)]
        cloud: CloudArgs,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Issue a credential for a branch
    IssueCredential {
        /// Branch id (UUID)
        #[arg(long)]
        branch: String,

        /// Cloud credential secret
        #[arg(long, env = "BRANCHSYNC_CREDENTIAL_SECRET", hide_env_values = true)]
        secret: String,

        /// Treat the secret as hex rather than raw text
        #[arg(long)]
        hex: bool,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Edge { cloud } => {
            commands::edge::run(&cli.db, cloud.config()).await?;
        }
        Commands::SyncOnce { cloud, format } => {
            commands::sync_once::run(&cli.db, cloud.config(), &format).await?;
        }
        Commands::Status { cloud, format } => {
            commands::status::run(&cli.db, cloud.config(), &format).await?;
        }
        Commands::IssueCredential {
            branch,
            secret,
            hex,
        } => {
            commands::issue_credential::run(&branch, &secret, hex)?;
        }
        Commands::Version => {
            println!("branchsync v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
