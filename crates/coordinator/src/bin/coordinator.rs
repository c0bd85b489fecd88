//! fleetload coordinator CLI
//!
//! Runs the controller that assigns work and holds the barriers, or the data
//! service that backs remote template and record stores.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fleetload_coordinator::{
    install_shutdown_handler, load_accounts, load_nodes, router, serve,
    CoordinatorConfig, DataService, DataServiceConfig,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fleetload-coordinator")]
#[command(about = "Coordinator and data services for fleetload workers")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assign jobs to workers and run the ready and done barriers
    Controller {
        /// Address to listen on
        #[arg(short, long, default_value = "0.0.0.0:3000")]
        listen: SocketAddr,

        /// Job configuration (JSON, or TOML with a .toml extension)
        #[arg(short, long)]
        jobs: PathBuf,

        /// Accounts file (JSON array or one key per line)
        #[arg(short, long)]
        accounts: PathBuf,

        /// Nodes file (JSON array or one endpoint per line)
        #[arg(short, long)]
        nodes: PathBuf,
    },

    /// Serve node list, accounts, templates and submission records
    DataServer {
        /// Address to listen on
        #[arg(short, long, default_value = "0.0.0.0:3001")]
        listen: SocketAddr,

        /// Accounts file handed out one at a time on /account
        #[arg(short, long)]
        accounts: Option<PathBuf>,

        /// Nodes file served on /nodes
        #[arg(short, long)]
        nodes: Option<PathBuf>,

        /// Give workers without a stored template the templates of others
        #[arg(long)]
        share_templates: bool,

        /// File the records are written to on commit
        #[arg(long)]
        records_file: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let cancel = install_shutdown_handler();

    match cli.command {
        Commands::Controller {
            listen,
            jobs,
            accounts,
            nodes,
        } => {
            let config = CoordinatorConfig::from_files(&jobs, &accounts, &nodes)
                .context("failed to load coordinator configuration")?
                .with_listen(listen);
            let session = Arc::new(config.session()?);
            info!(total_workers = session.total_workers(), "starting controller");

            let listener = TcpListener::bind(config.listen)
                .await
                .with_context(|| format!("failed to bind {}", config.listen))?;
            serve(listener, router(session), cancel).await?;
        }

        Commands::DataServer {
            listen,
            accounts,
            nodes,
            share_templates,
            records_file,
        } => {
            let accounts = match &accounts {
                Some(path) => load_accounts(path)?,
                None => Vec::new(),
            };
            let nodes = match &nodes {
                Some(path) => load_nodes(path)?,
                None => Vec::new(),
            };
            let mut config = DataServiceConfig::new().with_share_templates(share_templates);
            if let Some(path) = records_file {
                config = config.with_records_path(path);
            }
            let data = Arc::new(DataService::new(nodes, accounts, config));
            info!("starting data service");

            let listener = TcpListener::bind(listen)
                .await
                .with_context(|| format!("failed to bind {listen}"))?;
            serve(listener, Arc::clone(&data).router(), cancel).await?;

            if let Err(e) = data.commit().await {
                warn!(error = %e, "failed to commit records on shutdown");
            }
        }
    }

    info!("stopped");
    Ok(())
}
