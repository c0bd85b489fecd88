//! fleetload CLI
//!
//! Generates, sends and tracks transaction load, either standalone or as a
//! worker of a coordinated fleet.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use fleetload_generator::shutdown::install_interrupt_handler;
use fleetload_generator::{
    fetch_remote_endpoints, run_worker, CoordinatorClient, EndpointPool, FileRecordStore,
    FileTemplateStore, GeneratorConfig, HttpAuthor, HttpNetwork, IdentitySource,
    IdentityValidation, LoadGenerator, LoadRegistry, LocalRecordStore, LocalTemplateStore,
    Network, RecordStore, RemoteIdentities, RemoteRecordStore, RemoteService,
    RemoteTemplateStore, RotationPolicy, SendConfig, StaticIdentities, TemplateStore,
    WaitConfig, WorkerError, WorkerOptions,
};
use fleetload_types::{Endpoint, Identity};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const TEMPLATE_SUFFIX: &str = "-template.json";
const IDS_SUFFIX: &str = "-ids.json";

#[derive(Parser)]
#[command(name = "fleetload")]
#[command(about = "Transaction load generator")]
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
    /// Generate templates, send them and wait for inclusion in one go
    Run {
        /// Load to run
        load: String,

        #[command(flatten)]
        load_data: LoadDataArgs,

        #[command(flatten)]
        keys: KeyArgs,

        #[command(flatten)]
        nodes: NodeArgs,

        #[command(flatten)]
        send: SendArgs,

        #[command(flatten)]
        wait: WaitArgs,
    },

    /// Generate one template per account and store them for a later `send`
    Generate {
        /// Load to generate
        load: String,

        #[command(flatten)]
        load_data: LoadDataArgs,

        #[command(flatten)]
        keys: KeyArgs,

        #[command(flatten)]
        nodes: NodeArgs,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Send instances of a stored template
    Send {
        #[command(flatten)]
        nodes: NodeArgs,

        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        send: SendArgs,
    },

    /// Wait for inclusion of recorded transactions
    Wait {
        #[command(flatten)]
        nodes: NodeArgs,

        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        wait: WaitArgs,
    },

    /// Run as a worker of a coordinator
    Worker {
        /// Coordinator URL
        #[arg(short, long)]
        coordinator: String,

        /// Time between barrier polls
        #[arg(long, default_value = "5s")]
        barrier_poll: humantime::Duration,

        #[command(flatten)]
        nodes: NodeArgs,

        #[command(flatten)]
        send: SendArgs,

        #[command(flatten)]
        wait: WaitArgs,
    },

    /// List available loads
    Loads,
}

#[derive(Clone, Copy, ValueEnum)]
enum Rotation {
    /// Cycle through endpoints forever
    Wrap,
    /// Fail once every endpoint has been tried
    Exhaust,
}

impl From<Rotation> for RotationPolicy {
    fn from(rotation: Rotation) -> Self {
        match rotation {
            Rotation::Wrap => RotationPolicy::Wrap,
            Rotation::Exhaust => RotationPolicy::Exhaust,
        }
    }
}

#[derive(Args)]
struct NodeArgs {
    /// Node endpoints (comma-separated)
    #[arg(short, long, value_delimiter = ',', env = "FLEETLOAD_ENDPOINTS")]
    endpoints: Vec<String>,

    /// Data service URL (endpoints, identities, stores)
    #[arg(long)]
    remote: Option<String>,

    /// Worker id sent to the data service and the coordinator
    #[arg(long)]
    id: Option<String>,

    /// Endpoint rotation policy
    #[arg(long, value_enum, default_value = "wrap")]
    rotation: Rotation,

    /// Timeout of every network request
    #[arg(long, default_value = "60s")]
    request_timeout: humantime::Duration,

    /// Retries of a failed setup submission
    #[arg(long, default_value = "3")]
    submit_retries: u32,

    /// Failed submissions in a row before sending gives up
    #[arg(long, default_value = "10")]
    max_failures: u32,
}

impl NodeArgs {
    fn generator_config(&self, wait: WaitConfig) -> GeneratorConfig {
        GeneratorConfig::default()
            .with_request_timeout(*self.request_timeout)
            .with_submit_retries(self.submit_retries)
            .with_max_consecutive_failures(self.max_failures)
            .with_setup_wait(wait)
    }

    fn remote(&self) -> Result<Option<RemoteService>> {
        self.remote
            .as_ref()
            .map(|url| {
                RemoteService::new(
                    Endpoint::new(url.as_str()),
                    self.id.clone(),
                    *self.request_timeout,
                )
                .context("failed to create data service client")
            })
            .transpose()
    }

    fn endpoint_list(&self) -> Vec<Endpoint> {
        self.endpoints
            .iter()
            .filter(|e| !e.trim().is_empty())
            .map(|e| Endpoint::new(e.trim()))
            .collect()
    }

    async fn pool(&self) -> Result<EndpointPool> {
        let mut endpoints = self.endpoint_list();
        if endpoints.is_empty() {
            if let Some(remote) = self.remote()? {
                endpoints = fetch_remote_endpoints(&remote)
                    .await
                    .context("failed to fetch endpoints from the data service")?;
            }
        }
        EndpointPool::new(endpoints, self.rotation.into())
            .context("no node endpoints given (use --endpoints or --remote)")
    }
}

#[derive(Args)]
struct LoadDataArgs {
    /// Load data as inline JSON
    #[arg(long, conflicts_with = "data_file")]
    data: Option<String>,

    /// Load data from a JSON file
    #[arg(long)]
    data_file: Option<PathBuf>,
}

impl LoadDataArgs {
    fn value(&self) -> Result<Value> {
        let text = match (&self.data, &self.data_file) {
            (Some(data), _) => data.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
            (None, None) => return Ok(Value::Null),
        };
        serde_json::from_str(&text).context("load data is not valid JSON")
    }
}

#[derive(Args)]
struct KeyArgs {
    /// Private key of a sending account (repeatable)
    #[arg(short, long = "key")]
    keys: Vec<String>,

    /// File with one private key per line
    #[arg(long)]
    keys_file: Option<PathBuf>,

    /// Number of accounts to use
    #[arg(long, default_value = "1")]
    accounts: usize,

    /// Only use accounts with at least this balance and no pending transactions
    #[arg(long)]
    min_balance: Option<u64>,
}

impl KeyArgs {
    fn identities(&self) -> Result<Vec<Identity>> {
        let mut identities: Vec<Identity> = self.keys.iter().map(|k| Identity::from(k.as_str())).collect();
        if let Some(path) = &self.keys_file {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            identities.extend(
                text.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(Identity::from),
            );
        }
        Ok(identities)
    }

    fn source(
        &self,
        nodes: &NodeArgs,
        network: Arc<dyn Network>,
        pool: &EndpointPool,
    ) -> Result<Box<dyn IdentitySource>> {
        let identities = self.identities()?;
        if identities.is_empty() {
            return match nodes.remote()? {
                Some(remote) => Ok(Box::new(RemoteIdentities::new(remote))),
                None => bail!("no keys given (use --key, --keys-file or --remote)"),
            };
        }
        let mut source = StaticIdentities::new(identities);
        if let Some(min_balance) = self.min_balance {
            source = source.with_validation(
                IdentityValidation::new(network, pool.current().clone())
                    .with_min_balance(min_balance)
                    .with_timeout(*nodes.request_timeout),
            );
        }
        Ok(Box::new(source))
    }
}

#[derive(Args)]
struct StoreArgs {
    /// File prefix of the template and record files
    #[arg(short, long, default_value = "fleetload")]
    prefix: String,
}

impl StoreArgs {
    fn template_path(&self) -> PathBuf {
        PathBuf::from(format!("{}{TEMPLATE_SUFFIX}", self.prefix))
    }

    fn ids_path(&self) -> PathBuf {
        PathBuf::from(format!("{}{IDS_SUFFIX}", self.prefix))
    }

    fn templates(&self, nodes: &NodeArgs) -> Result<Box<dyn TemplateStore>> {
        Ok(match nodes.remote()? {
            Some(remote) => Box::new(RemoteTemplateStore::new(remote)),
            None => Box::new(FileTemplateStore::new(self.template_path())),
        })
    }

    async fn records(&self, nodes: &NodeArgs) -> Result<Box<dyn RecordStore>> {
        Ok(match nodes.remote()? {
            Some(remote) => Box::new(RemoteRecordStore::new(remote)),
            None => Box::new(FileRecordStore::open(self.ids_path()).await?),
        })
    }
}

#[derive(Args)]
struct SendArgs {
    /// Number of transactions to send
    #[arg(short = 'n', long, conflicts_with_all = ["duration", "infinite"])]
    count: Option<u64>,

    /// How long to send (e.g. "30s", "5m")
    #[arg(short, long, conflicts_with = "infinite")]
    duration: Option<humantime::Duration>,

    /// Send until interrupted
    #[arg(long)]
    infinite: bool,

    /// Time between pacing ticks
    #[arg(long, alias = "period")]
    interval: Option<humantime::Duration>,

    /// Transactions per tick
    #[arg(long, default_value = "1")]
    pack_size: usize,

    /// Switch node every tick
    #[arg(long)]
    rotate_nodes: bool,

    /// Switch sending account every tick
    #[arg(long, alias = "rotate-keys")]
    rotate_senders: bool,

    /// Validity window of signed transactions
    #[arg(long)]
    valid_time: Option<humantime::Duration>,
}

impl SendArgs {
    fn config(&self) -> SendConfig {
        let duration = self.duration.as_deref().copied();
        let mut config = match (self.count, duration, self.infinite) {
            (Some(count), _, _) => SendConfig::count(count),
            (None, Some(duration), _) => SendConfig::duration(duration),
            (None, None, true) => SendConfig::infinite(),
            (None, None, false) => SendConfig::count(1),
        };
        config = config
            .with_pack_size(self.pack_size)
            .with_rotate_nodes(self.rotate_nodes)
            .with_rotate_senders(self.rotate_senders);
        if let Some(interval) = self.interval.as_deref() {
            config = config.with_interval(*interval);
        }
        if let Some(valid_time) = self.valid_time.as_deref() {
            config = config.with_valid_time(*valid_time);
        }
        config
    }
}

#[derive(Args)]
struct WaitArgs {
    /// Do not wait for inclusion
    #[arg(long)]
    no_wait: bool,

    /// Retries after the first round of status checks
    #[arg(long, default_value = "6")]
    wait_retries: u32,

    /// Status checks per round
    #[arg(long, default_value = "30")]
    wait_attempts: u32,

    /// Time between status checks
    #[arg(long, default_value = "20s")]
    wait_interval: humantime::Duration,
}

impl WaitArgs {
    fn config(&self) -> WaitConfig {
        WaitConfig::default()
            .with_max_retries(self.wait_retries)
            .with_attempts_per_retry(self.wait_attempts)
            .with_poll_interval(*self.wait_interval)
    }

    fn enabled(&self) -> Option<WaitConfig> {
        (!self.no_wait).then(|| self.config())
    }
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

fn collaborators(nodes: &NodeArgs) -> Result<(Arc<dyn Network>, Arc<HttpAuthor>)> {
    let network: Arc<dyn Network> = Arc::new(HttpNetwork::new(*nodes.request_timeout)?);
    let author = Arc::new(HttpAuthor::new(*nodes.request_timeout)?);
    Ok((network, author))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e.downcast_ref::<WorkerError>().map_or(1, WorkerError::exit_code);
            eprintln!("error: {e:#}");
            ExitCode::from(code)
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    let registry = LoadRegistry::with_builtin_loads();

    match command {
        Commands::Loads => {
            for name in registry.names() {
                println!("{name}");
            }
        }

        Commands::Run {
            load,
            load_data,
            keys,
            nodes,
            send,
            wait,
        } => {
            let wait_config = wait.config();
            let pool = nodes.pool().await?;
            let (network, author) = collaborators(&nodes)?;
            let mut identities = keys.source(&nodes, network.clone(), &pool)?;
            let descriptor = registry.create(&load, &load_data.value()?)?;
            let mut generator = LoadGenerator::new(
                network,
                author,
                pool,
                nodes.generator_config(wait_config.clone()),
            );

            let mut templates = LocalTemplateStore::new();
            for _ in 0..keys.accounts.max(1) {
                let identity = identities.next_identity().await?;
                generator
                    .generate(descriptor.as_ref(), &mut templates, &identity)
                    .await?;
            }

            let cancel = install_interrupt_handler();
            let mut records = LocalRecordStore::new();
            let report = generator
                .send_all(&mut templates, &mut records, &send.config(), &cancel)
                .await?;
            report.print();

            if let Some(wait) = wait.enabled().filter(|_| !report.cancelled) {
                generator.wait_all(&records, &wait).await?.print();
            }
        }

        Commands::Generate {
            load,
            load_data,
            keys,
            nodes,
            store,
        } => {
            let pool = nodes.pool().await?;
            let (network, author) = collaborators(&nodes)?;
            let mut identities = keys.source(&nodes, network.clone(), &pool)?;
            let descriptor = registry.create(&load, &load_data.value()?)?;
            let mut generator = LoadGenerator::new(
                network,
                author,
                pool,
                nodes.generator_config(WaitConfig::default()),
            );

            let mut templates = store.templates(&nodes)?;
            for _ in 0..keys.accounts.max(1) {
                let identity = identities.next_identity().await?;
                let template = generator
                    .generate(descriptor.as_ref(), templates.as_mut(), &identity)
                    .await?;
                info!(fee_payer = %template.fee_payer(), "template generated");
            }
        }

        Commands::Send { nodes, store, send } => {
            let pool = nodes.pool().await?;
            let (network, author) = collaborators(&nodes)?;
            let mut generator = LoadGenerator::new(
                network,
                author,
                pool,
                nodes.generator_config(WaitConfig::default()),
            );
            let mut templates = store.templates(&nodes)?;
            let mut records = store.records(&nodes).await?;

            let cancel = install_interrupt_handler();
            let report = generator
                .send_all(templates.as_mut(), records.as_mut(), &send.config(), &cancel)
                .await?;
            report.print();
        }

        Commands::Wait { nodes, store, wait } => {
            let pool = nodes.pool().await?;
            let (network, author) = collaborators(&nodes)?;
            let mut generator = LoadGenerator::new(
                network,
                author,
                pool,
                nodes.generator_config(WaitConfig::default()),
            );
            let records = store.records(&nodes).await?;
            generator
                .wait_all(records.as_ref(), &wait.config())
                .await?
                .print();
        }

        Commands::Worker {
            coordinator,
            barrier_poll,
            nodes,
            send,
            wait,
        } => {
            let id = nodes
                .id
                .clone()
                .unwrap_or_else(|| hex::encode(rand::random::<[u8; 8]>()));
            info!(%id, %coordinator, "starting worker");
            let client = CoordinatorClient::new(
                Endpoint::new(coordinator),
                id,
                *nodes.request_timeout,
            )?
            .with_poll_interval(*barrier_poll);

            let (network, author) = collaborators(&nodes)?;
            let options = WorkerOptions {
                generator: nodes.generator_config(wait.config()),
                send: send.config(),
                wait: wait.enabled(),
                extra_endpoints: nodes.endpoint_list(),
                rotation: nodes.rotation.into(),
            };
            let cancel = install_interrupt_handler();
            let summary =
                run_worker(&client, &registry, network, author, &options, &cancel).await?;
            info!(
                job = %summary.job,
                fee_payer = %summary.fee_payer,
                work_units = summary.work_units,
                sent = summary.sent,
                "worker summary"
            );
        }
    }

    Ok(())
}
