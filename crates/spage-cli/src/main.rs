//! SimplePage dservice - censorship-resistant page hosting node

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};

use spage_chain::{Address, ChainWatcher, RpcClient, RpcConfig, WatcherConfig};
use spage_cli::{
    commands, logging, run_server, AppState, DataAction, ListAction, NodeConfig,
    DEFAULT_MAX_UPLOAD_BYTES,
};
use spage_core::{Indexer, IndexerConfig, ALLOW_SET, BLOCK_SET};
use spage_store::{AnyStore, IpfsStore, PageStore};

#[derive(Parser, Debug)]
#[command(name = "dservice")]
#[command(about = "SimplePage hosting node: indexes registered names and pins their pages")]
#[command(version)]
struct Cli {
    /// Kubo API URL
    #[arg(long, default_value = "http://localhost:5001", env = "DSERVICE_IPFS_API")]
    ipfs_api: String,

    /// Port for the HTTP surface
    #[arg(long, default_value_t = 3000, env = "DSERVICE_API_PORT")]
    api_port: u16,

    /// Host for the HTTP surface
    #[arg(long, default_value = "localhost", env = "DSERVICE_API_HOST")]
    api_host: String,

    /// Chain JSON-RPC endpoint
    #[arg(long, default_value = "http://localhost:8545", env = "DSERVICE_RPC")]
    rpc: String,

    /// First block to scan when the store holds no cursor
    #[arg(long, default_value_t = 0)]
    start_block: u64,

    /// Expected chain id; startup fails if the endpoint disagrees
    #[arg(long)]
    chain_id: Option<u64>,

    /// Serve only; do not run the reconciler
    #[arg(long)]
    disable_indexing: bool,

    /// Log verbosity
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Suppress console output
    #[arg(long)]
    silent: bool,

    /// Write daily-rolling logs into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// TLS private key path (requires --tls-cert)
    #[arg(long, requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    /// TLS certificate path (requires --tls-key)
    #[arg(long, requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// Universal resolver address override
    #[arg(long)]
    universal_resolver: Option<String>,

    /// SimplePage registry address override
    #[arg(long)]
    simplepage: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Operator's allow set; when non-empty only these names are hosted
    AllowList {
        #[command(subcommand)]
        action: ListCmd,
    },
    /// Operator's block set
    BlockList {
        #[command(subcommand)]
        action: ListCmd,
    },
    /// Indexer discovery state (domains, resolvers, contenthash sets)
    IndexerData {
        #[command(subcommand)]
        action: DataCmd,
    },
}

#[derive(Subcommand, Debug)]
enum ListCmd {
    /// Print the set
    Show,
    /// Add a name
    Add { name: String },
    /// Remove a name
    Rm { name: String },
}

#[derive(Subcommand, Debug)]
enum DataCmd {
    /// Dump the discovery state
    Show,
    /// Wipe the discovery state; the next cycle rescans from start-block
    Reset,
}

impl From<ListCmd> for ListAction {
    fn from(cmd: ListCmd) -> Self {
        match cmd {
            ListCmd::Show => ListAction::Show,
            ListCmd::Add { name } => ListAction::Add(name),
            ListCmd::Rm { name } => ListAction::Rm(name),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.log_level.as_str(), cli.silent, cli.log_dir.as_deref())?;

    let config = build_config(&cli)?;
    let store = Arc::new(AnyStore::Ipfs(IpfsStore::from_url(&config.ipfs_api)?));

    if let Some(command) = cli.command {
        store
            .health_check()
            .await
            .context("block store unreachable")?;
        return match command {
            Command::AllowList { action } => {
                commands::run_list_command(store, ALLOW_SET, action.into()).await
            }
            Command::BlockList { action } => {
                commands::run_list_command(store, BLOCK_SET, action.into()).await
            }
            Command::IndexerData { action } => {
                let action = match action {
                    DataCmd::Show => DataAction::Show,
                    DataCmd::Reset => DataAction::Reset,
                };
                commands::run_indexer_data(store, action).await
            }
        };
    }

    run_node(config, store).await
}

async fn run_node(config: NodeConfig, store: Arc<AnyStore>) -> anyhow::Result<()> {
    // a dead store at startup is fatal; anything later is retried per cycle
    store
        .health_check()
        .await
        .context("block store unreachable at startup")?;
    info!(ipfs = %config.ipfs_api, "connected to block store");

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut indexer_task = None;

    if config.disable_indexing {
        warn!("indexing disabled; serving existing pins only");
    } else {
        let rpc = RpcClient::new(RpcConfig {
            url: config.rpc_url.clone(),
            timeout: Duration::from_secs(30),
        })?;

        if let Some(expected) = config.chain_id {
            let actual = rpc.chain_id().await.context("chain id probe failed")?;
            anyhow::ensure!(
                actual == expected,
                "endpoint reports chain id {actual}, expected {expected}"
            );
        }

        let contracts = config.contracts().ok_or_else(|| {
            anyhow::anyhow!(
                "no contract addresses known for this chain; pass --simplepage and --universal-resolver"
            )
        })?;
        info!(
            registry = %contracts.simplepage,
            universal_resolver = %contracts.universal_resolver,
            start_block = config.start_block,
            "starting indexer"
        );

        let watcher = ChainWatcher::new(
            rpc,
            WatcherConfig {
                registry: contracts.simplepage,
                universal_resolver: contracts.universal_resolver,
            },
        );
        let indexer = Indexer::new(
            Arc::clone(&store),
            watcher,
            IndexerConfig {
                start_block: config.start_block,
                batch: config.batch,
                cycle_interval: config.cycle_interval,
                max_staged_age: config.max_staged_age,
            },
        );
        indexer_task = Some(tokio::spawn(indexer.run(stop_rx)));
    }

    let state = Arc::new(AppState::new(config, store));
    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown signal received");
    };
    run_server(state, shutdown).await?;

    // stop the reconciler cooperatively and await the in-flight cycle
    stop_tx.send(true).ok();
    if let Some(task) = indexer_task {
        task.await?;
    }
    Ok(())
}

fn build_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let simplepage = cli
        .simplepage
        .as_deref()
        .map(str::parse::<Address>)
        .transpose()
        .context("invalid --simplepage address")?;
    let universal_resolver = cli
        .universal_resolver
        .as_deref()
        .map(str::parse::<Address>)
        .transpose()
        .context("invalid --universal-resolver address")?;

    let max_upload_bytes = std::env::var("DSERVICE_MAX_UPLOAD")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

    Ok(NodeConfig {
        ipfs_api: cli.ipfs_api.clone(),
        api_host: cli.api_host.clone(),
        api_port: cli.api_port,
        rpc_url: cli.rpc.clone(),
        start_block: cli.start_block,
        chain_id: cli.chain_id,
        disable_indexing: cli.disable_indexing,
        simplepage,
        universal_resolver,
        tls_key: cli.tls_key.clone(),
        tls_cert: cli.tls_cert.clone(),
        max_upload_bytes,
        ..Default::default()
    })
}
