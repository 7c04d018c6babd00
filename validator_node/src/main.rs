use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use grid_validator::{
    common::{Clock, SystemClock},
    config::{StorageBackend, ValidatorConfig},
    dumper::registry::EventRegistry,
    result_channel,
    storage::{MemoryStorage, Storage},
    Database, Dumper, EthersChainClient, GridValidator,
};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "grid-validator", version)]
#[command(about = "GRID validator node - contract ingestion and provider auditing")]
struct Cli {
    /// Configuration file (toml, yaml or json)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest contract events and run the epoch scheduler
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Named chain: local, dev, test or product
    #[arg(long)]
    chain: Option<String>,

    /// Explicit RPC endpoint
    #[arg(long)]
    rpc_url: Option<String>,

    /// Hex encoded validator key
    #[arg(long)]
    private_key: Option<String>,

    /// Data directory for the rocksdb backend
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Storage backend: memory or rocksdb
    #[arg(long)]
    storage: Option<String>,
}

impl RunArgs {
    fn apply(self, config: &mut ValidatorConfig) -> Result<()> {
        if let Some(chain) = self.chain {
            config.chain = chain;
        }
        if let Some(rpc_url) = self.rpc_url {
            config.rpc_url = Some(rpc_url);
        }
        if let Some(private_key) = self.private_key {
            config.private_key = private_key;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(storage) = self.storage {
            config.storage = match storage.as_str() {
                "memory" => StorageBackend::Memory,
                "rocksdb" => StorageBackend::Rocksdb,
                other => bail!("unknown storage backend {:?}", other),
            };
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(cli.config.as_deref(), args).await,
    }
}

async fn run(config_path: Option<&Path>, args: RunArgs) -> Result<()> {
    let mut config = ValidatorConfig::load(config_path).context("loading configuration")?;
    args.apply(&mut config)?;
    config.validate().context("invalid configuration")?;

    let endpoint = config.endpoint();
    info!("Starting GRID validator on chain {} ({})", config.chain, endpoint);

    let db = Database::new(open_storage(&config)?);
    let chain = Arc::new(EthersChainClient::new(&endpoint)?);
    let registry = Arc::new(EventRegistry::from_json(&config.abi_sources()?)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let shutdown = CancellationToken::new();

    let contracts = vec![config.registry_address()?, config.market_address()?];
    let dumper = Arc::new(
        Dumper::new(chain, db.clone(), registry, clock.clone(), contracts)
            .await?
            .with_poll_interval(config.poll_interval()),
    );

    // Catch up before the scheduler starts reading orders
    match dumper.poll_once().await {
        Ok(summary) => info!(
            "Initial sync applied {} logs, cursor at {}",
            summary.applied, summary.cursor
        ),
        Err(e) => warn!("Initial sync failed: {}", e),
    }
    match dumper.lag().await {
        Ok(0) => {}
        Ok(lag) => warn!("Cursor is {} blocks behind the chain head", lag),
        Err(e) => warn!("Cannot read chain head: {}", e),
    }

    let ingestion = {
        let dumper = Arc::clone(&dumper);
        let token = shutdown.child_token();
        tokio::spawn(async move { dumper.run(token).await })
    };

    let (results, receiver) = result_channel(config.result_queue_capacity);
    let validator = Arc::new(
        GridValidator::new(db.clone(), config.secret_key()?, config.intervals()?, receiver)
            .with_clock(clock),
    );
    info!(
        "Validator address {:?}, result queue capacity {}",
        validator.address(),
        config.result_queue_capacity
    );
    let scheduler = validator.start(&shutdown);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    scheduler.stop().await?;
    shutdown.cancel();
    ingestion.await?;
    drop(results);

    db.flush().await?;
    Ok(())
}

fn open_storage(config: &ValidatorConfig) -> Result<Arc<dyn Storage>> {
    match config.storage {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; state is lost on restart");
            Ok(Arc::new(MemoryStorage::new()))
        }
        #[cfg(feature = "rocksdb")]
        StorageBackend::Rocksdb => {
            let path = config.data_dir.join("db");
            std::fs::create_dir_all(&path)
                .with_context(|| format!("creating {}", path.display()))?;
            let storage = grid_validator::storage::RocksDbStorage::open(&path)?;
            info!("Opened rocksdb at {}", path.display());
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "rocksdb"))]
        StorageBackend::Rocksdb => bail!("built without the rocksdb feature"),
    }
}
