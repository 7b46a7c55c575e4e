//! Cross-space bridge driver
//!
//! Deploys the token bridge contracts on both the core space and the EVM
//! space, links them, and drives registration and transfer workflows
//! through them. Every step is a confirmed transaction; deployed addresses
//! are persisted to a manifest so interrupted runs resume.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ethers::signers::LocalWallet;
use ethers::types::{Address, U256};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

mod chain;
mod config;
mod context;
mod contracts;
mod deploy;
mod driver;
mod error;
mod metrics;
#[cfg(test)]
mod testing;
mod tx;

use chain::{parse_address, CoreSpaceClient, EvmSpaceClient, LedgerKind};
use config::Settings;
use context::BridgeContext;
use contracts::{ArtifactStore, ContractSet};
use deploy::DeploymentRecord;
use driver::{default_amount, BridgeDriver, UpgradeTarget};
use error::BridgeResult;
use metrics::MetricsServer;
use tx::{FailurePolicy, ResourcePolicy, RetryPolicy, SequenceAllocator, SubmissionEngine};

#[derive(Parser)]
#[command(name = "crossspace-driver")]
#[command(about = "Deploy and drive the core/EVM cross-space token bridge", long_about = None)]
struct Cli {
    /// Configuration file, defaults to $CROSSSPACE_CONFIG or config/default.toml
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy both bridge sides and link them
    Deploy,

    /// Deploy and fund one faucet token per space
    Faucet,

    /// Register a native token and create its mirror on the other space
    Register {
        /// Space the token is native to
        #[arg(long, value_enum)]
        side: Side,

        /// Token address, hex or CIP-37
        token: String,
    },

    /// Cross both faucet tokens to the other space
    Cross {
        /// Amount in base units
        #[arg(long)]
        amount: Option<String>,
    },

    /// Send both faucet tokens' mirrors back to their native space
    Withdraw {
        /// Amount in base units
        #[arg(long)]
        amount: Option<String>,
    },

    /// Move the native asset from the core space to the EVM space
    CrossNative {
        /// Amount in base units, defaults to 10 of the native asset
        #[arg(long)]
        amount: Option<String>,

        /// EVM recipient, defaults to the admin account
        #[arg(long)]
        recipient: Option<String>,
    },

    /// Show link status and balances
    Show,

    /// Show where one native token is in its bridging lifecycle
    State {
        /// Space the token is native to
        #[arg(long, value_enum)]
        side: Side,

        /// Token address, hex or CIP-37
        token: String,
    },

    /// List tokens with a mirror created through one side
    Tokens {
        #[arg(long, value_enum)]
        side: Side,
    },

    /// Deploy a new implementation and repoint its beacon
    Upgrade {
        #[arg(long, value_enum)]
        side: Side,

        #[arg(long, value_enum)]
        target: Target,
    },

    /// Hand the admin rights of one bridge side to another account
    Handover {
        #[arg(long, value_enum)]
        side: Side,

        /// New admin address, hex or CIP-37
        new_admin: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Side {
    Core,
    Evm,
}

impl From<Side> for LedgerKind {
    fn from(side: Side) -> Self {
        match side {
            Side::Core => LedgerKind::Core,
            Side::Evm => LedgerKind::Evm,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Target {
    /// The bridge side contract itself
    Side,
    /// The mapped token template shared by every mirror
    Template,
}

impl From<Target> for UpgradeTarget {
    fn from(target: Target) -> Self {
        match target {
            Target::Side => UpgradeTarget::BridgeSide,
            Target::Template => UpgradeTarget::TokenTemplate,
        }
    }
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Deploy => "deploy",
            Commands::Faucet => "faucet",
            Commands::Register { .. } => "register",
            Commands::Cross { .. } => "cross",
            Commands::Withdraw { .. } => "withdraw",
            Commands::CrossNative { .. } => "cross_native",
            Commands::Show => "show",
            Commands::State { .. } => "state",
            Commands::Tokens { .. } => "tokens",
            Commands::Upgrade { .. } => "upgrade",
            Commands::Handover { .. } => "handover",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    info!("Starting cross-space driver v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load(cli.config.as_deref())?;
    info!(
        "Loaded configuration for core network {} and EVM chain {}",
        settings.core.network_id, settings.evm.chain_id
    );

    // Operator interrupt stops every pending wait
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received, stopping...");
            cancel.cancel();
        }
    });

    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let ctx = Arc::new(build_context(&settings, cancel.clone()).await?);
    let driver = BridgeDriver::new(ctx.clone());
    let workflow = cli.command.name();

    let span = info_span!("workflow", name = workflow, run_id = %ctx.run_id());
    let result = tokio::select! {
        result = async {
            run(&driver, cli.command).await?;
            ctx.settle().await
        }
        .instrument(span) => result,
        _ = cancel.cancelled() => Err(error::BridgeError::Cancelled {
            operation: workflow.to_string(),
        }),
    };
    metrics::record_workflow(workflow, result.is_ok());

    if let Some(h) = metrics_handle {
        h.abort();
    }

    match result {
        Ok(()) => {
            info!("{} finished", workflow);
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            info!("{} interrupted, rerun to resume from the manifest", workflow);
            Err(e.into())
        }
        Err(e) => {
            error!("{} failed: {}", workflow, e);
            Err(e.into())
        }
    }
}

async fn build_context(settings: &Settings, cancel: CancellationToken) -> Result<BridgeContext> {
    let wallet = settings
        .private_key()?
        .parse::<LocalWallet>()
        .context("Admin private key is not a valid secp256k1 key")?;

    let core = Arc::new(CoreSpaceClient::new(&settings.core, wallet.clone())?);
    let evm = Arc::new(EvmSpaceClient::new(&settings.evm, wallet)?);
    info!("Chain connections initialized");

    let engine = SubmissionEngine::new(
        ResourcePolicy::new(&settings.gas),
        RetryPolicy::from_config(&settings.retry),
        settings.failure.core,
        settings.failure.evm,
    );
    if settings.failure.evm == FailurePolicy::LogAndContinue {
        info!("EVM execution failures will be logged and the workflow continued");
    }

    let nonces = SequenceAllocator::new(engine.retry_policy().nonce_poll_interval);
    let manifest = Arc::new(DeploymentRecord::load(&settings.deployment.manifest_path).await?);
    let artifacts = ArtifactStore::new(&settings.deployment.artifacts_dir);
    let contracts = ContractSet::for_version(settings.deployment.contract_set);

    Ok(BridgeContext::new(
        core,
        evm,
        engine,
        nonces,
        manifest,
        artifacts,
        contracts,
        cancel,
    ))
}

async fn run(driver: &BridgeDriver, command: Commands) -> BridgeResult<()> {
    match command {
        Commands::Deploy => {
            let (core_side, evm_side) = driver.deploy().await?;
            info!("ConfluxSide {:?}, EvmSide {:?}", core_side, evm_side);
        }
        Commands::Faucet => {
            let (core_token, evm_token) = driver.faucet().await?;
            info!("Faucet tokens {:?} and {:?}", core_token, evm_token);
        }
        Commands::Register { side, token } => {
            let mirror = driver.register(side.into(), parse_address(&token)?).await?;
            info!("Mirror of {} is {:?}", token, mirror);
        }
        Commands::Cross { amount } => {
            driver.cross(parse_amount(amount, default_amount())?).await?;
        }
        Commands::Withdraw { amount } => {
            driver.withdraw(parse_amount(amount, default_amount())?).await?;
        }
        Commands::CrossNative { amount, recipient } => {
            let recipient = recipient.as_deref().map(parse_address).transpose()?;
            driver
                .cross_native(parse_amount(amount, U256::exp10(19))?, recipient)
                .await?;
        }
        Commands::Show => {
            let report = driver.show().await?;
            if !report.is_linked() {
                info!("Bridge sides are not linked, run deploy");
            }
        }
        Commands::State { side, token } => {
            let state = driver.token_state(side.into(), parse_address(&token)?).await?;
            info!("{} is {:?}", token, state);
        }
        Commands::Tokens { side } => {
            let tokens = driver.tokens(side.into()).await?;
            info!("{} tokens", tokens.len());
        }
        Commands::Upgrade { side, target } => {
            let implementation = driver.upgrade(side.into(), target.into()).await?;
            info!("New implementation {:?}", implementation);
        }
        Commands::Handover { side, new_admin } => {
            let new_admin: Address = parse_address(&new_admin)?;
            driver.handover(side.into(), new_admin).await?;
        }
    }
    Ok(())
}

fn parse_amount(input: Option<String>, default: U256) -> BridgeResult<U256> {
    match input {
        Some(text) => U256::from_dec_str(&text)
            .map_err(|e| error::BridgeError::Config(format!("Invalid amount {}: {}", text, e))),
        None => Ok(default),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,crossspace_driver=debug,hyper=warn"));

    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
