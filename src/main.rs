//! Bridge Transfer - burn on the source chain, mint on the destination chain
//!
//! Runs one transfer per invocation: approve and burn the token on the
//! source chain, wait for the attestation authority to sign the burn
//! message, then submit it to the destination chain's bridge.

use anyhow::{Context, Result};
use bridge_transfer::attestation::{AttestationPoller, IrisAttestationClient};
use bridge_transfer::chain::{DestinationSigner, EvmSourceChain, RestDestinationChain, SourceChain};
use bridge_transfer::config::Settings;
use bridge_transfer::coordination::TransferEngine;
use bridge_transfer::metrics::MetricsServer;
use bridge_transfer::tx::{DestinationReceiver, SourceSender};
use bridge_transfer::types::{StepStatus, TransferOutcome, TransferProgress, TransferRequest};
use clap::{Parser, Subcommand};
use ethers::types::H256;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

type Engine = TransferEngine<EvmSourceChain, IrisAttestationClient, RestDestinationChain>;

#[derive(Parser, Debug)]
#[clap(name = "bridge-transfer", version, about = "Cross-chain burn and mint transfers")]
struct Args {
    /// Configuration file, defaults to $BRIDGE_CONFIG or config/default.toml
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Burn on the source chain and receive on the destination chain
    Transfer {
        /// Decimal amount, defaults to transfer.amount from the config
        #[clap(long)]
        amount: Option<String>,
        /// Destination-chain recipient (0x + 64 hex characters)
        #[clap(long)]
        recipient: String,
    },
    /// Finish a transfer whose burn already confirmed
    Resume {
        /// Hash of the source-chain burn transaction
        #[clap(long)]
        source_tx: String,
    },
    /// Show token balances on both chains
    Balance {
        /// Destination address, defaults to the destination signer
        #[clap(long)]
        recipient: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    let args = Args::parse();
    info!("Starting Bridge Transfer v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = match &args.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    info!(
        "Loaded configuration: source chain {}, destination domain {}",
        settings.source.chain_id, settings.transfer.destination_domain
    );

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let engine = build_engine(&settings)?;
    let signer = Arc::new(
        DestinationSigner::from_env(&settings.destination.private_key_env)
            .context("Destination signer unavailable")?,
    );
    info!("Destination signer: {}", signer.address_hex());

    let result = match args.command {
        Command::Transfer { amount, recipient } => {
            let amount = amount
                .or_else(|| settings.transfer.amount.clone())
                .context("No amount given and transfer.amount is not configured")?;
            let request = TransferRequest {
                amount,
                recipient_address: recipient,
                credential: signer,
            };
            let outcome = engine.run(&request, log_progress).await;
            report(outcome)
        }
        Command::Resume { source_tx } => {
            let tx_hash: H256 = source_tx
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid transaction hash {:?}: {:?}", source_tx, e))?;
            let outcome = engine.resume(tx_hash, &signer, log_progress).await;
            report(outcome)
        }
        Command::Balance { recipient } => {
            let recipient = recipient.unwrap_or_else(|| signer.address_hex());
            show_balances(&engine, &recipient).await
        }
    };

    if let Some(h) = metrics_handle {
        h.abort();
    }
    result
}

fn build_engine(settings: &Settings) -> Result<Engine> {
    let source = Arc::new(EvmSourceChain::new(settings.source.clone())?);
    info!("Source chain client ready (chain id {})", settings.source.chain_id);

    let destination = Arc::new(RestDestinationChain::new(settings.destination.clone())?);
    info!("Destination chain client ready ({})", settings.destination.rest_url);

    let attestation = IrisAttestationClient::new(&settings.attestation)?;

    Ok(TransferEngine::new(
        SourceSender::new(
            source.clone(),
            settings.transfer.clone(),
            settings.source.approve_unlimited,
        ),
        AttestationPoller::new(source, attestation, settings.attestation.clone()),
        DestinationReceiver::new(destination),
    ))
}

fn log_progress(progress: TransferProgress) {
    let percentage = progress
        .percentage
        .map(|p| format!(" {}%", p))
        .unwrap_or_default();
    let hash = progress.transaction_hash.as_deref().unwrap_or("-");

    match progress.status {
        StepStatus::Failed => warn!(
            "[{}/{}] failed: {} (tx {})",
            progress.step_index, progress.total_steps, progress.message, hash
        ),
        _ => info!(
            "[{}/{}]{} {} (tx {})",
            progress.step_index, progress.total_steps, percentage, progress.message, hash
        ),
    }
}

fn report(outcome: TransferOutcome) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.success {
        anyhow::bail!(
            "Transfer failed: {}",
            outcome.error_message.unwrap_or_default()
        );
    }
    Ok(())
}

async fn show_balances(engine: &Engine, recipient: &str) -> Result<()> {
    let sender = engine.sender();
    let owner = sender.chain().signer_address();
    let source_balance = sender.check_balance(owner).await?;
    let destination_balance = engine.receiver().check_balance(recipient).await?;

    let balances = json!({
        "source": { "address": format!("{:?}", owner), "balance": source_balance },
        "destination": { "address": recipient, "balance": destination_balance },
    });
    println!("{}", serde_json::to_string_pretty(&balances)?);
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,bridge_transfer=debug,hyper=warn,reqwest=warn")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr),
        )
        .init();
}
