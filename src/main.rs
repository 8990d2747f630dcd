//! Sentinel wallet CLI
//!
//! Command-line interface for inspecting, simulating and sending transfers
//! and for backing up the root secret.

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use sentinel_wallet::amount::{format_units, parse_units};
use sentinel_wallet::intent::Utxo;
use sentinel_wallet::orchestrator::PreparedTransaction;
use sentinel_wallet::risk::{JsonlBreachLog, RuleBasedAnalyzer, TracingBreachHook};
use sentinel_wallet::rpc::{self, ChainRpc, HttpRpcClient};
use sentinel_wallet::secret::MemorySecretStore;
use sentinel_wallet::wallet::derivation::validate_mnemonic;
use sentinel_wallet::wallet::{FeeRouter, HdSigner, RpcSimulator, Signer};
use sentinel_wallet::{
    generate_shares, reconstruct, Chain, ChainData, Config, Dependencies, Error,
    OrchestratorConfig, RecoveryShare, Result, RpcConfig, Severity, TransferRequest,
    WalletOrchestrator, WALLET_MNEMONIC_ENV,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Self-custodial wallet: simulate, analyze, sign, broadcast")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(clap::Args, Clone)]
struct AccountArgs {
    /// Chain (ethereum, bitcoin, solana)
    #[arg(short = 'n', long, default_value = "ethereum")]
    chain: Chain,

    /// Secret store id of the account
    #[arg(short, long, default_value = "default")]
    account: String,
}

#[derive(clap::Args, Clone)]
struct TransferArgs {
    #[command(flatten)]
    account: AccountArgs,

    /// Destination address
    #[arg(long)]
    to: String,

    /// Amount in display units (e.g. 0.5)
    #[arg(long)]
    amount: String,

    /// Contract call data, hex encoded (Ethereum only)
    #[arg(long)]
    data: Option<String>,

    /// Input to spend as txid:vout:value_sat (Bitcoin only, repeatable)
    #[arg(long = "utxo")]
    utxos: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the account address
    Address(AccountArgs),

    /// Show the account balance
    Balance(AccountArgs),

    /// Simulate and analyze a transfer without signing it
    Simulate(TransferArgs),

    /// Simulate, analyze and, with --yes, sign and broadcast a transfer
    Send {
        #[command(flatten)]
        transfer: TransferArgs,

        /// Broadcast without further confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Split the root secret into recovery shares
    Split {
        /// Number of shares to create
        #[arg(short = 'N', long)]
        shares: usize,

        /// Shares needed to recover
        #[arg(short = 'T', long)]
        threshold: usize,
    },

    /// Rebuild the root secret from recovery shares
    Recover {
        /// Hex encoded shares
        #[arg(required = true)]
        shares: Vec<String>,

        /// Print the recovered secret
        #[arg(long)]
        reveal: bool,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    if let Err(e) = run(cli).await {
        tracing::error!(kind = ?e.kind(), error = %e, "Command failed");
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    tracing_subscriber::registry()
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Address(args) => {
            let signer = HdSigner::new(Arc::new(secret_store(&args.account)?));
            println!("{}", signer.address(&args.account, args.chain).await?);
        }
        Commands::Balance(args) => {
            let rpc = connect(args.chain, &config)?;
            let orchestrator = build_orchestrator(args.chain, &args.account, rpc, &config)?;
            let balance = orchestrator.load_account(&args.account).await?;
            println!("{} {}", balance.amount, balance.symbol);
        }
        Commands::Simulate(transfer) => {
            let (_, _, prepared) = prepare(&transfer, &config).await?;
            print_prepared(&prepared);
        }
        Commands::Send { transfer, yes } => run_send(&transfer, yes, &config).await?,
        Commands::Split { shares, threshold } => {
            let mnemonic = Zeroizing::new(read_env(WALLET_MNEMONIC_ENV)?);
            let shares = generate_shares(mnemonic.trim().as_bytes(), shares, threshold)?;
            for share in &shares {
                println!("{}", share.to_hex());
            }
        }
        Commands::Recover { shares, reveal } => {
            let shares = shares
                .iter()
                .map(|s| RecoveryShare::from_hex(s))
                .collect::<Result<Vec<_>>>()?;
            let secret = reconstruct(&shares)?;
            let phrase = Zeroizing::new(String::from_utf8_lossy(secret.expose_secret()).into_owned());
            if validate_mnemonic(&phrase) {
                println!("Recovered a valid mnemonic");
            } else {
                println!("Recovered secret is not a valid mnemonic");
            }
            if reveal {
                println!("{}", phrase.as_str());
            }
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn run_send(transfer: &TransferArgs, yes: bool, config: &Config) -> Result<()> {
    let (orchestrator, request, prepared) = prepare(transfer, config).await?;
    print_prepared(&prepared);

    if prepared.max_severity() == Some(Severity::Critical) {
        tracing::warn!(to = %request.to, "Send blocked by critical risk alert");
        println!("Refusing to send: critical risk alert");
        return Ok(());
    }
    if !yes {
        println!("Not sent. Re-run with --yes to sign and broadcast.");
        return Ok(());
    }

    let hash = orchestrator.confirm_transaction(&request).await?;
    println!("Broadcast: {}", hash);
    Ok(())
}

/// Load the account and prepare the transfer described by `transfer`
async fn prepare(
    transfer: &TransferArgs,
    config: &Config,
) -> Result<(WalletOrchestrator, TransferRequest, PreparedTransaction)> {
    let chain = transfer.account.chain;
    let rpc = connect(chain, config)?;
    let orchestrator = build_orchestrator(chain, &transfer.account.account, rpc.clone(), config)?;

    orchestrator.load_account(&transfer.account.account).await?;
    let request = build_request(transfer, chain, rpc.as_ref()).await?;
    let prepared = orchestrator.prepare_transaction(&request).await?;
    Ok((orchestrator, request, prepared))
}

fn print_prepared(prepared: &PreparedTransaction) {
    let chain = prepared.intent.chain;
    println!(
        "Transfer {} {} from {} to {}",
        format_units(prepared.intent.value, chain.decimals()),
        chain.symbol(),
        prepared.intent.from,
        prepared.intent.to
    );

    let simulation = &prepared.simulation;
    if simulation.success {
        println!("Simulation SUCCEEDED");
        println!("  Estimated usage: {}", simulation.estimated_gas_used);
        for (address, delta) in &simulation.balance_changes {
            println!("  {}: {}", address, delta);
        }
    } else {
        println!("Simulation FAILED");
        if let Some(reason) = &simulation.error {
            println!("  Reason: {}", reason);
        }
    }

    println!(
        "Max fee: {} {}",
        format_units(prepared.gas.total_fee(), chain.decimals()),
        chain.symbol()
    );

    if prepared.alerts.is_empty() {
        println!("No risk alerts");
    }
    for alert in &prepared.alerts {
        println!("[{}] {}: {}", alert.severity, alert.code, alert.description);
    }
}

fn read_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::Config(format!("{} is not set", name)))
}

fn secret_store(account: &str) -> Result<MemorySecretStore> {
    MemorySecretStore::from_env(WALLET_MNEMONIC_ENV, account)
}

fn connect(chain: Chain, config: &Config) -> Result<Arc<dyn ChainRpc>> {
    let rpc_config = RpcConfig::from_env();
    let url = rpc_config
        .get(chain)
        .ok_or_else(|| Error::Config(format!("no RPC endpoint configured for {}", chain)))?;
    Ok(Arc::new(HttpRpcClient::with_timeout(url, config.rpc_timeout())?))
}

fn build_orchestrator(
    chain: Chain,
    account: &str,
    rpc: Arc<dyn ChainRpc>,
    config: &Config,
) -> Result<WalletOrchestrator> {
    let signer = HdSigner::new(Arc::new(secret_store(account)?));
    let simulator = RpcSimulator::new(rpc.clone())
        .with_lamports_per_signature(config.fees.lamports_per_signature);
    let fees = FeeRouter::new(rpc.clone(), config.fees.clone());

    let mut analyzer =
        RuleBasedAnalyzer::from_config(&config.risk)?.with_hook(Arc::new(TracingBreachHook));
    if let Some(path) = &config.audit_log_path {
        analyzer = analyzer.with_hook(Arc::new(JsonlBreachLog::new(path)));
    }

    Ok(WalletOrchestrator::new(
        chain,
        Dependencies {
            rpc,
            signer: Arc::new(signer),
            simulator: Arc::new(simulator),
            fees: Arc::new(fees),
            analyzer: Arc::new(analyzer),
        },
        OrchestratorConfig::from(&config.risk),
    ))
}

/// Build the transfer request, fetching a recent blockhash for Solana
async fn build_request(
    transfer: &TransferArgs,
    chain: Chain,
    rpc: &dyn ChainRpc,
) -> Result<TransferRequest> {
    let value = parse_units(&transfer.amount, chain.decimals())?;
    let mut request = TransferRequest::new(transfer.to.as_str(), value);

    match chain {
        Chain::Ethereum => {
            if let Some(data) = &transfer.data {
                let bytes = alloy::hex::decode(data.trim())
                    .map_err(|e| Error::InvalidArgument(format!("call data is not hex: {}", e)))?;
                request = request.with_data(ChainData::Call(bytes.into()));
            }
        }
        Chain::Bitcoin => {
            if !transfer.utxos.is_empty() {
                let utxos = transfer
                    .utxos
                    .iter()
                    .map(|u| parse_utxo(u))
                    .collect::<Result<Vec<_>>>()?;
                request = request.with_data(ChainData::Utxos(utxos));
            }
        }
        Chain::Solana => {
            let blockhash = rpc::fetch_recent_blockhash(rpc).await?;
            request = request.with_data(ChainData::RecentBlockhash(blockhash));
        }
    }

    Ok(request)
}

fn parse_utxo(spec: &str) -> Result<Utxo> {
    let invalid = || Error::InvalidArgument(format!("expected txid:vout:value_sat, got {}", spec));
    let mut parts = spec.split(':');
    let (Some(txid), Some(vout), Some(value), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    Ok(Utxo {
        txid: txid.to_string(),
        vout: vout.parse().map_err(|_| invalid())?,
        value_sat: value.parse().map_err(|_| invalid())?,
    })
}
