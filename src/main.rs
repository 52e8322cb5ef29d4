use std::{
    num::NonZeroU32,
    path::PathBuf,
    process,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};
use tracing_subscriber::EnvFilter;

use spl_distributor::{
    checkpoint, recipients, BalancePreflight, CheckpointStore, DistributeError, DistributionJob,
    DistributionRunner, RetryExecutor, RetryPolicy, SolanaLedger, SourceAccount, SubmitOptions,
    BATCH_CAPACITY,
};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace); RUST_LOG overrides
    #[clap(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Distribute a fixed amount of an SPL token to each recipient
    Distribute(DistributeArgs),
    /// Generate a synthetic recipient CSV
    GenerateRecipients(GenerateArgs),
}

#[derive(Parser)]
struct DistributeArgs {
    /// Input CSV file with a `recipient` column
    #[clap(long)]
    input_csv: PathBuf,

    /// SPL token mint address
    #[clap(long)]
    mint: String,

    /// Source keypair path (transfer authority and fee payer)
    #[clap(long)]
    keypair: PathBuf,

    /// RPC URL
    #[clap(long)]
    url: String,

    /// Amount per recipient, in base units
    #[clap(long)]
    amount: u64,

    /// Commitment level for queries and preflight
    #[clap(long, value_enum, default_value = "confirmed")]
    commitment: CommitmentArg,

    /// Skip the RPC node's simulation preflight
    #[clap(long)]
    skip_preflight: bool,

    /// Compute unit price in microlamports
    #[clap(long, default_value = "1000")]
    priority_fee: u64,

    /// Rate limit for submissions (requests per second)
    #[clap(long, default_value = "10")]
    rate_limit: NonZeroU32,

    /// Maximum submission attempts per batch
    #[clap(long, default_value = "3")]
    max_attempts: u32,

    /// Base delay between submission attempts, in milliseconds
    #[clap(long, default_value = "2000")]
    retry_delay_ms: u64,

    /// Delay schedule between submission attempts
    #[clap(long, value_enum, default_value = "constant")]
    retry_policy: RetryPolicyArg,

    /// State directory for resume checkpoints
    #[clap(long, default_value = ".spl-distributor-state")]
    state_dir: PathBuf,

    /// Checkpoint file (auto-derived from the CSV and mint if not set)
    #[clap(long)]
    state_file: Option<PathBuf>,

    /// Discard previous resume state and start from the first recipient
    #[clap(long)]
    fresh: bool,

    /// Perform a dry run
    #[clap(long)]
    dry_run: bool,

    /// Skip confirmation prompt
    #[clap(long)]
    yes: bool,
}

#[derive(Parser)]
struct GenerateArgs {
    /// Number of recipients
    #[clap(long)]
    count: usize,

    /// Output CSV file
    #[clap(long)]
    output: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum CommitmentArg {
    Processed,
    Confirmed,
    Finalized,
}

impl CommitmentArg {
    fn to_config(self) -> CommitmentConfig {
        match self {
            Self::Processed => CommitmentConfig::processed(),
            Self::Confirmed => CommitmentConfig::confirmed(),
            Self::Finalized => CommitmentConfig::finalized(),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum RetryPolicyArg {
    Constant,
    Linear,
    Exponential,
}

impl RetryPolicyArg {
    fn to_policy(self, base: Duration) -> RetryPolicy {
        match self {
            Self::Constant => RetryPolicy::Constant { delay: base },
            Self::Linear => RetryPolicy::Linear { base },
            Self::Exponential => RetryPolicy::Exponential {
                base,
                max: Duration::from_secs(60),
                jitter: true,
            },
        }
    }
}

fn init_logging(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Distribute(args) => {
            if let Err(err) = distribute(args).await {
                eprintln!("error: {err:#}");
                let code = err
                    .downcast_ref::<DistributeError>()
                    .map(DistributeError::exit_code)
                    .unwrap_or(1);
                process::exit(code);
            }
            Ok(())
        }
        Commands::GenerateRecipients(args) => generate(args),
    }
}

async fn distribute(args: DistributeArgs) -> Result<()> {
    println!("\n🚀 Starting SPL token distribution...");

    let source = SourceAccount::from_file(&args.keypair)?;
    let mint = Pubkey::from_str(&args.mint).context("Invalid mint address")?;

    let commitment = args.commitment.to_config();
    let client = Arc::new(RpcClient::new_with_commitment(args.url.clone(), commitment));
    let ledger = SolanaLedger::new(
        client,
        SubmitOptions {
            commitment,
            skip_preflight: args.skip_preflight,
            priority_fee: args.priority_fee,
        },
        args.rate_limit,
    );

    let asset = ledger
        .fetch_asset(mint)
        .await
        .context("Could not fetch token mint")?;
    println!("Token mint: {} (decimals: {})", asset.mint, asset.decimals);

    let all_recipients = recipients::load_recipients(&args.input_csv)?;
    println!(
        "Loaded {} recipients from {}",
        all_recipients.len(),
        args.input_csv.display()
    );

    let state_path = match &args.state_file {
        Some(path) => path.clone(),
        None => checkpoint::state_path_for(&args.state_dir, &args.input_csv, &mint)
            .map_err(DistributeError::from)?,
    };
    let mut store = CheckpointStore::load(&state_path).map_err(DistributeError::from)?;
    println!("📁 Using state file: {}", state_path.display());

    if args.fresh && store.cursor() > 0 && !args.dry_run {
        println!("Discarding previous progress ({} recipients)", store.cursor());
        store.reset().map_err(DistributeError::from)?;
    }

    let done = store.cursor().min(all_recipients.len());
    if done > 0 {
        println!(
            "📊 Progress: {}/{} recipients already completed",
            done,
            all_recipients.len()
        );
    }
    let pending = all_recipients.len() - done;
    if pending == 0 {
        println!("All recipients already processed!");
        return Ok(());
    }

    let batches = pending.div_ceil(BATCH_CAPACITY);
    println!("Recipients to process: {pending}");
    println!(
        "Total tokens needed: {}",
        asset.ui_amount(args.amount) * pending as f64
    );

    if args.dry_run {
        let balance = BalancePreflight::new(&ledger)
            .check_balance(&asset, &source)
            .await?;
        return dry_run_summary(pending, batches, args.amount, balance, args.priority_fee, &asset);
    }

    if !args.yes {
        println!("\nReady to distribute? [y/N] ");
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    } else {
        println!("\nProceeding with distribution (--yes flag set)");
    }

    let retry = RetryExecutor::new(
        args.retry_policy.to_policy(Duration::from_millis(args.retry_delay_ms)),
        args.max_attempts,
    );
    let job = DistributionJob {
        asset,
        source,
        recipients: all_recipients,
        amount_per_recipient: args.amount,
    };

    let report = DistributionRunner::new(&ledger, retry)
        .run(&job, Some(&mut store))
        .await?;

    println!("\n✅ Distribution complete!");
    println!("Batches submitted: {}", report.batches());
    println!("Recipients paid this run: {}", report.transfers());
    println!(
        "Total progress: {}/{} recipients",
        store.cursor().min(job.recipients.len()),
        job.recipients.len()
    );

    Ok(())
}

fn dry_run_summary(
    pending: usize,
    batches: usize,
    amount: u64,
    balance: u64,
    priority_fee: u64,
    asset: &spl_distributor::Asset,
) -> Result<()> {
    let required = amount as u128 * pending as u128;

    // 5000 lamports base fee plus the priority fee over a 200k CU budget
    let base_fee = 0.000005;
    let priority_fee_sol = (priority_fee as f64 * 200_000.0) / 1_000_000.0 / 1_000_000_000.0;
    let tx_fee = base_fee + priority_fee_sol;

    println!("\n=== DRY RUN SUMMARY ===");
    println!("Recipients: {pending}");
    println!("Batches: {batches}");
    println!("Source balance: {} tokens", asset.ui_amount(balance));
    println!(
        "Transfer transactions: {} × ~{:.6} SOL = ~{:.4} SOL",
        batches,
        tx_fee,
        batches as f64 * tx_fee
    );

    if (balance as u128) < required {
        println!(
            "\n⚠️  Note: insufficient balance for actual distribution (need {} more base units)",
            required - balance as u128
        );
    }

    Ok(())
}

fn generate(args: GenerateArgs) -> Result<()> {
    println!("Generating {} recipients...", args.count);
    recipients::generate_recipients(args.count, &args.output)?;
    println!(
        "Generated {} recipients in {}",
        args.count,
        args.output.display()
    );
    Ok(())
}
