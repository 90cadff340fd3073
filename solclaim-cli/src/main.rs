use std::io::{self, Write};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use log::*;
use solana_sdk::{
    signature::{read_keypair_file, Keypair},
    signer::Signer,
};
use solclaim_core::{
    lamports_to_sol, CloseAccountsOptions, ReclaimEvent, ReclaimerConfig,
    RentReclaimer, ScanResult,
};
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "solclaim")]
#[command(about = "Reclaim rent locked up by empty SPL token accounts")]
struct Cli {
    /// RPC endpoint to connect to
    #[arg(
        long,
        global = true,
        default_value = "https://api.mainnet-beta.solana.com"
    )]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Lists empty token accounts and the rent locked up in them
    #[command(
        about = "Lists empty token accounts and the rent locked up in them",
        long_about = "Example: solclaim scan <WALLET> --url devnet-rpc-url"
    )]
    Scan { wallet: String },
    /// Closes empty token accounts and reclaims their rent
    #[command(
        about = "Closes empty token accounts and reclaims their rent",
        long_about = "Example: solclaim close --keypair path/to/id.json --simulate"
    )]
    Close {
        /// Keypair owning the accounts; it also receives the rent
        #[arg(long)]
        keypair: String,

        /// Accounts per close transaction
        #[arg(long)]
        batch_size: Option<usize>,

        /// Dry-run every batch instead of broadcasting
        #[arg(long)]
        simulate: bool,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let reclaimer = RentReclaimer::new(ReclaimerConfig {
        rpc_endpoint: Some(cli.url.clone()),
        commitment: None,
    })?;

    match cli.command {
        Commands::Scan { wallet } => scan(&reclaimer, &wallet).await,
        Commands::Close {
            keypair,
            batch_size,
            simulate,
            yes,
        } => close(&reclaimer, &keypair, batch_size, simulate, yes).await,
    }
}

async fn scan(reclaimer: &RentReclaimer, wallet: &str) -> Result<()> {
    let wallet = RentReclaimer::parse_wallet(wallet)?;
    let scan = reclaimer.scan(&wallet).await?;
    print_scan(&scan);
    Ok(())
}

async fn close(
    reclaimer: &RentReclaimer,
    keypair_path: &str,
    batch_size: Option<usize>,
    simulate: bool,
    yes: bool,
) -> Result<()> {
    let keypair = load_keypair(keypair_path)?;
    let wallet = keypair.pubkey();
    info!("Closing empty token accounts of {wallet}");

    let scan = reclaimer.scan(&wallet).await?;
    print_scan(&scan);
    if scan.closeable_accounts.is_empty() {
        println!("Nothing to reclaim.");
        return Ok(());
    }

    if !simulate && !yes && !confirm(scan.closeable_accounts.len())? {
        println!("Aborted.");
        return Ok(());
    }

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let progress = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            print_event(event);
        }
    });

    let result = reclaimer
        .close_with_keypair(
            &keypair,
            Some(scan.closeable_accounts),
            CloseAccountsOptions {
                batch_size,
                simulate,
                events: Some(events_tx),
                ..Default::default()
            },
        )
        .await?;
    progress
        .await
        .context("progress reporting task panicked")?;

    println!();
    println!(
        "Closed {} accounts, reclaimed {:.6} SOL",
        result.closed_count, result.reclaimed_sol
    );
    for signature in &result.signatures {
        println!("  {signature}");
    }
    if !result.success {
        for error in &result.errors {
            error!("Batch {} failed: {}", error.batch_index, error.error);
        }
        bail!(
            "{} accounts could not be closed",
            result.failed_count
        );
    }
    Ok(())
}

fn load_keypair(path: &str) -> Result<Keypair> {
    read_keypair_file(path)
        .map_err(|err| anyhow!("Failed to read keypair from {path}: {err}"))
}

fn print_scan(scan: &ScanResult) {
    println!(
        "Found {} token accounts, {} closeable",
        scan.total_accounts,
        scan.closeable_accounts.len()
    );
    for account in &scan.closeable_accounts {
        println!(
            "  {} (mint {}, {:.6} SOL)",
            account.pubkey,
            account.mint,
            lamports_to_sol(account.rent_lamports)
        );
    }
    println!(
        "Reclaimable: {:.6} SOL ({} lamports)",
        scan.total_reclaimable_sol, scan.total_reclaimable_lamports
    );
}

fn print_event(event: ReclaimEvent) {
    match event {
        ReclaimEvent::PhaseChanged(phase) => {
            println!("[{phase}]");
        }
        ReclaimEvent::BatchStarted {
            batch_index,
            total_batches,
        } => {
            println!(
                "Batch {}/{total_batches} ...",
                batch_index + 1
            );
        }
        ReclaimEvent::BatchCompleted {
            batch_index,
            total_batches,
            signature,
        } => {
            println!(
                "Batch {}/{total_batches} confirmed: {signature}",
                batch_index + 1
            );
        }
        ReclaimEvent::BatchFailed { batch_index, error } => {
            println!("Batch {} failed: {error}", batch_index + 1);
        }
    }
}

fn confirm(count: usize) -> Result<bool> {
    print!("Close {count} accounts? [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}
