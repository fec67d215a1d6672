//! Chronicle GMP Audit Ledger — Demo CLI
//!
//! Runs the reference scenarios, or verifies a JSON Lines ledger file.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- batch-release
//!   cargo run -p demo -- custody-transfer
//!   cargo run -p demo -- store-outage
//!   cargo run -p demo -- tamper-detection
//!   cargo run -p demo -- verify --ledger var/audit.jsonl
//!
//! `verify` reads the HMAC key from `CHRONICLE_HMAC_KEY` unless
//! `--demo-keys` is given.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use chronicle_audit::{HashChainEngine, JsonlAuditStore};
use chronicle_config::{KeyMaterial, LedgerConfig};
use chronicle_contracts::error::LedgerResult;
use chronicle_core::traits::IntegrityVerifier;
use chronicle_ref_pharma::{
    mock_data::demo_key_material,
    scenarios::{batch_release, custody_transfer, store_outage, tamper_detection, LEDGER_CONFIG},
};
use chronicle_verify::ChainVerifier;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Chronicle — tamper-evident audit ledger for GMP records.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "Chronicle GMP audit ledger demo",
    long_about = "Runs Chronicle reference scenarios showing hash-chained appends,\n\
                  custody continuity, store-outage handling, and tamper detection."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all four scenarios in sequence.
    RunAll,
    /// Scenario 1: Batch Release (boundary validation, encrypted backup).
    BatchRelease,
    /// Scenario 2: Sample Custody (continuous chain vs. missing hand-over).
    CustodyTransfer,
    /// Scenario 3: Store Outage (emergency record, gap-free retry).
    StoreOutage,
    /// Scenario 4: Tamper Detection (hash mismatch, broken link, backup recovery).
    TamperDetection,
    /// Verify the hash chain of a JSON Lines ledger file.
    Verify {
        /// Ledger file to read.
        #[arg(long)]
        ledger: PathBuf,
        /// Configuration file; defaults to the embedded reference config.
        #[arg(long)]
        config: Option<PathBuf>,
        /// First sequence to check.
        #[arg(long)]
        from: Option<u64>,
        /// Last sequence to check.
        #[arg(long)]
        to: Option<u64>,
        /// Use the fixed demo keys instead of the environment.
        #[arg(long)]
        demo_keys: bool,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug for pipeline-level output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::RunAll => {
            print_banner();
            run_all()
        }
        Command::BatchRelease => {
            print_banner();
            batch_release::run_scenario().map(|_| ())
        }
        Command::CustodyTransfer => {
            print_banner();
            custody_transfer::run_scenario().map(|_| ())
        }
        Command::StoreOutage => {
            print_banner();
            store_outage::run_scenario().map(|_| ())
        }
        Command::TamperDetection => {
            print_banner();
            tamper_detection::run_scenario().map(|_| ())
        }
        Command::Verify {
            ledger,
            config,
            from,
            to,
            demo_keys,
        } => match verify_ledger(ledger, config, from, to, demo_keys) {
            Ok(true) => Ok(()),
            Ok(false) => std::process::exit(2),
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(()) => {
            println!("Done.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

// ── Scenario dispatch ─────────────────────────────────────────────────────────

fn run_all() -> LedgerResult<()> {
    batch_release::run_scenario()?;
    custody_transfer::run_scenario()?;
    store_outage::run_scenario()?;
    tamper_detection::run_scenario()?;
    Ok(())
}

// ── Verify ────────────────────────────────────────────────────────────────────

/// Replay a ledger file.  Returns whether the chain is valid.
fn verify_ledger(
    ledger: PathBuf,
    config: Option<PathBuf>,
    from: Option<u64>,
    to: Option<u64>,
    demo_keys: bool,
) -> LedgerResult<bool> {
    let config = match config {
        Some(path) => LedgerConfig::from_file(&path)?,
        None => LedgerConfig::from_toml_str(LEDGER_CONFIG)?,
    };
    let keys = if demo_keys {
        demo_key_material()?
    } else {
        KeyMaterial::from_env(false)?
    };

    let store = JsonlAuditStore::open(&ledger, config.store_timeout())?;
    let engine = std::sync::Arc::new(HashChainEngine::new(keys.hmac));
    let verifier = ChainVerifier::with_page_size(engine, config.verification.page_size);

    info!(ledger = %ledger.display(), "verifying ledger file");
    let report = verifier.verify_range(&store, from.unwrap_or(1), to)?;

    println!(
        "{}: {} ({} entries examined, sequences {}..={})",
        ledger.display(),
        if report.valid { "VERIFIED" } else { "FAILED" },
        report.entries_examined,
        report.from_sequence,
        report.to_sequence
    );
    for violation in &report.violations {
        println!(
            "  {:<16} #{}: {}",
            violation.violation_type.to_string(),
            violation.sequence,
            violation.detail
        );
    }
    if let Some(first) = report.first_invalid_sequence {
        println!("First invalid sequence: #{first}");
    }
    Ok(report.valid)
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("Chronicle — Tamper-evident Audit Ledger");
    println!("GMP Reference Demo");
    println!("=======================================");
    println!();
    println!("Append pipeline per entry:");
    println!("  [1] Structural validation of the entry content");
    println!("  [2] Sequence allocated under the stream lock");
    println!("  [3] Keyed SHA-256 hash over canonical content + previous hash");
    println!("  [4] Conditional append: rejected unless it extends the current head");
    println!("  [5] GMP-critical entries sealed into the AES-256-GCM backup (async)");
    println!("  On failure: no sequence consumed, attempt written to the emergency log");
    println!();
}
