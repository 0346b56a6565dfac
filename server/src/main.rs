//! Keygate Licensing Server
//!
//! Serves the trial and licensing API consumed by desktop clients:
//! 1. Trial eligibility checks and credit consumption
//! 2. License activation, verification, and revocation
//! 3. Admin oversight reads behind a bearer token
//!
//! Usage:
//!   keygate-server --port 8090 --db data/keygate.db
//!
//! The server holds no in-process state beyond the SQLite store and the
//! token signing key.

use anyhow::{Context, Result};
use clap::Parser;
use ed25519_dalek::SigningKey;
use keygate_license::LicenseAuthority;
use keygate_server::{build_router, AppState};
use keygate_store::Store;
use keygate_trial::{AnomalyConfig, TrialConfig, TrialLedger, TrialPolicy};
use rand::rngs::OsRng;
use rand::RngCore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "keygate-server")]
#[command(about = "Keygate trial and licensing server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8090")]
    port: u16,

    /// Path to the SQLite database
    #[arg(short, long, default_value = "data/keygate.db")]
    db: PathBuf,

    /// Bearer token granting the admin role
    #[arg(long, env = "KEYGATE_ADMIN_TOKEN")]
    admin_token: String,

    /// Path to the Ed25519 token signing key (32-byte seed)
    #[arg(long, default_value = "keygate-signing.key")]
    signing_key: PathBuf,

    /// Credits allocated to a new trial
    #[arg(long, default_value = "50")]
    trial_credits: i64,

    /// Suspend trials as soon as suspicion heuristics fire
    #[arg(long)]
    auto_suspend: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("Keygate server starting...");

    let signing_key = load_or_generate_signing_key(&args.signing_key)?;
    let store = Arc::new(Store::open(&args.db).context("Failed to open store")?);

    let trial_config = TrialConfig {
        credits_allocated: args.trial_credits,
        policy: TrialPolicy {
            auto_suspend_suspicious: args.auto_suspend,
        },
        ..TrialConfig::default()
    };
    let ledger = Arc::new(TrialLedger::new(
        store.clone(),
        trial_config,
        AnomalyConfig::default(),
    ));
    let authority = Arc::new(LicenseAuthority::new(store, signing_key));
    let state = AppState::new(ledger, authority, args.admin_token);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port))
        .await
        .context("Failed to bind listen port")?;

    println!("\n========================================");
    println!("  Keygate Licensing Server Running");
    println!("========================================");
    println!("  Port:          {}", args.port);
    println!("  Database:      {}", args.db.display());
    println!("  Trial credits: {}", args.trial_credits);
    println!("========================================\n");

    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}

fn load_or_generate_signing_key(path: &PathBuf) -> Result<SigningKey> {
    if path.exists() {
        info!("Loading signing key from {:?}", path);
        let bytes = std::fs::read(path).context("Failed to read signing key file")?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .context("Signing key file must hold exactly 32 bytes")?;
        Ok(SigningKey::from_bytes(&seed))
    } else {
        info!("Generating new signing key at {:?}", path);
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let key = SigningKey::from_bytes(&seed);
        std::fs::write(path, seed).context("Failed to write signing key file")?;
        Ok(key)
    }
}
