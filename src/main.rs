//! asset-withdraw - submit a withdraw transaction to a permissioned ledger
//!
//! Loads the connection profile, checks the wallet for the configured
//! identity and submits `withdraw` with the two positional arguments to the
//! `asset_management` contract on channel `general`.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;

mod cli;
mod config;
mod error;
mod gateway;
mod submitter;
mod wallet;

#[cfg(test)]
mod testutil;

use cli::Cli;
use config::Settings;
use gateway::HttpGateway;
use wallet::{FileSystemWallet, IdentityStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    let cli = Cli::parse();

    // Configuration failures end the process before the wallet is touched
    let settings = Settings::load()?;
    let profile_path = settings.connection_profile_path()?;

    let mut gateway = HttpGateway::new();
    let code = submitter::execute(
        &settings,
        &profile_path,
        |path| -> Arc<dyn IdentityStore> { Arc::new(FileSystemWallet::new(path)) },
        &mut gateway,
        &cli.transaction_args(),
        &mut std::io::stdout(),
        &mut std::io::stderr(),
    )
    .await?;

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,asset_withdraw=info,reqwest=warn,hyper=warn"));

    // stdout carries the user-facing messages only
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}
