//! Transaction submitter
//!
//! Runs one withdraw submission end to end: identity check, connect, resolve
//! network, channel and contract, submit, disconnect. Once the gateway is
//! connected it is disconnected on every exit path.
//!
//! [`execute`] wraps the run with the connection profile pre-flight and the
//! mapping of its result to stderr and an exit status.

use crate::config::{ConnectionProfile, DiscoveryOptions, Settings, TargetConfig};
use crate::error::{WithdrawError, WithdrawResult};
use crate::gateway::{ConnectOptions, Gateway, SubmitResult};
use crate::wallet::IdentityStore;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Exit status used when the identity is missing and strict mode is on
pub const EXIT_IDENTITY_MISSING: i32 = 2;

/// Positional transaction arguments. Missing positions are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionArgs(Vec<Option<String>>);

impl TransactionArgs {
    /// Number of positional arguments forwarded to the contract
    pub const ARITY: usize = 2;

    /// Take the first two positional values verbatim, ignoring any extras
    pub fn from_positional(values: &[String]) -> Self {
        let args = (0..Self::ARITY).map(|i| values.get(i).cloned()).collect();
        Self(args)
    }

    pub fn as_slice(&self) -> &[Option<String>] {
        &self.0
    }
}

/// How a run ended without a handled failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Submitted(SubmitResult),
    IdentityMissing { label: String },
}

impl Outcome {
    /// Process exit status for this outcome
    pub fn exit_code(&self, fail_on_missing_identity: bool) -> i32 {
        match self {
            Outcome::Submitted(_) => 0,
            Outcome::IdentityMissing { .. } if fail_on_missing_identity => EXIT_IDENTITY_MISSING,
            Outcome::IdentityMissing { .. } => 0,
        }
    }
}

/// Message written to stderr for a handled failure
pub fn failure_message(error: &WithdrawError) -> String {
    format!("Failed to submit transaction: {}", error)
}

/// Load the profile, then submit and report; returns the process exit status
///
/// A profile that cannot be read or parsed is returned as an error before the
/// wallet is opened. Every later failure is written to `err` as the uniform
/// failure message and mapped to its exit status.
pub async fn execute<F, W, E>(
    settings: &Settings,
    profile_path: &Path,
    open_wallet: F,
    gateway: &mut dyn Gateway,
    args: &TransactionArgs,
    out: &mut W,
    err: &mut E,
) -> anyhow::Result<i32>
where
    F: FnOnce(PathBuf) -> Arc<dyn IdentityStore>,
    W: Write + Send,
    E: Write,
{
    let profile = ConnectionProfile::load(profile_path)?;
    info!("Loaded connection profile from {:?}", profile_path);
    let submitter = Submitter::new(profile, settings);

    let result = match settings.wallet_path() {
        Ok(path) => submitter.run(open_wallet(path), gateway, args, out).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(outcome) => {
            match &outcome {
                Outcome::Submitted(submitted) => info!(
                    "Submitted transaction {} ({} byte payload)",
                    submitted.tx_id,
                    submitted.payload.len()
                ),
                Outcome::IdentityMissing { label } => {
                    info!("Identity {} missing, nothing submitted", label)
                }
            }
            Ok(outcome.exit_code(settings.client.fail_on_missing_identity))
        }
        Err(e) => {
            error!(category = ?e.category(), "Submission failed: {}", e);
            writeln!(err, "{}", failure_message(&e))?;
            Ok(e.exit_code())
        }
    }
}

/// Submits one transaction with a loaded profile and settings
pub struct Submitter {
    profile: ConnectionProfile,
    identity: String,
    target: TargetConfig,
    discovery: DiscoveryOptions,
}

impl Submitter {
    pub fn new(profile: ConnectionProfile, settings: &Settings) -> Self {
        Self {
            profile,
            identity: settings.client.identity.clone(),
            target: settings.target.clone(),
            discovery: settings.discovery,
        }
    }

    /// Run the submission, writing user-facing messages to `out`
    pub async fn run<W: Write + Send>(
        &self,
        wallet: Arc<dyn IdentityStore>,
        gateway: &mut dyn Gateway,
        args: &TransactionArgs,
        out: &mut W,
    ) -> WithdrawResult<Outcome> {
        emit(out, &format!("Wallet path: {}", wallet.location()))?;

        let exists = wallet.exists(&self.identity).await?;
        if !exists {
            warn!("Identity {} is not enrolled, nothing submitted", self.identity);
            emit(
                out,
                &format!("Identity {:?} does not exist in the wallet", self.identity),
            )?;
            emit(out, &exists.to_string())?;
            return Ok(Outcome::IdentityMissing {
                label: self.identity.clone(),
            });
        }

        let options = ConnectOptions {
            identity: self.identity.clone(),
            wallet,
            discovery: self.discovery,
        };
        debug!("Connecting with {:?}", options);
        gateway.connect(&self.profile, options).await?;

        let result = self.submit(&*gateway, args, out).await;
        gateway.disconnect().await;

        result.map(Outcome::Submitted)
    }

    async fn submit<W: Write + Send>(
        &self,
        gateway: &dyn Gateway,
        args: &TransactionArgs,
        out: &mut W,
    ) -> WithdrawResult<SubmitResult> {
        let network = gateway.get_network(&self.target.channel).await?;
        let channel = network.get_channel(&self.target.channel).await?;
        debug!(
            "Network {} has channel {} served by {} peer(s)",
            network.name(),
            channel.name,
            channel.peers.len()
        );

        let contract = network.get_contract(&self.target.contract);
        debug!("Submitting {} to contract {}", self.target.transaction, contract.name());
        let result = contract
            .submit_transaction(&self.target.transaction, args.as_slice())
            .await?;

        info!(
            "Transaction {} committed on {}/{}",
            result.tx_id, self.target.channel, self.target.contract
        );
        emit(out, "Transaction has been submitted")?;

        Ok(result)
    }
}

fn emit<W: Write>(out: &mut W, line: &str) -> WithdrawResult<()> {
    writeln!(out, "{}", line)
        .map_err(|e| WithdrawError::Internal(format!("Failed to write output: {}", e)))
}
