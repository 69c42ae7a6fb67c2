//! Gateway module - connection to the ledger network
//!
//! This module provides:
//! - The `Gateway` / `Network` / `Contract` seams the submitter talks to
//! - Peer endpoint resolution from the connection profile
//! - Proposal signing with the wallet identity
//! - An HTTP/JSON gateway implementation

pub mod endpoint;
pub mod http;
pub mod signer;

pub use http::HttpGateway;

use crate::config::{ConnectionProfile, DiscoveryOptions};
use crate::error::WithdrawResult;
use crate::wallet::IdentityStore;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Options for opening a gateway connection
#[derive(Clone)]
pub struct ConnectOptions {
    /// Wallet label of the identity to act as
    pub identity: String,
    /// Wallet the identity is loaded from
    pub wallet: Arc<dyn IdentityStore>,
    pub discovery: DiscoveryOptions,
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("identity", &self.identity)
            .field("wallet", &self.wallet.location())
            .field("discovery", &self.discovery)
            .finish()
    }
}

/// Channel view resolved from a network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub name: String,
    /// Peer endpoints serving the channel
    pub peers: Vec<String>,
}

/// Result of a committed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResult {
    pub tx_id: String,
    /// Raw payload returned by the contract function
    pub payload: Vec<u8>,
}

/// Client session with the network, acting as one identity
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Open the session
    async fn connect(
        &mut self,
        profile: &ConnectionProfile,
        options: ConnectOptions,
    ) -> WithdrawResult<()>;

    /// Resolve the network view of a channel
    async fn get_network(&self, name: &str) -> WithdrawResult<Box<dyn Network>>;

    /// Release the session. Safe to call on a closed gateway.
    async fn disconnect(&mut self);
}

/// Network view of one channel
#[async_trait]
pub trait Network: Send + Sync {
    fn name(&self) -> &str;

    async fn get_channel(&self, name: &str) -> WithdrawResult<ChannelInfo>;

    fn get_contract(&self, name: &str) -> Box<dyn Contract>;
}

/// Deployed contract on a channel
#[async_trait]
pub trait Contract: Send + Sync {
    fn name(&self) -> &str;

    /// Submit a transaction and wait for the network to commit or reject it.
    /// `None` arguments are sent as absent values.
    async fn submit_transaction(
        &self,
        name: &str,
        args: &[Option<String>],
    ) -> WithdrawResult<SubmitResult>;
}
