//! Error types for the withdraw client

use thiserror::Error;

/// Main error type for the withdraw client
#[derive(Error, Debug)]
pub enum WithdrawError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection profile error: {0}")]
    Profile(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Identity {label} is not available: {message}")]
    Identity { label: String, message: String },

    #[error("Connection error for {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    #[error("Access denied for identity {identity}: {message}")]
    Authentication { identity: String, message: String },

    #[error("Channel {channel} not found")]
    ChannelNotFound { channel: String },

    #[error("Contract {contract} not found on channel {channel}")]
    ContractNotFound { channel: String, contract: String },

    #[error("Transaction {transaction} was rejected: {message}")]
    Endorsement { transaction: String, message: String },

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Gateway is not connected")]
    NotConnected,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse grouping of failures for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// Endpoint unreachable or transport failure
    Connectivity,
    /// Identity rejected by the network
    Authentication,
    /// Channel, contract or endorsement level rejection
    Contract,
    /// Local configuration, wallet or key problems
    Local,
}

impl WithdrawError {
    /// Classify the error for logging
    pub fn category(&self) -> FailureCategory {
        match self {
            WithdrawError::Connection { .. } | WithdrawError::NotConnected => {
                FailureCategory::Connectivity
            }
            WithdrawError::Authentication { .. } => FailureCategory::Authentication,
            WithdrawError::ChannelNotFound { .. }
            | WithdrawError::ContractNotFound { .. }
            | WithdrawError::Endorsement { .. } => FailureCategory::Contract,
            WithdrawError::Config(_)
            | WithdrawError::Profile(_)
            | WithdrawError::Wallet(_)
            | WithdrawError::Identity { .. }
            | WithdrawError::Signing(_)
            | WithdrawError::Internal(_) => FailureCategory::Local,
        }
    }

    /// Process exit status for a handled failure. Every category maps to 1.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// Result type for withdraw client operations
pub type WithdrawResult<T> = Result<T, WithdrawError>;
