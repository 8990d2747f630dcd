//! Error types for the wallet pipeline

use crate::chain::Chain;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Parsing error: {0}")]
    Parsing(String),

    #[error("Missing inputs: a UTXO set is required for this chain")]
    MissingInputs,

    #[error("Missing blockhash: a recent blockhash is required for this chain")]
    MissingBlockhash,

    #[error("Invalid threshold {threshold} for {total} shares")]
    InvalidThreshold { threshold: usize, total: usize },

    #[error("Invalid shares: {0}")]
    InvalidShares(String),

    #[error("State mismatch: expected {expected}, found {actual}")]
    StateMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Secret access denied: {0}")]
    AccessDenied(String),

    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("No signing backend available for {0}")]
    BackendUnavailable(Chain),

    #[error("Operation cancelled while in flight; broadcast outcome is unknown")]
    Cancelled,

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Discriminant of [`Error`], kept when the error itself is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedChain,
    Network,
    Rpc,
    Parsing,
    MissingInputs,
    MissingBlockhash,
    InvalidThreshold,
    InvalidShares,
    StateMismatch,
    AccessDenied,
    NotFound,
    BackendUnavailable,
    Cancelled,
    Signing,
    InvalidArgument,
    Config,
}

const MSG_NETWORK_REJECTED: &str = "Transaction failed. The network rejected the request.";
const MSG_CONNECTION: &str = "Unable to connect. Please check your internet connection.";
const MSG_UNEXPECTED_RESPONSE: &str = "Received an unexpected response from the network.";
const MSG_INCOMPLETE: &str = "The transaction is incomplete. Please review it and try again.";
const MSG_RECOVERY: &str = "The recovery shares could not be used.";
const MSG_SEQUENCE: &str = "Please review the transaction before confirming it.";
const MSG_WALLET_LOCKED: &str = "Unable to access the wallet.";
const MSG_UNKNOWN_OUTCOME: &str =
    "The transaction status is unknown. Check your activity before retrying.";
const MSG_GENERIC: &str = "Something went wrong. Please try again.";

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedChain(_) => ErrorKind::UnsupportedChain,
            Error::Network(_) => ErrorKind::Network,
            Error::Rpc { .. } => ErrorKind::Rpc,
            Error::Parsing(_) => ErrorKind::Parsing,
            Error::MissingInputs => ErrorKind::MissingInputs,
            Error::MissingBlockhash => ErrorKind::MissingBlockhash,
            Error::InvalidThreshold { .. } => ErrorKind::InvalidThreshold,
            Error::InvalidShares(_) => ErrorKind::InvalidShares,
            Error::StateMismatch { .. } => ErrorKind::StateMismatch,
            Error::AccessDenied(_) => ErrorKind::AccessDenied,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Signing(_) => ErrorKind::Signing,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Generic text safe to show an end user.
    ///
    /// Node error strings vary between implementations and can leak details,
    /// so they are never surfaced verbatim.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Rpc => MSG_NETWORK_REJECTED,
            ErrorKind::Network => MSG_CONNECTION,
            ErrorKind::Parsing => MSG_UNEXPECTED_RESPONSE,
            ErrorKind::MissingInputs | ErrorKind::MissingBlockhash | ErrorKind::InvalidArgument => {
                MSG_INCOMPLETE
            }
            ErrorKind::InvalidThreshold | ErrorKind::InvalidShares => MSG_RECOVERY,
            ErrorKind::StateMismatch => MSG_SEQUENCE,
            ErrorKind::AccessDenied | ErrorKind::NotFound => MSG_WALLET_LOCKED,
            ErrorKind::Cancelled => MSG_UNKNOWN_OUTCOME,
            ErrorKind::UnsupportedChain
            | ErrorKind::BackendUnavailable
            | ErrorKind::Signing
            | ErrorKind::Config => MSG_GENERIC,
        }
    }

    pub(crate) fn state_mismatch(expected: &'static str, actual: &'static str) -> Self {
        Error::StateMismatch { expected, actual }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parsing(e.to_string())
    }
}

/// Observable record of a failure: the kind and raw diagnostic text for logs,
/// plus the generic message for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    pub kind: ErrorKind,
    pub message: String,
    pub user_message: &'static str,
}

impl From<&Error> for FailureReport {
    fn from(error: &Error) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            user_message: error.user_message(),
        }
    }
}
