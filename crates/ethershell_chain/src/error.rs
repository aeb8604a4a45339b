use std::time::Duration;

use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the account registry, the dispatch proxy and the
/// deployment orchestrator.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Contract name is empty")]
    EmptyName,

    #[error("Contract address may not be empty")]
    MissingAddress,

    #[error("No ABI available for contract `{0}`")]
    MissingAbi(String),

    #[error("No bytecode available for contract `{0}`")]
    MissingBytecode(String),

    #[error("Wallets may not be duplicated: key is already registered at index {index}")]
    DuplicateKey { index: usize },

    #[error("An HD wallet with this mnemonic phrase already exists at index {index}")]
    DuplicatePhrase { index: usize },

    #[error("Wallet index {index} is out of range ({len} accounts registered)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Account {0} not found in registered accounts")]
    UnknownSigner(String),

    #[error("Account {0} is a node-managed account and cannot be used with `from`")]
    SignerNotAvailable(String),

    #[error("Nothing matches {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transaction {0} reverted")]
    Reverted(B256),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Key error: {0}")]
    Key(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// Coarse classification used by the shell to decide how to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Empty or malformed user input.
    Validation,
    /// An insert would break a registry uniqueness invariant.
    Integrity,
    /// A numeric selector outside the registry.
    IndexOutOfRange,
    /// `from` could not be turned into a signer.
    Signer,
    /// RPC round-trip failed, timed out, or the transaction reverted.
    Network,
    /// Soft miss on a selector.
    NotFound,
    /// Disk, serialization or other local failure.
    System,
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_)
            | Self::EmptyName
            | Self::MissingAddress
            | Self::MissingAbi(_)
            | Self::MissingBytecode(_)
            | Self::Abi(_)
            | Self::Key(_) => ErrorKind::Validation,
            Self::DuplicateKey { .. } | Self::DuplicatePhrase { .. } => ErrorKind::Integrity,
            Self::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            Self::UnknownSigner(_) | Self::SignerNotAvailable(_) => ErrorKind::Signer,
            Self::Network(_) | Self::Rpc { .. } | Self::Timeout(_) | Self::Reverted(_) => {
                ErrorKind::Network
            }
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Io(_) | Self::Serialization(_) | Self::Other(_) => ErrorKind::System,
        }
    }

    /// Message shown in the shell. Network failures are summarized; the full
    /// error goes to the log.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Network => format!("{self}. Check that the node is reachable."),
            ErrorKind::System => format!("{self}. Check disk space and permissions."),
            _ => self.to_string(),
        }
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}
