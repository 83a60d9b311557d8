use alloy::primitives::{Address, B256};
use std::time::Duration;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Stable classification of an [`Error`], independent of its message and cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Parse,
    MethodNotFound,
    PackFailed,
    UnpackFailed,
    InvalidKey,
    SigningFailed,
    Decode,
    MissingChainId,
    Connection,
    BalanceQueryFailed,
    NonceQueryFailed,
    ChainIdQueryFailed,
    CallFailed,
    EstimateFailed,
    SendFailed,
    ReceiptQueryFailed,
    ReceiptTimeout,
    Cancelled,
}

/// Errors raised while resolving, signing, sending or confirming a contract call.
#[derive(Debug, Error)]
pub enum Error {
    /// Interface description is neither a bare ABI array nor an artifact object.
    #[error("invalid interface description: {reason}")]
    Parse {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("method `{0}` not found in interface")]
    MethodNotFound(String),

    #[error("failed to encode arguments for `{method}`: {reason}")]
    PackFailed { method: String, reason: String },

    #[error("failed to decode result of `{method}`: {reason}")]
    UnpackFailed { method: String, reason: String },

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("signing failed")]
    SigningFailed(#[source] BoxError),

    /// Bad hex or a signature that is not exactly 65 bytes.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("transaction has no chain id")]
    MissingChainId,

    #[error("cannot reach RPC endpoint {url}")]
    Connection {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("balance query for {address} failed")]
    BalanceQueryFailed {
        address: Address,
        #[source]
        source: BoxError,
    },

    #[error("nonce query for {address} failed")]
    NonceQueryFailed {
        address: Address,
        #[source]
        source: BoxError,
    },

    #[error("chain id query failed")]
    ChainIdQueryFailed(#[source] BoxError),

    #[error("static call to {to} failed")]
    CallFailed {
        to: Address,
        #[source]
        source: BoxError,
    },

    #[error("gas estimation failed")]
    EstimateFailed(#[source] BoxError),

    #[error("failed to broadcast transaction")]
    SendFailed(#[source] BoxError),

    #[error("receipt query for {hash} failed")]
    ReceiptQueryFailed {
        hash: B256,
        #[source]
        source: BoxError,
    },

    #[error("no receipt for {hash} after {waited:?}")]
    ReceiptTimeout { hash: B256, waited: Duration },

    #[error("wait for receipt of {hash} was cancelled")]
    Cancelled { hash: B256 },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Parse { .. } => ErrorKind::Parse,
            Error::MethodNotFound(_) => ErrorKind::MethodNotFound,
            Error::PackFailed { .. } => ErrorKind::PackFailed,
            Error::UnpackFailed { .. } => ErrorKind::UnpackFailed,
            Error::InvalidKey(_) => ErrorKind::InvalidKey,
            Error::SigningFailed(_) => ErrorKind::SigningFailed,
            Error::Decode(_) => ErrorKind::Decode,
            Error::MissingChainId => ErrorKind::MissingChainId,
            Error::Connection { .. } => ErrorKind::Connection,
            Error::BalanceQueryFailed { .. } => ErrorKind::BalanceQueryFailed,
            Error::NonceQueryFailed { .. } => ErrorKind::NonceQueryFailed,
            Error::ChainIdQueryFailed(_) => ErrorKind::ChainIdQueryFailed,
            Error::CallFailed { .. } => ErrorKind::CallFailed,
            Error::EstimateFailed(_) => ErrorKind::EstimateFailed,
            Error::SendFailed(_) => ErrorKind::SendFailed,
            Error::ReceiptQueryFailed { .. } => ErrorKind::ReceiptQueryFailed,
            Error::ReceiptTimeout { .. } => ErrorKind::ReceiptTimeout,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Returns `true` for failures that happened on the node or on the way to it.
    pub fn is_transport(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Connection
                | ErrorKind::BalanceQueryFailed
                | ErrorKind::NonceQueryFailed
                | ErrorKind::ChainIdQueryFailed
                | ErrorKind::CallFailed
                | ErrorKind::EstimateFailed
                | ErrorKind::SendFailed
                | ErrorKind::ReceiptQueryFailed
                | ErrorKind::ReceiptTimeout
                | ErrorKind::Cancelled
        )
    }
}
