//! External oracle clients for the mixpool coordinator.
//!
//! Implements the `mixpool_coordinator` client traits against a Bitcoin
//! Core node (smart-fee estimation over JSON-RPC) and a fiat ticker
//! endpoint (JSON over HTTP). Both calls race against the caller's
//! cancellation token; all failures surface as `ExternalUnavailable`,
//! which the scheduler answers by keeping the previous round's values.

pub mod bitcoind;
pub mod rates;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("bitcoincore-rpc error: {0}")]
    Rpc(#[from] bitcoincore_rpc::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("node error: {0}")]
    NodeError(String),
}

pub type Result<T> = std::result::Result<T, RpcError>;

pub use bitcoind::{BitcoindFeeEstimator, NodeAuth, NodeConfig};
pub use rates::HttpRateProvider;
