//! Contracts for the two external collaborators a round consults.
//!
//! Each is a single async call taking a cancellation token; shutting the
//! coordinator down cancels any call in flight. Failures map to
//! [`MixpoolError::ExternalUnavailable`] and the scheduler falls back to
//! the previous round's values.

use async_trait::async_trait;
use mixpool_core::MixpoolError;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

/// One ticker entry from the exchange-rate provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeRate {
    pub code: String,
    pub rate: f64,
}

/// Fee oracle, normally the Bitcoin node's smart-fee estimator.
#[async_trait]
pub trait FeeEstimator: Send + Sync {
    /// Current fee rate in satoshis per virtual byte.
    async fn estimate_sat_per_byte(
        &self,
        cancel: CancellationToken,
    ) -> Result<u64, MixpoolError>;
}

/// Fiat price oracle.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn get_exchange_rates(
        &self,
        cancel: CancellationToken,
    ) -> Result<Vec<ExchangeRate>, MixpoolError>;
}
