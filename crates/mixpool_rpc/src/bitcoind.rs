use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bitcoincore_rpc::json::EstimateMode;
use bitcoincore_rpc::{Auth, Client, RpcApi};
use mixpool_core::MixpoolError;
use mixpool_coordinator::FeeEstimator;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Result, RpcError};

/// Configuration for a Bitcoin Core node connection.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub rpc_url: String,
    pub auth: NodeAuth,
}

/// Authentication method for RPC connection.
#[derive(Debug, Clone)]
pub enum NodeAuth {
    /// Cookie file authentication (most secure, default).
    CookieFile(PathBuf),
    /// Username/password authentication.
    UserPass { user: String, pass: String },
    /// No authentication (for testing only).
    None,
}

impl NodeConfig {
    /// Build an RPC client from this config.
    pub fn client(&self) -> Result<Client> {
        let auth = match &self.auth {
            NodeAuth::CookieFile(path) => Auth::CookieFile(path.clone()),
            NodeAuth::UserPass { user, pass } => Auth::UserPass(user.clone(), pass.clone()),
            NodeAuth::None => Auth::None,
        };
        Client::new(&self.rpc_url, auth).map_err(RpcError::Rpc)
    }
}

/// Fee oracle backed by the node's `estimatesmartfee`.
///
/// Asks for a one-block economical estimate and normalizes the returned
/// BTC-per-kvB rate to whole satoshis per virtual byte.
pub struct BitcoindFeeEstimator {
    client: Arc<Client>,
}

impl BitcoindFeeEstimator {
    pub fn new(config: &NodeConfig) -> Result<Self> {
        Ok(Self {
            client: Arc::new(config.client()?),
        })
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

#[async_trait]
impl FeeEstimator for BitcoindFeeEstimator {
    async fn estimate_sat_per_byte(
        &self,
        cancel: CancellationToken,
    ) -> std::result::Result<u64, MixpoolError> {
        let client = self.client.clone();
        let request = tokio::task::spawn_blocking(move || {
            client.estimate_smart_fee(1, Some(EstimateMode::Economical))
        });

        let response = tokio::select! {
            joined = request => joined
                .map_err(|err| unavailable(format!("fee estimation task failed: {err}")))?,
            _ = cancel.cancelled() => {
                return Err(unavailable("fee estimation cancelled"));
            }
        };

        let estimate = response.map_err(|err| unavailable(format!("estimatesmartfee: {err}")))?;
        let rate = estimate.fee_rate.ok_or_else(|| {
            let reasons = estimate.errors.unwrap_or_default().join("; ");
            unavailable(format!("estimatesmartfee returned no feerate: {reasons}"))
        })?;

        // BTC/kvB to sat/vB, never below the 1 sat/vB relay floor.
        let sat_per_byte = (rate.to_sat() / 1000).max(1);
        debug!(sat_per_byte, "fee estimate");
        Ok(sat_per_byte)
    }
}

fn unavailable(message: impl Into<String>) -> MixpoolError {
    MixpoolError::ExternalUnavailable(message.into())
}
