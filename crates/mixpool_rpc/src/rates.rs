use std::time::Duration;

use async_trait::async_trait;
use mixpool_core::MixpoolError;
use mixpool_coordinator::{ExchangeRate, RateProvider};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::Result;

/// Fiat ticker client.
///
/// Expects the endpoint to answer a GET with a JSON array of
/// `{"code": ..., "rate": ...}` entries; the coordinator picks the USD
/// entry out of the list.
#[derive(Clone)]
pub struct HttpRateProvider {
    url: String,
    client: reqwest::Client,
}

impl HttpRateProvider {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    async fn get_exchange_rates(
        &self,
        cancel: CancellationToken,
    ) -> std::result::Result<Vec<ExchangeRate>, MixpoolError> {
        let request = async {
            let response = self
                .client
                .get(&self.url)
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(|err| {
                    MixpoolError::ExternalUnavailable(format!("rate request: {err}"))
                })?;
            response.json::<Vec<ExchangeRate>>().await.map_err(|err| {
                MixpoolError::ExternalUnavailable(format!("rate response body: {err}"))
            })
        };

        let rates = tokio::select! {
            rates = request => rates?,
            _ = cancel.cancelled() => {
                return Err(MixpoolError::ExternalUnavailable(
                    "rate request cancelled".into(),
                ));
            }
        };
        debug!(count = rates.len(), "exchange rates fetched");
        Ok(rates)
    }
}
