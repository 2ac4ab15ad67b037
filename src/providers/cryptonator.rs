use super::util::{build_client, with_retry};
use crate::core::config::RateProviderConfig;
use crate::core::error::ProviderError;
use crate::core::rate::{FailurePolicy, RateRecord, RateSource, pair_queries};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::{debug, instrument, warn};

const RETRY_DELAY_MS: u64 = 500;

#[derive(Debug, Deserialize)]
struct TickerResponse {
    ticker: Option<Ticker>,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Deserialize)]
struct Ticker {
    base: String,
    target: String,
    price: Price,
}

// Prices arrive as decimal strings, but plain numbers are accepted too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Price {
    Text(String),
    Number(f64),
}

impl Price {
    fn parse(&self) -> Option<f64> {
        match self {
            Price::Text(text) => text.trim().parse::<f64>().ok(),
            Price::Number(value) => Some(*value),
        }
        .filter(|v| v.is_finite())
    }
}

/// Rate source backed by the Cryptonator ticker API, one request per pair.
pub struct CryptonatorProvider {
    base_url: String,
    client: reqwest::Client,
    max_concurrency: Option<usize>,
    retries: usize,
    failure_policy: FailurePolicy,
}

impl CryptonatorProvider {
    pub fn new(config: &RateProviderConfig) -> Result<Self> {
        Ok(CryptonatorProvider {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client: build_client(config.timeout_secs)?,
            max_concurrency: config.max_concurrency,
            retries: config.retries,
            failure_policy: config.failure_policy,
        })
    }

    #[instrument(name = "CryptonatorTickerFetch", skip(self))]
    async fn fetch_ticker(&self, asset: &str, reference: &str) -> Result<RateRecord> {
        let url = format!("{}/ticker/{}-{}", self.base_url, asset, reference);
        debug!("Requesting ticker from {}", url);

        let response =
            self.client
                .get(&url)
                .send()
                .await
                .map_err(|source| ProviderError::Transport {
                    url: url.clone(),
                    source,
                })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| ProviderError::Transport {
                url: url.clone(),
                source,
            })?;

        if status != StatusCode::OK {
            return Err(ProviderError::Status { url, status, body }.into());
        }

        let data: TickerResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::Malformed {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        if !data.success {
            let body = if data.error.is_empty() {
                body
            } else {
                data.error
            };
            return Err(ProviderError::Rejected { url, body }.into());
        }

        let ticker = data.ticker.ok_or_else(|| ProviderError::Malformed {
            url: url.clone(),
            reason: "missing ticker".to_string(),
        })?;
        let rate = ticker.price.parse().ok_or_else(|| ProviderError::Malformed {
            url: url.clone(),
            reason: format!("invalid price: {:?}", ticker.price),
        })?;

        Ok(RateRecord {
            asset: ticker.base,
            reference: ticker.target,
            rate,
        })
    }
}

#[async_trait]
impl RateSource for CryptonatorProvider {
    #[instrument(
        name = "CryptonatorRates",
        skip_all,
        fields(assets = assets.len(), references = references.len())
    )]
    async fn get_rates(
        &self,
        assets: &BTreeSet<String>,
        references: &[String],
    ) -> Result<Vec<RateRecord>> {
        let pairs = pair_queries(assets, references);
        debug!(pairs = pairs.len(), "Dispatching pair-queries");

        let fetches = pairs.into_iter().map(|(asset, reference)| async move {
            let result = with_retry(
                || self.fetch_ticker(&asset, &reference),
                self.retries,
                RETRY_DELAY_MS,
            )
            .await
            .with_context(|| format!("Failed to fetch rate for {asset}-{reference}"));
            (asset, reference, result)
        });

        // Both paths yield results in submission order and wait for every pair.
        let results: Vec<_> = match self.max_concurrency {
            Some(limit) => stream::iter(fetches).buffered(limit.max(1)).collect().await,
            None => join_all(fetches).await,
        };

        match self.failure_policy {
            FailurePolicy::AllOrNothing => results
                .into_iter()
                .map(|(_, _, result)| result)
                .collect::<Result<Vec<_>>>(),
            FailurePolicy::SkipFailed => Ok(results
                .into_iter()
                .filter_map(|(asset, reference, result)| match result {
                    Ok(rate) => Some(rate),
                    Err(e) => {
                        let cause = e.downcast_ref::<ProviderError>();
                        warn!(
                            %asset,
                            %reference,
                            url = cause.map_or("", |c| c.url()),
                            transport = cause.is_some_and(|c| c.is_transport()),
                            error = %e,
                            "Skipping failed pair-query"
                        );
                        None
                    }
                })
                .collect()),
        }
    }
}
