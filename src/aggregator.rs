//! Joins account balances with their exchange rates.

use crate::core::balance::{AssetBalance, BalanceSource};
use crate::core::rate::{RateRecord, RateSource};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};

/// Value of one balance expressed in one reference currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertedValue {
    pub asset: String,
    pub reference: String,
    pub value: f64,
}

pub struct Aggregator<'a> {
    balance_source: &'a dyn BalanceSource,
    rate_source: &'a dyn RateSource,
    references: &'a [String],
}

impl<'a> Aggregator<'a> {
    pub fn new(
        balance_source: &'a dyn BalanceSource,
        rate_source: &'a dyn RateSource,
        references: &'a [String],
    ) -> Self {
        Aggregator {
            balance_source,
            rate_source,
            references,
        }
    }

    /// Fetches balances, then rates for the held assets, and joins them.
    ///
    /// Output follows balance order, and within a balance the order the rate
    /// source returned its records in. Any provider failure aborts the call.
    #[instrument(name = "ComputeConversions", skip(self))]
    pub async fn compute_conversions(&self) -> Result<Vec<ConvertedValue>> {
        let balances = self
            .balance_source
            .get_balances()
            .await
            .context("Failed to fetch account balances")?;
        if balances.is_empty() {
            info!("No non-zero balances to convert");
            return Ok(Vec::new());
        }

        let assets: BTreeSet<String> = balances.iter().map(|b| b.asset.clone()).collect();
        debug!(?assets, references = ?self.references, "Fetching conversion rates");

        let rates = self
            .rate_source
            .get_rates(&assets, self.references)
            .await
            .context("Failed to fetch conversion rates")?;

        let conversions = join_conversions(&balances, &rates);
        debug!(count = conversions.len(), "Computed conversions");
        Ok(conversions)
    }
}

/// One value per (balance, rate) pair sharing the same asset.
pub fn join_conversions(balances: &[AssetBalance], rates: &[RateRecord]) -> Vec<ConvertedValue> {
    balances
        .iter()
        .flat_map(|balance| {
            let total = balance.total_f64();
            rates
                .iter()
                .filter(move |rate| rate.asset == balance.asset)
                .map(move |rate| ConvertedValue {
                    asset: balance.asset.clone(),
                    reference: rate.reference.clone(),
                    value: rate.rate * total,
                })
        })
        .collect()
}
