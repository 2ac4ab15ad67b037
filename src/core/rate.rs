//! Exchange rate abstractions and core types

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Display;
use std::str::FromStr;

/// Price of one unit of `asset` quoted in `reference`.
#[derive(Debug, Clone, PartialEq)]
pub struct RateRecord {
    pub asset: String,
    pub reference: String,
    pub rate: f64,
}

/// What a rate source does when some pair-queries fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any failed pair fails the whole batch.
    #[default]
    AllOrNothing,
    /// Failed pairs are logged and left out of the result.
    SkipFailed,
}

impl Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                FailurePolicy::AllOrNothing => "all_or_nothing",
                FailurePolicy::SkipFailed => "skip_failed",
            }
        )
    }
}

impl FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "all_or_nothing" => Ok(FailurePolicy::AllOrNothing),
            "skip_failed" => Ok(FailurePolicy::SkipFailed),
            _ => Err(anyhow::anyhow!("Invalid failure policy: {}", s)),
        }
    }
}

/// Every (asset, reference) pair to query, skipping self-pairs.
///
/// Pairs are asset-major and keep the order of `references` within an asset.
/// Symbols compare case-insensitively and repeated references are queried once.
pub fn pair_queries<'a, I>(assets: I, references: &[String]) -> Vec<(String, String)>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut unique: Vec<&String> = Vec::with_capacity(references.len());
    for reference in references {
        if !unique.iter().any(|u| u.eq_ignore_ascii_case(reference)) {
            unique.push(reference);
        }
    }

    assets
        .into_iter()
        .flat_map(|asset| {
            unique
                .iter()
                .filter(|reference| !reference.eq_ignore_ascii_case(asset))
                .map(|reference| (asset.clone(), (*reference).clone()))
                .collect::<Vec<_>>()
        })
        .collect()
}

#[async_trait]
pub trait RateSource: Send + Sync {
    async fn get_rates(
        &self,
        assets: &BTreeSet<String>,
        references: &[String],
    ) -> Result<Vec<RateRecord>>;
}
