//! Account balance abstractions

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Holdings of a single asset in the account.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
    pub total: Decimal,
}

impl AssetBalance {
    pub fn new(asset: &str, free: Decimal, locked: Decimal) -> Self {
        AssetBalance {
            asset: asset.to_string(),
            free,
            locked,
            total: free + locked,
        }
    }

    pub fn total_f64(&self) -> f64 {
        self.total.to_f64().unwrap_or_default()
    }
}

/// Source of the caller's current non-zero balances.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn get_balances(&self) -> Result<Vec<AssetBalance>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_total_is_free_plus_locked() {
        let balance = AssetBalance::new(
            "BTC",
            Decimal::from_str("0.25000000").unwrap(),
            Decimal::from_str("1.75").unwrap(),
        );
        assert_eq!(balance.total, Decimal::from(2));
        assert_eq!(balance.total_f64(), 2.0);
    }
}
