use super::util::build_client;
use crate::core::balance::{AssetBalance, BalanceSource};
use crate::core::config::AccountProviderConfig;
use crate::core::error::ProviderError;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, instrument};

type HmacSha256 = Hmac<Sha256>;

const API_KEY_HEADER: &str = "X-MBX-APIKEY";

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<RawBalance>,
}

#[derive(Debug, Deserialize)]
struct RawBalance {
    asset: String,
    free: String,
    locked: String,
}

/// Hex encoded HMAC-SHA256 of `query` keyed with `secret`.
pub fn sign_query(secret: &str, query: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow!("Invalid secret key: {e}"))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Balance source backed by the Binance spot account endpoint.
pub struct BinanceProvider {
    base_url: String,
    api_key: String,
    secret_key: String,
    recv_window: Option<u64>,
    client: reqwest::Client,
}

impl BinanceProvider {
    pub fn new(config: &AccountProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .context("Missing Binance API key (set BINANCE_API_KEY)")?;
        let secret_key = config
            .secret_key
            .clone()
            .filter(|k| !k.is_empty())
            .context("Missing Binance secret key (set BINANCE_SECRET_KEY)")?;

        Ok(BinanceProvider {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            secret_key,
            recv_window: config.recv_window,
            client: build_client(config.timeout_secs)?,
        })
    }

    /// Sorted query string with the trailing `signature` parameter.
    fn signed_query(&self, timestamp_ms: i64) -> Result<String> {
        let mut params = BTreeMap::new();
        params.insert("timestamp", timestamp_ms.to_string());
        if let Some(window) = self.recv_window {
            params.insert("recvWindow", window.to_string());
        }

        let query = params
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        let signature = sign_query(&self.secret_key, &query)?;
        Ok(format!("{query}&signature={signature}"))
    }

    fn parse_balances(url: &str, raw: Vec<RawBalance>) -> Result<Vec<AssetBalance>> {
        let parse = |asset: &str, field: &str, value: &str| {
            Decimal::from_str(value).map_err(|e| ProviderError::Malformed {
                url: url.to_string(),
                reason: format!("invalid {field} amount for {asset}: {e}"),
            })
        };

        let mut balances = Vec::new();
        for entry in raw {
            let free = parse(&entry.asset, "free", &entry.free)?;
            let locked = parse(&entry.asset, "locked", &entry.locked)?;
            let balance = AssetBalance::new(&entry.asset, free, locked);
            if balance.total > Decimal::ZERO {
                balances.push(balance);
            }
        }
        Ok(balances)
    }
}

#[async_trait]
impl BalanceSource for BinanceProvider {
    #[instrument(name = "BinanceAccountFetch", skip(self))]
    async fn get_balances(&self) -> Result<Vec<AssetBalance>> {
        let url = format!("{}/api/v3/account", self.base_url);
        let query = self.signed_query(chrono::Utc::now().timestamp_millis())?;
        debug!("Requesting account balances from {}", url);

        let response = self
            .client
            .get(format!("{url}?{query}"))
            .header("Accept", "application/json")
            .header(API_KEY_HEADER, &self.api_key)
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

        let data: AccountResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::Malformed {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let balances = Self::parse_balances(&url, data.balances)?;
        debug!(count = balances.len(), "Received non-zero balances");
        Ok(balances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const API_KEY: &str = "test-api-key";
    const SECRET: &str = "test-secret";

    fn provider_for(server: &MockServer) -> BinanceProvider {
        let config = AccountProviderConfig {
            base_url: server.uri(),
            api_key: Some(API_KEY.to_string()),
            secret_key: Some(SECRET.to_string()),
            ..AccountProviderConfig::default()
        };
        BinanceProvider::new(&config).unwrap()
    }

    async fn mount_account(server: &MockServer, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path("/api/v3/account"))
            .and(header(API_KEY_HEADER, API_KEY))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn test_sign_query_matches_published_example() {
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            sign_query(secret, query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_signed_query_is_sorted_and_signed_last() {
        let config = AccountProviderConfig {
            api_key: Some(API_KEY.to_string()),
            secret_key: Some(SECRET.to_string()),
            recv_window: Some(5000),
            ..AccountProviderConfig::default()
        };
        let provider = BinanceProvider::new(&config).unwrap();

        let query = provider.signed_query(1499827319559).unwrap();
        let (unsigned, signature) = query.split_once("&signature=").unwrap();
        assert_eq!(unsigned, "recvWindow=5000&timestamp=1499827319559");
        assert_eq!(signature, sign_query(SECRET, unsigned).unwrap());
    }

    #[test]
    fn test_missing_credentials_are_rejected() {
        let result = BinanceProvider::new(&AccountProviderConfig::default());
        assert!(result.is_err());
        assert!(
            result
                .err()
                .unwrap()
                .to_string()
                .contains("Missing Binance API key")
        );
    }

    #[tokio::test]
    async fn test_zero_balances_are_filtered() {
        let server = MockServer::start().await;
        mount_account(
            &server,
            200,
            r#"{
                "makerCommission": 15,
                "balances": [
                    {"asset": "BTC", "free": "1.50000000", "locked": "0.50000000"},
                    {"asset": "LTC", "free": "0.00000000", "locked": "0.00000000"},
                    {"asset": "ETH", "free": "0.00000000", "locked": "3.00000000"}
                ]
            }"#,
        )
        .await;

        let provider = provider_for(&server);
        let balances = provider.get_balances().await.unwrap();

        assert_eq!(balances.len(), 2);
        assert_eq!(balances[0].asset, "BTC");
        assert_eq!(balances[0].total, Decimal::from(2));
        assert_eq!(balances[1].asset, "ETH");
        assert_eq!(balances[1].free, Decimal::ZERO);
        assert_eq!(balances[1].total, Decimal::from(3));
    }

    #[tokio::test]
    async fn test_request_carries_valid_signature() {
        let server = MockServer::start().await;
        mount_account(&server, 200, r#"{"balances": []}"#).await;

        let provider = provider_for(&server);
        assert!(provider.get_balances().await.unwrap().is_empty());

        let requests = server.received_requests().await.unwrap();
        let query = requests[0].url.query().unwrap().to_string();
        let (unsigned, signature) = query.split_once("&signature=").unwrap();
        assert!(unsigned.starts_with("timestamp="));
        assert_eq!(signature, sign_query(SECRET, unsigned).unwrap());
    }

    #[tokio::test]
    async fn test_error_status_is_surfaced() {
        let server = MockServer::start().await;
        mount_account(
            &server,
            401,
            r#"{"code": -2015, "msg": "Invalid API-key, IP, or permissions for action."}"#,
        )
        .await;

        let provider = provider_for(&server);
        let err = provider.get_balances().await.unwrap_err();
        match err.downcast_ref::<ProviderError>() {
            Some(ProviderError::Status { status, body, .. }) => {
                assert_eq!(*status, StatusCode::UNAUTHORIZED);
                assert!(body.contains("Invalid API-key"));
            }
            other => panic!("Expected a status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_amount_is_malformed() {
        let server = MockServer::start().await;
        mount_account(
            &server,
            200,
            r#"{"balances": [{"asset": "BTC", "free": "lots", "locked": "0"}]}"#,
        )
        .await;

        let provider = provider_for(&server);
        let err = provider.get_balances().await.unwrap_err();
        let provider_err = err.downcast_ref::<ProviderError>().unwrap();
        assert!(matches!(provider_err, ProviderError::Malformed { .. }));
        assert!(!provider_err.is_transport());
        assert!(provider_err.to_string().contains("invalid free amount for BTC"));
    }
}
