use super::util::http_client;
use crate::core::config::DirectusConfig;
use crate::core::record::{AssetValue, PortfolioTotal};
use crate::core::sink::TelemetrySink;
use crate::export::{AMOUNT_DP, REFERENCE_UNIT_DP, fixed};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
struct CoinValuePayload<'a> {
    token: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    balance: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    value: Decimal,
    source: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    btc_value: Decimal,
}

#[derive(Debug, Serialize)]
struct TotalBalancePayload {
    value: String,
    btc_value: String,
}

/// Posts every coin value and each portfolio total to a Directus collection.
pub struct DirectusClient {
    client: reqwest::Client,
    config: DirectusConfig,
}

impl DirectusClient {
    pub fn new(config: DirectusConfig) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            config,
        })
    }

    async fn post<T: Serialize + Sync>(&self, endpoint: &str, payload: &T) -> Result<()> {
        let url = format!("{}/items/{endpoint}", self.config.host.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Request error for URL: {url}"))?
            .error_for_status()
            .with_context(|| format!("Directus rejected item for {endpoint}"))?;

        let body = response
            .text()
            .await
            .context("Failed to get response text")?;
        if self.config.logging_enabled {
            debug!(endpoint, response = %body, "Directus response");
        }
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for DirectusClient {
    async fn publish(&self, value: &AssetValue) -> Result<()> {
        let payload = CoinValuePayload {
            token: &value.asset,
            balance: value.balance,
            price: value.price,
            value: value.value,
            source: &value.source,
            btc_value: value.reference_unit_value,
        };
        self.post(&self.config.coin_values_endpoint, &payload).await
    }

    async fn publish_total(&self, total: &PortfolioTotal) -> Result<()> {
        let payload = TotalBalancePayload {
            value: fixed(total.total_value, AMOUNT_DP),
            btc_value: fixed(total.total_reference_unit_value, REFERENCE_UNIT_DP),
        };
        self.post(&self.config.total_balance_endpoint, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> DirectusClient {
        DirectusClient::new(DirectusConfig {
            host: server.uri(),
            api_key: "secret-token".to_string(),
            coin_values_endpoint: "coin_values".to_string(),
            total_balance_endpoint: "total_balance".to_string(),
            enabled: true,
            logging_enabled: true,
        })
        .unwrap()
    }

    fn timestamp() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_publish_total_formats_fixed_decimals() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/items/total_balance"))
            .and(header("authorization", "Bearer secret-token"))
            .and(body_json(serde_json::json!({
                "value": "36002.46",
                "btc_value": "0.60004100"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":{}}"#))
            .expect(1)
            .mount(&server)
            .await;

        let total = PortfolioTotal {
            timestamp: timestamp(),
            total_value: dec!(36002.456),
            total_fiat_value: dec!(360024.56),
            total_reference_unit_value: dec!(0.600041),
        };
        client(&server).publish_total(&total).await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_coin_value() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/items/coin_values"))
            .and(header("authorization", "Bearer secret-token"))
            .and(body_json(serde_json::json!({
                "token": "BTC",
                "balance": 0.5,
                "price": 60000.0,
                "value": 30000.0,
                "source": "Manual",
                "btc_value": 0.5
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let value = AssetValue {
            timestamp: timestamp(),
            asset: "BTC".to_string(),
            balance: dec!(0.5),
            price: dec!(60000),
            value: dec!(30000),
            fiat_value: dec!(300000),
            reference_unit_value: dec!(0.5),
            source: "Manual".to_string(),
        };
        client(&server).publish(&value).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_request_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let total = PortfolioTotal {
            timestamp: timestamp(),
            total_value: dec!(1),
            total_fiat_value: dec!(10),
            total_reference_unit_value: dec!(0.00001),
        };
        assert!(client(&server).publish_total(&total).await.is_err());
    }
}
