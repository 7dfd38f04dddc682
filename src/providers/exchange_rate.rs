use super::util::{get_json, http_client};
use crate::core::config::ExchangeRateConfig;
use crate::core::source::RateSource;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, error, info};

#[derive(Debug, Deserialize)]
struct ExchangeRateResponse {
    rates: Option<HashMap<String, Decimal>>,
    time_last_updated: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
struct CachedRate {
    rate: Decimal,
    valid_until: DateTime<Utc>,
}

/// Base-currency to fiat rate from an open exchange-rate API.
///
/// The rate is cached until one day after the upstream's own
/// `time_last_updated`. A failed refresh never fails the caller: the last
/// known rate is returned, or zero when there is none.
pub struct ExchangeRateProvider {
    client: reqwest::Client,
    config: ExchangeRateConfig,
    cached: Mutex<Option<CachedRate>>,
}

impl ExchangeRateProvider {
    pub fn new(config: ExchangeRateConfig) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            config,
            cached: Mutex::new(None),
        })
    }

    fn cached(&self) -> Option<CachedRate> {
        self.cached.lock().ok().and_then(|guard| *guard)
    }

    fn store(&self, rate: CachedRate) {
        if let Ok(mut guard) = self.cached.lock() {
            *guard = Some(rate);
        }
    }

    async fn fetch(&self) -> Result<CachedRate> {
        let data: ExchangeRateResponse = get_json(&self.client, &self.config.api_url).await?;
        let rate = data
            .rates
            .as_ref()
            .and_then(|rates| rates.get(&self.config.currency))
            .copied()
            .ok_or_else(|| anyhow!("No {} rate in exchange-rate response", self.config.currency))?;
        let updated = data
            .time_last_updated
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| anyhow!("Missing time_last_updated in exchange-rate response"))?;

        Ok(CachedRate {
            rate,
            valid_until: updated + TimeDelta::days(1),
        })
    }
}

#[async_trait]
impl RateSource for ExchangeRateProvider {
    async fn current_rate(&self) -> Result<Decimal> {
        let cached = self.cached();
        if let Some(cached) = cached.filter(|c| Utc::now() < c.valid_until) {
            debug!(next_update = %cached.valid_until, "Returning cached exchange rate");
            return Ok(cached.rate);
        }

        match self.fetch().await {
            Ok(fresh) => {
                info!(
                    currency = %self.config.currency,
                    rate = %fresh.rate,
                    next_update = %fresh.valid_until,
                    "Updated exchange rate"
                );
                self.store(fresh);
                Ok(fresh.rate)
            }
            Err(e) => {
                error!(currency = %self.config.currency, "Error fetching exchange rate: {e:#}");
                Ok(cached.map_or(Decimal::ZERO, |c| c.rate))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> ExchangeRateProvider {
        ExchangeRateProvider::new(ExchangeRateConfig {
            api_url: format!("{}/v6/latest/USD", server.uri()),
            currency: "NOK".to_string(),
        })
        .unwrap()
    }

    fn body(updated: i64) -> String {
        format!(
            r#"{{"result":"success","time_last_updated":{updated},"rates":{{"USD":1,"NOK":10.52,"EUR":0.92}}}}"#
        )
    }

    #[tokio::test]
    async fn test_fresh_rate_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v6/latest/USD"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body(Utc::now().timestamp())))
            .expect(1)
            .mount(&server)
            .await;
        let provider = provider(&server);

        assert_eq!(provider.current_rate().await.unwrap(), dec!(10.52));
        // Second call is served from the cache; the mock expects one hit.
        assert_eq!(provider.current_rate().await.unwrap(), dec!(10.52));
    }

    #[tokio::test]
    async fn test_failure_without_cache_returns_zero() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert_eq!(provider(&server).current_rate().await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_last_rate() {
        let server = MockServer::start().await;
        // Stale upstream timestamp: the cached rate expires immediately.
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body(0)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let provider = provider(&server);

        assert_eq!(provider.current_rate().await.unwrap(), dec!(10.52));
        assert_eq!(provider.current_rate().await.unwrap(), dec!(10.52));
    }

    #[tokio::test]
    async fn test_missing_currency_is_zero() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"time_last_updated":1700000000,"rates":{"USD":1}}"#),
            )
            .mount(&server)
            .await;

        assert_eq!(provider(&server).current_rate().await.unwrap(), Decimal::ZERO);
    }
}
