use super::util::{get_json, http_client};
use crate::core::balance::Balance;
use crate::core::config::{CoinGeckoAsset, CoinGeckoConfig};
use crate::core::source::BalanceSource;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

pub const SOURCE_NAME: &str = "CoinGecko";

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct SimplePriceResponse(HashMap<String, HashMap<String, Decimal>>);

/// Assets whose balance grows by a fixed amount per day, priced in USD by
/// CoinGecko's simple price endpoint.
pub struct CoinGeckoSource {
    client: reqwest::Client,
    config: CoinGeckoConfig,
}

impl CoinGeckoSource {
    pub fn new(config: CoinGeckoConfig) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            config,
        })
    }
}

/// Quantity held at `now`: the known total plus the daily accrual for every
/// whole day elapsed since it was recorded.
pub fn accrued_total(asset: &CoinGeckoAsset, now: NaiveDateTime) -> Decimal {
    let days = (now - asset.total_date).num_days();
    asset
        .initial_total
        .saturating_add(asset.tokens_per_day.saturating_mul(Decimal::from(days)))
}

#[async_trait]
impl BalanceSource for CoinGeckoSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch_balances(&self) -> Result<Vec<Balance>> {
        if self.config.assets.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = self
            .config
            .assets
            .iter()
            .map(|a| a.coingecko_id.as_str())
            .collect();
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd",
            self.config.base_url.trim_end_matches('/'),
            ids.join(",")
        );
        let SimplePriceResponse(prices) = get_json(&self.client, &url).await?;

        let now = Local::now().naive_local();
        let mut balances = Vec::with_capacity(self.config.assets.len());
        for asset in &self.config.assets {
            let price = prices
                .get(&asset.coingecko_id.to_lowercase())
                .and_then(|quotes| quotes.get("usd"));
            let Some(price) = price else {
                warn!(asset = %asset.asset_name, id = %asset.coingecko_id, "No USD price in CoinGecko response");
                continue;
            };

            let total = accrued_total(asset, now);
            debug!(asset = %asset.asset_name, %total, %price, "Priced accruing asset");
            balances.push(Balance::new(asset.asset_name.as_str(), total, *price, SOURCE_NAME));
        }
        Ok(balances)
    }
}
