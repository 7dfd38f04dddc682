use super::util::{get_json, http_client};
use crate::core::balance::Balance;
use crate::core::config::{BinanceConfig, ManualBalance};
use crate::core::source::BalanceSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: Decimal,
}

/// Spot prices from Binance's public ticker endpoint, quoted in one asset.
pub struct BinancePriceFeed {
    client: reqwest::Client,
    base_url: String,
    quote_asset: String,
}

impl BinancePriceFeed {
    pub fn new(config: &BinanceConfig) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            quote_asset: config.quote_asset.to_uppercase(),
        })
    }

    pub async fn price(&self, asset: &str) -> Result<Decimal> {
        let asset = asset.to_uppercase();
        if asset == self.quote_asset {
            return Ok(Decimal::ONE);
        }

        let symbol = format!("{asset}{}", self.quote_asset);
        let url = format!("{}/api/v3/ticker/price?symbol={symbol}", self.base_url);
        let ticker: TickerPrice = get_json(&self.client, &url)
            .await
            .with_context(|| format!("Failed to fetch price for {symbol}"))?;
        debug!(symbol = %ticker.symbol, price = %ticker.price, "Fetched ticker price");
        Ok(ticker.price)
    }
}

/// Prices a fixed list of holdings. Serves both the configured manual
/// balances and the generated demo portfolio.
pub struct HoldingsSource {
    name: String,
    feed: BinancePriceFeed,
    holdings: Vec<ManualBalance>,
}

impl HoldingsSource {
    /// Drops zero balances and excluded symbols, and orders the rest by asset.
    pub fn new(
        name: impl Into<String>,
        feed: BinancePriceFeed,
        holdings: Vec<ManualBalance>,
        excluded_symbols: &[String],
    ) -> Self {
        let mut holdings: Vec<ManualBalance> = holdings
            .into_iter()
            .filter(|h| h.available > Decimal::ZERO)
            .filter(|h| !excluded_symbols.iter().any(|s| s.eq_ignore_ascii_case(&h.asset)))
            .collect();
        holdings.sort_by(|a, b| a.asset.cmp(&b.asset));
        Self {
            name: name.into(),
            feed,
            holdings,
        }
    }

    pub fn holdings(&self) -> &[ManualBalance] {
        &self.holdings
    }
}

#[async_trait]
impl BalanceSource for HoldingsSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_balances(&self) -> Result<Vec<Balance>> {
        let balances = try_join_all(self.holdings.iter().map(|holding| async move {
            let price = self.feed.price(&holding.asset).await?;
            Ok::<_, anyhow::Error>(Balance::new(
                holding.asset.as_str(),
                holding.available,
                price,
                self.name.as_str(),
            ))
        }))
        .await?;

        let total = balances
            .iter()
            .fold(Decimal::ZERO, |acc, b| acc.saturating_add(b.value()));
        info!(
            source = %self.name,
            total_value = %total.round_dp(2),
            count = balances.len(),
            "Balances priced"
        );
        Ok(balances)
    }
}
