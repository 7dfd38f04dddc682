pub mod binance;
pub mod coingecko;
pub mod demo;
pub mod directus;
pub mod exchange_rate;
pub mod util;

pub use binance::{BinancePriceFeed, HoldingsSource};
pub use coingecko::CoinGeckoSource;
pub use directus::DirectusClient;
pub use exchange_rate::ExchangeRateProvider;

/// Source tag for balances listed in the config file.
pub const MANUAL_SOURCE: &str = "Manual";
