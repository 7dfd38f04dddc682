use crate::core::config::ManualBalance;
use rand::Rng;
use rust_decimal::Decimal;

pub const SOURCE_NAME: &str = "Demo";

const DEMO_COINS: [&str; 14] = [
    "BTC", "ETH", "BNB", "SOL", "AVAX", "DOGE", "XRP", "LINK", "ADA", "XLM", "TRX", "IO", "ETC",
    "SHIB",
];

/// Random holdings for the fixed demo coin list: up to 2 BTC, up to 100 of
/// anything else, four decimals.
pub fn demo_holdings<R: Rng + ?Sized>(rng: &mut R) -> Vec<ManualBalance> {
    DEMO_COINS
        .iter()
        .map(|coin| {
            let max = if *coin == "BTC" { 20_000 } else { 1_000_000 };
            ManualBalance {
                asset: coin.to_string(),
                available: Decimal::new(rng.gen_range(1..=max), 4),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rust_decimal_macros::dec;

    #[test]
    fn test_demo_holdings_cover_every_coin_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let holdings = demo_holdings(&mut rng);

        assert_eq!(holdings.len(), DEMO_COINS.len());
        for holding in &holdings {
            let max = if holding.asset == "BTC" { dec!(2) } else { dec!(100) };
            assert!(holding.available > Decimal::ZERO);
            assert!(holding.available <= max, "{} = {}", holding.asset, holding.available);
            assert!(holding.available.scale() <= 4);
        }
    }
}
