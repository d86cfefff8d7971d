use crate::model::{Asset, ExchangePair, Symbol};
use fnv::FnvHashMap;
use rust_decimal::Decimal;
use std::sync::OnceLock;

/// Display symbol -> Kraken pair for every supported market.
///
/// Two cohorts: the legacy assets Kraken still names with X/Z prefixes, and
/// the plain cohort listed after that convention was dropped. Anything not in
/// this table is unsupported and must fail fast.
const PAIRS: &[(&str, &str)] = &[
    // X-prefixed legacy cohort
    ("BTC/USD", "XXBTZUSD"),
    ("ETH/USD", "XETHZUSD"),
    ("XRP/USD", "XXRPZUSD"),
    ("LTC/USD", "XLTCZUSD"),
    ("XLM/USD", "XXLMZUSD"),
    ("XMR/USD", "XXMRZUSD"),
    ("DOGE/USD", "XXDGZUSD"),
    ("ETC/USD", "XETCZUSD"),
    ("ZEC/USD", "XZECZUSD"),
    // Plain cohort
    ("BCH/USD", "BCHUSD"),
    ("SOL/USD", "SOLUSD"),
    ("ADA/USD", "ADAUSD"),
    ("DOT/USD", "DOTUSD"),
    ("MATIC/USD", "MATICUSD"),
    ("AVAX/USD", "AVAXUSD"),
    ("LINK/USD", "LINKUSD"),
    ("ATOM/USD", "ATOMUSD"),
    ("UNI/USD", "UNIUSD"),
    ("ALGO/USD", "ALGOUSD"),
    ("FIL/USD", "FILUSD"),
    ("AAVE/USD", "AAVEUSD"),
    ("TRX/USD", "TRXUSD"),
    ("NEAR/USD", "NEARUSD"),
    ("ARB/USD", "ARBUSD"),
    ("OP/USD", "OPUSD"),
    ("SUI/USD", "SUIUSD"),
    ("TIA/USD", "TIAUSD"),
    ("INJ/USD", "INJUSD"),
    ("PEPE/USD", "PEPEUSD"),
    ("SHIB/USD", "SHIBUSD"),
];

/// Kraken ledger asset code -> display asset, for balance normalisation.
const ASSET_CODES: &[(&str, &str)] = &[
    ("XXBT", "BTC"),
    ("XBT", "BTC"),
    ("XETH", "ETH"),
    ("XXRP", "XRP"),
    ("XLTC", "LTC"),
    ("XXLM", "XLM"),
    ("XXMR", "XMR"),
    ("XXDG", "DOGE"),
    ("XDG", "DOGE"),
    ("XETC", "ETC"),
    ("XZEC", "ZEC"),
    ("ZUSD", "USD"),
    ("ZEUR", "EUR"),
    ("ZGBP", "GBP"),
];

/// Venue minimum order volumes in base units, per display base asset.
const MIN_ORDER_SIZES: &[(&str, &str)] = &[
    ("BTC", "0.0001"),
    ("ETH", "0.002"),
    ("XRP", "2.5"),
    ("LTC", "0.06"),
    ("XLM", "20"),
    ("XMR", "0.03"),
    ("DOGE", "20"),
    ("ETC", "0.3"),
    ("ZEC", "0.15"),
    ("BCH", "0.02"),
    ("SOL", "0.035"),
    ("ADA", "15"),
    ("DOT", "1"),
    ("MATIC", "10"),
    ("AVAX", "0.3"),
    ("LINK", "0.5"),
    ("ATOM", "0.5"),
    ("UNI", "0.6"),
    ("ALGO", "25"),
    ("FIL", "1"),
    ("AAVE", "0.05"),
    ("TRX", "50"),
    ("NEAR", "2"),
    ("ARB", "4"),
    ("OP", "3"),
    ("SUI", "5"),
    ("TIA", "0.5"),
    ("INJ", "0.3"),
    ("PEPE", "500000"),
    ("SHIB", "500000"),
];

/// Volume decimal places accepted on order submission. Kraken accepts eight
/// for every listed spot asset except the micro-priced memecoins.
const VOLUME_DECIMALS_DEFAULT: u32 = 8;
const VOLUME_DECIMALS_OVERRIDES: &[(&str, u32)] = &[("PEPE", 0), ("SHIB", 0)];

fn pair_index() -> &'static FnvHashMap<&'static str, &'static str> {
    static INDEX: OnceLock<FnvHashMap<&'static str, &'static str>> = OnceLock::new();
    INDEX.get_or_init(|| PAIRS.iter().copied().collect())
}

fn base_index() -> &'static FnvHashMap<&'static str, &'static str> {
    static INDEX: OnceLock<FnvHashMap<&'static str, &'static str>> = OnceLock::new();
    INDEX.get_or_init(|| {
        PAIRS
            .iter()
            .map(|(display, pair)| {
                let (base, _) = display
                    .split_once('/')
                    .expect("static pair table entries are BASE/QUOTE");
                (*pair, base)
            })
            .collect()
    })
}

/// Venue pair for a display symbol. `None` when the market is unsupported.
pub fn exchange_pair(symbol: &Symbol) -> Option<ExchangePair> {
    pair_index()
        .get(symbol.to_string().as_str())
        .map(|pair| ExchangePair::new(pair))
}

/// Display base asset of a venue pair, eg/ `XXBTZUSD` -> `BTC`.
pub fn base_asset(pair: &ExchangePair) -> Option<Asset> {
    base_index().get(pair.as_str()).map(|base| Asset::new(base))
}

/// Normalise a Kraken ledger asset code into its display asset, eg/
/// `XXBT` -> `BTC`. Codes outside the legacy table pass through unchanged.
pub fn normalize_asset(code: &str) -> Asset {
    ASSET_CODES
        .iter()
        .find(|(kraken, _)| *kraken == code)
        .map(|(_, display)| Asset::new(display))
        .unwrap_or_else(|| Asset::new(code))
}

/// Volume decimal places accepted for the provided display asset.
pub fn volume_decimals(asset: &Asset) -> u32 {
    VOLUME_DECIMALS_OVERRIDES
        .iter()
        .find(|(name, _)| *name == asset.as_str())
        .map(|(_, decimals)| *decimals)
        .unwrap_or(VOLUME_DECIMALS_DEFAULT)
}

/// Venue minimum order volume for the provided pair, in base units.
pub fn min_order_size(pair: &ExchangePair) -> Decimal {
    base_asset(pair)
        .and_then(|base| {
            MIN_ORDER_SIZES
                .iter()
                .find(|(name, _)| *name == base.as_str())
                .map(|(_, min)| min.parse().expect("static minimum sizes are decimals"))
        })
        .unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_legacy_cohort_maps_to_x_prefixed_pairs() {
        let cases = [
            ("BTC/USD", "XXBTZUSD"),
            ("ETH/USD", "XETHZUSD"),
            ("XRP/USD", "XXRPZUSD"),
            ("DOGE/USD", "XXDGZUSD"),
            ("ZEC/USD", "XZECZUSD"),
        ];
        for (display, expected) in cases {
            let symbol: Symbol = display.parse().unwrap();
            assert_eq!(
                exchange_pair(&symbol).unwrap(),
                ExchangePair::new(expected),
                "{display}"
            );
        }
    }

    #[test]
    fn test_plain_cohort_maps_without_prefix() {
        for (display, expected) in [("SOL/USD", "SOLUSD"), ("ATOM/USD", "ATOMUSD")] {
            let symbol: Symbol = display.parse().unwrap();
            assert_eq!(exchange_pair(&symbol).unwrap(), ExchangePair::new(expected));
        }
    }

    #[test]
    fn test_unknown_symbol_is_unmapped() {
        let symbol = Symbol::new("FOO", "USD");
        assert_eq!(exchange_pair(&symbol), None);
    }

    #[test]
    fn test_base_asset_reverse_lookup() {
        assert_eq!(
            base_asset(&ExchangePair::new("XXBTZUSD")),
            Some(Asset::new("BTC"))
        );
        assert_eq!(
            base_asset(&ExchangePair::new("SOLUSD")),
            Some(Asset::new("SOL"))
        );
        assert_eq!(base_asset(&ExchangePair::new("FOOUSD")), None);
    }

    #[test]
    fn test_asset_code_normalisation() {
        assert_eq!(normalize_asset("XXBT"), Asset::new("BTC"));
        assert_eq!(normalize_asset("ZUSD"), Asset::new("USD"));
        assert_eq!(normalize_asset("SOL"), Asset::new("SOL"));
    }

    #[test]
    fn test_every_pair_has_a_minimum_size() {
        for (_, pair) in PAIRS {
            assert!(
                min_order_size(&ExchangePair::new(pair)) > Decimal::ZERO,
                "missing minimum for {pair}"
            );
        }
    }

    #[test]
    fn test_volume_decimals_defaults_to_eight() {
        assert_eq!(volume_decimals(&Asset::new("BTC")), 8);
        assert_eq!(volume_decimals(&Asset::new("PEPE")), 0);
    }

    #[test]
    fn test_btc_minimum_size() {
        assert_eq!(min_order_size(&ExchangePair::new("XXBTZUSD")), dec!(0.0001));
    }
}
