use super::Asset;
use fnv::FnvHashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-asset free balances in display-asset terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances(FnvHashMap<Asset, Decimal>);

impl Balances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Free balance of the provided asset, zero when the venue reported none.
    pub fn get(&self, asset: &Asset) -> Decimal {
        self.0.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn insert(&mut self, asset: Asset, quantity: Decimal) {
        self.0.insert(asset, quantity);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Asset, &Decimal)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge a REST snapshot with a WebSocket-fed cache snapshot.
    ///
    /// REST is authoritative except where it reports zero (or nothing) for an
    /// asset the cache holds a positive quantity for - the venue's REST
    /// balance lags its stream after recent fills.
    pub fn merged_with_cached(mut self, cached: &Balances) -> Balances {
        for (asset, cached_quantity) in cached.iter() {
            if *cached_quantity > Decimal::ZERO && self.get(asset).is_zero() {
                self.0.insert(asset.clone(), *cached_quantity);
            }
        }
        self
    }
}

impl FromIterator<(Asset, Decimal)> for Balances {
    fn from_iter<I: IntoIterator<Item = (Asset, Decimal)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Process-shared balance snapshot kept warm by an external WebSocket feed.
///
/// Readers never block writers for long: updates replace single entries under
/// a short write lock, reads clone the snapshot.
#[derive(Debug, Default)]
pub struct BalanceCache {
    inner: RwLock<Balances>,
}

impl BalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, asset: Asset, quantity: Decimal) {
        self.inner.write().insert(asset, quantity);
    }

    pub fn snapshot(&self) -> Balances {
        self.inner.read().clone()
    }
}
