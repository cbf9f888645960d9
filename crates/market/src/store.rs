use std::collections::HashMap;

use gridex_core::{MarketEvent, MarketId};

use crate::Market;

/// Arena owning every market of a simulation.
///
/// Areas and agents keep `MarketId` handles only; all mutation goes
/// through the store, which keeps borrows short and localized.
#[derive(Debug, Default)]
pub struct MarketStore {
    markets: HashMap<MarketId, Market>,
}

impl MarketStore {
    pub fn new() -> Self {
        Self {
            markets: HashMap::new(),
        }
    }

    pub fn insert(&mut self, market: Market) -> MarketId {
        let id = market.id;
        self.markets.insert(id, market);
        id
    }

    pub fn get(&self, id: MarketId) -> Option<&Market> {
        self.markets.get(&id)
    }

    pub fn get_mut(&mut self, id: MarketId) -> Option<&mut Market> {
        self.markets.get_mut(&id)
    }

    pub fn remove(&mut self, id: MarketId) -> Option<Market> {
        self.markets.remove(&id)
    }

    pub fn ids(&self) -> Vec<MarketId> {
        self.markets.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    /// Drain the pending events of every market. Only markets that had
    /// events queued appear in the result.
    pub fn drain_all_events(&mut self) -> Vec<(MarketId, Vec<MarketEvent>)> {
        let mut drained = Vec::new();
        for (id, market) in self.markets.iter_mut() {
            let events = market.drain_events();
            if !events.is_empty() {
                drained.push((*id, events));
            }
        }
        // Stable order keeps simulations reproducible
        drained.sort_by_key(|(id, _)| *id);
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::GridFeeParams;
    use crate::OfferParams;
    use chrono::Utc;
    use gridex_core::{MarketKind, TraderDetails};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn insert_and_lookup_round_trip() {
        let mut store = MarketStore::new();
        let market = Market::new(
            "house",
            MarketKind::TwoSided,
            Utc::now(),
            &GridFeeParams::default(),
        )
        .unwrap();
        let id = store.insert(market);
        assert!(store.get(id).is_some());
        assert_eq!(store.len(), 1);
        assert!(store.remove(id).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn drain_all_events_empties_queues() {
        let mut store = MarketStore::new();
        let market = Market::new(
            "house",
            MarketKind::TwoSided,
            Utc::now(),
            &GridFeeParams::default(),
        )
        .unwrap();
        let id = store.insert(market);
        store
            .get_mut(id)
            .unwrap()
            .offer(OfferParams::new(
                dec!(10),
                dec!(1),
                TraderDetails::new("pv", Uuid::new_v4()),
            ))
            .unwrap();
        let drained = store.drain_all_events();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, id);
        assert_eq!(drained[0].1.len(), 1);
        assert!(store.drain_all_events().is_empty());
    }
}
