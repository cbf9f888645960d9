use std::collections::BTreeMap;

use gridex_core::{MarketId, TimeSlot, TraderDetails};
use gridex_market::{fees::GridFeeParams, MarketStore};
use gridex_ports::{MarketError, MarketResult};
use uuid::Uuid;

use crate::agent::MarketAgent;
use crate::strategy::Strategy;
use crate::world::TradeStats;

/// Node of the simulated grid.
///
/// Inner areas own one spot market per open time slot; leaf areas hold
/// a strategy instead and trade in the market of their parent.
pub struct Area {
    pub name: String,
    pub uuid: Uuid,
    pub grid_fees: GridFeeParams,
    pub children: Vec<Area>,
    pub markets: AreaMarkets,
    pub(crate) strategy: Option<Box<dyn Strategy>>,
    pub(crate) agents: BTreeMap<TimeSlot, MarketAgent>,
    pub(crate) trader: TraderDetails,
}

impl Area {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let uuid = Uuid::new_v4();
        Self {
            trader: TraderDetails::new(name.clone(), uuid),
            name,
            uuid,
            grid_fees: GridFeeParams::default(),
            children: Vec::new(),
            markets: AreaMarkets::default(),
            strategy: None,
            agents: BTreeMap::new(),
        }
    }

    /// Leaf area holding a device strategy
    pub fn with_strategy(name: impl Into<String>, strategy: Box<dyn Strategy>) -> Self {
        let mut area = Self::new(name);
        area.strategy = Some(strategy);
        area
    }

    pub fn with_grid_fees(mut self, grid_fees: GridFeeParams) -> Self {
        self.grid_fees = grid_fees;
        self
    }

    pub fn add_child(mut self, child: Area) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.strategy.is_some()
    }

    pub(crate) fn validate(&self) -> MarketResult<()> {
        if self.is_leaf() && !self.children.is_empty() {
            return Err(MarketError::Config(format!(
                "area {} has both a strategy and children",
                self.name
            )));
        }
        for child in &self.children {
            child.validate()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Area {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Area")
            .field("name", &self.name)
            .field("children", &self.children.len())
            .field("leaf", &self.is_leaf())
            .finish()
    }
}

/// Market handles of one area, keyed by time slot
#[derive(Debug, Default)]
pub struct AreaMarkets {
    pub open: BTreeMap<TimeSlot, MarketId>,
    pub past: BTreeMap<TimeSlot, MarketId>,
}

impl AreaMarkets {
    pub fn market_for(&self, slot: TimeSlot) -> Option<MarketId> {
        self.open.get(&slot).copied()
    }

    /// Move expired slots into the past and freeze their books. Past
    /// markets beyond the configured retention are dropped from the
    /// store after their trade statistics are harvested; `None` keeps
    /// them all. Calling this twice with the same time is a no-op.
    pub fn rotate(
        &mut self,
        now: TimeSlot,
        store: &mut MarketStore,
        stats: &mut TradeStats,
        area_name: &str,
        keep_past_markets: Option<usize>,
    ) {
        let expired: Vec<TimeSlot> = self.open.range(..now).map(|(slot, _)| *slot).collect();
        for slot in expired {
            if let Some(id) = self.open.remove(&slot) {
                if let Some(market) = store.get_mut(id) {
                    market.set_readonly();
                    log::debug!("[{}] market {} rotated into the past", area_name, slot);
                }
                self.past.insert(slot, id);
            }
        }
        let Some(keep) = keep_past_markets else {
            return;
        };
        while self.past.len() > keep {
            let oldest = match self.past.keys().next().copied() {
                Some(slot) => slot,
                None => break,
            };
            if let Some(id) = self.past.remove(&oldest) {
                if let Some(market) = store.remove(id) {
                    stats.absorb(area_name, &market);
                }
            }
        }
    }
}
