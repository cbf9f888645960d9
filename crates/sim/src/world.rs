use std::collections::{BTreeMap, HashMap};

use gridex_core::{
    Energy, MarketEvent, MarketId, MarketKind, Price, Rate, Tick, TimeSlot, Timestamp,
};
use gridex_market::{Market, MarketStore};
use gridex_matching::create_matching_algorithm;
use gridex_ports::{MarketError, MarketResult, MatchingAlgorithm};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::agent::MarketAgent;
use crate::area::Area;
use crate::config::SimulationConfig;
use crate::strategy::StrategyContext;

/// Aggregated trade figures over a set of markets
#[derive(Debug, Clone, Default)]
pub struct TradeStats {
    pub trade_count: u64,
    pub traded_energy: Energy,
    pub trade_volume: Price,
    pub grid_fees: Price,
    pub trades_per_area: HashMap<String, u64>,
}

impl TradeStats {
    pub(crate) fn absorb(&mut self, area_name: &str, market: &Market) {
        if market.trades().is_empty() {
            return;
        }
        for trade in market.trades() {
            self.trade_count += 1;
            self.traded_energy += trade.traded_energy;
            self.trade_volume += trade.trade_price;
        }
        self.grid_fees += market.market_fee();
        *self
            .trades_per_area
            .entry(area_name.to_string())
            .or_insert(0) += market.trades().len() as u64;
    }
}

/// The whole simulated grid: the area tree, the market arena, and the
/// clocking logic that advances them together.
pub struct World {
    root: Area,
    store: MarketStore,
    config: SimulationConfig,
    matcher: Box<dyn MatchingAlgorithm>,
    rng: StdRng,
    current_tick: Tick,
    current_slot: TimeSlot,
    activated: bool,
    stats: TradeStats,
}

impl World {
    pub fn new(root: Area, config: SimulationConfig) -> MarketResult<Self> {
        config.validate()?;
        root.validate()?;
        if root.is_leaf() {
            return Err(MarketError::Config(
                "the root area cannot be a device".to_string(),
            ));
        }
        Ok(Self {
            matcher: create_matching_algorithm(&config.matching_algorithm),
            rng: StdRng::seed_from_u64(config.seed),
            current_tick: 0,
            current_slot: config.start_time,
            activated: false,
            stats: TradeStats::default(),
            store: MarketStore::new(),
            root,
            config,
        })
    }

    pub fn root(&self) -> &Area {
        &self.root
    }

    pub fn store(&self) -> &MarketStore {
        &self.store
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    pub fn current_slot(&self) -> TimeSlot {
        self.current_slot
    }

    /// Rotate every area's markets at a slot boundary, open markets for
    /// the upcoming slots, refresh the agents, and let strategies place
    /// their orders for the new slot.
    pub fn market_cycle(&mut self, now: Timestamp) -> MarketResult<()> {
        self.current_slot = now;
        cycle_area(
            &mut self.root,
            None,
            now,
            &mut self.store,
            &self.config,
            &mut self.stats,
        )?;
        let rate = self.config.market_maker_rate_at(now);
        if !self.activated {
            // One-time setup pass, before the first slot's orders
            activate_strategies(&mut self.root, now, &mut self.store, self.current_tick, rate);
            self.activated = true;
        }
        cycle_strategies(&mut self.root, now, &mut self.store, self.current_tick, rate);
        dispatch_events(&mut self.root, &mut self.store);
        Ok(())
    }

    /// Advance one tick: strategies act, agents forward matured orders,
    /// two-sided markets clear, and all resulting events are routed to
    /// quiescence.
    pub fn tick(&mut self, now: Timestamp) -> MarketResult<()> {
        for id in self.store.ids() {
            if let Some(market) = self.store.get_mut(id) {
                market.set_now(now);
            }
        }
        let rate = self.config.market_maker_rate_at(self.current_slot);
        tick_strategies(
            &mut self.root,
            self.current_slot,
            &mut self.store,
            &mut self.rng,
            self.current_tick,
            rate,
        );
        tick_agents(
            &mut self.root,
            &mut self.store,
            &mut self.rng,
            self.current_tick,
        );
        dispatch_events(&mut self.root, &mut self.store);

        if self.config.market_kind == MarketKind::TwoSided
            && self.current_tick % self.config.clearing_interval_ticks == 0
        {
            self.clear_markets()?;
        }
        self.current_tick += 1;
        Ok(())
    }

    /// Run the matching algorithm over every open two-sided market until
    /// no further trades are possible.
    fn clear_markets(&mut self) -> MarketResult<()> {
        let mut ids = self.store.ids();
        ids.sort();
        for id in ids {
            loop {
                let view = match self.store.get(id) {
                    Some(market)
                        if market.kind == MarketKind::TwoSided && !market.is_readonly() =>
                    {
                        market.open_view()
                    }
                    _ => break,
                };
                let recommendations = self.matcher.get_matches_recommendations(&view);
                if recommendations.is_empty() {
                    break;
                }
                let performed = match self.store.get_mut(id) {
                    Some(market) => market.match_recommendations(recommendations)?,
                    None => break,
                };
                dispatch_events(&mut self.root, &mut self.store);
                if !performed {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Totals over the whole run so far: harvested past markets plus
    /// everything still live in the store.
    pub fn results(&self) -> TradeStats {
        let mut stats = self.stats.clone();
        collect_area_stats(&self.root, &self.store, &mut stats);
        stats
    }
}

fn cycle_area(
    area: &mut Area,
    parent_open: Option<&BTreeMap<TimeSlot, MarketId>>,
    now: Timestamp,
    store: &mut MarketStore,
    config: &SimulationConfig,
    stats: &mut TradeStats,
) -> MarketResult<()> {
    if area.is_leaf() {
        return Ok(());
    }
    area.markets
        .rotate(now, store, stats, &area.name, config.keep_past_markets);
    area.agents.retain(|slot, _| *slot >= now);

    for offset in 0..config.market_count {
        let slot = now + config.slot_length * offset as i32;
        if area.markets.open.contains_key(&slot) {
            continue;
        }
        let market = Market::new(area.name.clone(), config.market_kind, slot, &area.grid_fees)?;
        log::info!("[{}] opened market for slot {}", area.name, slot);
        let id = store.insert(market);
        area.markets.open.insert(slot, id);
    }

    if let Some(parent_open) = parent_open {
        for (slot, own_id) in area.markets.open.iter() {
            if area.agents.contains_key(slot) {
                continue;
            }
            if let Some(parent_id) = parent_open.get(slot) {
                area.agents.insert(
                    *slot,
                    MarketAgent::new(
                        area.name.clone(),
                        area.uuid,
                        *parent_id,
                        *own_id,
                        *slot,
                        config.min_offer_age,
                        config.min_bid_age,
                    ),
                );
            }
        }
    }

    let open = area.markets.open.clone();
    for child in area.children.iter_mut() {
        cycle_area(child, Some(&open), now, store, config, stats)?;
    }
    Ok(())
}

fn activate_strategies(
    area: &mut Area,
    slot: TimeSlot,
    store: &mut MarketStore,
    current_tick: Tick,
    market_maker_rate: Rate,
) {
    let market_id = area.markets.market_for(slot);
    for child in area.children.iter_mut() {
        match child.strategy.as_mut() {
            Some(strategy) => {
                if let Some(market) = market_id.and_then(|id| store.get_mut(id)) {
                    let mut ctx = StrategyContext {
                        market,
                        trader: &child.trader,
                        current_tick,
                        market_maker_rate,
                    };
                    strategy.on_activate(&mut ctx);
                }
            }
            None => activate_strategies(child, slot, store, current_tick, market_maker_rate),
        }
    }
}

fn cycle_strategies(
    area: &mut Area,
    slot: TimeSlot,
    store: &mut MarketStore,
    current_tick: Tick,
    market_maker_rate: Rate,
) {
    let market_id = area.markets.market_for(slot);
    for child in area.children.iter_mut() {
        match child.strategy.as_mut() {
            Some(strategy) => {
                if let Some(market) = market_id.and_then(|id| store.get_mut(id)) {
                    let mut ctx = StrategyContext {
                        market,
                        trader: &child.trader,
                        current_tick,
                        market_maker_rate,
                    };
                    strategy.on_market_cycle(&mut ctx);
                }
            }
            None => cycle_strategies(child, slot, store, current_tick, market_maker_rate),
        }
    }
}

fn tick_strategies(
    area: &mut Area,
    slot: TimeSlot,
    store: &mut MarketStore,
    rng: &mut StdRng,
    current_tick: Tick,
    market_maker_rate: Rate,
) {
    let market_id = area.markets.market_for(slot);
    // Fairness: no child acts first every tick
    let mut order: Vec<usize> = (0..area.children.len()).collect();
    order.shuffle(rng);
    for index in order {
        let child = &mut area.children[index];
        match child.strategy.as_mut() {
            Some(strategy) => {
                if let Some(market) = market_id.and_then(|id| store.get_mut(id)) {
                    let mut ctx = StrategyContext {
                        market,
                        trader: &child.trader,
                        current_tick,
                        market_maker_rate,
                    };
                    strategy.on_tick(&mut ctx);
                }
            }
            None => tick_strategies(child, slot, store, rng, current_tick, market_maker_rate),
        }
    }
}

fn tick_agents(area: &mut Area, store: &mut MarketStore, rng: &mut StdRng, current_tick: Tick) {
    for agent in area.agents.values_mut() {
        agent.tick(current_tick, store);
    }
    let mut order: Vec<usize> = (0..area.children.len()).collect();
    order.shuffle(rng);
    for index in order {
        tick_agents(&mut area.children[index], store, rng, current_tick);
    }
}

/// Drain queued market events and route them through the tree until no
/// market has any left. Routed events may queue new ones (bridged
/// trades, mirrored splits), hence the loop.
fn dispatch_events(root: &mut Area, store: &mut MarketStore) {
    loop {
        let batches = store.drain_all_events();
        if batches.is_empty() {
            break;
        }
        for (market_id, events) in batches {
            for event in events {
                route_event_to_agents(root, market_id, &event, store);
                route_event_to_strategies(root, market_id, &event);
            }
        }
    }
}

fn route_event_to_agents(
    area: &mut Area,
    market_id: MarketId,
    event: &MarketEvent,
    store: &mut MarketStore,
) {
    for agent in area.agents.values_mut() {
        agent.handle_market_event(market_id, event, store);
    }
    for child in area.children.iter_mut() {
        route_event_to_agents(child, market_id, event, store);
    }
}

fn route_event_to_strategies(area: &mut Area, market_id: MarketId, event: &MarketEvent) {
    let trade = match event {
        MarketEvent::OfferTraded { trade } | MarketEvent::BidTraded { trade } => trade,
        _ => return,
    };
    let owns_market = area.markets.open.values().any(|id| *id == market_id)
        || area.markets.past.values().any(|id| *id == market_id);
    if owns_market {
        for child in area.children.iter_mut() {
            if trade.seller.origin_uuid == child.uuid || trade.buyer.origin_uuid == child.uuid {
                if let Some(strategy) = child.strategy.as_mut() {
                    strategy.on_trade(trade);
                }
            }
        }
        return;
    }
    for child in area.children.iter_mut() {
        route_event_to_strategies(child, market_id, event);
    }
}

fn collect_area_stats(area: &Area, store: &MarketStore, stats: &mut TradeStats) {
    for id in area.markets.open.values().chain(area.markets.past.values()) {
        if let Some(market) = store.get(*id) {
            stats.absorb(&area.name, market);
        }
    }
    for child in &area.children {
        collect_area_stats(child, store, stats);
    }
}
