use std::collections::{HashMap, HashSet};

use gridex_core::{
    Bid, MarketEvent, MarketId, MarketKind, Offer, Requirement, Tick, TimeSlot, Trade,
    TradeBidOfferInfo, TradedOrder, TraderDetails, RATE_TOLERANCE,
};
use gridex_market::{AcceptBid, AcceptOffer, BidParams, MarketStore, OfferParams};
use gridex_ports::MarketError;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Source/target pair of a forwarded order. The same link is indexed
/// under both ids so lookups work from either side.
#[derive(Debug, Clone)]
struct OfferLink {
    source: Offer,
    target: Offer,
}

#[derive(Debug, Clone)]
struct BidLink {
    source: Bid,
    target: Bid,
}

/// Shared lookups an engine needs from its owning agent
struct EngineContext<'a> {
    owner_name: &'a str,
    owner_uuid: Uuid,
    /// Orders posted by either of the owner's engines; never reforwarded
    agent_offers: &'a HashSet<Uuid>,
    agent_bids: &'a HashSet<Uuid>,
}

/// One direction of an agent: watches the source market and mirrors its
/// orders into the target market, bridging trades back.
struct Engine {
    label: &'static str,
    source: MarketId,
    target: MarketId,
    min_offer_age: Tick,
    min_bid_age: Tick,
    current_tick: Tick,
    offer_age: HashMap<Uuid, Tick>,
    bid_age: HashMap<Uuid, Tick>,
    forwarded_offers: HashMap<Uuid, OfferLink>,
    forwarded_bids: HashMap<Uuid, BidLink>,
}

impl Engine {
    fn new(
        label: &'static str,
        source: MarketId,
        target: MarketId,
        min_offer_age: Tick,
        min_bid_age: Tick,
    ) -> Self {
        Self {
            label,
            source,
            target,
            min_offer_age,
            min_bid_age,
            current_tick: 0,
            offer_age: HashMap::new(),
            bid_age: HashMap::new(),
            forwarded_offers: HashMap::new(),
            forwarded_bids: HashMap::new(),
        }
    }

    fn forwarded_order_ids(&self) -> (Vec<Uuid>, Vec<Uuid>) {
        (
            self.forwarded_offers.keys().copied().collect(),
            self.forwarded_bids.keys().copied().collect(),
        )
    }

    fn link_offers(&mut self, source: Offer, target: Offer) {
        let link = OfferLink { source, target };
        self.forwarded_offers.insert(link.source.id, link.clone());
        self.forwarded_offers.insert(link.target.id, link);
    }

    fn unlink_offers(&mut self, link: &OfferLink) {
        self.forwarded_offers.remove(&link.source.id);
        self.forwarded_offers.remove(&link.target.id);
        self.offer_age.remove(&link.source.id);
        self.offer_age.remove(&link.target.id);
    }

    fn link_bids(&mut self, source: Bid, target: Bid) {
        let link = BidLink { source, target };
        self.forwarded_bids.insert(link.source.id, link.clone());
        self.forwarded_bids.insert(link.target.id, link);
    }

    fn unlink_bids(&mut self, link: &BidLink) {
        self.forwarded_bids.remove(&link.source.id);
        self.forwarded_bids.remove(&link.target.id);
        self.bid_age.remove(&link.source.id);
        self.bid_age.remove(&link.target.id);
    }

    fn tick(&mut self, current_tick: Tick, store: &mut MarketStore, ctx: &EngineContext) {
        self.current_tick = current_tick;
        self.propagate_offers(store, ctx);
        let two_sided = store
            .get(self.target)
            .map(|market| market.kind == MarketKind::TwoSided)
            .unwrap_or(false);
        if two_sided {
            self.propagate_bids(store, ctx);
        }
    }

    fn propagate_offers(&mut self, store: &mut MarketStore, ctx: &EngineContext) {
        if let Some(source) = store.get(self.source) {
            for offer_id in source.offers().keys() {
                self.offer_age.entry(*offer_id).or_insert(self.current_tick);
            }
        }

        let watched: Vec<(Uuid, Tick)> = self.offer_age.iter().map(|(id, age)| (*id, *age)).collect();
        for (offer_id, age) in watched {
            if self.forwarded_offers.contains_key(&offer_id) {
                continue;
            }
            if self.current_tick - age < self.min_offer_age {
                continue;
            }
            let offer = match store.get(self.source).and_then(|m| m.offers().get(&offer_id)) {
                Some(offer) => offer.clone(),
                None => {
                    // Offer left the book before maturing
                    self.offer_age.remove(&offer_id);
                    continue;
                }
            };
            if ctx.agent_offers.contains(&offer_id) || ctx.owner_name == offer.seller.name {
                self.offer_age.remove(&offer_id);
                continue;
            }
            self.forward_offer(&offer, store, ctx);
        }
    }

    fn propagate_bids(&mut self, store: &mut MarketStore, ctx: &EngineContext) {
        if let Some(source) = store.get(self.source) {
            for bid_id in source.bids().keys() {
                self.bid_age.entry(*bid_id).or_insert(self.current_tick);
            }
        }

        let watched: Vec<(Uuid, Tick)> = self.bid_age.iter().map(|(id, age)| (*id, *age)).collect();
        for (bid_id, age) in watched {
            if self.forwarded_bids.contains_key(&bid_id) {
                continue;
            }
            if self.current_tick - age < self.min_bid_age {
                continue;
            }
            let bid = match store.get(self.source).and_then(|m| m.bids().get(&bid_id)) {
                Some(bid) => bid.clone(),
                None => {
                    self.bid_age.remove(&bid_id);
                    continue;
                }
            };
            if ctx.agent_bids.contains(&bid_id) || ctx.owner_name == bid.buyer.name {
                self.bid_age.remove(&bid_id);
                continue;
            }
            self.forward_bid(&bid, store, ctx);
        }
    }

    /// Repost a source offer into the target market. The target market
    /// folds its own grid fee in while booking the offer.
    fn forward_offer(
        &mut self,
        offer: &Offer,
        store: &mut MarketStore,
        ctx: &EngineContext,
    ) -> Option<Offer> {
        if offer.price < -RATE_TOLERANCE {
            log::debug!("[{}] offer {} not forwarded, price < 0", self.label, offer.id);
            return None;
        }
        let forwarded_rate = store
            .get(self.target)?
            .fee()
            .update_forwarded_offer_rate(offer.energy_rate(), offer.original_rate());
        let requirements = self.forwarded_offer_requirements(offer, store);

        let params = OfferParams {
            price: forwarded_rate * offer.energy,
            energy: offer.energy,
            seller: TraderDetails::relayed(ctx.owner_name, ctx.owner_uuid, &offer.seller),
            offer_id: None,
            original_price: Some(offer.original_price),
            adapt_price_with_fees: true,
            add_to_history: true,
            dispatch_event: true,
            attributes: offer.attributes.clone(),
            requirements,
            time_slot: Some(offer.time_slot),
        };
        match store.get_mut(self.target)?.offer(params) {
            Ok(forwarded) => {
                log::debug!(
                    "[{}] forwarded offer {} as {}",
                    self.label,
                    offer.id,
                    forwarded.id
                );
                self.link_offers(offer.clone(), forwarded.clone());
                Some(forwarded)
            }
            Err(err) => {
                log::debug!("[{}] offer {} not forwarded: {}", self.label, offer.id, err);
                None
            }
        }
    }

    /// Repost a source bid into the target market. Bids shed the source
    /// market's grid fee on each hop instead of gaining it.
    fn forward_bid(
        &mut self,
        bid: &Bid,
        store: &mut MarketStore,
        ctx: &EngineContext,
    ) -> Option<Bid> {
        let target_name = store.get(self.target)?.name.clone();
        if bid.buyer.name == target_name {
            return None;
        }
        if bid.price < -RATE_TOLERANCE {
            log::debug!("[{}] bid {} not forwarded, price < 0", self.label, bid.id);
            return None;
        }
        let forwarded_rate = store
            .get(self.source)?
            .fee()
            .update_forwarded_bid_rate(bid.energy_rate(), bid.original_rate());
        let requirements = self.forwarded_bid_requirements(bid, store);

        let params = BidParams {
            price: forwarded_rate * bid.energy,
            energy: bid.energy,
            buyer: TraderDetails::relayed(ctx.owner_name, ctx.owner_uuid, &bid.buyer),
            bid_id: None,
            original_price: Some(bid.original_price),
            adapt_price_with_fees: true,
            add_to_history: true,
            dispatch_event: true,
            attributes: bid.attributes.clone(),
            requirements,
            time_slot: Some(bid.time_slot),
        };
        match store.get_mut(self.target)?.bid(params) {
            Ok(forwarded) => {
                log::debug!(
                    "[{}] forwarded bid {} as {}",
                    self.label,
                    bid.id,
                    forwarded.id
                );
                self.link_bids(bid.clone(), forwarded.clone());
                Some(forwarded)
            }
            Err(err) => {
                log::debug!("[{}] bid {} not forwarded: {}", self.label, bid.id, err);
                None
            }
        }
    }

    /// Price requirements travel with the order, so they gain the same
    /// fee treatment as the posted price.
    fn forwarded_offer_requirements(
        &self,
        offer: &Offer,
        store: &MarketStore,
    ) -> Vec<Requirement> {
        let Some(target) = store.get(self.target) else {
            return offer.requirements.clone();
        };
        offer
            .requirements
            .iter()
            .map(|requirement| match requirement {
                Requirement::Price(rate) => {
                    let original_rate = *rate + offer.accumulated_grid_fees() / offer.energy;
                    Requirement::Price(
                        target.fee().update_forwarded_offer_rate(*rate, original_rate),
                    )
                }
                other => other.clone(),
            })
            .collect()
    }

    fn forwarded_bid_requirements(&self, bid: &Bid, store: &MarketStore) -> Vec<Requirement> {
        let Some(source) = store.get(self.source) else {
            return bid.requirements.clone();
        };
        bid.requirements
            .iter()
            .map(|requirement| match requirement {
                Requirement::Price(rate) => {
                    let original_rate = *rate + bid.accumulated_grid_fees() / bid.energy;
                    Requirement::Price(
                        source.fee().update_forwarded_bid_rate(*rate, original_rate),
                    )
                }
                other => other.clone(),
            })
            .collect()
    }

    fn handle_event(
        &mut self,
        market_id: MarketId,
        event: &MarketEvent,
        store: &mut MarketStore,
        ctx: &EngineContext,
    ) {
        if market_id != self.source && market_id != self.target {
            return;
        }
        match event {
            MarketEvent::OfferTraded { trade } => self.on_offer_traded(trade, store, ctx),
            MarketEvent::OfferDeleted { offer } => self.on_offer_deleted(offer, store),
            MarketEvent::OfferSplit {
                original,
                accepted,
                residual,
            } => self.on_offer_split(market_id, original, accepted, residual, store, ctx),
            MarketEvent::BidTraded { trade } => self.on_bid_traded(trade, store, ctx),
            MarketEvent::BidDeleted { bid } => self.on_bid_deleted(bid, store),
            MarketEvent::BidSplit {
                original,
                accepted,
                residual,
            } => self.on_bid_split(market_id, original, accepted, residual, store, ctx),
            MarketEvent::Offer { .. } | MarketEvent::Bid { .. } => {}
        }
    }

    fn on_offer_traded(&mut self, trade: &Trade, store: &mut MarketStore, ctx: &EngineContext) {
        let offer_id = trade.traded.id();
        let Some(link) = self.forwarded_offers.get(&offer_id).cloned() else {
            return;
        };

        if offer_id == link.target.id {
            // The mirror sold in the target market; buy the original in
            // the source market on behalf of the taker.
            let updated_info = match store.get(self.source) {
                Some(source) => {
                    let mut updated = trade.offer_bid_trade_info.as_ref().map(|info| {
                        source
                            .fee()
                            .update_forwarded_offer_trade_original_info(info, &link.source)
                    });
                    if source.kind == MarketKind::OneSided {
                        // The trade price in the target market still carries
                        // that market's fee share; strip it for the hop down.
                        let trade_offer_rate =
                            trade.trade_rate() - trade.fee_price / trade.traded_energy;
                        let base = updated.unwrap_or(TradeBidOfferInfo {
                            original_bid_rate: None,
                            propagated_bid_rate: None,
                            original_offer_rate: link.source.original_rate(),
                            propagated_offer_rate: link.source.energy_rate(),
                            trade_rate: Decimal::ZERO,
                        });
                        updated = Some(TradeBidOfferInfo {
                            trade_rate: trade_offer_rate,
                            ..base
                        });
                    }
                    updated
                }
                None => return,
            };

            let buyer = TraderDetails::relayed(ctx.owner_name, ctx.owner_uuid, &trade.buyer);
            let mut accept =
                AcceptOffer::new(link.source.id, buyer).with_energy(trade.traded_energy);
            if let Some(info) = updated_info {
                accept = accept.with_trade_bid_info(info);
            }
            if let Some(market) = store.get_mut(self.source) {
                if let Err(err) = market.accept_offer(accept) {
                    log::warn!(
                        "[{}] could not bridge offer trade to the source market: {}",
                        self.label,
                        err
                    );
                }
            }
            self.unlink_offers(&link);
        } else if offer_id == link.source.id {
            // The original sold locally; withdraw the mirror.
            if let Some(market) = store.get_mut(self.target) {
                match market.delete_offer(link.target.id) {
                    Ok(_) | Err(MarketError::OfferNotFound(_)) => {}
                    Err(err) => {
                        log::debug!("[{}] could not withdraw mirror offer: {}", self.label, err)
                    }
                }
            }
            self.unlink_offers(&link);
            if let Some(TradedOrder::Offer(residual)) = &trade.residual {
                if !self.forwarded_offers.contains_key(&residual.id) {
                    self.forward_offer(residual, store, ctx);
                }
            }
        }
    }

    fn on_offer_deleted(&mut self, offer: &Offer, store: &mut MarketStore) {
        self.offer_age.remove(&offer.id);
        let Some(link) = self.forwarded_offers.get(&offer.id).cloned() else {
            return;
        };
        if link.source.id == offer.id {
            if let Some(market) = store.get_mut(self.target) {
                match market.delete_offer(link.target.id) {
                    Ok(_) | Err(MarketError::OfferNotFound(_)) => {}
                    Err(err) => {
                        log::debug!("[{}] could not withdraw mirror offer: {}", self.label, err)
                    }
                }
            }
        }
        self.unlink_offers(&link);
    }

    fn on_offer_split(
        &mut self,
        market_id: MarketId,
        original: &Offer,
        accepted: &Offer,
        residual: &Offer,
        store: &mut MarketStore,
        ctx: &EngineContext,
    ) {
        let Some(link) = self.forwarded_offers.get(&original.id).cloned() else {
            return;
        };

        if market_id == self.target {
            // The counterpart may already match if this engine itself
            // initiated the split; nothing left to mirror then.
            if link.source.energy <= accepted.energy {
                return;
            }
            let local = link.source.clone();
            let split = store
                .get_mut(self.source)
                .map(|m| m.split_offer(local.id, accepted.energy, local.original_price));
            match split {
                Some(Ok((local_accepted, local_residual))) => {
                    if let Some(age) = self.offer_age.remove(&local.id) {
                        self.offer_age.insert(local_residual.id, age);
                    }
                    self.link_offers(local_residual, residual.clone());
                    self.link_offers(local_accepted, accepted.clone());
                }
                Some(Err(err)) => {
                    log::warn!("[{}] could not mirror offer split: {}", self.label, err)
                }
                None => {}
            }
        } else if market_id == self.source {
            if ctx.agent_offers.contains(&accepted.id) || ctx.owner_name == accepted.seller.name {
                return;
            }
            if link.target.energy <= accepted.energy {
                return;
            }
            let mirror = link.target.clone();
            let split = store
                .get_mut(self.target)
                .map(|m| m.split_offer(mirror.id, accepted.energy, mirror.original_price));
            match split {
                Some(Ok((mirror_accepted, mirror_residual))) => {
                    if let Some(age) = self.offer_age.remove(&original.id) {
                        self.offer_age.insert(residual.id, age);
                    }
                    self.link_offers(residual.clone(), mirror_residual);
                    self.link_offers(accepted.clone(), mirror_accepted);
                }
                Some(Err(err)) => {
                    log::warn!("[{}] could not mirror offer split: {}", self.label, err)
                }
                None => {}
            }
        }
    }

    fn on_bid_traded(&mut self, trade: &Trade, store: &mut MarketStore, ctx: &EngineContext) {
        let bid_id = trade.traded.id();
        let Some(link) = self.forwarded_bids.get(&bid_id).cloned() else {
            return;
        };

        if bid_id == link.target.id {
            // The mirror bid settled in the target market; settle the
            // original in the source market.
            let trade_offer_info = match store.get(self.source) {
                Some(source) => {
                    let market_bid = match source.bids().get(&link.source.id) {
                        Some(bid) => bid.clone(),
                        None => return,
                    };
                    match trade.offer_bid_trade_info.as_ref() {
                        Some(info) => {
                            // Fold the source market's fee back in; it was
                            // skipped when the mirror bid was settled.
                            let updated = source
                                .fee()
                                .propagate_original_offer_info_on_bid_trade(info, false);
                            source
                                .fee()
                                .update_forwarded_bid_trade_original_info(&updated, &market_bid)
                        }
                        None => {
                            log::warn!(
                                "[{}] bid trade without trade info cannot be bridged",
                                self.label
                            );
                            return;
                        }
                    }
                }
                None => return,
            };

            let seller = TraderDetails::relayed(ctx.owner_name, ctx.owner_uuid, &trade.seller);
            let accept = AcceptBid::new(link.source.id, seller, trade_offer_info)
                .with_energy(trade.traded_energy);
            if let Some(market) = store.get_mut(self.source) {
                if let Err(err) = market.accept_bid(accept) {
                    log::warn!(
                        "[{}] could not bridge bid trade to the source market: {}",
                        self.label,
                        err
                    );
                }
            }
            self.withdraw_mirror_bid(&link, store);
        } else if bid_id == link.source.id {
            // The original settled locally; withdraw the mirror.
            self.withdraw_mirror_bid(&link, store);
            if let Some(TradedOrder::Bid(residual)) = &trade.residual {
                if !self.forwarded_bids.contains_key(&residual.id) {
                    self.forward_bid(residual, store, ctx);
                }
            }
        }
    }

    fn withdraw_mirror_bid(&mut self, link: &BidLink, store: &mut MarketStore) {
        if let Some(market) = store.get_mut(self.target) {
            match market.delete_bid(link.target.id) {
                Ok(_) | Err(MarketError::BidNotFound(_)) => {}
                Err(err) => log::debug!("[{}] could not withdraw mirror bid: {}", self.label, err),
            }
        }
        self.unlink_bids(link);
    }

    fn on_bid_deleted(&mut self, bid: &Bid, store: &mut MarketStore) {
        self.bid_age.remove(&bid.id);
        let Some(link) = self.forwarded_bids.get(&bid.id).cloned() else {
            return;
        };
        if link.source.id == bid.id {
            self.withdraw_mirror_bid(&link, store);
        } else {
            self.unlink_bids(&link);
        }
    }

    fn on_bid_split(
        &mut self,
        market_id: MarketId,
        original: &Bid,
        accepted: &Bid,
        residual: &Bid,
        store: &mut MarketStore,
        ctx: &EngineContext,
    ) {
        let Some(link) = self.forwarded_bids.get(&original.id).cloned() else {
            return;
        };

        if market_id == self.target {
            if link.source.energy <= accepted.energy {
                return;
            }
            let local = link.source.clone();
            let split = store
                .get_mut(self.source)
                .map(|m| m.split_bid(local.id, accepted.energy, local.original_price));
            match split {
                Some(Ok((local_accepted, local_residual))) => {
                    let age = self.bid_age.remove(&local.id).unwrap_or(self.current_tick);
                    self.bid_age.insert(local_residual.id, age);
                    self.link_bids(local_residual, residual.clone());
                    self.link_bids(local_accepted, accepted.clone());
                }
                Some(Err(err)) => {
                    log::warn!("[{}] could not mirror bid split: {}", self.label, err)
                }
                None => {}
            }
        } else if market_id == self.source {
            if ctx.agent_bids.contains(&accepted.id) {
                return;
            }
            if link.target.energy <= accepted.energy {
                return;
            }
            let mirror = link.target.clone();
            let split = store
                .get_mut(self.target)
                .map(|m| m.split_bid(mirror.id, accepted.energy, mirror.original_price));
            match split {
                Some(Ok((mirror_accepted, mirror_residual))) => {
                    let age = self
                        .bid_age
                        .remove(&original.id)
                        .unwrap_or(self.current_tick);
                    self.bid_age.insert(residual.id, age);
                    self.link_bids(residual.clone(), mirror_residual);
                    self.link_bids(accepted.clone(), mirror_accepted);
                }
                Some(Err(err)) => {
                    log::warn!("[{}] could not mirror bid split: {}", self.label, err)
                }
                None => {}
            }
        }
    }
}

/// Connects an area's market with its parent's market for one time
/// slot, forwarding orders both ways and bridging the trades back.
pub struct MarketAgent {
    pub name: String,
    pub uuid: Uuid,
    pub time_slot: TimeSlot,
    engines: [Engine; 2],
}

impl MarketAgent {
    pub fn new(
        name: impl Into<String>,
        uuid: Uuid,
        higher: MarketId,
        lower: MarketId,
        time_slot: TimeSlot,
        min_offer_age: Tick,
        min_bid_age: Tick,
    ) -> Self {
        Self {
            name: name.into(),
            uuid,
            time_slot,
            engines: [
                Engine::new("high->low", higher, lower, min_offer_age, min_bid_age),
                Engine::new("low->high", lower, higher, min_offer_age, min_bid_age),
            ],
        }
    }

    /// Ids of every order either engine has posted or is tracking; such
    /// orders must never be forwarded again.
    fn agent_order_ids(&self) -> (HashSet<Uuid>, HashSet<Uuid>) {
        let mut offers = HashSet::new();
        let mut bids = HashSet::new();
        for engine in &self.engines {
            let (engine_offers, engine_bids) = engine.forwarded_order_ids();
            offers.extend(engine_offers);
            bids.extend(engine_bids);
        }
        (offers, bids)
    }

    pub fn tick(&mut self, current_tick: Tick, store: &mut MarketStore) {
        let (agent_offers, agent_bids) = self.agent_order_ids();
        for engine in self.engines.iter_mut() {
            let ctx = EngineContext {
                owner_name: &self.name,
                owner_uuid: self.uuid,
                agent_offers: &agent_offers,
                agent_bids: &agent_bids,
            };
            engine.tick(current_tick, store, &ctx);
        }
    }

    pub fn handle_market_event(
        &mut self,
        market_id: MarketId,
        event: &MarketEvent,
        store: &mut MarketStore,
    ) {
        let (agent_offers, agent_bids) = self.agent_order_ids();
        for engine in self.engines.iter_mut() {
            let ctx = EngineContext {
                owner_name: &self.name,
                owner_uuid: self.uuid,
                agent_offers: &agent_offers,
                agent_bids: &agent_bids,
            };
            engine.handle_event(market_id, event, store, &ctx);
        }
    }
}

impl std::fmt::Debug for MarketAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketAgent")
            .field("name", &self.name)
            .field("time_slot", &self.time_slot)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gridex_market::fees::GridFeeParams;
    use gridex_market::Market;
    use rust_decimal_macros::dec;

    fn setup(kind: MarketKind, fees: GridFeeParams) -> (MarketStore, MarketId, MarketId) {
        let slot = Utc::now();
        let mut store = MarketStore::new();
        let higher = store.insert(Market::new("community", kind, slot, &fees).unwrap());
        let lower = store.insert(Market::new("house", kind, slot, &GridFeeParams::default()).unwrap());
        (store, higher, lower)
    }

    fn drain_to_quiescence(agent: &mut MarketAgent, store: &mut MarketStore) {
        loop {
            let batches = store.drain_all_events();
            if batches.is_empty() {
                break;
            }
            for (market_id, events) in batches {
                for event in events {
                    agent.handle_market_event(market_id, &event, store);
                }
            }
        }
    }

    #[test]
    fn matured_offer_is_forwarded_upward() {
        let (mut store, higher, lower) = setup(MarketKind::OneSided, GridFeeParams::default());
        let slot = store.get(lower).unwrap().time_slot;
        let mut agent = MarketAgent::new("house", Uuid::new_v4(), higher, lower, slot, 2, 2);
        store
            .get_mut(lower)
            .unwrap()
            .offer(OfferParams::new(
                dec!(10),
                dec!(1),
                TraderDetails::new("pv", Uuid::new_v4()),
            ))
            .unwrap();

        agent.tick(0, &mut store);
        assert!(store.get(higher).unwrap().offers().is_empty());
        agent.tick(2, &mut store);
        let mirrored = store.get(higher).unwrap().offers();
        assert_eq!(mirrored.len(), 1);
        let mirror = mirrored.values().next().unwrap();
        assert_eq!(mirror.seller.name, "house");
        assert_eq!(mirror.seller.origin, "pv");
        assert_eq!(mirror.energy_rate(), dec!(10));
    }

    #[test]
    fn mirrored_offer_is_not_forwarded_back() {
        let (mut store, higher, lower) = setup(MarketKind::OneSided, GridFeeParams::default());
        let slot = store.get(lower).unwrap().time_slot;
        let mut agent = MarketAgent::new("house", Uuid::new_v4(), higher, lower, slot, 0, 0);
        store
            .get_mut(lower)
            .unwrap()
            .offer(OfferParams::new(
                dec!(10),
                dec!(1),
                TraderDetails::new("pv", Uuid::new_v4()),
            ))
            .unwrap();

        agent.tick(0, &mut store);
        agent.tick(1, &mut store);
        agent.tick(2, &mut store);
        assert_eq!(store.get(higher).unwrap().offers().len(), 1);
        assert_eq!(store.get(lower).unwrap().offers().len(), 1);
    }

    #[test]
    fn trade_in_parent_market_is_bridged_to_the_source() {
        let (mut store, higher, lower) = setup(MarketKind::OneSided, GridFeeParams::default());
        let slot = store.get(lower).unwrap().time_slot;
        let mut agent = MarketAgent::new("house", Uuid::new_v4(), higher, lower, slot, 0, 0);
        store
            .get_mut(lower)
            .unwrap()
            .offer(OfferParams::new(
                dec!(10),
                dec!(1),
                TraderDetails::new("pv", Uuid::new_v4()),
            ))
            .unwrap();
        agent.tick(0, &mut store);
        store.drain_all_events();

        let mirror_id = *store.get(higher).unwrap().offers().keys().next().unwrap();
        store
            .get_mut(higher)
            .unwrap()
            .accept_offer(AcceptOffer::new(
                mirror_id,
                TraderDetails::new("load", Uuid::new_v4()),
            ))
            .unwrap();
        drain_to_quiescence(&mut agent, &mut store);

        let source = store.get(lower).unwrap();
        assert!(source.offers().is_empty());
        assert_eq!(source.trades().len(), 1);
        assert_eq!(source.trades()[0].seller.name, "pv");
        assert_eq!(source.trades()[0].buyer.name, "house");
        assert_eq!(source.trades()[0].buyer.origin, "load");
    }

    #[test]
    fn constant_fee_shifts_forwarded_offer_and_bid_rates() {
        let (mut store, higher, lower) =
            setup(MarketKind::TwoSided, GridFeeParams::constant(dec!(0.5)));
        let slot = store.get(lower).unwrap().time_slot;
        let mut agent = MarketAgent::new("house", Uuid::new_v4(), higher, lower, slot, 0, 0);
        store
            .get_mut(lower)
            .unwrap()
            .offer(OfferParams::new(
                dec!(10),
                dec!(1),
                TraderDetails::new("pv", Uuid::new_v4()),
            ))
            .unwrap();
        store
            .get_mut(higher)
            .unwrap()
            .bid(BidParams::new(
                dec!(12),
                dec!(1),
                TraderDetails::new("load", Uuid::new_v4()),
            ))
            .unwrap();
        agent.tick(0, &mut store);

        // Offer gains the parent's fee on the way up
        let mirror_offer = store.get(higher).unwrap().offers().values().next().unwrap().clone();
        assert_eq!(mirror_offer.energy_rate(), dec!(10.5));
        // Bid sheds the parent's fee on the way down
        let mirror_bid = store.get(lower).unwrap().bids().values().next().unwrap().clone();
        assert_eq!(mirror_bid.energy_rate(), dec!(11.5));
    }

    #[test]
    fn deleting_the_source_offer_withdraws_the_mirror() {
        let (mut store, higher, lower) = setup(MarketKind::OneSided, GridFeeParams::default());
        let slot = store.get(lower).unwrap().time_slot;
        let mut agent = MarketAgent::new("house", Uuid::new_v4(), higher, lower, slot, 0, 0);
        let offer = store
            .get_mut(lower)
            .unwrap()
            .offer(OfferParams::new(
                dec!(10),
                dec!(1),
                TraderDetails::new("pv", Uuid::new_v4()),
            ))
            .unwrap();
        agent.tick(0, &mut store);
        store.drain_all_events();
        assert_eq!(store.get(higher).unwrap().offers().len(), 1);

        store.get_mut(lower).unwrap().delete_offer(offer.id).unwrap();
        drain_to_quiescence(&mut agent, &mut store);
        assert!(store.get(higher).unwrap().offers().is_empty());
    }

    #[test]
    fn partial_trade_in_parent_market_splits_the_source_offer() {
        let (mut store, higher, lower) = setup(MarketKind::OneSided, GridFeeParams::default());
        let slot = store.get(lower).unwrap().time_slot;
        let mut agent = MarketAgent::new("house", Uuid::new_v4(), higher, lower, slot, 0, 0);
        store
            .get_mut(lower)
            .unwrap()
            .offer(OfferParams::new(
                dec!(30),
                dec!(3),
                TraderDetails::new("pv", Uuid::new_v4()),
            ))
            .unwrap();
        agent.tick(0, &mut store);
        store.drain_all_events();

        let mirror_id = *store.get(higher).unwrap().offers().keys().next().unwrap();
        store
            .get_mut(higher)
            .unwrap()
            .accept_offer(
                AcceptOffer::new(mirror_id, TraderDetails::new("load", Uuid::new_v4()))
                    .with_energy(dec!(1)),
            )
            .unwrap();
        drain_to_quiescence(&mut agent, &mut store);

        let source = store.get(lower).unwrap();
        assert_eq!(source.trades().len(), 1);
        assert_eq!(source.trades()[0].traded_energy, dec!(1));
        // The residual stays on both books, still linked
        assert_eq!(source.offers().len(), 1);
        assert_eq!(source.offers().values().next().unwrap().energy, dec!(2));
        assert_eq!(store.get(higher).unwrap().offers().len(), 1);
    }
}
