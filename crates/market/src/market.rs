use std::collections::{HashMap, VecDeque};

use gridex_core::{
    Bid, Energy, MarketEvent, MarketId, MarketKind, Offer, Price, Rate, Requirement, Trade,
    TradeBidOfferInfo, TradedOrder, TraderDetails, TimeSlot, Timestamp, RATE_TOLERANCE,
};
use gridex_matching::RequirementsSatisfiedChecker;
use gridex_ports::{BidOfferMatch, GridFeePolicy, MarketError, MarketResult};
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use crate::fees::{create_fee_policy, GridFeeParams};

/// Parameters for posting an offer
#[derive(Debug, Clone)]
pub struct OfferParams {
    pub price: Price,
    pub energy: Energy,
    pub seller: TraderDetails,
    pub offer_id: Option<Uuid>,
    pub original_price: Option<Price>,
    pub adapt_price_with_fees: bool,
    pub add_to_history: bool,
    pub dispatch_event: bool,
    pub attributes: Option<Value>,
    pub requirements: Vec<Requirement>,
    pub time_slot: Option<TimeSlot>,
}

impl OfferParams {
    pub fn new(price: Price, energy: Energy, seller: TraderDetails) -> Self {
        Self {
            price,
            energy,
            seller,
            offer_id: None,
            original_price: None,
            adapt_price_with_fees: true,
            add_to_history: true,
            dispatch_event: true,
            attributes: None,
            requirements: Vec::new(),
            time_slot: None,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.offer_id = Some(id);
        self
    }

    pub fn with_original_price(mut self, original_price: Price) -> Self {
        self.original_price = Some(original_price);
        self
    }

    pub fn keep_price(mut self) -> Self {
        self.adapt_price_with_fees = false;
        self
    }

    pub fn with_attributes(mut self, attributes: Value) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn with_requirements(mut self, requirements: Vec<Requirement>) -> Self {
        self.requirements = requirements;
        self
    }
}

/// Parameters for posting a bid
#[derive(Debug, Clone)]
pub struct BidParams {
    pub price: Price,
    pub energy: Energy,
    pub buyer: TraderDetails,
    pub bid_id: Option<Uuid>,
    pub original_price: Option<Price>,
    pub adapt_price_with_fees: bool,
    pub add_to_history: bool,
    pub dispatch_event: bool,
    pub attributes: Option<Value>,
    pub requirements: Vec<Requirement>,
    pub time_slot: Option<TimeSlot>,
}

impl BidParams {
    pub fn new(price: Price, energy: Energy, buyer: TraderDetails) -> Self {
        Self {
            price,
            energy,
            buyer,
            bid_id: None,
            original_price: None,
            adapt_price_with_fees: true,
            add_to_history: true,
            dispatch_event: true,
            attributes: None,
            requirements: Vec::new(),
            time_slot: None,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.bid_id = Some(id);
        self
    }

    pub fn with_original_price(mut self, original_price: Price) -> Self {
        self.original_price = Some(original_price);
        self
    }

    pub fn keep_price(mut self) -> Self {
        self.adapt_price_with_fees = false;
        self
    }

    pub fn with_attributes(mut self, attributes: Value) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn with_requirements(mut self, requirements: Vec<Requirement>) -> Self {
        self.requirements = requirements;
        self
    }
}

/// Parameters for taking an offer
#[derive(Debug, Clone)]
pub struct AcceptOffer {
    pub offer_id: Uuid,
    pub buyer: TraderDetails,
    pub energy: Option<Energy>,
    pub trade_rate: Option<Rate>,
    pub trade_bid_info: Option<TradeBidOfferInfo>,
    pub already_tracked: bool,
}

impl AcceptOffer {
    pub fn new(offer_id: Uuid, buyer: TraderDetails) -> Self {
        Self {
            offer_id,
            buyer,
            energy: None,
            trade_rate: None,
            trade_bid_info: None,
            already_tracked: false,
        }
    }

    pub fn with_energy(mut self, energy: Energy) -> Self {
        self.energy = Some(energy);
        self
    }

    pub fn with_trade_rate(mut self, rate: Rate) -> Self {
        self.trade_rate = Some(rate);
        self
    }

    pub fn with_trade_bid_info(mut self, info: TradeBidOfferInfo) -> Self {
        self.trade_bid_info = Some(info);
        self
    }

    pub fn already_tracked(mut self, tracked: bool) -> Self {
        self.already_tracked = tracked;
        self
    }
}

/// Parameters for settling a bid
#[derive(Debug, Clone)]
pub struct AcceptBid {
    pub bid_id: Uuid,
    pub seller: TraderDetails,
    pub energy: Option<Energy>,
    pub trade_rate: Option<Rate>,
    pub trade_offer_info: TradeBidOfferInfo,
    pub already_tracked: bool,
}

impl AcceptBid {
    pub fn new(bid_id: Uuid, seller: TraderDetails, trade_offer_info: TradeBidOfferInfo) -> Self {
        Self {
            bid_id,
            seller,
            energy: None,
            trade_rate: None,
            trade_offer_info,
            already_tracked: false,
        }
    }

    pub fn with_energy(mut self, energy: Energy) -> Self {
        self.energy = Some(energy);
        self
    }

    pub fn with_trade_rate(mut self, rate: Rate) -> Self {
        self.trade_rate = Some(rate);
        self
    }

    pub fn already_tracked(mut self, tracked: bool) -> Self {
        self.already_tracked = tracked;
        self
    }
}

/// Spot market for one delivery time slot.
///
/// One-sided markets only carry offers; two-sided markets carry both
/// sides and are cleared by a matching algorithm. All book mutations
/// queue `MarketEvent`s which the simulation drains and routes.
pub struct Market {
    pub id: MarketId,
    pub name: String,
    pub kind: MarketKind,
    pub time_slot: TimeSlot,
    now: Timestamp,
    readonly: bool,
    fee: Box<dyn GridFeePolicy>,
    offers: HashMap<Uuid, Offer>,
    bids: HashMap<Uuid, Bid>,
    trades: Vec<Trade>,
    offer_history: Vec<Offer>,
    bid_history: Vec<Bid>,
    pending_events: VecDeque<MarketEvent>,
    market_fee: Price,
    accumulated_trade_energy: Energy,
    accumulated_trade_price: Price,
    traded_energy: HashMap<String, Energy>,
}

impl Market {
    pub fn new(
        name: impl Into<String>,
        kind: MarketKind,
        time_slot: TimeSlot,
        fee_params: &GridFeeParams,
    ) -> MarketResult<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            time_slot,
            now: time_slot,
            readonly: false,
            fee: create_fee_policy(fee_params)?,
            offers: HashMap::new(),
            bids: HashMap::new(),
            trades: Vec::new(),
            offer_history: Vec::new(),
            bid_history: Vec::new(),
            pending_events: VecDeque::new(),
            market_fee: Decimal::ZERO,
            accumulated_trade_energy: Decimal::ZERO,
            accumulated_trade_price: Decimal::ZERO,
            traded_energy: HashMap::new(),
        })
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn set_now(&mut self, now: Timestamp) {
        self.now = now;
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Freeze the book; called when the slot rotates into the past
    pub fn set_readonly(&mut self) {
        self.readonly = true;
    }

    pub fn fee(&self) -> &dyn GridFeePolicy {
        self.fee.as_ref()
    }

    pub fn offers(&self) -> &HashMap<Uuid, Offer> {
        &self.offers
    }

    pub fn bids(&self) -> &HashMap<Uuid, Bid> {
        &self.bids
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn offer_history(&self) -> &[Offer] {
        &self.offer_history
    }

    pub fn bid_history(&self) -> &[Bid] {
        &self.bid_history
    }

    pub fn market_fee(&self) -> Price {
        self.market_fee
    }

    pub fn accumulated_trade_energy(&self) -> Energy {
        self.accumulated_trade_energy
    }

    pub fn accumulated_trade_price(&self) -> Price {
        self.accumulated_trade_price
    }

    /// Net traded energy per trader name: positive for sellers,
    /// negative for buyers
    pub fn traded_energy(&self) -> &HashMap<String, Energy> {
        &self.traded_energy
    }

    /// Volume-weighted average rate of the open offers
    pub fn avg_offer_price(&self) -> Rate {
        let energy: Energy = self.offers.values().map(|o| o.energy).sum();
        if energy.is_zero() {
            return Decimal::ZERO;
        }
        let price: Price = self.offers.values().map(|o| o.price).sum();
        price / energy
    }

    pub fn min_offer_price(&self) -> Option<Rate> {
        self.offers.values().map(Offer::energy_rate).min()
    }

    pub fn max_offer_price(&self) -> Option<Rate> {
        self.offers.values().map(Offer::energy_rate).max()
    }

    /// Volume-weighted average rate over all trades so far
    pub fn avg_trade_price(&self) -> Rate {
        if self.accumulated_trade_energy.is_zero() {
            return Decimal::ZERO;
        }
        self.accumulated_trade_price / self.accumulated_trade_energy
    }

    pub fn min_trade_price(&self) -> Option<Rate> {
        self.trades.iter().map(Trade::trade_rate).min()
    }

    pub fn max_trade_price(&self) -> Option<Rate> {
        self.trades.iter().map(Trade::trade_rate).max()
    }

    pub fn bought_energy(&self, buyer: &str) -> Energy {
        self.trades
            .iter()
            .filter(|t| t.buyer.name == buyer)
            .map(|t| t.traded_energy)
            .sum()
    }

    pub fn sold_energy(&self, seller: &str) -> Energy {
        self.trades
            .iter()
            .filter(|t| t.seller.name == seller)
            .map(|t| t.traded_energy)
            .sum()
    }

    pub fn total_spent(&self, buyer: &str) -> Price {
        self.trades
            .iter()
            .filter(|t| t.buyer.name == buyer)
            .map(|t| t.trade_price)
            .sum()
    }

    pub fn total_earned(&self, seller: &str) -> Price {
        self.trades
            .iter()
            .filter(|t| t.seller.name == seller)
            .map(|t| t.trade_price)
            .sum()
    }

    /// Snapshot of the open book for a matching algorithm
    pub fn open_view(&self) -> gridex_ports::OrderBookView {
        gridex_ports::OrderBookView {
            market_id: self.id,
            time_slot: self.time_slot,
            current_time: self.now,
            bids: self.bids.values().cloned().collect(),
            offers: self.offers.values().cloned().collect(),
        }
    }

    /// Take all queued events, oldest first
    pub fn drain_events(&mut self) -> Vec<MarketEvent> {
        self.pending_events.drain(..).collect()
    }

    fn queue_event(&mut self, event: MarketEvent) {
        self.pending_events.push_back(event);
    }

    /// Post an offer. The posted price gains this market's grid fee
    /// unless fee adaptation is disabled (splits, mirrored orders).
    pub fn offer(&mut self, params: OfferParams) -> MarketResult<Offer> {
        if self.readonly {
            return Err(MarketError::MarketReadOnly);
        }
        if params.energy <= Decimal::ZERO {
            return Err(MarketError::InvalidOffer);
        }
        let original_price = params.original_price.unwrap_or(params.price);

        let price = if params.adapt_price_with_fees {
            let rate = self.fee.update_incoming_offer_rate(
                Some(params.price / params.energy),
                original_price / params.energy,
            );
            rate * params.energy
        } else {
            params.price
        };

        if price < Decimal::ZERO {
            return Err(MarketError::NegativePrice(
                "offer price negative after fees".to_string(),
            ));
        }

        let offer = Offer {
            id: params.offer_id.unwrap_or_else(Uuid::new_v4),
            creation_time: self.now,
            time_slot: params.time_slot.unwrap_or(self.time_slot),
            price,
            energy: params.energy,
            original_price,
            seller: params.seller,
            attributes: params.attributes,
            requirements: params.requirements,
        };
        self.offers.insert(offer.id, offer.clone());
        if params.add_to_history {
            self.offer_history.push(offer.clone());
        }
        log::debug!(
            "[OFFER][NEW][{}][{}] {} kWh at {} by {}",
            self.name,
            offer.time_slot,
            offer.energy,
            offer.price,
            offer.seller.name
        );
        if params.dispatch_event {
            self.queue_event(MarketEvent::Offer {
                offer: offer.clone(),
            });
        }
        Ok(offer)
    }

    pub fn delete_offer(&mut self, offer_id: Uuid) -> MarketResult<Offer> {
        if self.readonly {
            return Err(MarketError::MarketReadOnly);
        }
        let offer = self
            .offers
            .remove(&offer_id)
            .ok_or(MarketError::OfferNotFound(offer_id))?;
        log::debug!("[OFFER][DEL][{}] {}", self.name, offer.id);
        self.queue_event(MarketEvent::OfferDeleted {
            offer: offer.clone(),
        });
        Ok(offer)
    }

    /// Post a bid. Rejected outright on one-sided markets.
    pub fn bid(&mut self, params: BidParams) -> MarketResult<Bid> {
        if self.readonly {
            return Err(MarketError::MarketReadOnly);
        }
        if self.kind == MarketKind::OneSided {
            return Err(MarketError::WrongMarketKind(
                "bids are not accepted on one-sided markets".to_string(),
            ));
        }
        if params.energy <= Decimal::ZERO {
            return Err(MarketError::InvalidBid);
        }
        let original_price = params.original_price.unwrap_or(params.price);

        let price = if params.adapt_price_with_fees {
            let rate = self.fee.update_incoming_bid_rate(
                Some(params.price / params.energy),
                original_price / params.energy,
            );
            rate * params.energy
        } else {
            params.price
        };

        if price < Decimal::ZERO {
            return Err(MarketError::NegativePrice(
                "bid price negative after fees".to_string(),
            ));
        }

        let bid = Bid {
            id: params.bid_id.unwrap_or_else(Uuid::new_v4),
            creation_time: self.now,
            time_slot: params.time_slot.unwrap_or(self.time_slot),
            price,
            energy: params.energy,
            original_price,
            buyer: params.buyer,
            attributes: params.attributes,
            requirements: params.requirements,
        };
        self.bids.insert(bid.id, bid.clone());
        if params.add_to_history {
            self.bid_history.push(bid.clone());
        }
        log::debug!(
            "[BID][NEW][{}][{}] {} kWh at {} by {}",
            self.name,
            bid.time_slot,
            bid.energy,
            bid.price,
            bid.buyer.name
        );
        if params.dispatch_event {
            self.queue_event(MarketEvent::Bid { bid: bid.clone() });
        }
        Ok(bid)
    }

    pub fn delete_bid(&mut self, bid_id: Uuid) -> MarketResult<Bid> {
        if self.readonly {
            return Err(MarketError::MarketReadOnly);
        }
        if self.kind == MarketKind::OneSided {
            return Err(MarketError::WrongMarketKind(
                "bids are not accepted on one-sided markets".to_string(),
            ));
        }
        let bid = self
            .bids
            .remove(&bid_id)
            .ok_or(MarketError::BidNotFound(bid_id))?;
        log::debug!("[BID][DEL][{}] {}", self.name, bid.id);
        self.queue_event(MarketEvent::BidDeleted { bid: bid.clone() });
        Ok(bid)
    }

    /// Split an offer into an accepted part (keeps the id) and a
    /// residual part (new id), preserving total energy, price and
    /// original price exactly.
    pub fn split_offer(
        &mut self,
        offer_id: Uuid,
        energy: Energy,
        original_price: Price,
    ) -> MarketResult<(Offer, Offer)> {
        let original = self
            .offers
            .remove(&offer_id)
            .ok_or(MarketError::OfferNotFound(offer_id))?;

        let portion = energy / original.energy;
        let residual_portion = (original.energy - energy) / original.energy;

        let accepted = match self.offer(
            OfferParams {
                price: original.price * portion,
                energy,
                seller: original.seller.clone(),
                offer_id: Some(original.id),
                original_price: Some(original_price * portion),
                adapt_price_with_fees: false,
                add_to_history: false,
                dispatch_event: false,
                attributes: original.attributes.clone(),
                requirements: original.requirements.clone(),
                time_slot: Some(original.time_slot),
            },
        ) {
            Ok(offer) => offer,
            Err(err) => {
                self.offers.insert(original.id, original);
                return Err(err);
            }
        };

        let residual = match self.offer(
            OfferParams {
                price: original.price * residual_portion,
                energy: original.energy - energy,
                seller: original.seller.clone(),
                offer_id: None,
                original_price: Some(original_price * residual_portion),
                adapt_price_with_fees: false,
                add_to_history: true,
                dispatch_event: false,
                attributes: original.attributes.clone(),
                requirements: original.requirements.clone(),
                time_slot: Some(original.time_slot),
            },
        ) {
            Ok(offer) => offer,
            Err(err) => {
                self.offers.remove(&accepted.id);
                self.offers.insert(original.id, original);
                return Err(err);
            }
        };

        log::debug!(
            "[OFFER][SPLIT][{}] {} kWh into {} and {}",
            self.name,
            original.energy,
            accepted.energy,
            residual.energy
        );
        self.queue_event(MarketEvent::OfferSplit {
            original,
            accepted: accepted.clone(),
            residual: residual.clone(),
        });
        Ok((accepted, residual))
    }

    /// Split a bid the same way offers are split
    pub fn split_bid(
        &mut self,
        bid_id: Uuid,
        energy: Energy,
        original_price: Price,
    ) -> MarketResult<(Bid, Bid)> {
        let original = self
            .bids
            .remove(&bid_id)
            .ok_or(MarketError::BidNotFound(bid_id))?;

        let portion = energy / original.energy;
        let residual_portion = (original.energy - energy) / original.energy;

        let accepted = match self.bid(
            BidParams {
                price: original.price * portion,
                energy,
                buyer: original.buyer.clone(),
                bid_id: Some(original.id),
                original_price: Some(original_price * portion),
                adapt_price_with_fees: false,
                add_to_history: false,
                dispatch_event: false,
                attributes: original.attributes.clone(),
                requirements: original.requirements.clone(),
                time_slot: Some(original.time_slot),
            },
        ) {
            Ok(bid) => bid,
            Err(err) => {
                self.bids.insert(original.id, original);
                return Err(err);
            }
        };

        let residual = match self.bid(
            BidParams {
                price: original.price * residual_portion,
                energy: original.energy - energy,
                buyer: original.buyer.clone(),
                bid_id: None,
                original_price: Some(original_price * residual_portion),
                adapt_price_with_fees: false,
                add_to_history: true,
                dispatch_event: false,
                attributes: original.attributes.clone(),
                requirements: original.requirements.clone(),
                time_slot: Some(original.time_slot),
            },
        ) {
            Ok(bid) => bid,
            Err(err) => {
                self.bids.remove(&accepted.id);
                self.bids.insert(original.id, original);
                return Err(err);
            }
        };

        log::debug!(
            "[BID][SPLIT][{}] {} kWh into {} and {}",
            self.name,
            original.energy,
            accepted.energy,
            residual.energy
        );
        self.queue_event(MarketEvent::BidSplit {
            original,
            accepted: accepted.clone(),
            residual: residual.clone(),
        });
        Ok((accepted, residual))
    }

    fn determine_offer_price(
        &self,
        energy_portion: Decimal,
        energy: Energy,
        trade_rate: Rate,
        trade_bid_info: Option<&TradeBidOfferInfo>,
        original_price: Price,
    ) -> (Price, Price) {
        match (self.kind, trade_bid_info) {
            (MarketKind::TwoSided, Some(info)) => {
                let breakdown = self.fee.calculate_trade_price_and_fees(info);
                (
                    breakdown.grid_fee_rate * energy,
                    breakdown.trade_rate * energy,
                )
            }
            // One-sided trades: the posted price already carries the
            // fees, only the fee share has to be accounted
            _ => (
                self.fee
                    .one_sided_trade_fee(original_price, energy, energy_portion),
                energy * trade_rate,
            ),
        }
    }

    /// Accept an offer, splitting it first if only part of its energy
    /// is taken. Returns the trade with any residual attached.
    pub fn accept_offer(&mut self, params: AcceptOffer) -> MarketResult<Trade> {
        if self.readonly {
            return Err(MarketError::MarketReadOnly);
        }
        let offer = self
            .offers
            .get(&params.offer_id)
            .cloned()
            .ok_or(MarketError::OfferNotFound(params.offer_id))?;

        let mut energy = params.energy.unwrap_or(offer.energy);
        if (energy - offer.energy).abs() <= RATE_TOLERANCE {
            energy = offer.energy;
        }
        if energy <= Decimal::ZERO {
            return Err(MarketError::InvalidTrade(
                "energy cannot be negative or zero".to_string(),
            ));
        }
        if energy > offer.energy {
            return Err(MarketError::InvalidTrade(format!(
                "traded energy {} exceeds offered energy {}",
                energy, offer.energy
            )));
        }

        let trade_rate = params.trade_rate.unwrap_or_else(|| offer.energy_rate());
        let original_price = offer.original_price;
        let energy_portion = energy / offer.energy;

        let (mut traded_offer, residual) = if energy < offer.energy {
            let (accepted, residual) = self.split_offer(params.offer_id, energy, original_price)?;
            self.offers.remove(&accepted.id);
            (accepted, Some(residual))
        } else {
            self.offers.remove(&params.offer_id);
            (offer, None)
        };

        let (fee_price, trade_price) = self.determine_offer_price(
            energy_portion,
            energy,
            trade_rate,
            params.trade_bid_info.as_ref(),
            original_price,
        );
        traded_offer.price = trade_price;

        let offer_bid_trade_info = params
            .trade_bid_info
            .as_ref()
            .and_then(|info| self.fee.propagate_original_bid_info_on_offer_trade(info));

        let trade = Trade {
            id: Uuid::new_v4(),
            creation_time: self.now,
            time_slot: traded_offer.time_slot,
            seller: traded_offer.seller.clone(),
            buyer: params.buyer,
            traded: TradedOrder::Offer(traded_offer),
            traded_energy: energy,
            trade_price,
            fee_price,
            residual: residual.map(TradedOrder::Offer),
            offer_bid_trade_info,
            already_tracked: params.already_tracked,
        };

        if !params.already_tracked {
            self.update_stats_after_trade(&trade);
            log::info!(
                "[TRADE][OFFER][{}][{}] {} kWh at {} from {} to {}",
                self.name,
                trade.time_slot,
                trade.traded_energy,
                trade.trade_price,
                trade.seller.name,
                trade.buyer.name
            );
        }

        self.queue_event(MarketEvent::OfferTraded {
            trade: trade.clone(),
        });
        Ok(trade)
    }

    /// Settle a bid against an already accepted offer
    pub fn accept_bid(&mut self, params: AcceptBid) -> MarketResult<Trade> {
        if self.readonly {
            return Err(MarketError::MarketReadOnly);
        }
        if self.kind == MarketKind::OneSided {
            return Err(MarketError::WrongMarketKind(
                "bids are not accepted on one-sided markets".to_string(),
            ));
        }
        let market_bid = self
            .bids
            .get(&params.bid_id)
            .cloned()
            .ok_or(MarketError::BidNotFound(params.bid_id))?;

        let mut energy = params.energy.unwrap_or(market_bid.energy);
        if (energy - market_bid.energy).abs() <= RATE_TOLERANCE {
            energy = market_bid.energy;
        }
        if energy <= Decimal::ZERO {
            return Err(MarketError::InvalidTrade(
                "energy cannot be negative or zero".to_string(),
            ));
        }
        if energy > market_bid.energy {
            return Err(MarketError::InvalidTrade(format!(
                "traded energy {} exceeds bid energy {}",
                energy, market_bid.energy
            )));
        }
        if let Some(trade_rate) = params.trade_rate {
            if trade_rate > market_bid.energy_rate() + RATE_TOLERANCE {
                return Err(MarketError::InvalidTrade(format!(
                    "trade rate {} above bid rate {}",
                    trade_rate,
                    market_bid.energy_rate()
                )));
            }
        }

        let original_price = market_bid.original_price;

        let (mut traded_bid, residual) = if energy < market_bid.energy {
            let (accepted, residual) = self.split_bid(params.bid_id, energy, original_price)?;
            self.bids.remove(&accepted.id);
            (accepted, Some(residual))
        } else {
            self.bids.remove(&params.bid_id);
            (market_bid, None)
        };

        let breakdown = self.fee.calculate_trade_price_and_fees(&params.trade_offer_info);
        let fee_price = breakdown.grid_fee_rate * energy;
        let trade_price = breakdown.trade_rate * energy;
        traded_bid.price = trade_price;

        // Fees are not adapted here, mirroring the behaviour of
        // forwarded bids which use the source market's fee
        let updated_trade_info = self
            .fee
            .propagate_original_offer_info_on_bid_trade(&params.trade_offer_info, true);

        let trade = Trade {
            id: Uuid::new_v4(),
            creation_time: self.now,
            time_slot: traded_bid.time_slot,
            seller: params.seller,
            buyer: traded_bid.buyer.clone(),
            traded: TradedOrder::Bid(traded_bid),
            traded_energy: energy,
            trade_price,
            fee_price,
            residual: residual.map(TradedOrder::Bid),
            offer_bid_trade_info: Some(updated_trade_info),
            already_tracked: params.already_tracked,
        };

        if !params.already_tracked {
            self.update_stats_after_trade(&trade);
            log::info!(
                "[TRADE][BID][{}][{}] {} kWh at {} from {} to {}",
                self.name,
                trade.time_slot,
                trade.traded_energy,
                trade.trade_price,
                trade.seller.name,
                trade.buyer.name
            );
        }

        self.queue_event(MarketEvent::BidTraded {
            trade: trade.clone(),
        });
        Ok(trade)
    }

    /// Settle one recommended bid/offer pair. The offer side is traded
    /// first, then the bid side with its statistics suppressed so the
    /// pair counts once.
    pub fn accept_bid_offer_pair(
        &mut self,
        bid: &Bid,
        offer: &Offer,
        clearing_rate: Rate,
        trade_bid_info: TradeBidOfferInfo,
        selected_energy: Energy,
    ) -> MarketResult<(Trade, Trade)> {
        let already_tracked = bid.buyer.name == offer.seller.name;
        let offer_trade = self.accept_offer(
            AcceptOffer::new(offer.id, bid.buyer.clone())
                .with_energy(selected_energy)
                .with_trade_rate(clearing_rate)
                .with_trade_bid_info(trade_bid_info)
                .already_tracked(already_tracked),
        )?;
        let bid_trade = self.accept_bid(
            AcceptBid::new(bid.id, offer.seller.clone(), trade_bid_info)
                .with_energy(selected_energy)
                .with_trade_rate(clearing_rate)
                .already_tracked(true),
        )?;
        Ok((bid_trade, offer_trade))
    }

    /// Apply a batch of recommendations against the live book.
    ///
    /// Orders that disappeared or stopped satisfying the validation are
    /// skipped; settled orders are replaced by their residuals in the
    /// remaining recommendations. Returns whether any trade happened.
    pub fn match_recommendations(
        &mut self,
        recommendations: Vec<BidOfferMatch>,
    ) -> MarketResult<bool> {
        let mut performed = false;
        let mut pending: VecDeque<BidOfferMatch> = recommendations.into();

        while let Some(recommendation) = pending.pop_front() {
            let market_offer = match self.offers.get(&recommendation.offer.id) {
                Some(offer) => offer.clone(),
                None => continue,
            };
            let market_bid = match self.bids.get(&recommendation.bid.id) {
                Some(bid) => bid.clone(),
                None => continue,
            };

            if let Err(err) = Self::validate_bid_offer_match(
                &market_bid,
                &market_offer,
                recommendation.trade_rate,
                recommendation.selected_energy,
            ) {
                log::debug!(
                    "[{}] skipping recommendation: {}",
                    self.name,
                    err
                );
                continue;
            }

            let original_bid_rate = market_bid.original_rate();
            let trade_rate_source = self.fee.calculate_original_trade_rate_from_clearing_rate(
                original_bid_rate,
                market_bid.energy_rate(),
                recommendation.trade_rate,
            );
            let trade_bid_info = TradeBidOfferInfo {
                original_bid_rate: Some(original_bid_rate),
                propagated_bid_rate: Some(market_bid.energy_rate()),
                original_offer_rate: market_offer.original_rate(),
                propagated_offer_rate: market_offer.energy_rate(),
                trade_rate: trade_rate_source,
            };
            let selected_energy = recommendation
                .selected_energy
                .min(market_offer.energy)
                .min(market_bid.energy);

            let (bid_trade, offer_trade) = self.accept_bid_offer_pair(
                &market_bid,
                &market_offer,
                recommendation.trade_rate,
                trade_bid_info,
                selected_energy,
            )?;
            performed = true;

            if let Some(TradedOrder::Offer(residual)) = &offer_trade.residual {
                for rec in pending.iter_mut() {
                    if rec.offer.id == market_offer.id {
                        rec.offer = residual.clone();
                    }
                }
            }
            if let Some(TradedOrder::Bid(residual)) = &bid_trade.residual {
                for rec in pending.iter_mut() {
                    if rec.bid.id == market_bid.id {
                        rec.bid = residual.clone();
                    }
                }
            }
        }
        Ok(performed)
    }

    /// Re-validate a recommendation against the live book
    pub fn validate_bid_offer_match(
        bid: &Bid,
        offer: &Offer,
        clearing_rate: Rate,
        selected_energy: Energy,
    ) -> MarketResult<()> {
        if selected_energy > bid.energy {
            return Err(MarketError::InvalidBidOfferPair(format!(
                "selected energy {} above bid energy {}",
                selected_energy, bid.energy
            )));
        }
        if selected_energy > offer.energy {
            return Err(MarketError::InvalidBidOfferPair(format!(
                "selected energy {} above offer energy {}",
                selected_energy, offer.energy
            )));
        }
        if bid.energy_rate() + RATE_TOLERANCE < clearing_rate {
            return Err(MarketError::InvalidBidOfferPair(format!(
                "clearing rate {} above bid rate {}",
                clearing_rate,
                bid.energy_rate()
            )));
        }
        if offer.energy_rate() > clearing_rate + RATE_TOLERANCE {
            return Err(MarketError::InvalidBidOfferPair(format!(
                "offer rate {} above clearing rate {}",
                offer.energy_rate(),
                clearing_rate
            )));
        }
        if !RequirementsSatisfiedChecker::is_satisfied(bid, offer, clearing_rate, selected_energy) {
            return Err(MarketError::InvalidBidOfferPair(
                "requirements failed the validation".to_string(),
            ));
        }
        Ok(())
    }

    fn update_stats_after_trade(&mut self, trade: &Trade) {
        self.trades.push(trade.clone());
        self.market_fee += trade.fee_price;
        self.accumulated_trade_price += trade.trade_price;
        self.accumulated_trade_energy += trade.traded_energy;
        *self
            .traded_energy
            .entry(trade.seller.name.clone())
            .or_insert(Decimal::ZERO) += trade.traded_energy;
        *self
            .traded_energy
            .entry(trade.buyer.name.clone())
            .or_insert(Decimal::ZERO) -= trade.traded_energy;
    }
}

impl std::fmt::Debug for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Market")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("time_slot", &self.time_slot)
            .field("offers", &self.offers.len())
            .field("bids", &self.bids.len())
            .field("trades", &self.trades.len())
            .finish()
    }
}
