use gridex_core::{Energy, MarketKind, Rate, Tick, Trade, TraderDetails};
use gridex_market::{AcceptOffer, BidParams, Market, OfferParams};
use gridex_ports::MarketResult;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Everything a strategy may touch while its owner's market is borrowed.
pub struct StrategyContext<'a> {
    pub market: &'a mut Market,
    pub trader: &'a TraderDetails,
    pub current_tick: Tick,
    /// Reference rate for the market's slot, cents/kWh
    pub market_maker_rate: Rate,
}

impl StrategyContext<'_> {
    pub fn post_offer(&mut self, price: Decimal, energy: Energy) -> MarketResult<gridex_core::Offer> {
        self.market
            .offer(OfferParams::new(price, energy, self.trader.clone()))
    }

    pub fn post_bid(&mut self, price: Decimal, energy: Energy) -> MarketResult<gridex_core::Bid> {
        self.market
            .bid(BidParams::new(price, energy, self.trader.clone()))
    }
}

/// Behaviour of a leaf device, driven by the simulation clock.
///
/// Strategies trade in the market of the area that contains them. All
/// hooks default to doing nothing so a strategy only implements the
/// phases it cares about.
pub trait Strategy: Send {
    /// Called once when the simulation starts
    fn on_activate(&mut self, _ctx: &mut StrategyContext) {}

    /// Called at the start of every market slot
    fn on_market_cycle(&mut self, _ctx: &mut StrategyContext) {}

    /// Called every tick
    fn on_tick(&mut self, _ctx: &mut StrategyContext) {}

    /// Called for every trade the device is a party of
    fn on_trade(&mut self, _trade: &Trade) {}
}

/// Sells a fixed amount of energy every slot at a fixed rate, or at the
/// market maker rate when none is given.
#[derive(Debug, Clone)]
pub struct CommoditySupplier {
    energy_per_slot: Energy,
    rate: Option<Rate>,
}

impl CommoditySupplier {
    pub fn new(energy_per_slot: Energy) -> Self {
        Self {
            energy_per_slot,
            rate: None,
        }
    }

    pub fn with_rate(mut self, rate: Rate) -> Self {
        self.rate = Some(rate);
        self
    }
}

impl Strategy for CommoditySupplier {
    fn on_market_cycle(&mut self, ctx: &mut StrategyContext) {
        let rate = self.rate.unwrap_or(ctx.market_maker_rate);
        if let Err(err) = ctx.post_offer(rate * self.energy_per_slot, self.energy_per_slot) {
            log::warn!("[{}] could not post offer: {}", ctx.trader.name, err);
        }
    }
}

/// Buys a fixed amount of energy every slot, paying at most the given
/// rate (or the market maker rate).
///
/// In two-sided markets the demand is expressed as a bid and left to
/// the matching algorithm. In one-sided markets the consumer takes the
/// cheapest affordable offers every tick until the slot's demand is
/// met.
#[derive(Debug, Clone)]
pub struct CommodityConsumer {
    energy_per_slot: Energy,
    max_rate: Option<Rate>,
    pending: Energy,
}

impl CommodityConsumer {
    pub fn new(energy_per_slot: Energy) -> Self {
        Self {
            energy_per_slot,
            max_rate: None,
            pending: Decimal::ZERO,
        }
    }

    pub fn with_max_rate(mut self, rate: Rate) -> Self {
        self.max_rate = Some(rate);
        self
    }

    fn max_rate(&self, ctx: &StrategyContext) -> Rate {
        self.max_rate.unwrap_or(ctx.market_maker_rate)
    }
}

impl Strategy for CommodityConsumer {
    fn on_market_cycle(&mut self, ctx: &mut StrategyContext) {
        self.pending = self.energy_per_slot;
        if ctx.market.kind == MarketKind::TwoSided {
            let rate = self.max_rate(ctx);
            if let Err(err) = ctx.post_bid(rate * self.energy_per_slot, self.energy_per_slot) {
                log::warn!("[{}] could not post bid: {}", ctx.trader.name, err);
            }
        }
    }

    fn on_tick(&mut self, ctx: &mut StrategyContext) {
        if ctx.market.kind == MarketKind::TwoSided || self.pending <= Decimal::ZERO {
            return;
        }
        let max_rate = self.max_rate(ctx);
        let mut affordable: Vec<_> = ctx
            .market
            .offers()
            .values()
            .filter(|offer| offer.seller.name != ctx.trader.name)
            .filter(|offer| offer.energy_rate() <= max_rate)
            .cloned()
            .collect();
        affordable.sort_by(|a, b| {
            a.energy_rate()
                .cmp(&b.energy_rate())
                .then_with(|| a.id.cmp(&b.id))
        });

        for offer in affordable {
            if self.pending <= Decimal::ZERO {
                break;
            }
            let energy = self.pending.min(offer.energy);
            match ctx.market.accept_offer(
                AcceptOffer::new(offer.id, ctx.trader.clone()).with_energy(energy),
            ) {
                Ok(trade) => self.pending -= trade.traded_energy,
                Err(err) => {
                    log::debug!("[{}] could not take offer {}: {}", ctx.trader.name, offer.id, err);
                }
            }
        }
    }

    fn on_trade(&mut self, trade: &Trade) {
        // Bid settlements come in through events, not through accept calls
        if trade.is_bid_trade() {
            self.pending -= trade.traded_energy;
        }
    }
}

/// Infinite source at the market maker rate; the price anchor of a grid.
#[derive(Debug, Clone)]
pub struct MarketMaker {
    energy_per_slot: Energy,
}

impl MarketMaker {
    pub fn new() -> Self {
        Self {
            energy_per_slot: dec!(1000000),
        }
    }

    pub fn with_energy(mut self, energy_per_slot: Energy) -> Self {
        self.energy_per_slot = energy_per_slot;
        self
    }
}

impl Default for MarketMaker {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for MarketMaker {
    fn on_market_cycle(&mut self, ctx: &mut StrategyContext) {
        let rate = ctx.market_maker_rate;
        if let Err(err) = ctx.post_offer(rate * self.energy_per_slot, self.energy_per_slot) {
            log::warn!("[{}] could not post offer: {}", ctx.trader.name, err);
        }
    }
}
