use gridex_core::{Bid, Energy, Offer, Price, Rate, TradeBidOfferInfo};
use gridex_ports::{GridFeePolicy, TradePriceBreakdown};
use rust_decimal::Decimal;

/// Absolute fee in cents/kWh, independent of the clearing price
#[derive(Debug, Clone, Copy)]
pub struct ConstantGridFee {
    rate: Rate,
}

impl ConstantGridFee {
    pub fn new(rate: Rate) -> Self {
        Self { rate }
    }
}

impl GridFeePolicy for ConstantGridFee {
    fn grid_fee_rate(&self) -> Rate {
        self.rate
    }

    fn update_incoming_offer_rate(&self, source_rate: Option<Rate>, original_rate: Rate) -> Rate {
        source_rate.unwrap_or(original_rate) + self.rate
    }

    fn update_incoming_bid_rate(&self, source_rate: Option<Rate>, original_rate: Rate) -> Rate {
        source_rate.unwrap_or(original_rate)
    }

    fn update_forwarded_offer_rate(&self, source_rate: Rate, _original_rate: Rate) -> Rate {
        source_rate
    }

    fn update_forwarded_bid_rate(&self, source_rate: Rate, _original_rate: Rate) -> Rate {
        source_rate - self.rate
    }

    fn calculate_trade_price_and_fees(&self, info: &TradeBidOfferInfo) -> TradePriceBreakdown {
        let demand_side_fee = match (info.original_bid_rate, info.propagated_bid_rate) {
            (Some(original), Some(propagated)) => original - propagated,
            _ => Decimal::ZERO,
        };
        let supply_side_fee = info.propagated_offer_rate - info.original_offer_rate;
        let revenue_rate = info.trade_rate - demand_side_fee - supply_side_fee;
        TradePriceBreakdown {
            revenue_rate,
            grid_fee_rate: self.rate,
            trade_rate: revenue_rate + supply_side_fee,
        }
    }

    fn calculate_original_trade_rate_from_clearing_rate(
        &self,
        original_bid_rate: Rate,
        propagated_bid_rate: Rate,
        clearing_rate: Rate,
    ) -> Rate {
        clearing_rate + (original_bid_rate - propagated_bid_rate)
    }

    fn propagate_original_offer_info_on_bid_trade(
        &self,
        info: &TradeBidOfferInfo,
        ignore_fees: bool,
    ) -> TradeBidOfferInfo {
        let rate = if ignore_fees { Decimal::ZERO } else { self.rate };
        TradeBidOfferInfo {
            original_bid_rate: None,
            propagated_bid_rate: None,
            original_offer_rate: info.original_offer_rate,
            propagated_offer_rate: info.propagated_offer_rate + rate,
            trade_rate: info.trade_rate,
        }
    }

    fn propagate_original_bid_info_on_offer_trade(
        &self,
        info: &TradeBidOfferInfo,
    ) -> Option<TradeBidOfferInfo> {
        let original_bid_rate = info.original_bid_rate?;
        let propagated_bid_rate = info.propagated_bid_rate?;
        Some(TradeBidOfferInfo {
            original_bid_rate: Some(original_bid_rate),
            propagated_bid_rate: Some(propagated_bid_rate - self.rate),
            original_offer_rate: info.original_offer_rate,
            propagated_offer_rate: info.propagated_offer_rate,
            trade_rate: info.trade_rate,
        })
    }

    fn update_forwarded_offer_trade_original_info(
        &self,
        info: &TradeBidOfferInfo,
        market_offer: &Offer,
    ) -> TradeBidOfferInfo {
        TradeBidOfferInfo {
            original_bid_rate: info.original_bid_rate,
            propagated_bid_rate: info.propagated_bid_rate,
            original_offer_rate: market_offer.original_rate(),
            propagated_offer_rate: market_offer.energy_rate(),
            trade_rate: info.trade_rate,
        }
    }

    fn update_forwarded_bid_trade_original_info(
        &self,
        info: &TradeBidOfferInfo,
        market_bid: &Bid,
    ) -> TradeBidOfferInfo {
        TradeBidOfferInfo {
            original_bid_rate: Some(market_bid.original_rate()),
            propagated_bid_rate: Some(market_bid.energy_rate()),
            original_offer_rate: info.original_offer_rate,
            propagated_offer_rate: info.propagated_offer_rate,
            trade_rate: info.trade_rate,
        }
    }

    fn one_sided_trade_fee(
        &self,
        _original_price: Price,
        energy: Energy,
        _energy_portion: Decimal,
    ) -> Price {
        self.rate * energy
    }
}
