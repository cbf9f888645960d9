use gridex_core::{Bid, Energy, Offer, Price, Rate, TradeBidOfferInfo};
use rust_decimal::Decimal;

/// Per-unit decomposition of a trade settled in one market
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradePriceBreakdown {
    /// Rate the seller side earns before this market's fee
    pub revenue_rate: Rate,
    /// Fee rate this market keeps
    pub grid_fee_rate: Rate,
    /// Rate the buyer side pays in this market
    pub trade_rate: Rate,
}

/// Grid fee model of a single market.
///
/// The four `update_*` methods transform order rates as orders enter a
/// market or are forwarded out of it; the trade-side methods decompose a
/// clearing rate back into device revenue plus the fees of every market
/// on the path. The two directions are exact inverses of each other, so
/// forwarding an order and settling the resulting trade reconstructs the
/// originating device's rate without drift.
pub trait GridFeePolicy: std::fmt::Debug + Send {
    /// Configured fee, percent for relative models, cents/kWh for
    /// absolute ones
    fn grid_fee_rate(&self) -> Rate;

    /// Rate an offer is booked at when it enters this market.
    /// `source_rate` is `None` for offers posted directly by a device.
    fn update_incoming_offer_rate(&self, source_rate: Option<Rate>, original_rate: Rate) -> Rate;

    /// Rate a bid is booked at when it enters this market
    fn update_incoming_bid_rate(&self, source_rate: Option<Rate>, original_rate: Rate) -> Rate;

    /// Rate used when this market's agent forwards one of its offers out
    fn update_forwarded_offer_rate(&self, source_rate: Rate, original_rate: Rate) -> Rate;

    /// Rate used when this market's agent forwards one of its bids out
    fn update_forwarded_bid_rate(&self, source_rate: Rate, original_rate: Rate) -> Rate;

    /// Split the anchor trade rate into seller revenue, this market's
    /// fee and the rate the buyer pays here
    fn calculate_trade_price_and_fees(&self, info: &TradeBidOfferInfo) -> TradePriceBreakdown;

    /// Invert the bid-side fee chain: from a clearing rate seen where
    /// the bid ended up, recover the anchor rate at the bid's origin
    fn calculate_original_trade_rate_from_clearing_rate(
        &self,
        original_bid_rate: Rate,
        propagated_bid_rate: Rate,
        clearing_rate: Rate,
    ) -> Rate;

    /// Add this market's supply-side fee to the offer rates of a trade
    /// info that is travelling up towards the seller's origin market.
    /// With `ignore_fees` the rates pass through unchanged.
    fn propagate_original_offer_info_on_bid_trade(
        &self,
        info: &TradeBidOfferInfo,
        ignore_fees: bool,
    ) -> TradeBidOfferInfo;

    /// Subtract this market's demand-side fee from the bid rates of a
    /// trade info travelling down towards the buyer's origin market.
    /// `None` when the trade has no bid side (one-sided trades).
    fn propagate_original_bid_info_on_offer_trade(
        &self,
        info: &TradeBidOfferInfo,
    ) -> Option<TradeBidOfferInfo>;

    /// Substitute the offer-side rates with those of the local market
    /// offer the trade is being bridged onto
    fn update_forwarded_offer_trade_original_info(
        &self,
        info: &TradeBidOfferInfo,
        market_offer: &Offer,
    ) -> TradeBidOfferInfo;

    /// Substitute the bid-side rates with those of the local market bid
    /// the trade is being bridged onto
    fn update_forwarded_bid_trade_original_info(
        &self,
        info: &TradeBidOfferInfo,
        market_bid: &Bid,
    ) -> TradeBidOfferInfo;

    /// Fee collected when an offer is taken directly, without bid-side
    /// trade info (one-sided markets)
    fn one_sided_trade_fee(
        &self,
        original_price: Price,
        energy: Energy,
        energy_portion: Decimal,
    ) -> Price;
}
