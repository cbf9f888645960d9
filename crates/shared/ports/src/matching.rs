use gridex_core::{Bid, Energy, MarketId, Offer, Rate, TimeSlot, Timestamp};
use serde::{Deserialize, Serialize};

/// Immutable snapshot of one market's open orders, handed to a matching
/// algorithm each clearing round
#[derive(Debug, Clone)]
pub struct OrderBookView {
    pub market_id: MarketId,
    pub time_slot: TimeSlot,
    pub current_time: Timestamp,
    pub bids: Vec<Bid>,
    pub offers: Vec<Offer>,
}

/// One recommended trade produced by a matching algorithm.
///
/// Recommendations are advisory: the market re-validates each one
/// against its live book before settling it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidOfferMatch {
    pub market_id: MarketId,
    pub time_slot: TimeSlot,
    pub bid: Bid,
    pub offer: Offer,
    pub selected_energy: Energy,
    pub trade_rate: Rate,
}

/// Clearing strategy for a two-sided market
pub trait MatchingAlgorithm: Send {
    fn name(&self) -> &str;

    /// Propose trades for the current book. May be called repeatedly
    /// within one clearing round until it returns no recommendations.
    fn get_matches_recommendations(&mut self, view: &OrderBookView) -> Vec<BidOfferMatch>;
}
