use serde::{Deserialize, Serialize};

use crate::values::Rate;

/// Rate bookkeeping carried with a trade across the market hierarchy.
///
/// The original/propagated pairs let each market on the settlement path
/// invert the grid fees applied while the orders were forwarded, so the
/// originating device's rate can be reconstructed exactly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeBidOfferInfo {
    /// Bid rate at the originating buyer (absent for one-sided trades)
    pub original_bid_rate: Option<Rate>,
    /// Bid rate as seen in the clearing market
    pub propagated_bid_rate: Option<Rate>,
    /// Offer rate at the originating seller
    pub original_offer_rate: Rate,
    /// Offer rate as seen in the clearing market
    pub propagated_offer_rate: Rate,
    /// Anchor rate the settling market derives the trade price from
    pub trade_rate: Rate,
}
