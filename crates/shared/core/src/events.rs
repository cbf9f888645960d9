use serde::{Deserialize, Serialize};

use crate::entities::{Bid, Offer, Trade};

/// Notification a market queues whenever its book changes.
///
/// The simulation drains these after every operation batch and routes
/// them to market agents and strategies until no market has any left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MarketEvent {
    Offer { offer: Offer },
    OfferSplit { original: Offer, accepted: Offer, residual: Offer },
    OfferDeleted { offer: Offer },
    OfferTraded { trade: Trade },
    Bid { bid: Bid },
    BidSplit { original: Bid, accepted: Bid, residual: Bid },
    BidDeleted { bid: Bid },
    BidTraded { trade: Trade },
}
