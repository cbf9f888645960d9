//! Gridex Ports
//!
//! Port definitions (traits) for the gridex market simulator.
//! These define the boundaries between the market engine, the grid fee
//! models and the matching algorithms that clear two-sided markets.

mod error;
mod fees;
mod matching;

pub use error::{MarketError, MarketResult};
pub use fees::{GridFeePolicy, TradePriceBreakdown};
pub use matching::{BidOfferMatch, MatchingAlgorithm, OrderBookView};
