//! Gridex Market
//!
//! The spot market order book: offers, bids, trades, residual splits on
//! partial acceptance, and the grid fee models that make fee application
//! invertible across the market hierarchy. Markets live in a
//! `MarketStore` arena and are referenced by id everywhere else.

pub mod fees;
mod market;
mod store;

pub use fees::{create_fee_policy, ConstantGridFee, GridFeeParams, PercentageGridFee};
pub use market::{AcceptBid, AcceptOffer, BidParams, Market, OfferParams};
pub use store::MarketStore;
