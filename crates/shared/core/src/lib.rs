//! Gridex Core
//!
//! Domain entities and value types for the gridex energy market simulator:
//! traders, offers, bids, trades and the events markets emit while a
//! simulation steps through its time slots.

mod entities;
mod events;
mod values;

pub use entities::{
    Bid, Offer, Requirement, Trade, TradeBidOfferInfo, TradedOrder, TraderDetails,
};
pub use events::MarketEvent;
pub use values::{
    Energy, MarketId, MarketKind, Price, Rate, Tick, TimeSlot, Timestamp, RATE_TOLERANCE,
};
