mod order;
mod requirement;
mod trade;
mod trade_info;
mod trader;

pub use order::{Bid, Offer};
pub use requirement::Requirement;
pub use trade::{Trade, TradedOrder};
pub use trade_info::TradeBidOfferInfo;
pub use trader::TraderDetails;
