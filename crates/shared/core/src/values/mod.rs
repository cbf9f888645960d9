use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

/// Price value in currency cents - uses Decimal for precision
pub type Price = Decimal;

/// Energy amount in kWh - uses Decimal for precision
pub type Energy = Decimal;

/// Price per unit energy, cents/kWh
pub type Rate = Decimal;

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

/// Delivery interval a market trades energy for, identified by its start
pub type TimeSlot = DateTime<Utc>;

/// Simulation tick counter
pub type Tick = u64;

/// Handle for a market stored in the market arena
pub type MarketId = Uuid;

/// Tolerance for rate comparisons after division
pub const RATE_TOLERANCE: Decimal = dec!(0.00001);

/// Which side(s) of the book a market accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MarketKind {
    /// Offers only; demand takes offers directly
    OneSided,
    /// Offers and bids, cleared by a matching algorithm
    TwoSided,
}
