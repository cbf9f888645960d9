use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{Requirement, TraderDetails};
use crate::values::{Energy, Price, Rate, TimeSlot, Timestamp};

/// Sell order for a quantity of energy in one market time slot.
///
/// `price` is the posted price in this market; `original_price` is the
/// price of the root order at the originating device, before any grid
/// fees were folded in along the forwarding chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub creation_time: Timestamp,
    pub time_slot: TimeSlot,
    pub price: Price,
    pub energy: Energy,
    pub original_price: Price,
    pub seller: TraderDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<Requirement>,
}

impl Offer {
    /// Posted price per unit energy
    pub fn energy_rate(&self) -> Rate {
        self.price / self.energy
    }

    /// Rate of the root order at the originating device
    pub fn original_rate(&self) -> Rate {
        self.original_price / self.energy
    }

    /// Grid fees folded into this offer so far (offers gain fees upward)
    pub fn accumulated_grid_fees(&self) -> Price {
        self.price - self.original_price
    }
}

/// Buy order for a quantity of energy in one market time slot.
///
/// Forwarded bids shed the source market's grid fee on each hop, so
/// `price <= original_price` along the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: Uuid,
    pub creation_time: Timestamp,
    pub time_slot: TimeSlot,
    pub price: Price,
    pub energy: Energy,
    pub original_price: Price,
    pub buyer: TraderDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<Requirement>,
}

impl Bid {
    /// Posted price per unit energy
    pub fn energy_rate(&self) -> Rate {
        self.price / self.energy
    }

    /// Rate of the root order at the originating device
    pub fn original_rate(&self) -> Rate {
        self.original_price / self.energy
    }

    /// Grid fees subtracted from this bid so far
    pub fn accumulated_grid_fees(&self) -> Price {
        self.original_price - self.price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn offer(price: Price, energy: Energy) -> Offer {
        Offer {
            id: Uuid::new_v4(),
            creation_time: Utc::now(),
            time_slot: Utc::now(),
            price,
            energy,
            original_price: price,
            seller: TraderDetails::new("pv", Uuid::new_v4()),
            attributes: None,
            requirements: vec![],
        }
    }

    #[test]
    fn energy_rate_divides_price_by_energy() {
        let o = offer(dec!(30), dec!(3));
        assert_eq!(o.energy_rate(), dec!(10));
        assert_eq!(o.original_rate(), dec!(10));
        assert_eq!(o.accumulated_grid_fees(), dec!(0));
    }

    #[test]
    fn offer_serializes_round_trip() {
        let o = offer(dec!(12.5), dec!(1));
        let json = serde_json::to_string(&o).unwrap();
        let back: Offer = serde_json::from_str(&json).unwrap();
        assert_eq!(o, back);
    }
}
