use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Bid, Offer, TradeBidOfferInfo, TraderDetails};
use crate::values::{Energy, Price, Rate, TimeSlot, Timestamp};

/// Snapshot of the order a trade settled, priced at the final trade price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TradedOrder {
    Offer(Offer),
    Bid(Bid),
}

impl TradedOrder {
    pub fn id(&self) -> Uuid {
        match self {
            TradedOrder::Offer(o) => o.id,
            TradedOrder::Bid(b) => b.id,
        }
    }

    pub fn price(&self) -> Price {
        match self {
            TradedOrder::Offer(o) => o.price,
            TradedOrder::Bid(b) => b.price,
        }
    }

    pub fn energy(&self) -> Energy {
        match self {
            TradedOrder::Offer(o) => o.energy,
            TradedOrder::Bid(b) => b.energy,
        }
    }

    pub fn energy_rate(&self) -> Rate {
        match self {
            TradedOrder::Offer(o) => o.energy_rate(),
            TradedOrder::Bid(b) => b.energy_rate(),
        }
    }
}

/// Completed exchange of energy between a buyer and a seller.
///
/// Appended to the market's trade log and broadcast as a market event so
/// agents can bridge the trade into neighbouring markets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub creation_time: Timestamp,
    pub time_slot: TimeSlot,
    pub traded: TradedOrder,
    pub seller: TraderDetails,
    pub buyer: TraderDetails,
    pub traded_energy: Energy,
    /// Total amount paid, grid fee of the settling market included
    pub trade_price: Price,
    /// Grid fee this market collected on the trade
    pub fee_price: Price,
    /// Untraded remainder re-posted to the book, if the order split
    pub residual: Option<TradedOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_bid_trade_info: Option<TradeBidOfferInfo>,
    /// Set when the same trade was already counted in another market's
    /// statistics (bid and offer settled by the same pair acceptance)
    pub already_tracked: bool,
}

impl Trade {
    /// Final price per unit energy
    pub fn trade_rate(&self) -> Rate {
        self.trade_price / self.traded_energy
    }

    pub fn is_bid_trade(&self) -> bool {
        matches!(self.traded, TradedOrder::Bid(_))
    }

    pub fn is_offer_trade(&self) -> bool {
        matches!(self.traded, TradedOrder::Offer(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn trade_rate_and_kind() {
        let seller = TraderDetails::new("pv", Uuid::new_v4());
        let buyer = TraderDetails::new("load", Uuid::new_v4());
        let now = Utc::now();
        let offer = Offer {
            id: Uuid::new_v4(),
            creation_time: now,
            time_slot: now,
            price: dec!(20),
            energy: dec!(2),
            original_price: dec!(20),
            seller: seller.clone(),
            attributes: None,
            requirements: vec![],
        };
        let trade = Trade {
            id: Uuid::new_v4(),
            creation_time: now,
            time_slot: now,
            traded: TradedOrder::Offer(offer),
            seller,
            buyer,
            traded_energy: dec!(2),
            trade_price: dec!(20),
            fee_price: dec!(0),
            residual: None,
            offer_bid_trade_info: None,
            already_tracked: false,
        };
        assert_eq!(trade.trade_rate(), dec!(10));
        assert!(trade.is_offer_trade());
        assert!(!trade.is_bid_trade());
    }
}
