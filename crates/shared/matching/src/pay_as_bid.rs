use std::collections::HashSet;

use gridex_core::{Bid, Offer, RATE_TOLERANCE};
use gridex_ports::{BidOfferMatch, MatchingAlgorithm, OrderBookView};

use crate::RequirementsSatisfiedChecker;

/// Pay-as-bid clearing: every matched pair trades at the posted rate of
/// the sell side, so each seller is paid exactly what they asked for.
///
/// Pairing favours sellers: the most expensive offers pick the most
/// expensive compatible bids first.
pub struct PayAsBid;

impl PayAsBid {
    pub fn new() -> Self {
        Self
    }

    fn sorted_bids(view: &OrderBookView) -> Vec<Bid> {
        let mut bids = view.bids.clone();
        // Descending by rate; id as deterministic tie-break
        bids.sort_by(|a, b| {
            b.energy_rate()
                .cmp(&a.energy_rate())
                .then_with(|| a.id.cmp(&b.id))
        });
        bids
    }

    fn sorted_offers(view: &OrderBookView) -> Vec<Offer> {
        let mut offers = view.offers.clone();
        offers.sort_by(|a, b| {
            b.energy_rate()
                .cmp(&a.energy_rate())
                .then_with(|| a.id.cmp(&b.id))
        });
        offers
    }
}

impl Default for PayAsBid {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchingAlgorithm for PayAsBid {
    fn name(&self) -> &str {
        "Pay-as-Bid"
    }

    fn get_matches_recommendations(&mut self, view: &OrderBookView) -> Vec<BidOfferMatch> {
        let sorted_bids = Self::sorted_bids(view);
        let sorted_offers = Self::sorted_offers(view);

        let mut selected_bids: HashSet<uuid::Uuid> = HashSet::new();
        let mut recommendations = Vec::new();

        for offer in &sorted_offers {
            let offer_rate = offer.energy_rate();
            for bid in &sorted_bids {
                if selected_bids.contains(&bid.id) {
                    continue;
                }
                if offer.seller.name == bid.buyer.name {
                    continue;
                }
                if offer_rate - bid.energy_rate() > RATE_TOLERANCE {
                    continue;
                }
                let selected_energy = bid.energy.min(offer.energy);
                if !RequirementsSatisfiedChecker::is_satisfied(
                    bid,
                    offer,
                    offer_rate,
                    selected_energy,
                ) {
                    continue;
                }
                selected_bids.insert(bid.id);
                recommendations.push(BidOfferMatch {
                    market_id: view.market_id,
                    time_slot: view.time_slot,
                    bid: bid.clone(),
                    offer: offer.clone(),
                    selected_energy,
                    trade_rate: offer_rate,
                });
                break;
            }
        }

        log::debug!(
            "pay-as-bid matched {} pair(s) out of {} bid(s) / {} offer(s)",
            recommendations.len(),
            view.bids.len(),
            view.offers.len()
        );
        recommendations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gridex_core::TraderDetails;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn make_offer(seller: &str, rate: Decimal, energy: Decimal) -> Offer {
        Offer {
            id: Uuid::new_v4(),
            creation_time: Utc::now(),
            time_slot: Utc::now(),
            price: rate * energy,
            energy,
            original_price: rate * energy,
            seller: TraderDetails::new(seller, Uuid::new_v4()),
            attributes: None,
            requirements: vec![],
        }
    }

    fn make_bid(buyer: &str, rate: Decimal, energy: Decimal) -> Bid {
        Bid {
            id: Uuid::new_v4(),
            creation_time: Utc::now(),
            time_slot: Utc::now(),
            price: rate * energy,
            energy,
            original_price: rate * energy,
            buyer: TraderDetails::new(buyer, Uuid::new_v4()),
            attributes: None,
            requirements: vec![],
        }
    }

    fn view(bids: Vec<Bid>, offers: Vec<Offer>) -> OrderBookView {
        OrderBookView {
            market_id: Uuid::new_v4(),
            time_slot: Utc::now(),
            current_time: Utc::now(),
            bids,
            offers,
        }
    }

    #[test]
    fn matches_crossing_pair_at_offer_rate() {
        let mut algo = PayAsBid::new();
        let v = view(
            vec![make_bid("load", dec!(12), dec!(1))],
            vec![make_offer("pv", dec!(10), dec!(1))],
        );
        let recs = algo.get_matches_recommendations(&v);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].trade_rate, dec!(10));
        assert_eq!(recs[0].selected_energy, dec!(1));
    }

    #[test]
    fn no_match_when_offer_rate_above_bid() {
        let mut algo = PayAsBid::new();
        let v = view(
            vec![make_bid("load", dec!(9), dec!(1))],
            vec![make_offer("pv", dec!(10), dec!(1))],
        );
        assert!(algo.get_matches_recommendations(&v).is_empty());
    }

    #[test]
    fn expensive_offers_take_expensive_bids_first() {
        let mut algo = PayAsBid::new();
        let cheap_offer = make_offer("pv-a", dec!(5), dec!(1));
        let dear_offer = make_offer("pv-b", dec!(8), dec!(1));
        let cheap_bid = make_bid("load-a", dec!(9), dec!(1));
        let dear_bid = make_bid("load-b", dec!(11), dec!(1));
        let v = view(
            vec![cheap_bid.clone(), dear_bid.clone()],
            vec![cheap_offer, dear_offer.clone()],
        );
        let recs = algo.get_matches_recommendations(&v);
        assert_eq!(recs.len(), 2);
        // Highest offer gets the highest bid
        assert_eq!(recs[0].offer.id, dear_offer.id);
        assert_eq!(recs[0].bid.id, dear_bid.id);
    }

    #[test]
    fn never_pairs_a_trader_with_itself() {
        let mut algo = PayAsBid::new();
        let v = view(
            vec![make_bid("house", dec!(12), dec!(1))],
            vec![make_offer("house", dec!(10), dec!(1))],
        );
        assert!(algo.get_matches_recommendations(&v).is_empty());
    }

    #[test]
    fn partial_energy_uses_smaller_side() {
        let mut algo = PayAsBid::new();
        let v = view(
            vec![make_bid("load", dec!(12), dec!(5))],
            vec![make_offer("pv", dec!(10), dec!(2))],
        );
        let recs = algo.get_matches_recommendations(&v);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].selected_energy, dec!(2));
    }
}
