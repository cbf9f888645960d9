use std::collections::{HashMap, VecDeque};

use gridex_core::{Bid, Energy, Offer, Rate, Timestamp, RATE_TOLERANCE};
use gridex_ports::{BidOfferMatch, MatchingAlgorithm, OrderBookView};
use rust_decimal::Decimal;

/// Merit-order clearing: cumulative supply and demand curves are
/// intersected and every matched pair trades at the single clearing
/// rate.
pub struct PayAsClear {
    /// Clearing rate per clearing round, for inspection
    clearing_history: Vec<(Timestamp, Rate)>,
}

impl PayAsClear {
    pub fn new() -> Self {
        Self {
            clearing_history: Vec::new(),
        }
    }

    pub fn clearing_history(&self) -> &[(Timestamp, Rate)] {
        &self.clearing_history
    }

    fn sorted_bids(view: &OrderBookView) -> Vec<Bid> {
        let mut bids = view.bids.clone();
        // Demand curve: most expensive bids first
        bids.sort_by(|a, b| {
            b.energy_rate()
                .cmp(&a.energy_rate())
                .then_with(|| a.id.cmp(&b.id))
        });
        bids
    }

    fn sorted_offers(view: &OrderBookView) -> Vec<Offer> {
        let mut offers = view.offers.clone();
        // Supply curve: cheapest offers first
        offers.sort_by(|a, b| {
            a.energy_rate()
                .cmp(&b.energy_rate())
                .then_with(|| a.id.cmp(&b.id))
        });
        offers
    }

    /// Cumulative energy at each rate step along a sorted order list
    fn accumulated_energy_per_rate<T>(orders: &[T], rate_of: impl Fn(&T) -> Rate, energy_of: impl Fn(&T) -> Energy) -> Vec<(Rate, Energy)> {
        let mut energy_sum = Decimal::ZERO;
        let mut accumulated = Vec::with_capacity(orders.len());
        for order in orders {
            energy_sum += energy_of(order);
            accumulated.push((rate_of(order), energy_sum));
        }
        accumulated
    }

    /// Intersect the demand curve (ascending rates) with the supply
    /// curve. Returns the clearing rate and the energy cleared at it.
    fn clearing_point_from_curves(
        bids_ascending: &[(Rate, Energy)],
        offers: &[(Rate, Energy)],
    ) -> Option<(Rate, Energy)> {
        for (b_rate, b_energy) in bids_ascending {
            for (o_rate, o_energy) in offers {
                if *o_rate <= *b_rate + RATE_TOLERANCE && o_energy >= b_energy {
                    return Some((*b_rate, *b_energy));
                }
            }
        }
        // Cumulative demand exceeds cumulative supply everywhere: clear
        // whatever supply is available at the highest crossing rate
        let mut last = None;
        for (b_rate, b_energy) in bids_ascending {
            for (o_rate, o_energy) in offers {
                if *o_rate <= *b_rate + RATE_TOLERANCE && o_energy < b_energy {
                    last = Some((*b_rate, *o_energy));
                }
            }
        }
        last
    }

    fn get_clearing_point(
        sorted_bids: &[Bid],
        sorted_offers: &[Offer],
    ) -> Option<(Rate, Energy)> {
        if sorted_bids.is_empty() || sorted_offers.is_empty() {
            return None;
        }
        let cumulative_bids =
            Self::accumulated_energy_per_rate(sorted_bids, Bid::energy_rate, |b| b.energy);
        let cumulative_offers =
            Self::accumulated_energy_per_rate(sorted_offers, Offer::energy_rate, |o| o.energy);
        let bids_ascending: Vec<(Rate, Energy)> =
            cumulative_bids.into_iter().rev().collect();
        Self::clearing_point_from_curves(&bids_ascending, &cumulative_offers)
    }

    /// Walk the merit order and assign cleared energy greedily, keeping
    /// track of partially consumed offers so a single offer can cover
    /// several bids.
    fn create_bid_offer_matchings(
        view: &OrderBookView,
        clearing_rate: Rate,
        mut clearing_energy: Energy,
        sorted_offers: Vec<Offer>,
        sorted_bids: Vec<Bid>,
    ) -> Vec<BidOfferMatch> {
        let mut offers: VecDeque<Offer> = sorted_offers.into();
        let mut residual_offer_energy: HashMap<uuid::Uuid, Energy> = HashMap::new();
        let mut matchings = Vec::new();

        'bids: for bid in sorted_bids {
            let mut bid_energy = bid.energy;
            while bid_energy > RATE_TOLERANCE {
                let offer = match offers.pop_front() {
                    Some(offer) => offer,
                    None => break 'bids,
                };
                let offer_energy = residual_offer_energy
                    .get(&offer.id)
                    .copied()
                    .unwrap_or(offer.energy);
                if offer_energy - bid_energy > RATE_TOLERANCE {
                    // Bid fully covered; the offer keeps its remainder
                    // at the front of the queue for the next bid
                    residual_offer_energy.insert(offer.id, offer_energy - bid_energy);
                    matchings.push(BidOfferMatch {
                        market_id: view.market_id,
                        time_slot: view.time_slot,
                        bid: bid.clone(),
                        offer: offer.clone(),
                        selected_energy: bid_energy,
                        trade_rate: clearing_rate,
                    });
                    clearing_energy -= bid_energy;
                    offers.push_front(offer);
                    bid_energy = Decimal::ZERO;
                } else {
                    // Offer exhausted by this bid; move to the next one
                    matchings.push(BidOfferMatch {
                        market_id: view.market_id,
                        time_slot: view.time_slot,
                        bid: bid.clone(),
                        offer: offer.clone(),
                        selected_energy: offer_energy,
                        trade_rate: clearing_rate,
                    });
                    bid_energy -= offer_energy;
                    residual_offer_energy.remove(&offer.id);
                    clearing_energy -= offer_energy;
                }
                if clearing_energy <= RATE_TOLERANCE {
                    return matchings;
                }
            }
        }
        matchings
    }
}

impl Default for PayAsClear {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchingAlgorithm for PayAsClear {
    fn name(&self) -> &str {
        "Pay-as-Clear"
    }

    fn get_matches_recommendations(&mut self, view: &OrderBookView) -> Vec<BidOfferMatch> {
        let sorted_bids = Self::sorted_bids(view);
        let sorted_offers = Self::sorted_offers(view);

        let (clearing_rate, clearing_energy) =
            match Self::get_clearing_point(&sorted_bids, &sorted_offers) {
                Some(clearing) => clearing,
                None => return Vec::new(),
            };

        if clearing_energy > Decimal::ZERO {
            log::info!(
                "market clearing rate: {} clearing energy: {}",
                clearing_rate,
                clearing_energy
            );
            self.clearing_history.push((view.current_time, clearing_rate));
        }

        Self::create_bid_offer_matchings(
            view,
            clearing_rate,
            clearing_energy,
            sorted_offers,
            sorted_bids,
        )
    }
}
