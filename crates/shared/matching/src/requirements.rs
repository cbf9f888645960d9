use gridex_core::{Bid, Energy, Offer, Rate, Requirement, RATE_TOLERANCE};
use serde_json::Value;

/// Validates the hard constraints attached to orders before a
/// recommended trade is settled.
///
/// An order with no requirements matches anything; otherwise at least
/// one of its requirements must hold for the proposed counterparty,
/// energy and rate.
pub struct RequirementsSatisfiedChecker;

impl RequirementsSatisfiedChecker {
    pub fn is_satisfied(
        bid: &Bid,
        offer: &Offer,
        clearing_rate: Rate,
        selected_energy: Energy,
    ) -> bool {
        Self::offer_requirements_satisfied(bid, offer, clearing_rate, selected_energy)
            && Self::bid_requirements_satisfied(bid, offer, clearing_rate, selected_energy)
    }

    fn offer_requirements_satisfied(
        bid: &Bid,
        offer: &Offer,
        clearing_rate: Rate,
        selected_energy: Energy,
    ) -> bool {
        if offer.requirements.is_empty() {
            return true;
        }
        offer.requirements.iter().any(|req| match req {
            Requirement::TradingPartners(partners) => {
                partners.contains(&bid.buyer.origin_uuid) || partners.contains(&bid.buyer.uuid)
            }
            Requirement::EnergyType(types) => Self::has_energy_type(&bid.attributes, types),
            Requirement::MinimumEnergy(min) => selected_energy >= *min,
            Requirement::MaximumEnergy(max) => selected_energy <= *max,
            // Rate floor for the seller
            Requirement::Price(floor) => clearing_rate + RATE_TOLERANCE >= *floor,
        })
    }

    fn bid_requirements_satisfied(
        bid: &Bid,
        offer: &Offer,
        clearing_rate: Rate,
        selected_energy: Energy,
    ) -> bool {
        if bid.requirements.is_empty() {
            return true;
        }
        bid.requirements.iter().any(|req| match req {
            Requirement::TradingPartners(partners) => {
                partners.contains(&offer.seller.origin_uuid) || partners.contains(&offer.seller.uuid)
            }
            Requirement::EnergyType(types) => Self::has_energy_type(&offer.attributes, types),
            Requirement::MinimumEnergy(min) => selected_energy >= *min,
            Requirement::MaximumEnergy(max) => selected_energy <= *max,
            // Rate ceiling for the buyer
            Requirement::Price(ceiling) => clearing_rate <= *ceiling + RATE_TOLERANCE,
        })
    }

    fn has_energy_type(attributes: &Option<Value>, accepted: &[String]) -> bool {
        attributes
            .as_ref()
            .and_then(|attrs| attrs.get("energy_type"))
            .and_then(Value::as_str)
            .map(|energy_type| accepted.iter().any(|t| t == energy_type))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gridex_core::TraderDetails;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use uuid::Uuid;

    fn offer_with(attributes: Option<Value>, requirements: Vec<Requirement>) -> Offer {
        Offer {
            id: Uuid::new_v4(),
            creation_time: Utc::now(),
            time_slot: Utc::now(),
            price: dec!(10),
            energy: dec!(1),
            original_price: dec!(10),
            seller: TraderDetails::new("pv", Uuid::new_v4()),
            attributes,
            requirements,
        }
    }

    fn bid_with(requirements: Vec<Requirement>) -> Bid {
        Bid {
            id: Uuid::new_v4(),
            creation_time: Utc::now(),
            time_slot: Utc::now(),
            price: dec!(12),
            energy: dec!(1),
            original_price: dec!(12),
            buyer: TraderDetails::new("load", Uuid::new_v4()),
            attributes: None,
            requirements,
        }
    }

    #[test]
    fn no_requirements_always_satisfied() {
        let bid = bid_with(vec![]);
        let offer = offer_with(None, vec![]);
        assert!(RequirementsSatisfiedChecker::is_satisfied(
            &bid,
            &offer,
            dec!(10),
            dec!(1)
        ));
    }

    #[test]
    fn energy_type_requirement_checks_offer_attributes() {
        let bid = bid_with(vec![Requirement::EnergyType(vec!["PV".to_string()])]);
        let green = offer_with(Some(json!({"energy_type": "PV"})), vec![]);
        let grey = offer_with(None, vec![]);
        assert!(RequirementsSatisfiedChecker::is_satisfied(
            &bid,
            &green,
            dec!(10),
            dec!(1)
        ));
        assert!(!RequirementsSatisfiedChecker::is_satisfied(
            &bid,
            &grey,
            dec!(10),
            dec!(1)
        ));
    }

    #[test]
    fn trading_partner_requirement_matches_origin() {
        let bid = bid_with(vec![]);
        let offer = offer_with(
            None,
            vec![Requirement::TradingPartners(vec![bid.buyer.origin_uuid])],
        );
        assert!(RequirementsSatisfiedChecker::is_satisfied(
            &bid,
            &offer,
            dec!(10),
            dec!(1)
        ));
        let other = offer_with(
            None,
            vec![Requirement::TradingPartners(vec![Uuid::new_v4()])],
        );
        assert!(!RequirementsSatisfiedChecker::is_satisfied(
            &bid,
            &other,
            dec!(10),
            dec!(1)
        ));
    }

    #[test]
    fn bid_price_requirement_caps_clearing_rate() {
        let bid = bid_with(vec![Requirement::Price(dec!(11))]);
        let offer = offer_with(None, vec![]);
        assert!(RequirementsSatisfiedChecker::is_satisfied(
            &bid,
            &offer,
            dec!(10),
            dec!(1)
        ));
        assert!(!RequirementsSatisfiedChecker::is_satisfied(
            &bid,
            &offer,
            dec!(12),
            dec!(1)
        ));
    }
}
