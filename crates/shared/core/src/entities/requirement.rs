use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::values::{Energy, Rate};

/// Hard matching constraint attached to an offer or a bid.
///
/// A recommendation is only valid when at least one requirement of each
/// order is satisfied (orders without requirements match anything).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    /// Counterparty origin must be one of these traders
    TradingPartners(Vec<Uuid>),
    /// Counterparty order must carry one of these energy types
    EnergyType(Vec<String>),
    /// Trade must move at least this much energy
    MinimumEnergy(Energy),
    /// Trade must move at most this much energy
    MaximumEnergy(Energy),
    /// Rate ceiling for a bid, rate floor for an offer
    Price(Rate),
}
