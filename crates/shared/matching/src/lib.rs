//! Gridex Matching Algorithms
//!
//! Clearing strategies for two-sided markets, plus the requirement
//! checker that validates recommended trades.

mod pay_as_bid;
mod pay_as_clear;
mod requirements;

pub use pay_as_bid::PayAsBid;
pub use pay_as_clear::PayAsClear;
pub use requirements::RequirementsSatisfiedChecker;

// Re-export the trait from ports for convenience
pub use gridex_ports::{BidOfferMatch, MatchingAlgorithm, OrderBookView};

/// Factory function to create matching algorithms by name
pub fn create_matching_algorithm(algorithm_type: &str) -> Box<dyn MatchingAlgorithm> {
    match algorithm_type.to_lowercase().as_str() {
        "pay-as-clear" | "payasclear" => Box::new(PayAsClear::new()),
        _ => Box::new(PayAsBid::new()), // Default
    }
}
