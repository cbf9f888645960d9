use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use gridex_core::{MarketKind, Rate, Tick, TimeSlot, Timestamp};
use gridex_ports::{MarketError, MarketResult};
use rust_decimal_macros::dec;

/// Immutable run parameters, fixed before the first tick.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Start of the first market slot
    pub start_time: Timestamp,
    /// Length of one market slot
    pub slot_length: Duration,
    /// Length of one tick; must divide the slot length
    pub tick_length: Duration,
    /// How many slots the simulation runs for
    pub slot_count: u64,
    /// How many future slots have an open market at any time
    pub market_count: usize,
    /// Whether markets carry bids as well as offers
    pub market_kind: MarketKind,
    /// Name of the matching algorithm, resolved through the factory
    pub matching_algorithm: String,
    /// Two-sided markets are cleared every this many ticks
    pub clearing_interval_ticks: Tick,
    /// Offers younger than this many ticks are not forwarded
    pub min_offer_age: Tick,
    /// Bids younger than this many ticks are not forwarded
    pub min_bid_age: Tick,
    /// Settled markets each area keeps after rotation; `None` retains
    /// the full history
    pub keep_past_markets: Option<usize>,
    /// Reference rate per hour of day, cents/kWh
    pub market_maker_rate: BTreeMap<u32, Rate>,
    /// Seed for the tick-ordering shuffle
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_time: default_start_time(),
            slot_length: Duration::minutes(15),
            tick_length: Duration::seconds(15),
            slot_count: 4,
            market_count: 1,
            market_kind: MarketKind::TwoSided,
            matching_algorithm: "pay-as-bid".to_string(),
            clearing_interval_ticks: 1,
            min_offer_age: 2,
            min_bid_age: 2,
            keep_past_markets: Some(1),
            market_maker_rate: BTreeMap::new(),
            seed: 0,
        }
    }
}

fn default_start_time() -> DateTime<Utc> {
    // Midnight of a fixed day keeps default runs reproducible
    match Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0) {
        chrono::LocalResult::Single(t) => t,
        _ => Utc::now(),
    }
}

impl SimulationConfig {
    pub fn ticks_per_slot(&self) -> u64 {
        (self.slot_length.num_seconds() / self.tick_length.num_seconds()) as u64
    }

    pub fn total_ticks(&self) -> u64 {
        self.slot_count * self.ticks_per_slot()
    }

    pub fn end_time(&self) -> Timestamp {
        self.start_time + self.slot_length * self.slot_count as i32
    }

    /// Reference rate for the hour of day the slot falls into
    pub fn market_maker_rate_at(&self, slot: TimeSlot) -> Rate {
        self.market_maker_rate
            .get(&slot.hour())
            .copied()
            .unwrap_or(dec!(30))
    }

    pub fn validate(&self) -> MarketResult<()> {
        if self.tick_length.num_seconds() <= 0 || self.slot_length.num_seconds() <= 0 {
            return Err(MarketError::Config(
                "tick and slot lengths must be positive".to_string(),
            ));
        }
        if self.slot_length.num_seconds() % self.tick_length.num_seconds() != 0 {
            return Err(MarketError::Config(format!(
                "slot length {}s is not a multiple of tick length {}s",
                self.slot_length.num_seconds(),
                self.tick_length.num_seconds()
            )));
        }
        if self.market_count == 0 {
            return Err(MarketError::Config(
                "at least one open market is required".to_string(),
            ));
        }
        if self.clearing_interval_ticks == 0 {
            return Err(MarketError::Config(
                "clearing interval must be at least one tick".to_string(),
            ));
        }
        if self.slot_count == 0 {
            return Err(MarketError::Config(
                "simulation needs at least one slot".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SimulationConfig::default();
        config.validate().unwrap();
        assert_eq!(config.ticks_per_slot(), 60);
        assert_eq!(config.total_ticks(), 240);
    }

    #[test]
    fn misaligned_tick_length_is_rejected() {
        let config = SimulationConfig {
            slot_length: Duration::minutes(15),
            tick_length: Duration::seconds(7),
            ..SimulationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn market_maker_rate_falls_back_to_default() {
        let mut config = SimulationConfig::default();
        config.market_maker_rate.insert(0, dec!(25));
        assert_eq!(config.market_maker_rate_at(config.start_time), dec!(25));
        let noon = config.start_time + Duration::hours(12);
        assert_eq!(config.market_maker_rate_at(noon), dec!(30));
    }
}
