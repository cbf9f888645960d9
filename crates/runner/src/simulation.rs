use std::collections::HashMap;
use std::time::Duration;

use gridex_core::{Energy, Price};
use gridex_ports::MarketResult;
use gridex_sim::{Area, SimulationConfig, World};

/// Outcome of a finished (or aborted) run
#[derive(Debug, Clone)]
pub struct SimulationResults {
    pub completed_ticks: u64,
    pub completed_slots: u64,
    pub trade_count: u64,
    pub traded_energy: Energy,
    pub trade_volume: Price,
    pub grid_fees: Price,
    pub trades_per_area: HashMap<String, u64>,
    pub success: bool,
    pub error: Option<String>,
}

/// Owns a `World` and advances it slot by slot, tick by tick.
pub struct Simulation {
    world: World,
}

impl Simulation {
    pub fn new(root: Area, config: SimulationConfig) -> MarketResult<Self> {
        Ok(Self {
            world: World::new(root, config)?,
        })
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    fn step(&mut self, tick: u64) -> MarketResult<()> {
        let (start_time, tick_length, ticks_per_slot) = {
            let config = self.world.config();
            (
                config.start_time,
                config.tick_length,
                config.ticks_per_slot(),
            )
        };
        let now = start_time + tick_length * tick as i32;
        if tick % ticks_per_slot == 0 {
            self.world.market_cycle(now)?;
        }
        self.world.tick(now)
    }

    /// Run the whole simulation as fast as possible
    pub fn run(mut self) -> SimulationResults {
        let total_ticks = self.world.config().total_ticks();
        log::info!("starting simulation, {} ticks", total_ticks);
        for tick in 0..total_ticks {
            if let Err(err) = self.step(tick) {
                log::error!("simulation aborted at tick {}: {}", tick, err);
                return self.finish(tick, Some(err.to_string()));
            }
        }
        self.finish(total_ticks, None)
    }

    /// Run paced against the wall clock, sleeping `tick_interval`
    /// between ticks
    pub async fn run_paced(mut self, tick_interval: Duration) -> SimulationResults {
        let total_ticks = self.world.config().total_ticks();
        log::info!(
            "starting paced simulation, {} ticks every {:?}",
            total_ticks,
            tick_interval
        );
        for tick in 0..total_ticks {
            if let Err(err) = self.step(tick) {
                log::error!("simulation aborted at tick {}: {}", tick, err);
                return self.finish(tick, Some(err.to_string()));
            }
            tokio::time::sleep(tick_interval).await;
        }
        self.finish(total_ticks, None)
    }

    fn finish(self, completed_ticks: u64, error: Option<String>) -> SimulationResults {
        let stats = self.world.results();
        let ticks_per_slot = self.world.config().ticks_per_slot();
        let results = SimulationResults {
            completed_ticks,
            completed_slots: completed_ticks / ticks_per_slot,
            trade_count: stats.trade_count,
            traded_energy: stats.traded_energy,
            trade_volume: stats.trade_volume,
            grid_fees: stats.grid_fees,
            trades_per_area: stats.trades_per_area,
            success: error.is_none(),
            error,
        };
        log::info!(
            "simulation finished: {} slots, {} trades, {} kWh traded, {} fees collected",
            results.completed_slots,
            results.trade_count,
            results.traded_energy,
            results.grid_fees
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridex_sim::{CommodityConsumer, CommoditySupplier};
    use rust_decimal_macros::dec;

    fn single_house() -> Area {
        Area::new("grid").add_child(
            Area::new("house")
                .add_child(Area::with_strategy(
                    "pv",
                    Box::new(CommoditySupplier::new(dec!(1)).with_rate(dec!(10))),
                ))
                .add_child(Area::with_strategy(
                    "load",
                    Box::new(CommodityConsumer::new(dec!(1)).with_max_rate(dec!(30))),
                )),
        )
    }

    #[test]
    fn run_completes_every_slot_and_trades_each_one() {
        let mut config = SimulationConfig::default();
        config.slot_count = 3;
        let simulation = Simulation::new(single_house(), config).unwrap();
        let results = simulation.run();
        assert!(results.success);
        assert_eq!(results.completed_slots, 3);
        assert_eq!(results.trade_count, 3);
        assert_eq!(results.traded_energy, dec!(3));
        assert_eq!(results.trades_per_area["house"], 3);
    }

    #[tokio::test]
    async fn paced_run_matches_the_fast_run() {
        let mut config = SimulationConfig::default();
        config.slot_count = 1;
        let simulation = Simulation::new(single_house(), config).unwrap();
        let results = simulation.run_paced(Duration::from_millis(0)).await;
        assert!(results.success);
        assert_eq!(results.trade_count, 1);
        assert_eq!(results.traded_energy, dec!(1));
    }
}
