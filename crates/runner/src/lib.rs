//! Gridex Runner
//!
//! Drives a `World` through its configured slots and ticks, either as
//! fast as possible or paced against the wall clock, and aggregates the
//! run's results.

mod simulation;

pub use simulation::{Simulation, SimulationResults};
