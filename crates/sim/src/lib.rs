//! Gridex Sim
//!
//! The hierarchical layer of the simulator: areas arranged in a tree,
//! per-area spot markets rotating through time slots, market agents
//! forwarding orders between adjacent markets, and the strategies that
//! post orders for leaf devices.

mod agent;
mod area;
mod config;
mod strategy;
mod world;

pub use agent::MarketAgent;
pub use area::{Area, AreaMarkets};
pub use config::SimulationConfig;
pub use strategy::{
    CommodityConsumer, CommoditySupplier, MarketMaker, Strategy, StrategyContext,
};
pub use world::{TradeStats, World};
