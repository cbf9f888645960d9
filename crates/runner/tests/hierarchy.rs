//! Two-level hierarchy scenarios: order forwarding between a child and
//! a parent market, trade bridging, and grid fee collection along the
//! path.

use gridex_core::MarketId;
use gridex_market::{fees::GridFeeParams, Market};
use gridex_sim::{Area, CommodityConsumer, CommoditySupplier, SimulationConfig, World};
use rust_decimal_macros::dec;

/// Root market with a fee, demand at the root, supply one level down
fn fee_grid(grid_fees: GridFeeParams, house_fees: GridFeeParams) -> Area {
    Area::new("grid")
        .with_grid_fees(grid_fees)
        .add_child(Area::with_strategy(
            "load",
            Box::new(CommodityConsumer::new(dec!(1)).with_max_rate(dec!(12))),
        ))
        .add_child(
            Area::new("house")
                .with_grid_fees(house_fees)
                .add_child(Area::with_strategy(
                    "pv",
                    Box::new(CommoditySupplier::new(dec!(1)).with_rate(dec!(10))),
                )),
        )
}

fn run_one_slot(world: &mut World, ticks: u64) {
    let _ = env_logger::builder().is_test(true).try_init();
    let start = world.config().start_time;
    let tick_length = world.config().tick_length;
    world.market_cycle(start).unwrap();
    for tick in 0..ticks {
        world.tick(start + tick_length * tick as i32).unwrap();
    }
}

fn grid_market(world: &World) -> &Market {
    let id = *world.root().markets.open.values().next().unwrap();
    world.store().get(id).unwrap()
}

fn house_market(world: &World) -> &Market {
    let house = world
        .root()
        .children
        .iter()
        .find(|child| child.name == "house")
        .unwrap();
    let id: MarketId = *house.markets.open.values().next().unwrap();
    world.store().get(id).unwrap()
}

#[test]
fn constant_fee_is_added_back_when_a_trade_is_bridged_upward() {
    let root = fee_grid(
        GridFeeParams::constant(dec!(0.5)),
        GridFeeParams::default(),
    );
    let mut world = World::new(root, SimulationConfig::default()).unwrap();
    run_one_slot(&mut world, 6);

    // The child settles at the supply rate
    let house = house_market(&world);
    assert_eq!(house.trades().len(), 1);
    assert_eq!(house.trades()[0].traded_energy, dec!(1));
    assert_eq!(house.trades()[0].trade_price, dec!(10));
    assert_eq!(house.trades()[0].seller.origin, "pv");
    assert_eq!(house.market_fee(), dec!(0));

    // One level up the buyer pays the clearing price plus the grid fee
    let grid = grid_market(&world);
    assert_eq!(grid.trades().len(), 1);
    assert_eq!(grid.trades()[0].traded_energy, dec!(1));
    assert_eq!(grid.trades()[0].trade_price, dec!(10.5));
    assert_eq!(grid.trades()[0].buyer.origin, "load");
    assert_eq!(grid.market_fee(), dec!(0.5));

    let results = world.results();
    assert_eq!(results.trade_count, 2);
    assert_eq!(results.grid_fees, dec!(0.5));
}

#[test]
fn forwarded_bid_sheds_the_source_market_fee() {
    let root = fee_grid(
        GridFeeParams::constant(dec!(0.5)),
        GridFeeParams::default(),
    );
    // Push clearing past the inspection window so the forwarded orders
    // stay visible on the books
    let mut config = SimulationConfig::default();
    config.clearing_interval_ticks = 600;
    let mut world = World::new(root, config).unwrap();
    let start = world.config().start_time;
    let tick_length = world.config().tick_length;
    world.market_cycle(start).unwrap();
    for tick in 0..3u32 {
        world.tick(start + tick_length * tick as i32).unwrap();
    }

    let house = house_market(&world);
    // load's bid arrived in the child market with the fee subtracted
    let mirrored_bid = house
        .bids()
        .values()
        .find(|bid| bid.buyer.origin == "load")
        .expect("forwarded bid not found");
    assert_eq!(mirrored_bid.energy_rate(), dec!(11.5));
    assert_eq!(mirrored_bid.original_rate(), dec!(12));

    let grid = grid_market(&world);
    // pv's offer arrived in the parent market with the fee added
    let mirrored_offer = grid
        .offers()
        .values()
        .find(|offer| offer.seller.origin == "pv")
        .expect("forwarded offer not found");
    assert_eq!(mirrored_offer.energy_rate(), dec!(10.5));
    assert_eq!(mirrored_offer.original_rate(), dec!(10));
}

#[test]
fn percentage_fee_splits_revenue_and_fee_exactly() {
    let root = Area::new("grid")
        .with_grid_fees(GridFeeParams::percentage(dec!(10)))
        .add_child(Area::with_strategy(
            "load",
            Box::new(CommodityConsumer::new(dec!(1)).with_max_rate(dec!(22))),
        ))
        .add_child(
            Area::new("house")
                .with_grid_fees(GridFeeParams::percentage(dec!(0)))
                .add_child(Area::with_strategy(
                    "pv",
                    Box::new(CommoditySupplier::new(dec!(1)).with_rate(dec!(20))),
                )),
        );
    let mut world = World::new(root, SimulationConfig::default()).unwrap();
    run_one_slot(&mut world, 6);

    // The seller is paid its posted rate
    let house = house_market(&world);
    assert_eq!(house.trades().len(), 1);
    assert_eq!(house.trades()[0].trade_price, dec!(20));
    assert_eq!(house.market_fee(), dec!(0));

    // The buyer pays the posted rate marked up by 10%
    let grid = grid_market(&world);
    assert_eq!(grid.trades().len(), 1);
    assert_eq!(grid.trades()[0].trade_price, dec!(22));
    assert_eq!(grid.market_fee(), dec!(2));

    let results = world.results();
    assert_eq!(results.grid_fees, dec!(2));
}

#[test]
fn books_are_empty_once_the_chain_settles() {
    let root = fee_grid(
        GridFeeParams::constant(dec!(0.5)),
        GridFeeParams::default(),
    );
    let mut world = World::new(root, SimulationConfig::default()).unwrap();
    run_one_slot(&mut world, 6);

    assert!(grid_market(&world).offers().is_empty());
    assert!(grid_market(&world).bids().is_empty());
    assert!(house_market(&world).offers().is_empty());
    assert!(house_market(&world).bids().is_empty());
}

#[test]
fn rotation_carries_results_across_slots() {
    let mut config = SimulationConfig::default();
    config.slot_count = 2;
    let slot_length = config.slot_length;
    let ticks = config.ticks_per_slot();
    let tick_length = config.tick_length;
    let start = config.start_time;
    let root = fee_grid(
        GridFeeParams::constant(dec!(0.5)),
        GridFeeParams::default(),
    );
    let mut world = World::new(root, config).unwrap();

    for slot in 0..2u32 {
        let slot_start = start + slot_length * slot as i32;
        world.market_cycle(slot_start).unwrap();
        for tick in 0..ticks {
            world.tick(slot_start + tick_length * tick as i32).unwrap();
        }
    }

    let results = world.results();
    assert_eq!(results.trade_count, 4);
    assert_eq!(results.traded_energy, dec!(4));
    assert_eq!(results.grid_fees, dec!(1.0));
}
