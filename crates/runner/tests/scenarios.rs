//! Single-market clearing scenarios exercised end to end through the
//! matching algorithms and the order book.

use chrono::Utc;
use gridex_core::{MarketKind, TradedOrder, TraderDetails};
use gridex_market::{fees::GridFeeParams, BidParams, Market, OfferParams};
use gridex_matching::{MatchingAlgorithm, PayAsBid, PayAsClear};
use rust_decimal_macros::dec;
use uuid::Uuid;

fn trader(name: &str) -> TraderDetails {
    TraderDetails::new(name, Uuid::new_v4())
}

fn feeless_market() -> Market {
    Market::new(
        "community",
        MarketKind::TwoSided,
        Utc::now(),
        &GridFeeParams::default(),
    )
    .unwrap()
}

#[test]
fn pay_as_bid_settles_at_the_offer_rate() {
    let mut market = feeless_market();
    market
        .offer(OfferParams::new(dec!(20), dec!(2), trader("pv")))
        .unwrap();
    market
        .bid(BidParams::new(dec!(24), dec!(2), trader("load")))
        .unwrap();

    let mut matcher = PayAsBid::new();
    let recommendations = matcher.get_matches_recommendations(&market.open_view());
    assert_eq!(recommendations.len(), 1);
    assert_eq!(recommendations[0].trade_rate, dec!(10));

    let performed = market.match_recommendations(recommendations).unwrap();
    assert!(performed);
    assert_eq!(market.trades().len(), 1);
    let trade = &market.trades()[0];
    assert_eq!(trade.traded_energy, dec!(2));
    assert_eq!(trade.trade_price, dec!(20));
    assert!(trade.residual.is_none());
    assert!(market.offers().is_empty());
    assert!(market.bids().is_empty());
}

#[test]
fn pay_as_clear_settles_every_pair_at_the_clearing_rate() {
    let mut market = feeless_market();
    market
        .offer(OfferParams::new(dec!(20), dec!(2), trader("pv")))
        .unwrap();
    market
        .bid(BidParams::new(dec!(24), dec!(2), trader("load")))
        .unwrap();

    let mut matcher = PayAsClear::new();
    let recommendations = matcher.get_matches_recommendations(&market.open_view());
    assert_eq!(recommendations.len(), 1);
    let clearing_rate = recommendations[0].trade_rate;

    market.match_recommendations(recommendations).unwrap();
    assert_eq!(market.trades().len(), 1);
    let trade = &market.trades()[0];
    assert_eq!(trade.traded_energy, dec!(2));
    assert_eq!(trade.trade_price, clearing_rate * dec!(2));
    // No fees configured, so the whole price is revenue
    assert_eq!(trade.fee_price, dec!(0));
    assert_eq!(market.market_fee(), dec!(0));
}

#[test]
fn partially_matched_offer_leaves_a_residual_at_the_same_rate() {
    let mut market = feeless_market();
    let offer = market
        .offer(OfferParams::new(dec!(50), dec!(5), trader("pv")))
        .unwrap();
    market
        .bid(BidParams::new(dec!(24), dec!(2), trader("load")))
        .unwrap();

    let mut matcher = PayAsBid::new();
    let recommendations = matcher.get_matches_recommendations(&market.open_view());
    market.match_recommendations(recommendations).unwrap();

    assert_eq!(market.trades().len(), 1);
    let trade = &market.trades()[0];
    assert_eq!(trade.traded_energy, dec!(2));
    let residual = match &trade.residual {
        Some(TradedOrder::Offer(residual)) => residual,
        other => panic!("expected a residual offer, got {:?}", other),
    };
    assert_eq!(residual.energy, dec!(3));
    assert_eq!(residual.energy_rate(), dec!(10));
    assert_ne!(residual.id, offer.id);
    // The residual stays live on the book
    assert!(market.offers().contains_key(&residual.id));
    assert!(market.bids().is_empty());
}

#[test]
fn repeated_clearing_rounds_drain_the_book() {
    let mut market = feeless_market();
    market
        .offer(OfferParams::new(dec!(30), dec!(3), trader("pv")))
        .unwrap();
    market
        .bid(BidParams::new(dec!(13), dec!(1), trader("load-a")))
        .unwrap();
    market
        .bid(BidParams::new(dec!(24), dec!(2), trader("load-b")))
        .unwrap();

    let mut matcher = PayAsBid::new();
    loop {
        let recommendations = matcher.get_matches_recommendations(&market.open_view());
        if recommendations.is_empty() {
            break;
        }
        if !market.match_recommendations(recommendations).unwrap() {
            break;
        }
    }
    assert!(market.offers().is_empty());
    assert!(market.bids().is_empty());
    let total: rust_decimal::Decimal = market.trades().iter().map(|t| t.traded_energy).sum();
    assert_eq!(total, dec!(3));
}
