use thiserror::Error;

/// Domain-level errors for market operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    #[error("Invalid offer: energy must be positive")]
    InvalidOffer,

    #[error("Invalid bid: energy must be positive")]
    InvalidBid,

    #[error("Invalid trade: {0}")]
    InvalidTrade(String),

    #[error("Offer not found: {0}")]
    OfferNotFound(uuid::Uuid),

    #[error("Bid not found: {0}")]
    BidNotFound(uuid::Uuid),

    #[error("Market is read-only")]
    MarketReadOnly,

    #[error("Negative price not accepted: {0}")]
    NegativePrice(String),

    #[error("Operation not supported by this market kind: {0}")]
    WrongMarketKind(String),

    #[error("Invalid bid/offer pair: {0}")]
    InvalidBidOfferPair(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type MarketResult<T> = std::result::Result<T, MarketError>;
