//! Provider access and the three fetch stages: watchlist, prices, fundamentals.

pub mod fixture;
pub mod fundamentals;
pub mod prices;
pub mod provider;
pub mod robinhood;
pub mod shape;
pub mod watchlist;

pub use fixture::{CallLog, Fixture, FixtureProvider, FixtureShape};
pub use fundamentals::{
    ChunkError, ChunkFailurePolicy, ChunkOutcome, ChunkStats, FundamentalsBatch,
    FundamentalsBatcher, DEFAULT_CHUNK_SIZE, DEFAULT_PACING,
};
pub use prices::{PriceFetcher, PriceMap};
pub use provider::{Credentials, MarketDataProvider, ProviderError, Session, SessionProvider};
pub use robinhood::RobinhoodClient;
pub use shape::ResponseShape;
pub use watchlist::{Watchlist, WatchlistError, WatchlistLoader};
