//! I/O around the scoring core: exchanges, cache, history and the
//! concurrent aggregation runtime.

pub mod aggregator;
pub mod cache;
pub mod exchange;
pub mod history;

pub use aggregator::{OfferAggregator, DEFAULT_SOURCE_TIMEOUT};
pub use cache::{CacheError, CachedOffer, OfferCache, OfferCacheSnapshot};
pub use exchange::{ExchangeClient, FileSource, OfferSource, SourceError};
pub use history::{HistoryEntry, HistoryError, SearchHistory};
