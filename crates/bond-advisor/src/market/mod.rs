//! Market Data
//!
//! Sources of yield curves and the instrument pool.

mod simulated;

pub use simulated::{SimulatedMarket, DEFAULT_SEED, SERIES_DAYS};

use crate::model::{Instrument, MarketSnapshot, YieldPoint};

/// Market data source (Strategy pattern)
///
/// Implementations compute their data at most once; every call returns the
/// same slices for the life of the source.
pub trait MarketDataSource: Send + Sync {
    /// Chronological yield series, oldest first
    fn yield_series(&self) -> &[YieldPoint];

    /// Instrument pool in display order
    fn instruments(&self) -> &[Instrument];

    /// Latest point with derived metrics
    fn snapshot(&self) -> Option<MarketSnapshot> {
        MarketSnapshot::from_series(self.yield_series())
    }

    /// Source name
    fn name(&self) -> &str;
}
