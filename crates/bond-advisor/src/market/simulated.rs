//! Simulated Market
//!
//! For demos and tests. A seeded gaussian random walk for the two yield
//! curves and a fixed pool of four bond ETFs.

use std::sync::OnceLock;

use chrono::{Days, Local, NaiveDate};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use rust_decimal_macros::dec;

use super::MarketDataSource;
use crate::model::{round4, Instrument, RiskProfile, RiskTier, YieldPoint};

/// Seed used when `MARKET_SEED` is not set
pub const DEFAULT_SEED: u64 = 42;

/// Length of the generated series
pub const SERIES_DAYS: usize = 60;

const DOMESTIC_ANCHOR: f64 = 2.10;
const FOREIGN_ANCHOR: f64 = 4.20;

/// Daily standard deviation, in percentage points
const DOMESTIC_VOLATILITY: f64 = 0.02;
const FOREIGN_VOLATILITY: f64 = 0.05;

/// Deterministic market built from a seed
pub struct SimulatedMarket {
    seed: u64,
    end_date: NaiveDate,
    series: OnceLock<Vec<YieldPoint>>,
    instruments: OnceLock<Vec<Instrument>>,
}

impl SimulatedMarket {
    /// Series ending today
    pub fn new(seed: u64) -> Self {
        Self::ending_on(seed, Local::now().date_naive())
    }

    /// Series ending on `end_date`
    pub fn ending_on(seed: u64, end_date: NaiveDate) -> Self {
        Self {
            seed,
            end_date,
            series: OnceLock::new(),
            instruments: OnceLock::new(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl Default for SimulatedMarket {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl MarketDataSource for SimulatedMarket {
    fn yield_series(&self) -> &[YieldPoint] {
        self.series.get_or_init(|| {
            tracing::debug!(seed = self.seed, end = %self.end_date, "generating yield series");
            random_walk(self.seed, self.end_date)
        })
    }

    fn instruments(&self) -> &[Instrument] {
        self.instruments.get_or_init(bond_etf_pool)
    }

    fn name(&self) -> &str {
        "SimulatedMarket"
    }
}

/// Walk both curves from their anchors.
///
/// The walk carries unrounded values; only the emitted points are rounded.
/// Day 0 is the anchor itself.
fn random_walk(seed: u64, end_date: NaiveDate) -> Vec<YieldPoint> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut domestic = DOMESTIC_ANCHOR;
    let mut foreign = FOREIGN_ANCHOR;

    let mut points = Vec::with_capacity(SERIES_DAYS);
    for day in 0..SERIES_DAYS {
        if day > 0 {
            let dz: f64 = rng.sample(StandardNormal);
            let fz: f64 = rng.sample(StandardNormal);
            domestic += dz * DOMESTIC_VOLATILITY;
            foreign += fz * FOREIGN_VOLATILITY;
        }

        let days_back = (SERIES_DAYS - 1 - day) as u64;
        let date = end_date
            .checked_sub_days(Days::new(days_back))
            .unwrap_or(end_date);

        points.push(YieldPoint {
            date,
            domestic_yield: round4(domestic),
            foreign_yield: round4(foreign),
        });
    }
    points
}

fn bond_etf_pool() -> Vec<Instrument> {
    vec![
        Instrument::new(
            "511260",
            "10Y Treasury ETF",
            dec!(103.5),
            dec!(0.12),
            RiskTier::R2,
            RiskProfile::Balanced,
        ),
        Instrument::new(
            "511010",
            "Treasury ETF",
            dec!(120.1),
            dec!(0.05),
            RiskTier::R2,
            RiskProfile::Conservative,
        ),
        Instrument::new(
            "511090",
            "30Y Treasury ETF",
            dec!(105.2),
            dec!(0.80),
            RiskTier::R3,
            RiskProfile::Aggressive,
        ),
        Instrument::new(
            "511220",
            "Municipal Bond ETF",
            dec!(99.8),
            dec!(-0.02),
            RiskTier::R3,
            RiskProfile::Balanced,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn end() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 31).unwrap()
    }

    #[test]
    fn test_same_seed_same_series() {
        let a = SimulatedMarket::ending_on(DEFAULT_SEED, end());
        let b = SimulatedMarket::ending_on(DEFAULT_SEED, end());
        assert_eq!(a.yield_series().len(), SERIES_DAYS);
        assert_eq!(a.yield_series(), b.yield_series());
    }

    #[test]
    fn test_different_seed_differs() {
        let a = SimulatedMarket::ending_on(1, end());
        let b = SimulatedMarket::ending_on(2, end());
        assert_ne!(a.yield_series(), b.yield_series());
    }

    #[test]
    fn test_first_point_is_anchor() {
        let market = SimulatedMarket::ending_on(DEFAULT_SEED, end());
        let first = market.yield_series()[0];
        assert_eq!(first.domestic_yield, 2.10);
        assert_eq!(first.foreign_yield, 4.20);
    }

    #[test]
    fn test_values_finite_and_four_decimals() {
        let market = SimulatedMarket::ending_on(DEFAULT_SEED, end());
        for point in market.yield_series() {
            for value in [point.domestic_yield, point.foreign_yield] {
                assert!(value.is_finite());
                assert_eq!(round4(value), value);
            }
        }
    }

    #[test]
    fn test_dates_consecutive_ending_on_end_date() {
        let market = SimulatedMarket::ending_on(DEFAULT_SEED, end());
        let series = market.yield_series();
        assert_eq!(series.last().unwrap().date, end());
        for pair in series.windows(2) {
            assert_eq!(pair[1].date - pair[0].date, chrono::Duration::days(1));
        }
    }

    #[test]
    fn test_series_cached() {
        let market = SimulatedMarket::ending_on(DEFAULT_SEED, end());
        let first = market.yield_series().as_ptr();
        let second = market.yield_series().as_ptr();
        assert_eq!(first, second);
    }

    #[test]
    fn test_instrument_pool() {
        let market = SimulatedMarket::default();
        let pool = market.instruments();
        assert_eq!(pool.len(), 4);
        for instrument in pool {
            assert!(!instrument.code.is_empty());
            assert!(!instrument.name.is_empty());
            assert!(!instrument.risk_tier.label().is_empty());
        }
        assert_eq!(pool[0].code, "511260");
        assert_eq!(pool[3].code, "511220");
    }
}
