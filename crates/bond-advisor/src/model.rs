//! Domain Models
//!
//! Yields are `f64` (they come out of a gaussian walk). Prices and returns use
//! `rust_decimal`; never use f64 for money!

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AdvisorError;

/// Round to 4 decimal places
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// One day of the two yield curves, in percent
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct YieldPoint {
    pub date: NaiveDate,

    /// Domestic 10-year government bond yield
    pub domestic_yield: f64,

    /// US 10-year Treasury yield
    pub foreign_yield: f64,
}

/// How much loss the user is willing to stomach
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

impl RiskProfile {
    pub const ALL: [Self; 3] = [Self::Conservative, Self::Balanced, Self::Aggressive];

    /// Short name, also used as the "suits" column of the instrument table
    pub fn name(self) -> &'static str {
        match self {
            Self::Conservative => "Conservative",
            Self::Balanced => "Balanced",
            Self::Aggressive => "Aggressive",
        }
    }

    /// Name plus the goal it stands for, as shown in the selector
    pub fn label(self) -> &'static str {
        match self {
            Self::Conservative => "Conservative (never lose principal)",
            Self::Balanced => "Balanced (beat inflation)",
            Self::Aggressive => "Aggressive (chase big swings)",
        }
    }
}

impl std::fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for RiskProfile {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(Self::Conservative),
            "balanced" => Ok(Self::Balanced),
            "aggressive" => Ok(Self::Aggressive),
            other => Err(AdvisorError::InvalidRiskProfile(other.to_string())),
        }
    }
}

/// Regulatory risk rating of a product (R1 = lowest, R5 = highest)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskTier {
    R1,
    R2,
    R3,
    R4,
    R5,
}

impl RiskTier {
    pub fn label(self) -> &'static str {
        match self {
            Self::R1 => "R1 very low risk",
            Self::R2 => "R2 low risk",
            Self::R3 => "R3 medium risk",
            Self::R4 => "R4 medium-high risk",
            Self::R5 => "R5 high risk",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A tradable bond ETF
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    /// Exchange code (e.g., "511260")
    pub code: String,

    pub name: String,

    pub last_price: Decimal,

    /// Return over the last month, in percent
    pub month_return: Decimal,

    pub risk_tier: RiskTier,

    /// Investor profile the product suits
    pub suitability: RiskProfile,
}

impl Instrument {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        last_price: Decimal,
        month_return: Decimal,
        risk_tier: RiskTier,
        suitability: RiskProfile,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            last_price,
            month_return,
            risk_tier,
            suitability,
        }
    }

    /// Signed percentage, e.g. `+0.12%` or `-0.02%`
    pub fn month_return_display(&self) -> String {
        if self.month_return.is_sign_negative() {
            format!("{}%", self.month_return)
        } else {
            format!("+{}%", self.month_return)
        }
    }
}

/// Where the domestic yield sits, read as a buy signal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    /// Yield below 2.2%: bond prices are high
    Overheated,
    RangeBound,
    /// Yield above 2.8%: bond prices are low
    Undervalued,
}

impl MarketStatus {
    pub fn classify(domestic_yield: f64) -> Self {
        if domestic_yield < 2.2 {
            Self::Overheated
        } else if domestic_yield > 2.8 {
            Self::Undervalued
        } else {
            Self::RangeBound
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Overheated => "Bull market high (bonds expensive)",
            Self::RangeBound => "Range-bound market",
            Self::Undervalued => "Bear market low (bonds cheap)",
        }
    }
}

/// The latest point of the series plus what the dashboard derives from it
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub as_of: NaiveDate,
    pub domestic_yield: f64,
    pub foreign_yield: f64,

    /// Domestic yield change against the previous day, rounded to 4 dp.
    /// Negative means bond prices rose.
    pub domestic_change: f64,

    pub status: MarketStatus,
}

impl MarketSnapshot {
    /// `None` for an empty series
    pub fn from_series(series: &[YieldPoint]) -> Option<Self> {
        let latest = series.last()?;
        let domestic_change = match series.len() {
            0 | 1 => 0.0,
            n => round4(latest.domestic_yield - series[n - 2].domestic_yield),
        };

        Some(Self {
            as_of: latest.date,
            domestic_yield: latest.domestic_yield,
            foreign_yield: latest.foreign_yield,
            domestic_change,
            status: MarketStatus::classify(latest.domestic_yield),
        })
    }
}
