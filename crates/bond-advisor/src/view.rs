//! Dashboard views
//!
//! Pure projections of market data and session state into what the page
//! shows. Nothing here mutates anything.

use chrono::NaiveDate;
use serde::Serialize;

use advisor_core::{Role, SessionState};

use crate::market::{MarketDataSource, SERIES_DAYS};
use crate::model::{Instrument, MarketStatus, RiskProfile};
use crate::session::AdvisorySession;

#[derive(Clone, Debug, Serialize)]
pub struct MetricView {
    pub label: &'static str,
    /// e.g. `2.1%`
    pub value: String,
    /// e.g. `-0.0123%`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
    /// Falling values are good news (yield down means price up)
    pub inverse: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusView {
    pub status: MarketStatus,
    pub label: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct SeriesView {
    pub name: &'static str,
    pub color: &'static str,
    pub width: u8,
    pub dashed: bool,
    pub points: Vec<(NaiveDate, f64)>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChartView {
    pub title: String,
    pub x_label: &'static str,
    pub y_label: &'static str,
    pub series: Vec<SeriesView>,
}

/// Everything above the chat
#[derive(Clone, Debug, Serialize)]
pub struct MarketView {
    pub as_of: NaiveDate,
    pub metrics: Vec<MetricView>,
    pub status: StatusView,
    pub chart: ChartView,
}

#[derive(Clone, Debug, Serialize)]
pub struct InstrumentRow {
    pub code: String,
    pub name: String,
    pub last_price: String,
    pub month_return: String,
    pub risk_tier: &'static str,
    pub suitability: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct MessageView {
    pub role: Role,
    pub content: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct RiskOption {
    pub value: RiskProfile,
    pub label: &'static str,
    pub selected: bool,
}

/// The chat column and its controls
#[derive(Clone, Debug, Serialize)]
pub struct TranscriptView {
    pub session_id: String,
    pub caption: String,
    pub state: SessionState,
    pub risk_options: Vec<RiskOption>,
    pub messages: Vec<MessageView>,
}

/// `None` when the source has no data
pub fn market_view(source: &dyn MarketDataSource) -> Option<MarketView> {
    let snapshot = source.snapshot()?;
    let series = source.yield_series();

    let metrics = vec![
        MetricView {
            label: "Domestic 10Y government bond yield",
            value: format!("{}%", snapshot.domestic_yield),
            delta: Some(format!("{}%", snapshot.domestic_change)),
            inverse: true,
        },
        MetricView {
            label: "US 10Y Treasury yield",
            value: format!("{}%", snapshot.foreign_yield),
            delta: None,
            inverse: false,
        },
    ];

    let chart = ChartView {
        title: format!("Government bond yields, last {SERIES_DAYS} days"),
        x_label: "Date",
        y_label: "Yield (%)",
        series: vec![
            SeriesView {
                name: "Domestic 10Y",
                color: "#d62728",
                width: 3,
                dashed: false,
                points: series.iter().map(|p| (p.date, p.domestic_yield)).collect(),
            },
            SeriesView {
                name: "US 10Y",
                color: "#1f77b4",
                width: 2,
                dashed: true,
                points: series.iter().map(|p| (p.date, p.foreign_yield)).collect(),
            },
        ],
    };

    Some(MarketView {
        as_of: snapshot.as_of,
        metrics,
        status: StatusView {
            status: snapshot.status,
            label: snapshot.status.label(),
        },
        chart,
    })
}

pub fn instrument_rows(instruments: &[Instrument]) -> Vec<InstrumentRow> {
    instruments
        .iter()
        .map(|i| InstrumentRow {
            code: i.code.clone(),
            name: i.name.clone(),
            last_price: i.last_price.to_string(),
            month_return: i.month_return_display(),
            risk_tier: i.risk_tier.label(),
            suitability: i.suitability.name(),
        })
        .collect()
}

pub fn transcript_view(session: &AdvisorySession) -> TranscriptView {
    TranscriptView {
        session_id: session.id().to_string(),
        caption: format!(
            "Your all-weather bond advisor | Mode: {}",
            session.risk_profile.label()
        ),
        state: session.chat.state(),
        risk_options: RiskProfile::ALL
            .iter()
            .map(|&p| RiskOption {
                value: p,
                label: p.label(),
                selected: p == session.risk_profile,
            })
            .collect(),
        messages: session
            .chat
            .messages()
            .iter()
            .map(|m| MessageView {
                role: m.role,
                content: m.content.clone(),
            })
            .collect(),
    }
}
