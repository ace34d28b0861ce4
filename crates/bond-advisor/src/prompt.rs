//! Advisory prompt
//!
//! The system prompt is rebuilt for every turn from the latest snapshot, the
//! risk profile and the instrument pool. Conversation history never goes in.

use chrono::NaiveDate;

use crate::model::{Instrument, RiskProfile};

/// First message of every new session
pub const GREETING: &str = "Hi! I'm your bond advisor. Have you looked at the chart above? \
The market is getting interesting. What would you like to know?";

const ROLE_AND_PRINCIPLES: &str = "\
You are a bond fund manager with 10 years of experience, now advising ordinary individual investors.

[Task]
Answer the user's question based on the [Current market data] and [User profile] below.

[Principles]
1. Speak plainly: do not pile up jargon. If you mention \"duration\" or \"YTM\", explain it again in everyday words.
2. Take a position: do not sit on the fence. At a bull-market high, state the risk clearly; at a low, point out the opportunity.
3. Use the data: quote the specific figures below in your answer (for example: \"the yield is now 2.1%...\").
4. Recommend from the pool: if the user asks what to buy, pick the best match from the [Selected bond ETF pool] first.";

/// Build the system prompt for one turn.
///
/// Pure: identical inputs give byte-identical output.
pub fn build_system_prompt(
    as_of: NaiveDate,
    domestic_yield: f64,
    foreign_yield: f64,
    risk_profile: RiskProfile,
    instruments: &[Instrument],
) -> String {
    let table = render_instrument_table(instruments);

    format!(
        "{ROLE_AND_PRINCIPLES}

[Background]
[Current market data]
- Data date: {date}
- Domestic 10Y government bond yield: {domestic_yield}% (the lower the yield, the more expensive the bond)
- US 10Y Treasury yield: {foreign_yield}%

[User profile]
- Risk preference: {risk}

[Selected bond ETF pool]
{table}",
        date = as_of.format("%Y-%m-%d"),
        risk = risk_profile.label(),
    )
}

/// Plain-text table with padded columns, header first.
///
/// Text columns are left-aligned, numeric columns right-aligned.
pub fn render_instrument_table(instruments: &[Instrument]) -> String {
    const HEADERS: [&str; 6] = ["Code", "Name", "Last", "1M return", "Risk tier", "Suits"];
    const RIGHT_ALIGNED: [bool; 6] = [false, false, true, true, false, false];

    let rows: Vec<[String; 6]> = instruments
        .iter()
        .map(|i| {
            [
                i.code.clone(),
                i.name.clone(),
                i.last_price.to_string(),
                i.month_return_display(),
                i.risk_tier.label().to_string(),
                i.suitability.name().to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let render_line = |cells: [&str; 6]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(widths)
            .zip(RIGHT_ALIGNED)
            .map(|((cell, width), right)| {
                if right {
                    format!("{cell:>width$}")
                } else {
                    format!("{cell:<width$}")
                }
            })
            .collect();
        padded.join("  ").trim_end().to_string()
    };

    let mut lines = vec![render_line(HEADERS)];
    for row in &rows {
        lines.push(render_line([
            row[0].as_str(),
            row[1].as_str(),
            row[2].as_str(),
            row[3].as_str(),
            row[4].as_str(),
            row[5].as_str(),
        ]));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{MarketDataSource, SimulatedMarket};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn pool() -> Vec<Instrument> {
        SimulatedMarket::default().instruments().to_vec()
    }

    #[test]
    fn test_prompt_is_pure() {
        let instruments = pool();
        let a = build_system_prompt(date(), 2.10, 4.20, RiskProfile::Balanced, &instruments);
        let b = build_system_prompt(date(), 2.10, 4.20, RiskProfile::Balanced, &instruments);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_prompt_embeds_context() {
        let prompt = build_system_prompt(date(), 2.1, 4.2, RiskProfile::Aggressive, &pool());
        assert!(prompt.contains("Data date: 2026-10-16"));
        assert!(prompt.contains("yield: 2.1% (the lower the yield, the more expensive the bond)"));
        assert!(prompt.contains("US 10Y Treasury yield: 4.2%"));
        assert!(prompt.contains("Risk preference: Aggressive (chase big swings)"));
        assert!(prompt.contains("511090"));
        assert!(prompt.starts_with("You are a bond fund manager"));
    }

    #[test]
    fn test_prompt_changes_with_risk_profile() {
        let instruments = pool();
        let a = build_system_prompt(date(), 2.1, 4.2, RiskProfile::Conservative, &instruments);
        let b = build_system_prompt(date(), 2.1, 4.2, RiskProfile::Balanced, &instruments);
        assert_ne!(a, b);
    }

    #[test]
    fn test_table_layout() {
        let table = render_instrument_table(&pool());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("Code    Name"));
        assert!(lines[1].starts_with("511260  10Y Treasury ETF"));
        assert!(lines[1].contains("+0.12%"));
        assert!(lines[4].contains("-0.02%"));
        assert!(lines.iter().all(|l| !l.ends_with(' ')));

        // columns line up: "Risk tier" starts at the same offset everywhere
        let offset = lines[0].find("Risk tier").unwrap();
        assert_eq!(&lines[1][offset..offset + 2], "R2");
        assert_eq!(&lines[3][offset..offset + 2], "R3");
    }

    #[test]
    fn test_empty_pool_renders_header_only() {
        assert_eq!(render_instrument_table(&[]).lines().count(), 1);
    }
}
