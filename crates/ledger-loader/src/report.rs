//! Plain-text rendering of period summaries.

use ledger_core::error::Result;
use ledger_core::models::PeriodSummary;
use ledger_data::aggregator::totals;

const PERIOD_WIDTH: usize = 10;
const AMOUNT_WIDTH: usize = 16;

/// Fixed-width table with a totals footer.
pub fn render_table(periods: &[PeriodSummary]) -> Result<String> {
    if periods.is_empty() {
        return Ok("No ledger rows.\n".to_string());
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:<PERIOD_WIDTH$}  {:>AMOUNT_WIDTH$}  {:>AMOUNT_WIDTH$}\n",
        "Period", "Predicted", "Realized"
    ));
    out.push_str(&format!(
        "{}\n",
        "-".repeat(PERIOD_WIDTH + 2 * (AMOUNT_WIDTH + 2))
    ));
    for p in periods {
        out.push_str(&format!(
            "{:<PERIOD_WIDTH$}  {:>AMOUNT_WIDTH$}  {:>AMOUNT_WIDTH$}\n",
            p.period,
            p.predicted.to_string(),
            p.realized.to_string()
        ));
    }

    let t = totals(periods)?;
    out.push_str(&format!(
        "{:<PERIOD_WIDTH$}  {:>AMOUNT_WIDTH$}  {:>AMOUNT_WIDTH$}\n",
        "Total",
        t.predicted.to_string(),
        t.realized.to_string()
    ));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn summary(period: &str, predicted: &str, realized: &str) -> PeriodSummary {
        PeriodSummary {
            period: period.to_string(),
            predicted: Decimal::from_str(predicted).unwrap(),
            realized: Decimal::from_str(realized).unwrap(),
        }
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render_table(&[]).unwrap(), "No ledger rows.\n");
    }

    #[test]
    fn test_render_rows_and_total() {
        let out = render_table(&[
            summary("2025-01", "300", "270"),
            summary("2025-02", "150.25", "120"),
        ])
        .unwrap();
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("Period"));
        assert!(lines[2].starts_with("2025-01"));
        assert!(lines[2].ends_with("270"));
        assert!(lines[3].contains("150.25"));
        assert!(lines[4].starts_with("Total"));
        assert!(lines[4].contains("450.25"));
        assert!(lines[4].ends_with("390"));
    }

    #[test]
    fn test_render_total_overflow_is_an_error() {
        let big = "50000000000000000000000000000";
        assert!(render_table(&[summary("2025-01", big, "0"), summary("2025-02", big, "0")]).is_err());
    }
}
