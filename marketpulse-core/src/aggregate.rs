//! Market breadth aggregation: one snapshot in, one dated stat point out.
//!
//! The reference date is an explicit input rather than a wall-clock read so
//! tests (and backfills) can supply fixed dates; [`market_today`] computes the
//! production value in the market's own time zone.

use chrono::NaiveDate;
use chrono_tz::Asia::Shanghai;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snapshot::{RawSnapshot, SpotRow};

/// One persisted record of market-wide statistics for a calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStatPoint {
    /// Trading date in the market's local calendar. Unique key in the history.
    pub date: NaiveDate,
    /// Arithmetic mean turnover rate, percent, 4dp.
    pub avg_turnover: f64,
    /// Median turnover rate, percent, 4dp.
    pub median_turnover: f64,
    /// Total traded value in hundred-millions of CNY (亿元), 2dp.
    pub total_amount: f64,
    /// Percent of instruments that closed up, 2dp.
    pub up_ratio: f64,
    /// Sample size after cleaning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_count: Option<usize>,
    /// True when turnover was derived from traded value / float cap instead
    /// of being provider-reported.
    #[serde(default, skip_serializing_if = "is_false")]
    pub turnover_estimated: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Structured error types for the aggregation stage.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error(
        "no turnover data and no way to derive it; provider columns present: {}",
        .present.join(", ")
    )]
    SchemaMismatch { present: Vec<String> },

    #[error("no rows left after cleaning; cannot compute market ratios")]
    EmptyAfterFilter,
}

/// Today's date in the market's reference time zone (Asia/Shanghai),
/// independent of the host's local time zone.
pub fn market_today() -> NaiveDate {
    chrono::Utc::now().with_timezone(&Shanghai).date_naive()
}

/// Compute the market-wide statistics for `date` from a normalized snapshot.
///
/// Cleaning drops rows with missing turnover or change-percent, and rows that
/// look halted/delisted (no positive price and no traded value). If the
/// provider reported no turnover at all, a per-row estimate is derived from
/// traded value / float cap and the result is flagged as estimated.
pub fn aggregate(snapshot: &RawSnapshot, date: NaiveDate) -> Result<MarketStatPoint, AggregateError> {
    let (rows, turnover_estimated) = with_turnover(snapshot)?;

    let kept: Vec<&SpotRow> = rows
        .iter()
        .filter(|r| r.turnover_rate.is_some() && r.price_change_pct.is_some())
        .filter(|r| !is_halted(r))
        .collect();

    if kept.is_empty() {
        return Err(AggregateError::EmptyAfterFilter);
    }

    let mut turnovers: Vec<f64> = kept.iter().filter_map(|r| r.turnover_rate).collect();
    turnovers.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = kept.len();
    let avg_turnover = turnovers.iter().sum::<f64>() / n as f64;
    let median_turnover = if n % 2 == 0 {
        (turnovers[n / 2 - 1] + turnovers[n / 2]) / 2.0
    } else {
        turnovers[n / 2]
    };

    let total_value: f64 = kept.iter().filter_map(|r| r.traded_value).sum();
    let up_count = kept
        .iter()
        .filter(|r| r.price_change_pct.is_some_and(|pct| pct > 0.0))
        .count();

    Ok(MarketStatPoint {
        date,
        avg_turnover: round_dp(avg_turnover, 4),
        median_turnover: round_dp(median_turnover, 4),
        total_amount: round_dp(total_value / 1e8, 2),
        up_ratio: round_dp(100.0 * up_count as f64 / n as f64, 2),
        stock_count: Some(n),
        turnover_estimated,
    })
}

/// Resolve turnover per row, estimating it from traded value / float cap when
/// the provider reported none at all.
///
/// Returns the rows to aggregate plus whether the estimate path was taken.
fn with_turnover(snapshot: &RawSnapshot) -> Result<(Vec<SpotRow>, bool), AggregateError> {
    let any_reported = snapshot.rows.iter().any(|r| r.turnover_rate.is_some());
    if any_reported {
        return Ok((snapshot.rows.clone(), false));
    }

    let estimated: Vec<SpotRow> = snapshot
        .rows
        .iter()
        .map(|r| {
            let mut row = r.clone();
            row.turnover_rate = match (r.traded_value, r.float_cap) {
                (Some(value), Some(cap)) if cap > 0.0 => Some(round_dp(value / cap * 100.0, 4)),
                _ => None,
            };
            row
        })
        .collect();

    if estimated.iter().all(|r| r.turnover_rate.is_none()) {
        return Err(AggregateError::SchemaMismatch {
            present: snapshot.source_columns.clone(),
        });
    }

    Ok((estimated, true))
}

/// Halted/delisted noise: neither a positive last price nor positive traded value.
fn is_halted(row: &SpotRow) -> bool {
    row.last_price.unwrap_or(0.0) <= 0.0 && row.traded_value.unwrap_or(0.0) <= 0.0
}

fn round_dp(x: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (x * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    fn row(turnover: f64, value: f64, pct: f64, price: f64) -> SpotRow {
        SpotRow {
            turnover_rate: Some(turnover),
            traded_value: Some(value),
            price_change_pct: Some(pct),
            last_price: Some(price),
            float_cap: None,
        }
    }

    fn snapshot(rows: Vec<SpotRow>) -> RawSnapshot {
        RawSnapshot {
            rows,
            provider: "test".into(),
            source_columns: vec!["amount".into(), "pct".into(), "price".into()],
        }
    }

    #[test]
    fn three_row_reference_scenario() {
        let snap = snapshot(vec![
            row(1.0, 1e8, 1.0, 10.0),
            row(2.0, 2e8, -1.0, 20.0),
            row(3.0, 3e8, 0.0, 30.0),
        ]);

        let point = aggregate(&snap, date()).unwrap();
        assert_eq!(point.avg_turnover, 2.0);
        assert_eq!(point.median_turnover, 2.0);
        assert_eq!(point.total_amount, 6.0);
        assert_eq!(point.up_ratio, 33.33);
        assert_eq!(point.stock_count, Some(3));
        assert!(!point.turnover_estimated);
    }

    #[test]
    fn even_row_count_takes_midpoint_median() {
        let snap = snapshot(vec![
            row(1.0, 1e8, 1.0, 10.0),
            row(2.0, 1e8, 1.0, 10.0),
            row(4.0, 1e8, 1.0, 10.0),
            row(8.0, 1e8, 1.0, 10.0),
        ]);

        let point = aggregate(&snap, date()).unwrap();
        assert_eq!(point.median_turnover, 3.0);
        assert_eq!(point.up_ratio, 100.0);
    }

    #[test]
    fn rows_missing_turnover_are_dropped_when_others_report_it() {
        let mut missing = row(0.0, 5e8, 2.0, 15.0);
        missing.turnover_rate = None;

        let snap = snapshot(vec![row(1.0, 1e8, 1.0, 10.0), missing]);
        let point = aggregate(&snap, date()).unwrap();
        assert_eq!(point.stock_count, Some(1));
        assert_eq!(point.avg_turnover, 1.0);
    }

    #[test]
    fn rows_missing_change_pct_are_dropped() {
        let mut missing = row(2.0, 2e8, 0.0, 10.0);
        missing.price_change_pct = None;

        let snap = snapshot(vec![row(1.0, 1e8, 1.0, 10.0), missing]);
        let point = aggregate(&snap, date()).unwrap();
        assert_eq!(point.stock_count, Some(1));
    }

    #[test]
    fn halted_rows_are_dropped() {
        let snap = snapshot(vec![
            row(1.0, 1e8, 1.0, 10.0),
            row(2.0, 0.0, 0.0, 0.0),
            row(3.0, -1.0, -5.0, 0.0),
        ]);

        let point = aggregate(&snap, date()).unwrap();
        assert_eq!(point.stock_count, Some(1));
    }

    #[test]
    fn all_rows_filtered_is_an_error() {
        let snap = snapshot(vec![row(1.0, 0.0, 1.0, 0.0)]);
        assert!(matches!(
            aggregate(&snap, date()),
            Err(AggregateError::EmptyAfterFilter)
        ));
    }

    #[test]
    fn turnover_estimated_from_float_cap_when_provider_reports_none() {
        // traded 1e8 CNY against a 5e9 CNY float → 2% turnover
        let make = |value: f64, cap: f64, pct: f64| SpotRow {
            turnover_rate: None,
            traded_value: Some(value),
            price_change_pct: Some(pct),
            last_price: Some(10.0),
            float_cap: Some(cap),
        };

        let snap = snapshot(vec![make(1e8, 5e9, 1.0), make(3e8, 1e10, -1.0)]);
        let point = aggregate(&snap, date()).unwrap();

        assert!(point.turnover_estimated);
        assert_eq!(point.avg_turnover, 2.5);
        assert_eq!(point.median_turnover, 2.5);
        assert_eq!(point.stock_count, Some(2));
    }

    #[test]
    fn no_turnover_and_no_float_cap_is_schema_mismatch() {
        let mut r = row(0.0, 1e8, 1.0, 10.0);
        r.turnover_rate = None;
        r.float_cap = None;

        match aggregate(&snapshot(vec![r]), date()) {
            Err(AggregateError::SchemaMismatch { present }) => {
                assert_eq!(present, vec!["amount", "pct", "price"]);
            }
            other => panic!("expected SchemaMismatch, got {other:?}"),
        }
    }

    #[test]
    fn aggregation_is_deterministic() {
        let snap = snapshot(vec![
            row(0.5, 2e8, 0.3, 11.0),
            row(1.7, 4e8, -2.2, 6.5),
            row(9.9, 8e8, 10.0, 88.0),
        ]);

        let a = aggregate(&snap, date()).unwrap();
        let b = aggregate(&snap, date()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rounding_precision_matches_output_contract() {
        let snap = snapshot(vec![
            row(1.23456789, 123_456_789.0, 1.0, 10.0),
            row(2.34567891, 234_567_891.0, -1.0, 10.0),
        ]);

        let point = aggregate(&snap, date()).unwrap();
        assert_eq!(point.avg_turnover, 1.7901);
        assert_eq!(point.total_amount, 3.58);
        assert_eq!(point.up_ratio, 50.0);
    }
}
