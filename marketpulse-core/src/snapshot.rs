//! Canonical snapshot model and provider column normalization.
//!
//! Every provider returns rows keyed by its own field names (`turnoverratio`
//! for Sina, `f8` for EastMoney, ...). A declarative [`ColumnMap`] per provider
//! renames those into the canonical attribute set before anything downstream
//! sees the data. The map must be updated whenever a provider renames fields —
//! a recognized fragility of scraping unofficial endpoints.

use serde_json::Value;

use crate::source::SourceError;

/// One provider row before normalization: raw JSON object as returned
/// by the endpoint.
pub type RawRow = serde_json::Map<String, Value>;

/// A provider response: one raw JSON object per tradable instrument.
pub type RawTable = Vec<RawRow>;

/// One instrument's metrics after normalization and numeric coercion.
///
/// Non-numeric wire values ("-", "", null) become `None` rather than errors;
/// the aggregator decides what missing data means.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotRow {
    /// Percent of the free float traded this session.
    pub turnover_rate: Option<f64>,
    /// Session traded value, CNY.
    pub traded_value: Option<f64>,
    /// Percent change vs. prior close.
    pub price_change_pct: Option<f64>,
    /// Last traded price, CNY.
    pub last_price: Option<f64>,
    /// Float market capitalization, CNY (unit-converted). Only used by the
    /// fallback turnover computation.
    pub float_cap: Option<f64>,
}

/// Full-market snapshot for one pipeline run. Never persisted.
#[derive(Debug, Clone)]
pub struct RawSnapshot {
    pub rows: Vec<SpotRow>,
    /// Provider that produced the snapshot (for diagnostics).
    pub provider: String,
    /// Field names observed on the wire, sorted. Kept for schema-mismatch
    /// diagnostics after the raw table is gone.
    pub source_columns: Vec<String>,
}

/// Provider-specific field names for the canonical attribute set.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    /// May be absent from the wire entirely; the aggregator then falls back
    /// to traded_value / float_cap.
    pub turnover_rate: &'static str,
    pub traded_value: &'static str,
    pub price_change_pct: &'static str,
    pub last_price: &'static str,
    pub float_cap: Option<&'static str>,
    /// Multiplier converting the provider's float-cap unit into CNY
    /// (Sina reports 万元 → 1e4, EastMoney reports CNY → 1.0).
    pub float_cap_unit: f64,
}

impl ColumnMap {
    /// Columns that must be present for the snapshot to be usable at all.
    /// `turnover_rate` is excluded: its absence is handled by the fallback
    /// computation, not here.
    fn required(&self) -> [&'static str; 3] {
        [self.traded_value, self.price_change_pct, self.last_price]
    }
}

/// Rename and coerce a raw provider table into a canonical snapshot.
///
/// Fails with [`SourceError::SchemaMismatch`] if a required provider column is
/// missing from every row; the diagnostic lists the field names actually seen.
pub fn normalize(table: &RawTable, map: &ColumnMap, provider: &str) -> Result<RawSnapshot, SourceError> {
    if table.is_empty() {
        return Err(SourceError::EmptyResult {
            provider: provider.to_string(),
        });
    }

    let source_columns = observed_columns(table);

    for col in map.required() {
        if !source_columns.iter().any(|c| c == col) {
            return Err(SourceError::SchemaMismatch {
                provider: provider.to_string(),
                missing: col.to_string(),
                present: source_columns,
            });
        }
    }

    let rows = table
        .iter()
        .map(|raw| SpotRow {
            turnover_rate: raw.get(map.turnover_rate).and_then(coerce_numeric),
            traded_value: raw.get(map.traded_value).and_then(coerce_numeric),
            price_change_pct: raw.get(map.price_change_pct).and_then(coerce_numeric),
            last_price: raw.get(map.last_price).and_then(coerce_numeric),
            float_cap: map
                .float_cap
                .and_then(|key| raw.get(key))
                .and_then(coerce_numeric)
                .map(|v| v * map.float_cap_unit),
        })
        .collect();

    Ok(RawSnapshot {
        rows,
        provider: provider.to_string(),
        source_columns,
    })
}

/// Sorted union of field names across the table.
fn observed_columns(table: &RawTable) -> Vec<String> {
    let mut cols: Vec<String> = table
        .iter()
        .flat_map(|row| row.keys().cloned())
        .collect();
    cols.sort();
    cols.dedup();
    cols
}

/// Best-effort numeric coercion for wire values.
///
/// Providers mix JSON numbers with stringified numbers and placeholder
/// strings like "-" for halted instruments. Non-finite values are missing
/// too: a "NaN" string would otherwise flow through the ratio math and turn
/// into an unparseable `null` in the persisted history.
fn coerce_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_table(rows: Vec<Value>) -> RawTable {
        rows.into_iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    fn test_map() -> ColumnMap {
        ColumnMap {
            turnover_rate: "turnoverratio",
            traded_value: "amount",
            price_change_pct: "changepercent",
            last_price: "trade",
            float_cap: Some("nmc"),
            float_cap_unit: 1e4,
        }
    }

    #[test]
    fn coerces_numbers_and_numeric_strings() {
        assert_eq!(coerce_numeric(&json!(1.23)), Some(1.23));
        assert_eq!(coerce_numeric(&json!("1.23")), Some(1.23));
        assert_eq!(coerce_numeric(&json!(" 4.5 ")), Some(4.5));
        assert_eq!(coerce_numeric(&json!("-2.1")), Some(-2.1));
    }

    #[test]
    fn placeholders_become_missing_not_errors() {
        assert_eq!(coerce_numeric(&json!("-")), None);
        assert_eq!(coerce_numeric(&json!("")), None);
        assert_eq!(coerce_numeric(&json!(null)), None);
        assert_eq!(coerce_numeric(&json!(true)), None);
    }

    #[test]
    fn non_finite_values_become_missing() {
        assert_eq!(coerce_numeric(&json!("NaN")), None);
        assert_eq!(coerce_numeric(&json!("nan")), None);
        assert_eq!(coerce_numeric(&json!("inf")), None);
        assert_eq!(coerce_numeric(&json!("-inf")), None);
        assert_eq!(coerce_numeric(&json!("infinity")), None);
    }

    #[test]
    fn renames_provider_columns_to_canonical() {
        let table = to_table(vec![json!({
            "turnoverratio": 1.5,
            "amount": "200000000",
            "changepercent": -0.8,
            "trade": 12.34,
            "nmc": 500000.0
        })]);

        let snap = normalize(&table, &test_map(), "sina").unwrap();
        assert_eq!(snap.rows.len(), 1);
        let row = &snap.rows[0];
        assert_eq!(row.turnover_rate, Some(1.5));
        assert_eq!(row.traded_value, Some(2e8));
        assert_eq!(row.price_change_pct, Some(-0.8));
        assert_eq!(row.last_price, Some(12.34));
        // nmc is 万元; normalized float cap is CNY
        assert_eq!(row.float_cap, Some(5e9));
    }

    #[test]
    fn missing_required_column_reports_observed_columns() {
        let table = to_table(vec![json!({
            "turnoverratio": 1.5,
            "changepercent": -0.8,
            "trade": 12.34
        })]);

        match normalize(&table, &test_map(), "sina") {
            Err(SourceError::SchemaMismatch {
                missing, present, ..
            }) => {
                assert_eq!(missing, "amount");
                assert_eq!(present, vec!["changepercent", "trade", "turnoverratio"]);
            }
            other => panic!("expected SchemaMismatch, got {other:?}"),
        }
    }

    #[test]
    fn absent_turnover_column_is_tolerated() {
        let table = to_table(vec![json!({
            "amount": 1e8,
            "changepercent": 0.5,
            "trade": 10.0,
            "nmc": 100000.0
        })]);

        let snap = normalize(&table, &test_map(), "sina").unwrap();
        assert_eq!(snap.rows[0].turnover_rate, None);
        assert_eq!(snap.rows[0].float_cap, Some(1e9));
    }

    #[test]
    fn empty_table_is_an_empty_result() {
        let err = normalize(&Vec::new(), &test_map(), "sina").unwrap_err();
        assert!(matches!(err, SourceError::EmptyResult { .. }));
    }
}
