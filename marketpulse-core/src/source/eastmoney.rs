//! EastMoney per-exchange spot list provider.
//!
//! Fetches the `push2 clist` ranking API once per exchange segment (Shanghai,
//! Shenzhen, Beijing) and merges the results. A failed segment is logged and
//! skipped rather than aborting the whole fetch; only an empty union fails.
//!
//! Fields come back under opaque names (`f2` = last price, `f3` = change pct,
//! `f6` = traded value, `f8` = turnover rate, `f21` = float cap); the column
//! map translates them, and halted instruments carry "-" placeholders that
//! coercion turns into missing values.

use std::time::Duration;

use serde::Deserialize;

use super::{FetchLog, SourceError, SpotProvider};
use crate::snapshot::{ColumnMap, RawRow, RawTable};

/// Exchange segments, each an independent `fs` filter expression.
const SEGMENTS: [(&str, &str); 3] = [
    ("shanghai", "m:1+t:2,m:1+t:23"),
    ("shenzhen", "m:0+t:6,m:0+t:80"),
    ("beijing", "m:0+t:81+s:2048"),
];

// One oversized page per segment; each exchange lists well under 6000 A shares.
const PAGE_SIZE: usize = 6000;

#[derive(Debug, Deserialize)]
struct ClistResponse {
    data: Option<ClistData>,
}

#[derive(Debug, Deserialize)]
struct ClistData {
    #[allow(dead_code)]
    total: i64,
    diff: Vec<RawRow>,
}

/// EastMoney spot snapshot provider.
pub struct EastMoneyProvider {
    client: reqwest::blocking::Client,
    column_map: ColumnMap,
}

impl EastMoneyProvider {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            column_map: ColumnMap {
                turnover_rate: "f8",
                traded_value: "f6",
                price_change_pct: "f3",
                last_price: "f2",
                // f21 is already CNY
                float_cap: Some("f21"),
                float_cap_unit: 1.0,
            },
        }
    }

    fn segment_url(fs: &str) -> String {
        format!(
            "https://push2.eastmoney.com/api/qt/clist/get\
             ?pn=1&pz={PAGE_SIZE}&po=1&np=1&fltt=2&invt=2&fid=f12&fs={fs}\
             &fields=f2,f3,f6,f8,f12,f14,f21"
        )
    }

    fn fetch_segment(&self, fs: &str) -> Result<RawTable, SourceError> {
        let url = Self::segment_url(fs);

        let resp = self.client.get(&url).send().map_err(|e| SourceError::Network {
            provider: "eastmoney".into(),
            message: e.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::BadStatus {
                provider: "eastmoney".into(),
                status: status.as_u16(),
            });
        }

        let body: ClistResponse = resp.json().map_err(|e| SourceError::Decode {
            provider: "eastmoney".into(),
            message: e.to_string(),
        })?;

        // `data: null` means the filter matched nothing
        Ok(body.data.map(|d| d.diff).unwrap_or_default())
    }
}

impl Default for EastMoneyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SpotProvider for EastMoneyProvider {
    fn name(&self) -> &str {
        "eastmoney"
    }

    /// Union of all segments that fetched successfully. A single bad segment
    /// is non-fatal; an empty union is.
    fn fetch(&self, log: &dyn FetchLog) -> Result<RawTable, SourceError> {
        let mut table = RawTable::new();
        let mut failed_segments = 0;

        for (segment, fs) in SEGMENTS {
            match self.fetch_segment(fs) {
                Ok(rows) => table.extend(rows),
                Err(e) => {
                    log.on_segment_skipped("eastmoney", segment, &e);
                    failed_segments += 1;
                }
            }
        }

        if table.is_empty() {
            if failed_segments > 0 {
                return Err(SourceError::SegmentsAllFailed {
                    provider: "eastmoney".into(),
                });
            }
            return Err(SourceError::EmptyResult {
                provider: "eastmoney".into(),
            });
        }

        Ok(table)
    }

    fn column_map(&self) -> &ColumnMap {
        &self.column_map
    }
}
