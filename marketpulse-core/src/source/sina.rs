//! Sina Finance spot list provider.
//!
//! Pages through the `Market_Center.getHQNodeData` JSON endpoint over the
//! `hs_a` node (all Shanghai + Shenzhen A shares). Sina has no official API;
//! field names and pagination behavior change without notice, which is why
//! this provider sits in a fallback chain rather than being trusted alone.

use std::time::Duration;

use serde_json::Value;

use super::{FetchLog, SourceError, SpotProvider};
use crate::snapshot::{ColumnMap, RawTable};

const NODE: &str = "hs_a";
const PAGE_SIZE: usize = 100;
// ~5400 listed A shares; anything past this is a pagination bug upstream.
const MAX_PAGES: usize = 120;

/// Sina Finance spot snapshot provider.
pub struct SinaProvider {
    client: reqwest::blocking::Client,
    column_map: ColumnMap,
}

impl SinaProvider {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            column_map: ColumnMap {
                turnover_rate: "turnoverratio",
                traded_value: "amount",
                price_change_pct: "changepercent",
                last_price: "trade",
                // Sina reports float cap (nmc) in 万元
                float_cap: Some("nmc"),
                float_cap_unit: 1e4,
            },
        }
    }

    fn page_url(page: usize) -> String {
        format!(
            "https://vip.stock.finance.sina.com.cn/quotes_service/api/json_v2.php\
             /Market_Center.getHQNodeData\
             ?page={page}&num={PAGE_SIZE}&sort=symbol&asc=1&node={NODE}&symbol=&_s_r_a=init"
        )
    }

    /// Fetch one page. Past the last page Sina returns `null` or `[]`;
    /// both map to an empty table.
    fn fetch_page(&self, page: usize) -> Result<RawTable, SourceError> {
        let url = Self::page_url(page);

        let resp = self.client.get(&url).send().map_err(|e| SourceError::Network {
            provider: "sina".into(),
            message: e.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::BadStatus {
                provider: "sina".into(),
                status: status.as_u16(),
            });
        }

        let body: Value = resp.json().map_err(|e| SourceError::Decode {
            provider: "sina".into(),
            message: format!("page {page}: {e}"),
        })?;

        match body {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => Ok(row),
                    other => Err(SourceError::Decode {
                        provider: "sina".into(),
                        message: format!("page {page}: expected object row, got {other}"),
                    }),
                })
                .collect(),
            other => Err(SourceError::Decode {
                provider: "sina".into(),
                message: format!("page {page}: expected array, got {other}"),
            }),
        }
    }
}

impl Default for SinaProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SpotProvider for SinaProvider {
    fn name(&self) -> &str {
        "sina"
    }

    fn fetch(&self, _log: &dyn FetchLog) -> Result<RawTable, SourceError> {
        let mut table = RawTable::new();

        for page in 1..=MAX_PAGES {
            let rows = self.fetch_page(page)?;
            if rows.is_empty() {
                break;
            }
            let short_page = rows.len() < PAGE_SIZE;
            table.extend(rows);
            if short_page {
                break;
            }
        }

        if table.is_empty() {
            return Err(SourceError::EmptyResult {
                provider: "sina".into(),
            });
        }

        Ok(table)
    }

    fn column_map(&self) -> &ColumnMap {
        &self.column_map
    }
}
