//! MarketPulse core — daily A-share market breadth pipeline.
//!
//! One-shot pipeline, three stages:
//! - [`source`] — fetch a full-market spot snapshot, with ordered provider
//!   fallback and column normalization
//! - [`aggregate`] — clean the snapshot and compute market-wide statistics
//! - [`store`] — upsert the dated stat point into the persisted JSON history

pub mod aggregate;
pub mod snapshot;
pub mod source;
pub mod store;

pub use aggregate::{aggregate, market_today, AggregateError, MarketStatPoint};
pub use snapshot::{ColumnMap, RawSnapshot, RawTable, SpotRow};
pub use source::{
    default_providers, fetch_snapshot, EastMoneyProvider, FetchLog, NullFetchLog, SinaProvider,
    SourceError, SpotProvider, StdoutFetchLog,
};
pub use store::{HistoryStore, StoreError};
