//! Spot snapshot providers and the ordered fallback chain.
//!
//! The [`SpotProvider`] trait abstracts over upstream endpoints (Sina spot
//! list, EastMoney per-exchange lists) so the pipeline can try them in order
//! and tests can substitute mocks. Providers return raw JSON tables; the
//! shared normalization step in [`crate::snapshot`] applies each provider's
//! [`ColumnMap`].
//!
//! There are no retries or backoff beyond the fallback chain: a provider
//! gets exactly one attempt per run.

pub mod eastmoney;
pub mod sina;

use thiserror::Error;

use crate::snapshot::{normalize, ColumnMap, RawSnapshot, RawTable};

pub use eastmoney::EastMoneyProvider;
pub use sina::SinaProvider;

/// Structured error types for the fetch stage.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error from {provider}: {message}")]
    Network { provider: String, message: String },

    #[error("{provider} returned HTTP {status}")]
    BadStatus { provider: String, status: u16 },

    #[error("failed to decode {provider} response: {message}")]
    Decode { provider: String, message: String },

    #[error("{provider} returned no rows")]
    EmptyResult { provider: String },

    #[error(
        "{provider} is missing expected column '{missing}'; columns present: {}",
        .present.join(", ")
    )]
    SchemaMismatch {
        provider: String,
        missing: String,
        present: Vec<String>,
    },

    #[error("all {provider} segments failed")]
    SegmentsAllFailed { provider: String },

    #[error("all providers failed:{}", .causes.iter().map(|(p, e)| format!("\n  {p}: {e}")).collect::<String>())]
    AllProvidersFailed { causes: Vec<(String, String)> },
}

/// Trait for spot snapshot providers.
///
/// Implementations handle the wire specifics of one upstream source. The
/// fallback chain sits above this trait — providers don't know about each
/// other.
pub trait SpotProvider {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch the full-market raw table. One attempt, no retries.
    fn fetch(&self, log: &dyn FetchLog) -> Result<RawTable, SourceError>;

    /// Field-rename map applied during normalization.
    fn column_map(&self) -> &ColumnMap;
}

/// Progress/diagnostic callbacks for a fetch run.
pub trait FetchLog {
    /// Called before each provider attempt.
    fn on_attempt(&self, provider: &str);

    /// Called when a provider attempt fails and the chain moves on.
    fn on_provider_failed(&self, provider: &str, error: &SourceError);

    /// Called when a per-exchange segment fails and is skipped (non-fatal).
    fn on_segment_skipped(&self, provider: &str, segment: &str, error: &SourceError);

    /// Called once a provider yields a usable snapshot.
    fn on_fetched(&self, provider: &str, rows: usize);
}

/// Reporter that prints to stdout/stderr.
pub struct StdoutFetchLog;

impl FetchLog for StdoutFetchLog {
    fn on_attempt(&self, provider: &str) {
        println!("Fetching A-share spot snapshot from {provider}...");
    }

    fn on_provider_failed(&self, provider: &str, error: &SourceError) {
        eprintln!("  {provider} failed, trying next source: {error}");
    }

    fn on_segment_skipped(&self, provider: &str, segment: &str, error: &SourceError) {
        eprintln!("  {provider}: segment {segment} skipped: {error}");
    }

    fn on_fetched(&self, provider: &str, rows: usize) {
        println!("  OK: {provider} returned {rows} instruments");
    }
}

/// Silent reporter for tests and embedding.
pub struct NullFetchLog;

impl FetchLog for NullFetchLog {
    fn on_attempt(&self, _provider: &str) {}
    fn on_provider_failed(&self, _provider: &str, _error: &SourceError) {}
    fn on_segment_skipped(&self, _provider: &str, _segment: &str, _error: &SourceError) {}
    fn on_fetched(&self, _provider: &str, _rows: usize) {}
}

/// The default provider chain, in attempt order.
pub fn default_providers() -> Vec<Box<dyn SpotProvider>> {
    vec![
        Box::new(SinaProvider::new()),
        Box::new(EastMoneyProvider::new()),
    ]
}

/// Try each provider in order; first one that yields a non-empty normalized
/// snapshot wins.
///
/// Any failure (network, schema mismatch, empty result) escalates to the next
/// provider. If the whole chain is exhausted, the per-provider causes are
/// collected into [`SourceError::AllProvidersFailed`].
pub fn fetch_snapshot(
    providers: &[Box<dyn SpotProvider>],
    log: &dyn FetchLog,
) -> Result<RawSnapshot, SourceError> {
    let mut causes: Vec<(String, String)> = Vec::new();

    for provider in providers {
        let name = provider.name().to_string();
        log.on_attempt(&name);

        let attempt = provider
            .fetch(log)
            .and_then(|table| normalize(&table, provider.column_map(), &name));

        match attempt {
            Ok(snapshot) => {
                log.on_fetched(&name, snapshot.rows.len());
                return Ok(snapshot);
            }
            Err(e) => {
                log.on_provider_failed(&name, &e);
                causes.push((name, e.to_string()));
            }
        }
    }

    Err(SourceError::AllProvidersFailed { causes })
}
