//! Date-keyed history persistence.
//!
//! The history is a single UTF-8 JSON array of stat points, sorted ascending
//! by date, rewritten whole on every run. Upserts replace the entire record
//! for a date (last write wins), so re-running the pipeline on the same day
//! is idempotent.
//!
//! Writes go to a temp file in the same directory followed by an atomic
//! rename, so the backing file is always either fully the old version or
//! fully the new one. The file is not locked; concurrent runs race and the
//! last writer wins, which is accepted for a once-a-day schedule.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;

use crate::aggregate::MarketStatPoint;

/// Structured error types for the persistence stage.
///
/// Corrupt *reads* are not represented here: they degrade to an empty history
/// with a logged warning instead of failing the run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("history I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("history serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// JSON history file manager.
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted history.
    ///
    /// An absent file is an empty history. An unreadable or invalid file is
    /// also an empty history — logged as a warning, never fatal, accepting
    /// that the next successful run overwrites whatever was there.
    pub fn load(&self) -> Vec<MarketStatPoint> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                eprintln!(
                    "warning: cannot read history {}: {e}; starting from empty history",
                    self.path.display()
                );
                return Vec::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(points) => points,
            Err(e) => {
                eprintln!(
                    "warning: history {} is not valid JSON: {e}; starting from empty history",
                    self.path.display()
                );
                Vec::new()
            }
        }
    }

    /// Insert or replace the record for `point.date` and persist the result.
    ///
    /// Returns the full history as written.
    pub fn upsert(&self, point: MarketStatPoint) -> Result<Vec<MarketStatPoint>, StoreError> {
        let mut by_date: BTreeMap<NaiveDate, MarketStatPoint> = self
            .load()
            .into_iter()
            .map(|p| (p.date, p))
            .collect();
        by_date.insert(point.date, point);

        // BTreeMap iteration gives the ascending-by-date ordering for free
        let history: Vec<MarketStatPoint> = by_date.into_values().collect();
        self.save(&history)?;
        Ok(history)
    }

    /// Serialize the full history and atomically replace the backing file.
    pub fn save(&self, history: &[MarketStatPoint]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(history)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;

        // Atomic rename; clean up the temp file if it fails
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Io(e)
        })?;

        Ok(())
    }
}
