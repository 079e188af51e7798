use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use whowas_core::records::{Category, Change, Departure};

/// Daemon lifecycle markers in the audit log. The span between a `started`
/// row and the next `stopped` row bounds when history was being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Started,
    Stopped,
}

impl LifecycleEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleEvent::Started => "started",
            LifecycleEvent::Stopped => "stopped",
        }
    }
}

pub trait HistoryStore: Send + Sync {
    /// Persist one detached batch as a single bulk write. Every row must
    /// belong to `category`. Atomic per call: the whole batch lands or the
    /// attempt failed.
    fn insert_changes(&self, category: Category, rows: &[Change]) -> Result<usize>;

    fn insert_departures(&self, rows: &[Departure]) -> Result<usize>;

    /// Delete persisted rows that are immediately superseded by an identical
    /// later value for the same dedup key. Returns the number of pruned rows.
    fn compact(&self, category: Category) -> Result<usize>;

    fn record_lifecycle(&self, event: LifecycleEvent, at: DateTime<Utc>) -> Result<()>;
}

static ROWS_PERSISTED: AtomicU64 = AtomicU64::new(0);
static LAST_FLUSH_AT_EPOCH: AtomicI64 = AtomicI64::new(0);

/// Called by flush workers after a successful bulk write.
pub fn note_flush(rows: usize, at: DateTime<Utc>) {
    ROWS_PERSISTED.fetch_add(rows as u64, Ordering::Relaxed);
    LAST_FLUSH_AT_EPOCH.store(at.timestamp(), Ordering::Relaxed);
}

pub fn rows_persisted_total() -> u64 {
    ROWS_PERSISTED.load(Ordering::Relaxed)
}

pub fn last_flush_at() -> Option<DateTime<Utc>> {
    let secs = LAST_FLUSH_AT_EPOCH.load(Ordering::Relaxed);
    if secs > 0 {
        Utc.timestamp_opt(secs, 0).single()
    } else {
        None
    }
}

pub mod sqlite3;
