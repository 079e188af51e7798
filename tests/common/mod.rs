#![allow(dead_code)]

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use whowas_core::records::{Category, Change, Departure};
use whowas_storage::{HistoryStore, LifecycleEvent};

/// In-memory store double that records every call the flush machinery makes.
#[derive(Default)]
pub struct MockStore {
    pub batches: Mutex<Vec<(Category, Vec<Change>)>>,
    pub departure_batches: Mutex<Vec<Vec<Departure>>>,
    pub compactions: Mutex<Vec<Category>>,
    pub lifecycle: Mutex<Vec<(LifecycleEvent, DateTime<Utc>)>>,
    pub insert_attempts: AtomicUsize,
    pub fail_inserts: AtomicBool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows_for(&self, category: Category) -> Vec<Change> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == category)
            .flat_map(|(_, rows)| rows.clone())
            .collect()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn compacted(&self, category: Category) -> bool {
        self.compactions.lock().unwrap().contains(&category)
    }

    pub fn lifecycle_events(&self) -> Vec<(LifecycleEvent, DateTime<Utc>)> {
        self.lifecycle.lock().unwrap().clone()
    }
}

impl HistoryStore for MockStore {
    fn insert_changes(&self, category: Category, rows: &[Change]) -> Result<usize> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated bulk insert failure"));
        }
        self.batches.lock().unwrap().push((category, rows.to_vec()));
        Ok(rows.len())
    }

    fn insert_departures(&self, rows: &[Departure]) -> Result<usize> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated bulk insert failure"));
        }
        self.departure_batches.lock().unwrap().push(rows.to_vec());
        Ok(rows.len())
    }

    fn compact(&self, category: Category) -> Result<usize> {
        self.compactions.lock().unwrap().push(category);
        Ok(0)
    }

    fn record_lifecycle(&self, event: LifecycleEvent, at: DateTime<Utc>) -> Result<()> {
        self.lifecycle.lock().unwrap().push((event, at));
        Ok(())
    }
}

pub fn name_change(uid: i64, name: &str) -> Change {
    Change::Name {
        uid,
        name: name.to_string(),
        first_seen: Utc::now(),
    }
}
