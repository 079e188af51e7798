use anyhow::{Result, anyhow};
use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use whowas_common::threading::{ThreadHandle, ThreadRegistry};
use whowas_core::buffer::PendingQueues;
use whowas_core::records::Category;
use whowas_storage::{self as storage, HistoryStore};

pub const MIN_FLUSH_INTERVAL_SECS: u64 = 1;
pub const MAX_FLUSH_INTERVAL_SECS: u64 = 60;

#[derive(Debug)]
pub enum ControlMsg {
    Stop,
    /// Request an immediate drain and persist, acknowledged once done.
    Flush(Sender<()>),
}

/// What one flush worker drains and persists on every cycle.
trait FlushTask: Send + 'static {
    fn label(&self) -> &'static str;
    fn pending(&self) -> usize;
    /// Drain-and-swap the queue and bulk-persist the detached batch.
    /// Returns the rows persisted. A failed persist is logged here and the
    /// batch is dropped; re-queueing it would duplicate or reorder history.
    fn flush(&mut self) -> usize;
}

struct CategoryTask {
    category: Category,
    queues: Arc<PendingQueues>,
    store: Arc<dyn HistoryStore>,
    compact_threshold: usize,
}

impl FlushTask for CategoryTask {
    fn label(&self) -> &'static str {
        self.category.table()
    }

    fn pending(&self) -> usize {
        self.queues.len(self.category)
    }

    fn flush(&mut self) -> usize {
        let batch = self.queues.drain(self.category);
        if batch.is_empty() {
            return 0;
        }
        match self.store.insert_changes(self.category, &batch) {
            Ok(n) => {
                storage::note_flush(n, Utc::now());
                debug!("flushed {} rows to {}", n, self.category);
                if n > self.compact_threshold && self.category.compactable() {
                    match self.store.compact(self.category) {
                        Ok(pruned) => {
                            info!("compacted {}: pruned {} superseded rows", self.category, pruned)
                        }
                        Err(e) => error!("compaction of {} failed: {:#}", self.category, e),
                    }
                }
                n
            }
            Err(e) => {
                error!(
                    "failed to persist a batch of {} {} rows: {:#}",
                    batch.len(),
                    self.category,
                    e
                );
                0
            }
        }
    }
}

struct DepartureTask {
    queues: Arc<PendingQueues>,
    store: Arc<dyn HistoryStore>,
}

impl FlushTask for DepartureTask {
    fn label(&self) -> &'static str {
        "departures"
    }

    fn pending(&self) -> usize {
        self.queues.departures_len()
    }

    fn flush(&mut self) -> usize {
        let batch = self.queues.drain_departures();
        if batch.is_empty() {
            return 0;
        }
        match self.store.insert_departures(&batch) {
            Ok(n) => {
                storage::note_flush(n, Utc::now());
                debug!("flushed {n} departures");
                n
            }
            Err(e) => {
                error!(
                    "failed to persist a batch of {} departures: {:#}",
                    batch.len(),
                    e
                );
                0
            }
        }
    }
}

/// One background thread that drains its queue on a fixed cadence and once
/// more after cancellation.
pub struct FlushWorker {
    label: &'static str,
    control_tx: Sender<ControlMsg>,
    handle: Option<ThreadHandle>,
}

impl FlushWorker {
    pub fn spawn_category(
        threads: &ThreadRegistry,
        category: Category,
        queues: Arc<PendingQueues>,
        store: Arc<dyn HistoryStore>,
        interval_secs: u64,
        compact_threshold: usize,
    ) -> Result<Self> {
        Self::spawn(
            threads,
            CategoryTask {
                category,
                queues,
                store,
                compact_threshold,
            },
            interval_secs,
        )
    }

    pub fn spawn_departures(
        threads: &ThreadRegistry,
        queues: Arc<PendingQueues>,
        store: Arc<dyn HistoryStore>,
        interval_secs: u64,
    ) -> Result<Self> {
        Self::spawn(threads, DepartureTask { queues, store }, interval_secs)
    }

    fn spawn<T: FlushTask>(
        threads: &ThreadRegistry,
        task: T,
        interval_secs: u64,
    ) -> Result<Self> {
        // A misconfigured interval must neither starve the store nor flood it.
        let interval = Duration::from_secs(
            interval_secs.clamp(MIN_FLUSH_INTERVAL_SECS, MAX_FLUSH_INTERVAL_SECS),
        );
        let label = task.label();
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let handle = threads.spawn(format!("flush-{label}"), move || {
            run_loop(task, interval, control_rx);
        })?;

        Ok(Self {
            label,
            control_tx,
            handle: Some(handle),
        })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Force an immediate drain and persist, waiting for the worker's ack.
    pub fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        self.control_tx
            .send(ControlMsg::Flush(ack_tx))
            .map_err(|_| anyhow!("flush worker '{}' is gone", self.label))?;
        ack_rx
            .recv_timeout(Duration::from_secs(5))
            .map_err(|_| anyhow!("timed out waiting for '{}' flush ack", self.label))?;
        Ok(())
    }

    /// Stop the worker. Its final drain runs before the join returns, so no
    /// residual events are stranded.
    pub fn stop(mut self) -> Result<()> {
        let _ = self.control_tx.send(ControlMsg::Stop);
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|e| anyhow!("flush worker '{}' panicked: {:?}", self.label, e))?;
        }
        Ok(())
    }
}

impl Drop for FlushWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.control_tx.send(ControlMsg::Stop);
            if let Err(e) = handle.join() {
                error!("flush worker '{}' panicked: {:?}", self.label, e);
            }
        }
    }
}

fn run_loop<T: FlushTask>(mut task: T, interval: Duration, control_rx: Receiver<ControlMsg>) {
    info!(
        "flush worker for {} started (interval {}s)",
        task.label(),
        interval.as_secs()
    );

    loop {
        match control_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                task.flush();
            }
            Ok(ControlMsg::Flush(ack)) => {
                task.flush();
                let _ = ack.send(());
            }
            Ok(ControlMsg::Stop) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Cancellation path: exactly one more drain so nothing in flight is lost.
    let final_rows = task.flush();
    if final_rows > 0 {
        info!("final flush for {}: {} rows", task.label(), final_rows);
    }
    let leftover = task.pending();
    if leftover > 0 {
        warn!(
            "{} {} events were appended after the final drain and will not be persisted",
            leftover,
            task.label()
        );
    }

    info!("flush worker for {} exited", task.label());
}
