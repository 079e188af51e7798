use anyhow::{Context, Result};
use chrono::Utc;
use crossbeam_channel::Sender;
use log::{error, info};
use std::path::Path;
use std::sync::Arc;

use crate::daemon::flush::FlushWorker;
use crate::daemon::ingest::{self, DaemonEvent};
use crate::daemon::socket_server::IngestServer;
use whowas_common::config::AppConfig;
use whowas_common::paths;
use whowas_common::threading::{ThreadHandle, ThreadRegistry};
use whowas_core::buffer::PendingQueues;
use whowas_core::records::Category;
use whowas_core::sync::SyncGate;
use whowas_storage::{self as storage, HistoryStore, LifecycleEvent};

/// Owns the pending queues, the sync gate, one flush worker per category
/// (plus departures), and the ingest loop.
pub struct Daemon {
    queues: Arc<PendingQueues>,
    gate: Arc<SyncGate>,
    store: Arc<dyn HistoryStore>,
    workers: Vec<FlushWorker>,
    ingest_thread: Option<ThreadHandle>,
    event_tx: Sender<DaemonEvent>,
    threads: ThreadRegistry,
}

impl Daemon {
    /// Spawn the flush workers and the ingest loop. The returned handle must
    /// be shut down to guarantee the final drains and the `stopped` marker.
    pub fn start(store: Arc<dyn HistoryStore>, config: &AppConfig) -> Result<Daemon> {
        let queues = Arc::new(PendingQueues::new());
        let gate = Arc::new(SyncGate::new());
        let threads = ThreadRegistry::new();

        let mut workers = Vec::with_capacity(Category::ALL.len() + 1);
        for category in Category::ALL {
            workers.push(FlushWorker::spawn_category(
                &threads,
                category,
                Arc::clone(&queues),
                Arc::clone(&store),
                config.flush_interval_secs,
                config.compact_threshold,
            )?);
        }
        workers.push(FlushWorker::spawn_departures(
            &threads,
            Arc::clone(&queues),
            Arc::clone(&store),
            config.flush_interval_secs,
        )?);

        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let ingest_thread = {
            let queues = Arc::clone(&queues);
            let gate = Arc::clone(&gate);
            let store = Arc::clone(&store);
            threads.spawn("ingest", move || {
                ingest::run_ingest(event_rx, queues, gate, store);
            })?
        };

        info!(
            "daemon started with workers: {:?}",
            threads.active_thread_names()
        );

        Ok(Daemon {
            queues,
            gate,
            store,
            workers,
            ingest_thread: Some(ingest_thread),
            event_tx,
            threads,
        })
    }

    /// Sender for gateway events and the shutdown signal.
    pub fn event_sender(&self) -> Sender<DaemonEvent> {
        self.event_tx.clone()
    }

    /// Direct append access for embedded producers.
    pub fn queues(&self) -> Arc<PendingQueues> {
        Arc::clone(&self.queues)
    }

    pub fn gate(&self) -> Arc<SyncGate> {
        Arc::clone(&self.gate)
    }

    /// Serve NDJSON gateway events on the workspace ingest socket. Keep the
    /// returned server alive; dropping it removes the socket file.
    pub fn serve_socket(&self, workspace_dir: &Path) -> Result<IngestServer> {
        let server = IngestServer::new(paths::ingest_socket(workspace_dir));
        server.start(self.event_tx.clone())?;
        Ok(server)
    }

    /// Block until the ingest loop exits (shutdown signal or channel close).
    pub fn join_ingest(&mut self) {
        if let Some(handle) = self.ingest_thread.take() {
            if let Err(e) = handle.join() {
                error!("ingest thread panicked: {e:?}");
            }
        }
    }

    /// Stop ingest, drain every queue exactly once more, then record the
    /// `stopped` marker. The marker lands only after all final drains have
    /// completed: it demarcates "no more events were persisted after this".
    pub fn shutdown(mut self) -> Result<()> {
        let _ = self.event_tx.send(DaemonEvent::Shutdown);
        self.join_ingest();

        info!(
            "draining flush workers: {:?}",
            self.threads.active_thread_names()
        );
        for worker in self.workers.drain(..) {
            let label = worker.label();
            info!("stopping flush worker for {label}");
            if let Err(e) = worker.stop() {
                error!("flush worker for {label} did not stop cleanly: {e:#}");
            }
        }

        let stopped_at = Utc::now();
        self.store
            .record_lifecycle(LifecycleEvent::Stopped, stopped_at)
            .context("Failed to record the stopped marker")?;

        match storage::last_flush_at() {
            Some(at) => info!(
                "daemon stopped: {} rows persisted this run, last flush at {at}",
                storage::rows_persisted_total()
            ),
            None => info!("daemon stopped: nothing was persisted this run"),
        }
        Ok(())
    }
}

/// Foreground entry point for `whowas start`: wires the socket intake and
/// ctrl-c, then blocks until shutdown completes.
pub fn run(store: Arc<dyn HistoryStore>, workspace_dir: &Path, config: &AppConfig) -> Result<()> {
    let mut daemon = Daemon::start(store, config)?;
    let _server = daemon.serve_socket(workspace_dir)?;

    let shutdown_tx = daemon.event_sender();
    ctrlc::set_handler(move || {
        info!("ctrl-c received, requesting shutdown");
        let _ = shutdown_tx.send(DaemonEvent::Shutdown);
    })
    .context("Failed to install the ctrl-c handler")?;

    daemon.join_ingest();
    daemon.shutdown()
}
