use chrono::Utc;
use crossbeam_channel::Receiver;
use log::{debug, info, warn};
use std::sync::Arc;

use crate::daemon::reconcile;
use whowas_core::buffer::PendingQueues;
use whowas_core::classify::{GatewayEvent, classify};
use whowas_core::sync::SyncGate;
use whowas_storage::HistoryStore;

/// Daemon-internal event stream: gateway traffic plus the shutdown signal.
#[derive(Debug)]
pub enum DaemonEvent {
    Gateway(GatewayEvent),
    Shutdown,
}

/// Consume gateway events until shutdown, classifying each into pending
/// queue appends.
///
/// A diff is meaningless before the baseline exists, so diff-derived events
/// that arrive ahead of the first snapshot are held in arrival order and
/// replayed the moment the snapshot latches the gate.
pub fn run_ingest(
    rx: Receiver<DaemonEvent>,
    queues: Arc<PendingQueues>,
    gate: Arc<SyncGate>,
    store: Arc<dyn HistoryStore>,
) {
    info!("ingest loop started");
    let mut held: Vec<GatewayEvent> = Vec::new();

    while let Ok(event) = rx.recv() {
        match event {
            DaemonEvent::Shutdown => {
                info!("shutdown signal received");
                break;
            }
            DaemonEvent::Gateway(GatewayEvent::Snapshot { members }) if !gate.is_set() => {
                reconcile::complete_initial_sync(members, &queues, &gate, store.as_ref());
                if !held.is_empty() {
                    info!("replaying {} events held during initial sync", held.len());
                    for event in held.drain(..) {
                        apply(&event, &queues);
                    }
                }
            }
            DaemonEvent::Gateway(event) => {
                if gate.is_set() {
                    apply(&event, &queues);
                } else {
                    debug!("holding a gateway event until the initial sync completes");
                    held.push(event);
                }
            }
        }
    }

    if !held.is_empty() {
        warn!(
            "{} gateway events were never applied: no snapshot arrived before shutdown",
            held.len()
        );
    }
    info!("ingest loop exited");
}

fn apply(event: &GatewayEvent, queues: &PendingQueues) {
    let classified = classify(event, Utc::now());
    queues.extend(classified.changes);
    for departure in classified.departures {
        queues.push_departure(departure);
    }
}
