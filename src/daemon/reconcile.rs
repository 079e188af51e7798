use anyhow::Result;
use chrono::{Duration, Utc};
use log::{debug, info, warn};

use whowas_core::buffer::PendingQueues;
use whowas_core::classify::bulk_changes;
use whowas_core::records::MemberSnapshot;
use whowas_core::sync::SyncGate;
use whowas_storage::{HistoryStore, LifecycleEvent};

/// Where the initial roster comes from. Implemented by whatever platform
/// adapter embeds the daemon; the ingest socket delivers the same payload as
/// a `snapshot` gateway event instead.
pub trait RosterSource: Send + Sync {
    fn current_members(&self) -> Result<Vec<MemberSnapshot>>;
}

/// One-shot initial reconciliation. Enumerates the roster and hands the
/// result to [`complete_initial_sync`]. If enumeration fails the gate is
/// latched anyway: diff producers blocked forever would be worse than a
/// missing baseline, which the next full snapshot repairs.
pub fn initial_sync(
    source: &dyn RosterSource,
    queues: &PendingQueues,
    gate: &SyncGate,
    store: &dyn HistoryStore,
) {
    if gate.is_set() {
        debug!("initial sync already completed, ignoring repeat trigger");
        return;
    }
    match source.current_members() {
        Ok(members) => complete_initial_sync(members, queues, gate, store),
        Err(e) => {
            warn!("roster enumeration failed, latching sync gate without a baseline: {e:#}");
            record_started_marker(store);
            gate.set();
        }
    }
}

/// Record the `started` marker, enqueue one baseline observation per
/// (member, category), and latch the gate. Idempotent: a second call is a
/// no-op and enqueues nothing.
pub fn complete_initial_sync(
    members: Vec<MemberSnapshot>,
    queues: &PendingQueues,
    gate: &SyncGate,
    store: &dyn HistoryStore,
) {
    if gate.is_set() {
        debug!("initial sync already completed, ignoring repeat snapshot");
        return;
    }

    record_started_marker(store);

    let now = Utc::now();
    let changes = bulk_changes(&members, now);
    let enqueued = changes.len();
    queues.extend(changes);
    gate.set();

    info!(
        "initial sync complete: {} membership rows, {} baseline observations",
        members.len(),
        enqueued
    );
}

fn record_started_marker(store: &dyn HistoryStore) {
    // Backdated one microsecond so the marker sorts strictly before every
    // baseline row stamped afterwards.
    let at = Utc::now() - Duration::microseconds(1);
    if let Err(e) = store.record_lifecycle(LifecycleEvent::Started, at) {
        warn!("failed to record the started marker: {e:#}");
    }
}
