mod common;

use anyhow::{Result, anyhow};
use common::MockStore;
use whowas::daemon::reconcile::{self, RosterSource};
use whowas_core::buffer::PendingQueues;
use whowas_core::records::{Category, MemberSnapshot, Presence};
use whowas_core::sync::SyncGate;
use whowas_storage::LifecycleEvent;

struct FakeRoster(Vec<MemberSnapshot>);

impl RosterSource for FakeRoster {
    fn current_members(&self) -> Result<Vec<MemberSnapshot>> {
        Ok(self.0.clone())
    }
}

struct FailingRoster;

impl RosterSource for FailingRoster {
    fn current_members(&self) -> Result<Vec<MemberSnapshot>> {
        Err(anyhow!("gateway unavailable"))
    }
}

fn member(uid: i64, sid: i64) -> MemberSnapshot {
    MemberSnapshot {
        uid,
        sid,
        name: format!("user-{uid}"),
        tag: "0001".to_string(),
        nick: Some(format!("nick-{uid}-{sid}")),
        status: Presence::Online,
    }
}

#[test]
fn initial_sync_enqueues_baseline_and_latches() {
    let queues = PendingQueues::new();
    let gate = SyncGate::new();
    let store = MockStore::new();
    // uid 1 is visible in two spaces, uid 2 in one.
    let roster = FakeRoster(vec![member(1, 10), member(1, 20), member(2, 10)]);

    reconcile::initial_sync(&roster, &queues, &gate, &store);

    assert!(gate.is_set());
    assert_eq!(queues.len(Category::Nicks), 3);
    assert_eq!(queues.len(Category::Names), 2);
    assert_eq!(queues.len(Category::Tags), 2);
    assert_eq!(queues.len(Category::Statuses), 2);

    let lifecycle = store.lifecycle_events();
    assert_eq!(lifecycle.len(), 1);
    assert_eq!(lifecycle[0].0, LifecycleEvent::Started);

    // The started marker sorts strictly before every baseline observation.
    let marker_at = lifecycle[0].1;
    for change in queues.drain(Category::Nicks) {
        assert!(marker_at < change.first_seen());
    }
}

#[test]
fn initial_sync_is_idempotent() {
    let queues = PendingQueues::new();
    let gate = SyncGate::new();
    let store = MockStore::new();
    let roster = FakeRoster(vec![member(1, 10)]);

    reconcile::initial_sync(&roster, &queues, &gate, &store);
    let after_first: usize = Category::ALL.iter().map(|c| queues.len(*c)).sum();

    reconcile::initial_sync(&roster, &queues, &gate, &store);
    let after_second: usize = Category::ALL.iter().map(|c| queues.len(*c)).sum();

    assert_eq!(after_first, after_second);
    assert_eq!(store.lifecycle_events().len(), 1);
    assert!(gate.is_set());
}

#[test]
fn direct_snapshot_completion_is_idempotent_too() {
    let queues = PendingQueues::new();
    let gate = SyncGate::new();
    let store = MockStore::new();

    reconcile::complete_initial_sync(vec![member(1, 10)], &queues, &gate, &store);
    reconcile::complete_initial_sync(vec![member(2, 10)], &queues, &gate, &store);

    // The second snapshot is ignored: one baseline, one marker.
    assert_eq!(queues.len(Category::Names), 1);
    assert_eq!(store.lifecycle_events().len(), 1);
}

#[test]
fn failed_enumeration_still_latches() {
    let queues = PendingQueues::new();
    let gate = SyncGate::new();
    let store = MockStore::new();

    reconcile::initial_sync(&FailingRoster, &queues, &gate, &store);

    assert!(gate.is_set());
    for category in Category::ALL {
        assert!(queues.is_empty(category));
    }
    // The service still went live; the marker is recorded.
    assert_eq!(store.lifecycle_events().len(), 1);
}
