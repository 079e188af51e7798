use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// One-shot startup latch. Producers that derive changes from diffs wait
/// here until the initial roster baseline has been enqueued; a diff without
/// its baseline would record a mutation with no prior state.
#[derive(Default)]
pub struct SyncGate {
    latched: Mutex<bool>,
    cond: Condvar,
}

impl SyncGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        *self.latched.lock().expect("sync gate mutex poisoned")
    }

    /// Latch permanently. Calling again is a no-op.
    pub fn set(&self) {
        let mut latched = self.latched.lock().expect("sync gate mutex poisoned");
        *latched = true;
        self.cond.notify_all();
    }

    /// Block until the gate is latched.
    pub fn wait(&self) {
        let mut latched = self.latched.lock().expect("sync gate mutex poisoned");
        while !*latched {
            latched = self.cond.wait(latched).expect("sync gate mutex poisoned");
        }
    }

    /// Block until the gate is latched or the timeout elapses. Returns
    /// whether the gate was latched.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut latched = self.latched.lock().expect("sync gate mutex poisoned");
        while !*latched {
            let (guard, result) = self
                .cond
                .wait_timeout(latched, timeout)
                .expect("sync gate mutex poisoned");
            latched = guard;
            if result.timed_out() {
                return *latched;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_unlatched_and_latches_once() {
        let gate = SyncGate::new();
        assert!(!gate.is_set());
        gate.set();
        assert!(gate.is_set());
        gate.set();
        assert!(gate.is_set());
    }

    #[test]
    fn wait_timeout_reports_unlatched() {
        let gate = SyncGate::new();
        assert!(!gate.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn wait_unblocks_on_set() {
        let gate = Arc::new(SyncGate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                gate.wait();
                true
            })
        };
        gate.set();
        assert!(waiter.join().expect("waiter panicked"));
    }
}
