use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Spawns named OS threads and remembers which are still live, so shutdown
/// logs can say what the daemon was running.
#[derive(Clone, Default)]
pub struct ThreadRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicUsize,
    live: Mutex<HashMap<usize, String>>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, name: impl Into<String>, f: F) -> Result<ThreadHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        let join_handle = thread::Builder::new()
            .name(name.clone())
            .spawn(f)
            .map_err(|e| anyhow!("failed to spawn thread '{name}': {e}"))?;

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .live
            .lock()
            .expect("thread registry mutex poisoned")
            .insert(id, name.clone());

        Ok(ThreadHandle {
            name,
            id,
            handle: Some(join_handle),
            inner: Arc::clone(&self.inner),
        })
    }

    pub fn active_thread_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .live
            .lock()
            .expect("thread registry mutex poisoned")
            .values()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

pub struct ThreadHandle {
    name: String,
    id: usize,
    handle: Option<JoinHandle<()>>,
    inner: Arc<RegistryInner>,
}

impl ThreadHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn join(mut self) -> thread::Result<()> {
        self.unregister();
        match self.handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }

    fn unregister(&self) {
        self.inner
            .live
            .lock()
            .expect("thread registry mutex poisoned")
            .remove(&self.id);
    }
}

impl Drop for ThreadHandle {
    fn drop(&mut self) {
        self.unregister();
        // Dropping the inner JoinHandle detaches the thread; never block here.
    }
}
