//! Registry of pending deferred tasks
//!
//! Every scene run and timer is a spawned task registered under a unique
//! id with its metadata. A task that fires removes itself with `take`;
//! `cancel` aborts it and removes it. Whichever happens first wins, so a
//! cancelled task can never fire afterwards.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

struct Entry<M> {
    meta: M,
    handle: JoinHandle<()>,
}

pub struct TaskRegistry<M> {
    tasks: Arc<Mutex<HashMap<String, Entry<M>>>>,
}

impl<M> Clone for TaskRegistry<M> {
    fn clone(&self) -> Self {
        Self {
            tasks: Arc::clone(&self.tasks),
        }
    }
}

impl<M> Default for TaskRegistry<M> {
    fn default() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<M: Clone + Send + 'static> TaskRegistry<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task under `base_id`, suffixed `-2`, `-3`... if that id is
    /// taken. `make` receives the final id.
    ///
    /// The registry stays locked until the task is registered, so even a
    /// task with no delay finds itself when it calls `take`.
    pub async fn spawn<F, Fut>(&self, base_id: &str, make: F) -> M
    where
        F: FnOnce(String) -> (M, Fut),
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;

        let mut id = base_id.to_string();
        let mut n = 1;
        while tasks.contains_key(&id) {
            n += 1;
            id = format!("{}-{}", base_id, n);
        }

        let (meta, task) = make(id.clone());
        let handle = tokio::spawn(task);
        debug!(id = %id, "task registered");
        tasks.insert(
            id,
            Entry {
                meta: meta.clone(),
                handle,
            },
        );
        meta
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.tasks.lock().await.contains_key(id)
    }

    /// Deregister a task that is firing; `None` if it was cancelled
    pub async fn take(&self, id: &str) -> Option<M> {
        self.tasks.lock().await.remove(id).map(|entry| entry.meta)
    }

    /// Abort and deregister a pending task
    pub async fn cancel(&self, id: &str) -> Option<M> {
        let entry = self.tasks.lock().await.remove(id)?;
        entry.handle.abort();
        debug!(id, "task cancelled");
        Some(entry.meta)
    }

    /// Cancel every task whose metadata matches
    pub async fn cancel_where(&self, mut matches: impl FnMut(&M) -> bool) -> Vec<M> {
        let mut tasks = self.tasks.lock().await;
        let ids: Vec<String> = tasks
            .iter()
            .filter(|(_, entry)| matches(&entry.meta))
            .map(|(id, _)| id.clone())
            .collect();

        ids.iter()
            .filter_map(|id| tasks.remove(id))
            .map(|entry| {
                entry.handle.abort();
                entry.meta
            })
            .collect()
    }

    pub async fn list(&self) -> Vec<M> {
        self.tasks
            .lock()
            .await
            .values()
            .map(|entry| entry.meta.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Abort everything still pending
    pub async fn abort_all(&self) -> usize {
        let mut tasks = self.tasks.lock().await;
        let count = tasks.len();
        for (_, entry) in tasks.drain() {
            entry.handle.abort();
        }
        count
    }
}
