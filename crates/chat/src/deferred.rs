use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

/// Resource a delayed action belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DeferredKey {
    Message { channel_id: String, message_id: String },
    Channel(String),
}

#[derive(Default)]
struct DeferredState {
    next_generation: u64,
    tasks: HashMap<DeferredKey, (u64, JoinHandle<()>)>,
}

/// Cancellable delayed actions, at most one per resource.
///
/// Scheduling a key that already has a pending action aborts the old one.
/// Once an action starts running it is no longer pending and cannot be
/// cancelled.
#[derive(Clone, Default)]
pub struct DeferredTasks {
    inner: Arc<Mutex<DeferredState>>,
}

impl DeferredTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F>(&self, key: DeferredKey, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut state = lock(&self.inner);
        state.next_generation += 1;
        let generation = state.next_generation;

        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = lock(&inner);
                let current = state.tasks.get(&task_key).map(|(current, _)| *current);
                if current != Some(generation) {
                    return;
                }
                state.tasks.remove(&task_key);
            }
            action.await;
        });

        if let Some((_, previous)) = state.tasks.insert(key.clone(), (generation, handle)) {
            previous.abort();
            debug!(
                event_name = "deferred.rescheduled",
                key = ?key,
                "replaced pending deferred task"
            );
        }
    }

    pub fn cancel(&self, key: &DeferredKey) -> bool {
        match lock(&self.inner).tasks.remove(key) {
            Some((_, handle)) => {
                handle.abort();
                debug!(event_name = "deferred.cancelled", key = ?key, "cancelled deferred task");
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, key: &DeferredKey) -> bool {
        lock(&self.inner).tasks.contains_key(key)
    }

    pub fn pending(&self) -> usize {
        lock(&self.inner).tasks.len()
    }
}

fn lock(state: &Mutex<DeferredState>) -> MutexGuard<'_, DeferredState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use super::{DeferredKey, DeferredTasks};

    fn channel_key(id: &str) -> DeferredKey {
        DeferredKey::Channel(id.to_owned())
    }

    #[tokio::test(start_paused = true)]
    async fn action_runs_after_delay_and_clears_entry() {
        let tasks = DeferredTasks::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        tasks.schedule(channel_key("1"), Duration::from_secs(5), async move {
            let _ = tx.send("fired");
        });
        assert!(tasks.is_scheduled(&channel_key("1")));

        let fired = timeout(Duration::from_secs(10), rx.recv()).await.expect("fires in time");
        assert_eq!(fired, Some("fired"));
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_pending_action() {
        let tasks = DeferredTasks::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let first = tx.clone();
        tasks.schedule(channel_key("1"), Duration::from_secs(5), async move {
            let _ = first.send("first");
        });
        tasks.schedule(channel_key("1"), Duration::from_secs(8), async move {
            let _ = tx.send("second");
        });
        assert_eq!(tasks.pending(), 1);

        let fired = timeout(Duration::from_secs(20), rx.recv()).await.expect("fires in time");
        assert_eq!(fired, Some("second"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_action_never_runs() {
        let tasks = DeferredTasks::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<&str>();

        tasks.schedule(channel_key("1"), Duration::from_secs(5), async move {
            let _ = tx.send("fired");
        });
        assert!(tasks.cancel(&channel_key("1")));
        assert!(!tasks.cancel(&channel_key("1")));

        let outcome = timeout(Duration::from_secs(10), rx.recv()).await;
        assert!(!matches!(outcome, Ok(Some(_))), "cancelled action must not fire");
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let tasks = DeferredTasks::new();
        let message_key =
            DeferredKey::Message { channel_id: "1".to_owned(), message_id: "2".to_owned() };

        tasks.schedule(message_key.clone(), Duration::from_secs(5), async {});
        tasks.schedule(channel_key("1"), Duration::from_secs(5), async {});
        assert_eq!(tasks.pending(), 2);

        tasks.cancel(&channel_key("1"));
        assert!(tasks.is_scheduled(&message_key));
    }
}
