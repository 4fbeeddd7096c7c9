use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Cancellable delayed actions keyed by owner id.
///
/// Scheduling under a key replaces any timer already pending for that key,
/// and dropping the registry cancels everything outstanding, so stale
/// timers cannot resurrect state after a reset.
pub struct TimerRegistry<K> {
    timers: Mutex<HashMap<K, JoinHandle<()>>>,
}

impl<K: Eq + Hash> TimerRegistry<K> {
    pub fn new() -> Self {
        Self {
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Run `action` after `delay`, replacing any timer pending under `key`.
    pub fn schedule<F>(&self, key: K, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        });
        let replaced = self.timers.lock().insert(key, handle);
        if let Some(old) = replaced {
            old.abort();
        }
    }

    /// Cancel the timer under `key`. Returns whether one was still pending.
    pub fn cancel(&self, key: &K) -> bool {
        match self.timers.lock().remove(key) {
            Some(handle) => {
                let was_pending = !handle.is_finished();
                handle.abort();
                was_pending
            }
            None => false,
        }
    }

    /// Cancel every outstanding timer, returning how many were pending.
    pub fn cancel_all(&self) -> usize {
        let mut timers = self.timers.lock();
        let mut cancelled = 0;
        for (_, handle) in timers.drain() {
            if !handle.is_finished() {
                cancelled += 1;
            }
            handle.abort();
        }
        cancelled
    }

    /// Timers scheduled and not yet fired. Prunes completed entries.
    pub fn pending(&self) -> usize {
        let mut timers = self.timers.lock();
        timers.retain(|_, handle| !handle.is_finished());
        timers.len()
    }
}

impl<K: Eq + Hash> Default for TimerRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for TimerRegistry<K> {
    fn drop(&mut self) {
        for (_, handle) in self.timers.lock().drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter_action(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let registry = TimerRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        registry.schedule("a", Duration::from_millis(50), counter_action(&fired));

        tokio::time::sleep(Duration::from_millis(49)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(registry.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let registry = TimerRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        registry.schedule("a", Duration::from_millis(50), counter_action(&fired));

        assert!(registry.cancel(&"a"));
        assert!(!registry.cancel(&"a"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_pending_timer() {
        let registry = TimerRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        registry.schedule("a", Duration::from_millis(50), counter_action(&first));
        registry.schedule("a", Duration::from_millis(80), counter_action(&second));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let registry = TimerRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        for key in 0..4 {
            registry.schedule(key, Duration::from_millis(50), counter_action(&fired));
        }
        assert_eq!(registry.pending(), 4);
        assert_eq!(registry.cancel_all(), 4);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_outstanding_timers() {
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let registry = TimerRegistry::new();
            registry.schedule("a", Duration::from_millis(50), counter_action(&fired));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_keys_all_fire() {
        let registry = TimerRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        registry.schedule("a", Duration::from_millis(10), counter_action(&fired));
        registry.schedule("b", Duration::from_millis(20), counter_action(&fired));
        registry.schedule("c", Duration::from_millis(30), counter_action(&fired));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }
}
