//! Optional background eviction.
//!
//! The binding middleware already calls
//! [`SessionStore::evict_stale`] on every request, which is enough for a
//! busy gateway. A quiet one can also run this task so idle sessions are
//! dropped even when no traffic arrives.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::SessionStore;

/// Spawns a task that sweeps `store` once per `config.sweep_interval`.
///
/// The task runs until the returned handle is aborted or the runtime
/// shuts down.
pub fn spawn_sweeper(store: Arc<SessionStore>) -> JoinHandle<()> {
    let period = store.config().sweep_interval;
    let max_age = store.config().max_age;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately; the store's own rate limit
        // turns it into a no-op.
        loop {
            interval.tick().await;
            let evicted = store.evict_stale(max_age);
            tracing::debug!(evicted, "session sweep finished");
        }
    })
}
