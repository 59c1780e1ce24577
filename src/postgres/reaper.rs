use std::time::Duration;

use deadpool_postgres::Pool;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Periodically close pooled connections that have sat idle longer than `idle_timeout`.
///
/// deadpool keeps idle connections forever, so this task enforces the timeout. It sweeps at
/// half the timeout (at least once a second) and stops once the pool is closed.
pub fn spawn_idle_reaper(pool: Pool, idle_timeout: Duration) -> JoinHandle<()> {
    let period = (idle_timeout / 2).max(MIN_SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if pool.is_closed() {
                debug!("pool closed; idle reaper exiting");
                break;
            }
            let swept = pool.retain(|_, metrics| metrics.last_used() < idle_timeout);
            if !swept.removed.is_empty() {
                debug!(
                    removed = swept.removed.len(),
                    retained = swept.retained,
                    "closed idle connections"
                );
            }
        }
    })
}
