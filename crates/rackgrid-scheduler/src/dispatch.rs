//! Dispatcher: delivers allocation notifications off the scheduling path.
//!
//! Each allocation is handed to a spawned task that calls the outbound
//! notify callback, retrying with linear backoff. Failures are logged,
//! never propagated back into the scheduler.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use rackgrid_core::NotifyConfig;

use crate::executor::Allocation;

pub type NotifyFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Outbound `NotifyAllocation` callback supplied by the transport.
pub type NotifyFn = Arc<dyn Fn(Allocation) -> NotifyFuture + Send + Sync>;

/// Totals returned by [`Dispatcher::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Dispatcher {
    notify: NotifyFn,
    max_attempts: u32,
    backoff: Duration,
    in_flight: Arc<Mutex<JoinSet<bool>>>,
}

impl Dispatcher {
    pub fn new(notify: NotifyFn, config: &NotifyConfig) -> Self {
        Self {
            notify,
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
            in_flight: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Queue delivery of one allocation and return immediately.
    pub async fn dispatch(&self, allocation: Allocation) {
        let notify = self.notify.clone();
        let max_attempts = self.max_attempts;
        let backoff = self.backoff;

        let mut in_flight = self.in_flight.lock().await;
        // Reap finished deliveries so the set does not grow without bound.
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn(deliver(notify, allocation, max_attempts, backoff));
    }

    /// Wait for every queued delivery to finish.
    pub async fn flush(&self) -> DeliveryStats {
        let mut pending = std::mem::take(&mut *self.in_flight.lock().await);
        let mut stats = DeliveryStats::default();
        while let Some(result) = pending.join_next().await {
            match result {
                Ok(true) => stats.delivered += 1,
                Ok(false) => stats.failed += 1,
                Err(e) => {
                    error!(error = %e, "notification task panicked");
                    stats.failed += 1;
                }
            }
        }
        stats
    }
}

async fn deliver(
    notify: NotifyFn,
    allocation: Allocation,
    max_attempts: u32,
    backoff: Duration,
) -> bool {
    for attempt in 1..=max_attempts {
        match notify(allocation.clone()).await {
            Ok(()) => {
                debug!(job_id = allocation.job_id, attempt, "allocation delivered");
                return true;
            }
            Err(e) => {
                warn!(
                    job_id = allocation.job_id,
                    attempt,
                    max_attempts,
                    error = %e,
                    "allocation notification failed"
                );
                if attempt < max_attempts {
                    tokio::time::sleep(backoff * attempt).await;
                }
            }
        }
    }

    error!(
        job_id = allocation.job_id,
        machines = ?allocation.machines,
        "giving up on allocation notification"
    );
    false
}

/// A notifier that only records allocations in the log.
pub fn logging_notifier() -> NotifyFn {
    Arc::new(|allocation: Allocation| -> NotifyFuture {
        Box::pin(async move {
            info!(
                job_id = allocation.job_id,
                machines = ?allocation.machines,
                partial = allocation.partial,
                "notify allocation"
            );
            Ok(())
        })
    })
}
