//! Shared, serialized entry point to the scheduler.
//!
//! `SchedulerHandle` is cheap to clone. All clones share one
//! [`Scheduler`] behind an async mutex, so inbound events are applied one
//! at a time. Notifications for the allocations an event produced are
//! dispatched after the lock is released; a notify callback that calls
//! back into the handle sees the committed state and cannot deadlock.
//!
//! Delivery order is only guaranteed within one event. Notifications from
//! two consecutive events may reach the notifier in either order, so a
//! grant of machines freed by a later event can arrive before the earlier
//! grant of the same machines.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use rackgrid_core::{JobId, JobRequest, MachineId};

use crate::dispatch::{DeliveryStats, Dispatcher};
use crate::error::SchedulerResult;
use crate::executor::Allocation;
use crate::scheduler::{ReleaseReport, Scheduler};
use crate::snapshot::ClusterSnapshot;

/// Cloneable front end over one [`Scheduler`].
///
/// Events are serialized; their notifications are not ordered across
/// events.
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Arc<Mutex<Scheduler>>,
    dispatcher: Dispatcher,
}

impl SchedulerHandle {
    pub fn new(scheduler: Scheduler, dispatcher: Dispatcher) -> Self {
        Self {
            inner: Arc::new(Mutex::new(scheduler)),
            dispatcher,
        }
    }

    pub async fn add_job(&self, request: JobRequest) -> SchedulerResult<Vec<Allocation>> {
        let allocations = {
            let mut scheduler = self.inner.lock().await;
            scheduler.add_job(request)?
        };
        self.notify_all(&allocations).await;
        Ok(allocations)
    }

    pub async fn free_resources(&self, machines: &[MachineId]) -> ReleaseReport {
        let report = {
            let mut scheduler = self.inner.lock().await;
            scheduler.free_resources(machines)
        };
        self.notify_all(&report.allocations).await;
        report
    }

    pub async fn complete_job(&self, job_id: JobId) -> SchedulerResult<ReleaseReport> {
        let report = {
            let mut scheduler = self.inner.lock().await;
            scheduler.complete_job(job_id)?
        };
        self.notify_all(&report.allocations).await;
        Ok(report)
    }

    pub async fn snapshot(&self) -> ClusterSnapshot {
        self.inner.lock().await.snapshot()
    }

    pub async fn check_invariants(&self) -> Vec<String> {
        self.inner.lock().await.check_invariants()
    }

    /// Wait until every queued notification has been delivered or dropped.
    pub async fn flush_notifications(&self) -> DeliveryStats {
        self.dispatcher.flush().await
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    async fn notify_all(&self, allocations: &[Allocation]) {
        for allocation in allocations {
            debug!(
                job_id = allocation.job_id,
                machines = allocation.machines.len(),
                "queueing allocation notification"
            );
            self.dispatcher.dispatch(allocation.clone()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    use rackgrid_core::{ClusterConfig, JobType, NotifyConfig};

    use crate::dispatch::{NotifyFn, NotifyFuture, logging_notifier};
    use crate::error::SchedulerError;

    fn handle_with(machines: u32, notify: NotifyFn) -> SchedulerHandle {
        let config = ClusterConfig::single_rack(machines);
        SchedulerHandle::new(
            Scheduler::new(&config),
            Dispatcher::new(
                notify,
                &NotifyConfig {
                    max_attempts: 1,
                    backoff_ms: 0,
                },
            ),
        )
    }

    fn gpu(job_id: JobId, k: u32) -> JobRequest {
        JobRequest::new(job_id, JobType::Gpu, k, 0, 4.0, 4.0)
    }

    #[tokio::test]
    async fn concurrent_duplicates_admit_one() {
        let handle = handle_with(8, logging_notifier());
        let a = handle.clone();
        let b = handle.clone();

        let (first, second) = tokio::join!(a.add_job(gpu(1, 2)), b.add_job(gpu(1, 2)));

        let errors: Vec<SchedulerError> = [first, second]
            .into_iter()
            .filter_map(Result::err)
            .collect();
        assert_eq!(errors, vec![SchedulerError::DuplicateJob(1)]);
        assert_eq!(handle.snapshot().await.machines_free, 6);
    }

    #[tokio::test]
    async fn notifications_follow_allocations() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let notify: NotifyFn = Arc::new(move |a: Allocation| -> NotifyFuture {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().unwrap().push((a.job_id, a.machines.len()));
                Ok(())
            })
        });
        let handle = handle_with(4, notify);

        handle.add_job(gpu(1, 3)).await.unwrap();
        handle.add_job(gpu(2, 2)).await.unwrap();
        let report = handle.free_resources(&[0, 1, 2]).await;
        let stats = handle.flush_notifications().await;

        assert_eq!(report.completed, vec![1]);
        assert_eq!(stats.delivered, 2);
        let mut got = seen.lock().unwrap().clone();
        got.sort();
        assert_eq!(got, vec![(1, 3), (2, 2)]);
    }

    #[tokio::test]
    async fn regrant_of_same_machines_delivers_both_events() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let notify: NotifyFn = Arc::new(move |a: Allocation| -> NotifyFuture {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().unwrap().push((a.job_id, a.machines));
                Ok(())
            })
        });
        let handle = handle_with(3, notify);

        handle.add_job(gpu(1, 3)).await.unwrap();
        handle.add_job(gpu(2, 3)).await.unwrap();
        handle.complete_job(1).await.unwrap();
        handle.flush_notifications().await;

        // Arrival order across events is unspecified; compare as a set.
        let mut got = seen.lock().unwrap().clone();
        got.sort();
        let all = std::collections::BTreeSet::from([0, 1, 2]);
        assert_eq!(got, vec![(1, all.clone()), (2, all)]);
    }

    #[tokio::test]
    async fn notifier_observes_committed_state() {
        let slot: Arc<OnceLock<SchedulerHandle>> = Arc::new(OnceLock::new());
        let observed = Arc::new(std::sync::Mutex::new(Vec::new()));

        let slot_ref = slot.clone();
        let sink = observed.clone();
        let notify: NotifyFn = Arc::new(move |a: Allocation| -> NotifyFuture {
            let slot = slot_ref.clone();
            let sink = sink.clone();
            Box::pin(async move {
                if let Some(handle) = slot.get() {
                    let snap = handle.snapshot().await;
                    let held = snap.running_job(a.job_id).map(|j| j.allocated.len());
                    sink.lock().unwrap().push(held);
                }
                Ok(())
            })
        });

        let handle = handle_with(4, notify);
        let _ = slot.set(handle.clone());

        handle.add_job(gpu(7, 2)).await.unwrap();
        handle.flush_notifications().await;

        assert_eq!(*observed.lock().unwrap(), vec![Some(2)]);
    }

    #[tokio::test]
    async fn rejected_request_sends_nothing() {
        let handle = handle_with(2, logging_notifier());
        assert!(handle.add_job(gpu(1, 3)).await.is_err());
        assert_eq!(handle.flush_notifications().await, DeliveryStats::default());
        assert!(handle.check_invariants().await.is_empty());
    }

    #[tokio::test]
    async fn complete_job_through_handle() {
        let handle = handle_with(2, logging_notifier());
        handle.add_job(gpu(1, 2)).await.unwrap();
        handle.add_job(gpu(2, 2)).await.unwrap();

        let report = handle.complete_job(1).await.unwrap();

        assert_eq!(report.allocations.len(), 1);
        assert_eq!(report.allocations[0].job_id, 2);
        assert_eq!(handle.flush_notifications().await.delivered, 2);
    }
}
