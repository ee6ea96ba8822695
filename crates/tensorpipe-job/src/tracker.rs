use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;
use tensorpipe_core::JobId;
use tensorpipe_model::LayerModel;
use tracing::{info, warn};

use crate::error::JobOutcome;
use crate::job::Job;

pub type UpdateCallback = Arc<dyn Fn(&Job) + Send + Sync>;
pub type ResolveCallback = Arc<dyn Fn(JobOutcome) + Send + Sync>;

/// The tracker-side wrapper around a `Job`: its callbacks, last-activity clock, and the
/// mutable job state itself. Kept separate from `Job` so the wire-adjacent struct never
/// has to carry trait-object callbacks.
pub struct PendingJob {
    pub job: RwLock<Job>,
    last_update: RwLock<Instant>,
    on_update: UpdateCallback,
    resolve: ResolveCallback,
}

impl PendingJob {
    fn touch(&self) {
        *self.last_update.write() = Instant::now();
    }

    fn is_expired(&self, expired_after: Duration) -> bool {
        self.last_update.read().elapsed() > expired_after
    }
}

const COMPLETED_CAPACITY: usize = 4096;
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_EXPIRED_JOB_TIME: Duration = Duration::from_secs(60);

/// Process-wide registry of in-flight jobs. Mirrors the timeout-checker pattern used for
/// peer task tracking: a background sweep on a fixed interval expires anything that has
/// gone quiet for too long, and a bounded `completed` ring suppresses late updates for
/// requests that already resolved.
pub struct JobTracker {
    pending: DashMap<JobId, Arc<PendingJob>>,
    completed: RwLock<VecDeque<JobId>>,
    check_interval: Duration,
    expired_job_time: Duration,
    layer_model: Option<Arc<dyn LayerModel>>,
}

impl JobTracker {
    pub fn new(
        check_interval: Duration,
        expired_job_time: Duration,
        layer_model: Option<Arc<dyn LayerModel>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pending: DashMap::new(),
            completed: RwLock::new(VecDeque::with_capacity(COMPLETED_CAPACITY)),
            check_interval,
            expired_job_time,
            layer_model,
        })
    }

    pub fn add(&self, job: Job, on_update: UpdateCallback, resolve: ResolveCallback) -> Arc<PendingJob> {
        let job_id = job.job_id;
        let pending = Arc::new(PendingJob {
            job: RwLock::new(job),
            last_update: RwLock::new(Instant::now()),
            on_update,
            resolve,
        });
        self.pending.insert(job_id, pending.clone());
        pending
    }

    pub fn get(&self, job_id: JobId) -> Option<Arc<PendingJob>> {
        self.pending.get(&job_id).map(|e| e.clone())
    }

    fn is_completed(&self, job_id: JobId) -> bool {
        self.completed.read().contains(&job_id)
    }

    /// Refreshes the activity clock without firing the update callback. Called on every
    /// inbound envelope and every local layer-processing step so chunked prefill never
    /// spuriously expires.
    pub fn touch(&self, job_id: JobId) {
        if let Some(pending) = self.pending.get(&job_id) {
            pending.touch();
        }
    }

    /// Fires the update callback unless the job already completed (and was dropped from
    /// `pending`, or raced into `completed`), then refreshes the activity clock.
    pub fn send_update(&self, job_id: JobId) -> bool {
        if self.is_completed(job_id) {
            return false;
        }
        if let Some(pending) = self.pending.get(&job_id) {
            pending.touch();
            let job = pending.job.read();
            (pending.on_update)(&job);
            true
        } else {
            false
        }
    }

    /// Idempotent: invokes `resolve` once, moves the id into the completed ring, and
    /// removes it from the pending map.
    pub fn complete(&self, job_id: JobId, outcome: JobOutcome) {
        if self.is_completed(job_id) {
            return;
        }
        if let Some((_, pending)) = self.pending.remove(&job_id) {
            (pending.resolve)(outcome);
        }
        self.push_completed(job_id);
    }

    fn push_completed(&self, job_id: JobId) {
        let mut completed = self.completed.write();
        if completed.len() >= COMPLETED_CAPACITY {
            completed.pop_front();
        }
        completed.push_back(job_id);
    }

    fn sweep_once(&self) {
        let mut stale = Vec::new();
        for entry in self.pending.iter() {
            if entry.value().is_expired(self.expired_job_time) {
                stale.push(*entry.key());
            }
        }
        for job_id in stale {
            warn!(job_id = %job_id, "job expired, removing from tracker");
            if let Some(layer_model) = &self.layer_model {
                layer_model.clear_cache(job_id);
            }
            self.complete(job_id, JobOutcome::Stale);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Spawns the background staleness sweep. Returns the task handle so callers can
    /// abort it on shutdown.
    pub fn spawn_sweep(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let tracker = self.clone();
        let check_interval = self.check_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(check_interval);
            loop {
                ticker.tick().await;
                tracker.sweep_once();
            }
        })
    }
}

impl std::fmt::Debug for JobTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTracker")
            .field("pending_count", &self.pending.len())
            .finish()
    }
}

pub fn log_tracker_defaults() {
    info!(
        check_interval_secs = DEFAULT_CHECK_INTERVAL.as_secs(),
        expired_job_time_secs = DEFAULT_EXPIRED_JOB_TIME.as_secs(),
        "job tracker defaults"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tensorpipe_core::{ModelId, NodeId, PipeId};
    use tensorpipe_wire::SamplingParams;

    fn job() -> Job {
        Job::new(
            JobId::generate(),
            NodeId::generate(),
            PipeId::new("p"),
            ModelId::new("m"),
            vec![],
            16,
            SamplingParams::default(),
        )
    }

    #[test]
    fn send_update_fires_callback_while_pending() {
        let tracker = JobTracker::new(Duration::from_secs(10), Duration::from_secs(60), None);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let j = job();
        let job_id = j.job_id;
        tracker.add(
            j,
            Arc::new(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
            Arc::new(|_| {}),
        );
        assert!(tracker.send_update(job_id));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn complete_is_idempotent() {
        let tracker = JobTracker::new(Duration::from_secs(10), Duration::from_secs(60), None);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let j = job();
        let job_id = j.job_id;
        tracker.add(j, Arc::new(|_| {}), Arc::new(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));
        tracker.complete(job_id, JobOutcome::Completed { result: "ok".into() });
        tracker.complete(job_id, JobOutcome::Completed { result: "ok".into() });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn send_update_after_completion_is_dropped() {
        let tracker = JobTracker::new(Duration::from_secs(10), Duration::from_secs(60), None);
        let j = job();
        let job_id = j.job_id;
        tracker.add(j, Arc::new(|_| {}), Arc::new(|_| {}));
        tracker.complete(job_id, JobOutcome::Completed { result: "ok".into() });
        assert!(!tracker.send_update(job_id));
    }

    #[test]
    fn sweep_expires_jobs_past_the_timeout() {
        let tracker = JobTracker::new(Duration::from_millis(5), Duration::from_millis(10), None);
        let resolved = Arc::new(AtomicUsize::new(0));
        let resolved_clone = resolved.clone();
        let j = job();
        let job_id = j.job_id;
        tracker.add(
            j,
            Arc::new(|_| {}),
            Arc::new(move |outcome| {
                if matches!(outcome, JobOutcome::Stale) {
                    resolved_clone.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );
        std::thread::sleep(Duration::from_millis(20));
        tracker.sweep_once();
        assert_eq!(resolved.load(Ordering::SeqCst), 1);
        assert!(tracker.get(job_id).is_none());
    }
}
