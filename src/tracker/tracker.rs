use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, Semaphore, watch};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use super::job::{Job, PollConfig};
use crate::engine::{EngineApi, JobKind, RemoteState};

/// Tracker-wide policy knobs, derived from [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub poll: PollConfig,
    /// Ceiling on how long a job may stay non-terminal before it is forced
    /// to TimedOut.
    pub max_job_wait: Duration,
    /// How long a terminal job stays queryable before eviction.
    pub retention: Duration,
    /// Maximum engine calls (submits + polls) in flight at once.
    pub max_concurrent_calls: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            max_job_wait: Duration::from_secs(900),
            retention: Duration::from_secs(3600),
            max_concurrent_calls: 4,
        }
    }
}

struct Inner {
    engine: Arc<dyn EngineApi>,
    /// Registry of live jobs. Each entry's watch channel holds the latest
    /// snapshot; waiters subscribe, the poll loop publishes.
    jobs: Mutex<HashMap<String, watch::Sender<Job>>>,
    /// Throttles outbound engine calls. Excess callers queue here.
    limiter: Semaphore,
    config: TrackerConfig,
}

impl Inner {
    /// Run `f` against the live job under the registry lock and publish the
    /// updated snapshot to all waiters. Returns `None` if the job was
    /// evicted.
    async fn update<R>(&self, id: &str, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        let jobs = self.jobs.lock().await;
        let tx = jobs.get(id)?;
        let mut out = None;
        tx.send_modify(|job| out = Some(f(job)));
        out
    }
}

/// Owns the lifecycle of every in-flight analysis job, independent of any
/// conversation. Cloning is cheap and shares the registry.
#[derive(Clone)]
pub struct JobTracker {
    inner: Arc<Inner>,
}

impl JobTracker {
    pub fn new(engine: Arc<dyn EngineApi>, config: TrackerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                jobs: Mutex::new(HashMap::new()),
                limiter: Semaphore::new(config.max_concurrent_calls.max(1)),
                config,
            }),
        }
    }

    /// Submit a task to the engine and start tracking it.
    ///
    /// A rejected submission still produces a job — created directly in
    /// Failed state with the rejection attached, so the outcome is
    /// queryable like any other terminal job.
    pub async fn register(&self, kind: JobKind, params: Vec<(String, String)>) -> Job {
        let submitted = {
            let _permit = self
                .inner
                .limiter
                .acquire()
                .await
                .expect("limiter never closed");
            self.inner.engine.submit(kind, &params).await
        };

        let job = match submitted {
            Ok(id) => {
                info!(job = %id, %kind, "registered analysis job");
                Job::pending(id, kind, params)
            }
            Err(e) => {
                warn!(%kind, error = %e, "job submission rejected");
                Job::failed_submission(kind, params, e.to_string())
            }
        };

        let (tx, _rx) = watch::channel(job.clone());
        self.inner.jobs.lock().await.insert(job.id.clone(), tx);

        if job.state.is_terminal() {
            evict_later(self.inner.clone(), job.id.clone());
        } else {
            spawn_poll_loop(self.inner.clone(), job.id.clone());
        }

        job
    }

    /// Non-blocking snapshot of one job.
    pub async fn query(&self, id: &str) -> Option<Job> {
        let jobs = self.inner.jobs.lock().await;
        jobs.get(id).map(|tx| tx.borrow().clone())
    }

    /// Snapshots for a set of job ids, preserving input order and skipping
    /// evicted ids.
    pub async fn query_many(&self, ids: &[String]) -> Vec<Job> {
        let jobs = self.inner.jobs.lock().await;
        ids.iter()
            .filter_map(|id| jobs.get(id).map(|tx| tx.borrow().clone()))
            .collect()
    }

    /// Suspend until the job reaches a terminal state or `budget` elapses.
    ///
    /// On budget expiry the returned snapshot reports TimedOut to this
    /// caller only; the registry copy keeps its real state and the poll
    /// loop keeps running. Every concurrent waiter that sees the job turn
    /// terminal receives the identical snapshot.
    pub async fn await_result(&self, id: &str, budget: Duration) -> Option<Job> {
        let mut rx = {
            let jobs = self.inner.jobs.lock().await;
            jobs.get(id)?.subscribe()
        };

        let snapshot = rx.borrow().clone();
        if snapshot.state.is_terminal() {
            return Some(snapshot);
        }

        let terminal = async {
            loop {
                if rx.changed().await.is_err() {
                    // Sender dropped by eviction; last snapshot is final.
                    return rx.borrow().clone();
                }
                let job = rx.borrow().clone();
                if job.state.is_terminal() {
                    return job;
                }
            }
        };

        match timeout(budget, terminal).await {
            Ok(job) => Some(job),
            Err(_) => {
                let mut snapshot = self.query(id).await.unwrap_or(snapshot);
                snapshot.time_out();
                Some(snapshot)
            }
        }
    }

    /// Detach a session's jobs: terminal entries are dropped immediately,
    /// live ones keep polling fire-and-forget until their own eviction.
    pub async fn release(&self, ids: &[String]) {
        let mut jobs = self.inner.jobs.lock().await;
        for id in ids {
            let terminal = jobs
                .get(id)
                .map(|tx| tx.borrow().state.is_terminal())
                .unwrap_or(false);
            if terminal {
                jobs.remove(id);
                debug!(job = %id, "released terminal job with its session");
            }
        }
    }
}

/// Background poll cycle for one job: exponential backoff with jitter,
/// throttled engine calls, terminal-state detection, wait ceiling.
fn spawn_poll_loop(inner: Arc<Inner>, id: String) {
    tokio::spawn(async move {
        let deadline = Instant::now() + inner.config.max_job_wait;
        let mut attempt: u32 = 0;

        loop {
            let delay_ms = inner
                .config
                .poll
                .jittered(inner.config.poll.delay_for_attempt(attempt));
            let delay = Duration::from_millis(delay_ms);

            let live = inner
                .update(&id, |job| {
                    let delay = chrono::Duration::milliseconds(delay_ms as i64);
                    job.next_poll_at = Some(Utc::now() + delay);
                })
                .await;
            if live.is_none() {
                return;
            }

            sleep(delay).await;

            if Instant::now() >= deadline {
                inner.update(&id, |job| job.time_out()).await;
                info!(job = %id, "job exceeded its wait ceiling, forced to TimedOut");
                break;
            }

            let polled = {
                let _permit = inner.limiter.acquire().await.expect("limiter never closed");
                inner.engine.poll(&id).await
            };

            let outcome = inner
                .update(&id, |job| {
                    job.last_polled_at = Some(Utc::now());
                    match &polled {
                        Ok(status) => {
                            job.consecutive_failures = 0;
                            match status.state {
                                RemoteState::Queued => {}
                                RemoteState::Running => job.mark_running(),
                                RemoteState::Done => job.succeed(status.payload.clone()),
                                RemoteState::Error => job.fail(
                                    status
                                        .error
                                        .clone()
                                        .unwrap_or_else(|| "task failed without detail".into()),
                                ),
                            }
                        }
                        Err(e) => {
                            job.consecutive_failures += 1;
                            warn!(
                                job = %job.id,
                                failures = job.consecutive_failures,
                                error = %e,
                                "poll failed"
                            );
                            if job.consecutive_failures >= inner.config.poll.max_consecutive_failures
                            {
                                job.fail(format!(
                                    "transport exhausted after {} consecutive poll failures: {e}",
                                    job.consecutive_failures
                                ));
                            }
                        }
                    }
                    job.state
                })
                .await;

            match outcome {
                None => return, // evicted while sleeping
                Some(state) if state.is_terminal() => {
                    info!(job = %id, %state, "job reached terminal state");
                    break;
                }
                Some(_) => {}
            }

            attempt += 1;
        }

        evict_later(inner, id);
    });
}

/// Drop a terminal job from the registry once its retention window passes.
fn evict_later(inner: Arc<Inner>, id: String) {
    tokio::spawn(async move {
        sleep(inner.config.retention).await;
        if inner.jobs.lock().await.remove(&id).is_some() {
            debug!(job = %id, "evicted terminal job after retention window");
        }
    });
}
