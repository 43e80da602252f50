use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::engine::JobKind;

/// Lifecycle states of a tracked job.
///
/// Transitions are one-directional: Pending → Running → one of the three
/// terminal states. Nothing ever leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::TimedOut
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "PENDING"),
            JobState::Running => write!(f, "RUNNING"),
            JobState::Succeeded => write!(f, "SUCCEEDED"),
            JobState::Failed => write!(f, "FAILED"),
            JobState::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

/// Configuration for the per-job poll cadence.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay in milliseconds before the first poll.
    pub initial_ms: u64,
    /// Ceiling in milliseconds for the exponential backoff.
    pub max_ms: u64,
    /// Jitter fraction applied to every delay (0.1 = ±10%). Keeps a burst
    /// of jobs submitted together from polling the engine in lockstep.
    pub jitter: f64,
    /// Consecutive transport failures tolerated before the job is failed.
    pub max_consecutive_failures: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_ms: 1000,
            max_ms: 30_000,
            jitter: 0.1,
            max_consecutive_failures: 3,
        }
    }
}

impl PollConfig {
    /// Delay before poll number `attempt` (zero-based):
    /// initial_ms * 2^attempt, capped at max_ms.
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let factor = 2u64.saturating_pow(attempt);
        self.initial_ms.saturating_mul(factor).min(self.max_ms)
    }

    /// Apply the configured jitter to a delay.
    pub fn jittered(&self, delay_ms: u64) -> u64 {
        if self.jitter <= 0.0 || delay_ms == 0 {
            return delay_ms;
        }
        let spread = delay_ms as f64 * self.jitter;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        (delay_ms as f64 + offset).max(0.0) as u64
    }
}

/// One unit of work submitted to the analysis engine, as tracked locally.
///
/// Mutated only by the tracker's poll loop; everyone else sees clones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    /// Engine-issued task id, or a local id when submission itself failed.
    pub id: String,
    pub kind: JobKind,
    /// Engine form fields captured at submission. Immutable afterwards.
    pub params: Vec<(String, String)>,
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub next_poll_at: Option<DateTime<Utc>>,
    /// Present exactly when `state` is `Succeeded`.
    pub result: Option<Value>,
    /// Present exactly when `state` is `Failed`.
    pub error: Option<String>,
    /// Transport failures since the last successful poll.
    #[serde(skip)]
    pub consecutive_failures: u32,
}

impl Job {
    /// A freshly submitted job waiting for its first poll.
    pub fn pending(id: String, kind: JobKind, params: Vec<(String, String)>) -> Self {
        Self {
            id,
            kind,
            params,
            state: JobState::Pending,
            submitted_at: Utc::now(),
            last_polled_at: None,
            next_poll_at: None,
            result: None,
            error: None,
            consecutive_failures: 0,
        }
    }

    /// A job whose submission was rejected: born terminal, never polled.
    pub fn failed_submission(kind: JobKind, params: Vec<(String, String)>, error: String) -> Self {
        Self {
            id: format!("local-{}", Uuid::new_v4()),
            kind,
            params,
            state: JobState::Failed,
            submitted_at: Utc::now(),
            last_polled_at: None,
            next_poll_at: None,
            result: None,
            error: Some(error),
            consecutive_failures: 0,
        }
    }

    /// Pending → Running. No-op in any other state.
    pub fn mark_running(&mut self) {
        if self.state == JobState::Pending {
            self.state = JobState::Running;
        }
    }

    /// Transition to Succeeded with the engine's result payload.
    pub fn succeed(&mut self, result: Value) {
        if self.state.is_terminal() {
            return;
        }
        self.state = JobState::Succeeded;
        self.result = Some(result);
        self.error = None;
    }

    /// Transition to Failed with an error description.
    pub fn fail(&mut self, error: String) {
        if self.state.is_terminal() {
            return;
        }
        self.state = JobState::Failed;
        self.error = Some(error);
        self.result = None;
    }

    /// Transition to TimedOut. Carries neither result nor error detail.
    pub fn time_out(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = JobState::TimedOut;
    }
}
