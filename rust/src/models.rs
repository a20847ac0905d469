//! Core data types: jobs, requirements, estimates and admission outcomes.

use chrono::Duration;
use rustc_hash::FxHashMap;

use crate::timeline::Timestamp;

/// Job identifier in the host queue.
pub type JobId = u32;

/// Convert a time limit in minutes to seconds.
pub fn minutes_to_secs(minutes: u32) -> i64 {
    Duration::minutes(i64::from(minutes)).num_seconds()
}

/// Queue state of a job. Only running and pending jobs matter to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobState {
    Pending,
    Running,
    Other,
}

/// A job record as seen by the engine (read-only).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub state: JobState,
    /// Actual start for running jobs
    pub start_time: Timestamp,
    pub time_limit_minutes: Option<u32>,
    pub nodes: u32,
    /// Explicit license requests: resource name -> amount
    pub requests: FxHashMap<String, u32>,
    /// Typed metadata attached by the submission layer
    pub metadata: FxHashMap<String, String>,
}

impl Job {
    pub fn new(
        id: JobId,
        state: JobState,
        start_time: Timestamp,
        time_limit_minutes: Option<u32>,
        nodes: u32,
    ) -> Self {
        Self {
            id,
            state,
            start_time,
            time_limit_minutes,
            nodes,
            requests: FxHashMap::default(),
            metadata: FxHashMap::default(),
        }
    }

    /// Add an explicit request for `resource`.
    pub fn with_request(mut self, resource: &str, amount: u32) -> Self {
        self.requests.insert(resource.to_string(), amount);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Explicitly requested amount of `resource`, if any.
    #[inline]
    pub fn request(&self, resource: &str) -> Option<u32> {
        self.requests.get(resource).copied()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.state == JobState::Running
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.state == JobState::Pending
    }
}

/// Estimated consumption of one resource by one job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsumptionEstimate {
    pub value: u32,
    /// Predicted run time; takes precedence over the job's own limit when set
    pub time_limit_minutes: Option<u32>,
}

impl ConsumptionEstimate {
    pub fn new(value: u32) -> Self {
        Self {
            value,
            time_limit_minutes: None,
        }
    }

    pub fn with_time_limit(mut self, minutes: u32) -> Self {
        self.time_limit_minutes = Some(minutes);
        self
    }
}

/// Where a job's requirement for a resource comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requirement {
    /// Requested by the user; counted in the resource's reported usage while running
    Explicit(u32),
    /// Estimated by the predictor (zero when nothing is known)
    Predicted(u32),
}

impl Requirement {
    /// Explicit request wins; otherwise the estimate is a prediction.
    pub fn resolve(job: &Job, resource: &str, estimate: &ConsumptionEstimate) -> Self {
        match job.request(resource) {
            Some(amount) => Self::Explicit(amount),
            None => Self::Predicted(estimate.value),
        }
    }

    #[inline]
    pub fn value(&self) -> u32 {
        match *self {
            Self::Explicit(v) | Self::Predicted(v) => v,
        }
    }

    /// Amount to test against `capacity`.
    ///
    /// Predictions above capacity are over-estimates and get clamped; an
    /// explicit request above capacity can never fit and yields `None`.
    /// Nothing positive fits into a zero capacity.
    pub fn effective(&self, capacity: u32) -> Option<u32> {
        match *self {
            Self::Explicit(v) if v > capacity => None,
            Self::Explicit(v) => Some(v),
            Self::Predicted(v) if v > 0 && capacity == 0 => None,
            Self::Predicted(v) => Some(v.min(capacity)),
        }
    }
}

/// Outcome of an admission test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Earliest start that keeps the resource within its limits
    At(Timestamp),
    /// The requirement can never be satisfied
    Never,
}

impl Admission {
    #[inline]
    pub fn start(&self) -> Option<Timestamp> {
        match *self {
            Self::At(t) => Some(t),
            Self::Never => None,
        }
    }

    #[inline]
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::At(_))
    }

    /// Start time with `-1` standing for "never", as host schedulers expect.
    pub fn as_when(&self) -> Timestamp {
        self.start().unwrap_or(-1)
    }
}

/// Externally tracked state of a configured resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceState {
    pub name: String,
    /// Capacity
    pub total: u32,
    /// Amount currently in use according to the host
    pub used: u32,
}

impl ResourceState {
    pub fn new(name: &str, total: u32, used: u32) -> Self {
        Self {
            name: name.to_string(),
            total,
            used,
        }
    }
}
