//! Interface to the external consumption predictor.
//!
//! The engine never talks to the prediction service itself. Callers inject a
//! [`Predictor`]; connection handling, timeouts and retries stay on their side
//! and an unavailable service simply answers [`Prediction::NotApplicable`].

use rustc_hash::FxHashMap;

use crate::models::{Job, JobId};

/// Answer of the predictor for one job and resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prediction {
    /// Estimated consumption, optionally with a predicted run time
    Estimate {
        value: u32,
        time_limit_minutes: Option<u32>,
    },
    /// Only a run time is known
    TimeLimitOnly { time_limit_minutes: u32 },
    /// No estimate for this job
    NotApplicable,
}

impl Prediction {
    #[inline]
    pub fn value(&self) -> Option<u32> {
        match *self {
            Self::Estimate { value, .. } => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn time_limit_minutes(&self) -> Option<u32> {
        match *self {
            Self::Estimate {
                time_limit_minutes, ..
            } => time_limit_minutes,
            Self::TimeLimitOnly { time_limit_minutes } => Some(time_limit_minutes),
            Self::NotApplicable => None,
        }
    }
}

/// Estimates how much of a resource a job consumes.
///
/// Consulted once per job and resource during registry construction, and
/// only for jobs without an explicit request for that resource.
pub trait Predictor {
    fn predict(&self, job: &Job, resource: &str) -> Prediction;
}

impl<F> Predictor for F
where
    F: Fn(&Job, &str) -> Prediction,
{
    fn predict(&self, job: &Job, resource: &str) -> Prediction {
        self(job, resource)
    }
}

/// Predictor that knows nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPredictor;

impl Predictor for NoPredictor {
    fn predict(&self, _job: &Job, _resource: &str) -> Prediction {
        Prediction::NotApplicable
    }
}

/// Lookup-table predictor, e.g. for answers fetched ahead of the cycle.
#[derive(Clone, Debug, Default)]
pub struct StaticPredictor {
    table: FxHashMap<String, FxHashMap<JobId, Prediction>>,
}

impl StaticPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: &str, job_id: JobId, prediction: Prediction) {
        self.table
            .entry(resource.to_string())
            .or_default()
            .insert(job_id, prediction);
    }

    pub fn len(&self) -> usize {
        self.table.values().map(|jobs| jobs.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Predictor for StaticPredictor {
    fn predict(&self, job: &Job, resource: &str) -> Prediction {
        self.table
            .get(resource)
            .and_then(|jobs| jobs.get(&job.id))
            .copied()
            .unwrap_or(Prediction::NotApplicable)
    }
}
