//! Per-resource registry rebuilt once per scheduling cycle.
//!
//! The registry owns one [`ResourceEntry`] per configured resource and the
//! consumption estimates gathered while building it. Admission queries and
//! commits live in `admission.rs`; construction lives in `build.rs`.

mod adaptive;
mod admission;
mod build;
mod entry;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::models::{ConsumptionEstimate, Job, JobId};
use crate::timeline::{Timestamp, UsageTimeline};

pub use adaptive::{star_target, RateAccumulator, RateStats};
pub use build::{gather_demands, Demand, DemandTable};
pub(crate) use admission::duration_secs;
pub use entry::{AdaptiveEntry, BaselineEntry, ResourceEntry, StarState};

/// Errors reserved for caller misuse. Infeasible jobs are not errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdmissionError {
    #[error("Unknown resource: {0}")]
    UnknownResource(String),
    #[error("Invalid interval: end {end} is before start {start}")]
    InvalidInterval { start: Timestamp, end: Timestamp },
    #[error("Job {0} has no time limit and no predicted run time")]
    MissingTimeLimit(JobId),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Resource entries for one scheduling cycle.
#[derive(Clone, Debug)]
pub struct Registry {
    entries: FxHashMap<String, ResourceEntry>,
    demands: DemandTable,
    resolution_secs: i64,
    now: Timestamp,
    verbosity: u8,
}

impl Registry {
    /// Entry for `name`, if that resource is configured.
    pub fn entry(&self, name: &str) -> Option<&ResourceEntry> {
        self.entries.get(name)
    }

    /// Usage timeline of `name`.
    pub fn timeline(&self, name: &str) -> Option<&UsageTimeline> {
        self.entry(name).map(|e| &e.base().timeline)
    }

    /// Star timeline of `name`; `None` unless the entry is adaptive.
    pub fn star_timeline(&self, name: &str) -> Option<&UsageTimeline> {
        self.entry(name).and_then(|e| e.star()).map(|s| &s.timeline)
    }

    /// Configured resource names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cycle time the registry was built for.
    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    pub fn resolution_secs(&self) -> i64 {
        self.resolution_secs
    }

    /// Demand recorded for `job_id` on `resource` during construction.
    pub fn demand_for(&self, job_id: JobId, resource: &str) -> Option<&Demand> {
        self.demands.get(resource).and_then(|jobs| jobs.get(&job_id))
    }

    /// Estimate gathered for `job` on `resource`, or an empty estimate if the
    /// job was not seen during construction.
    pub fn estimate_for(&self, job: &Job, resource: &str) -> ConsumptionEstimate {
        self.demand_for(job.id, resource)
            .map(Demand::estimate)
            .unwrap_or_default()
    }

    /// Align `t` down to the resolution grid.
    pub(crate) fn round_down(&self, t: Timestamp) -> Timestamp {
        round_down(t, self.resolution_secs)
    }

    /// Next grid point strictly after `t`.
    pub(crate) fn round_up(&self, t: Timestamp) -> Timestamp {
        round_up(t, self.resolution_secs)
    }
}

pub(crate) fn round_down(t: Timestamp, resolution: i64) -> Timestamp {
    if resolution <= 0 {
        return t;
    }
    t - t.rem_euclid(resolution)
}

pub(crate) fn round_up(t: Timestamp, resolution: i64) -> Timestamp {
    if resolution <= 0 {
        return t;
    }
    t - t.rem_euclid(resolution) + resolution
}
