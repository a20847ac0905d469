//! Registry construction from the job list.
//!
//! Construction runs in two phases. [`gather_demands`] asks the predictor
//! about every running and pending job; it is pure and may be run per job
//! chunk by callers who want to overlap predictor latency. The fold then
//! walks the jobs in order and builds each resource's timelines serially.

use rand::Rng;
use rustc_hash::FxHashMap;

use crate::config::{AdmissionConfig, AdmissionPolicy};
use crate::models::{minutes_to_secs, ConsumptionEstimate, Job, JobId, Requirement, ResourceState};
use crate::predictor::Predictor;
use crate::timeline::{Timestamp, UsageTimeline, ORIGIN};
use crate::{log_changes, log_checks, log_debug};

use super::adaptive::{star_target, RateAccumulator};
use super::entry::{AdaptiveEntry, BaselineEntry, ResourceEntry, StarState};
use super::{AdmissionError, Registry};

/// What a job needs from one resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Demand {
    pub requirement: Requirement,
    /// Run time reported by the predictor
    pub time_limit_minutes: Option<u32>,
}

impl Demand {
    fn of(job: &Job, resource: &str, predictor: &(impl Predictor + ?Sized)) -> Self {
        if let Some(amount) = job.request(resource) {
            return Self {
                requirement: Requirement::Explicit(amount),
                time_limit_minutes: None,
            };
        }
        let prediction = predictor.predict(job, resource);
        Self {
            requirement: Requirement::Predicted(prediction.value().unwrap_or(0)),
            time_limit_minutes: prediction.time_limit_minutes(),
        }
    }

    /// Demand of a job the gather phase did not see.
    fn fallback(job: &Job, resource: &str) -> Self {
        Self {
            requirement: job
                .request(resource)
                .map_or(Requirement::Predicted(0), Requirement::Explicit),
            time_limit_minutes: None,
        }
    }

    pub fn estimate(&self) -> ConsumptionEstimate {
        ConsumptionEstimate {
            value: self.requirement.value(),
            time_limit_minutes: self.time_limit_minutes,
        }
    }

    /// The job's own limit, falling back to the predicted one.
    fn time_limit(&self, job: &Job) -> Option<u32> {
        job.time_limit_minutes.or(self.time_limit_minutes)
    }

    /// The predicted run time, falling back to the job's own limit.
    fn duration(&self, job: &Job) -> Option<u32> {
        self.time_limit_minutes.or(job.time_limit_minutes)
    }
}

/// resource name -> job id -> demand
pub type DemandTable = FxHashMap<String, FxHashMap<JobId, Demand>>;

/// Resolve the demand of every running and pending job on every resource.
pub fn gather_demands<P>(jobs: &[Job], resources: &[ResourceState], predictor: &P) -> DemandTable
where
    P: Predictor + ?Sized,
{
    let mut table: DemandTable = FxHashMap::default();
    for resource in resources {
        let per_job = table.entry(resource.name.clone()).or_default();
        for job in jobs.iter().filter(|j| j.is_running() || j.is_pending()) {
            per_job.insert(job.id, Demand::of(job, &resource.name, predictor));
        }
    }
    table
}

/// Running job's reservation as seen by the star timeline.
struct RunningUse {
    value: u32,
    nodes: u32,
    end: Option<Timestamp>,
}

impl Registry {
    /// Build the registry for one scheduling cycle.
    ///
    /// Returns `Ok(None)` when no resource is configured; every job is then
    /// unconstrained. `rng` supplies the per-resource jitter of the two-group
    /// policy and is not touched otherwise.
    pub fn build<P, R>(
        config: &AdmissionConfig,
        resources: &[ResourceState],
        jobs: &[Job],
        predictor: &P,
        now: Timestamp,
        rng: &mut R,
    ) -> Result<Option<Self>, AdmissionError>
    where
        P: Predictor + ?Sized,
        R: Rng,
    {
        config.validate()?;
        if resources.is_empty() {
            log_checks!(config.verbosity, "No resources configured, admission disabled");
            return Ok(None);
        }
        let demands = gather_demands(jobs, resources, predictor);
        Self::from_demands(config, resources, jobs, demands, now, rng).map(Some)
    }

    /// Fold previously gathered demands into a registry.
    pub fn from_demands<R: Rng>(
        config: &AdmissionConfig,
        resources: &[ResourceState],
        jobs: &[Job],
        demands: DemandTable,
        now: Timestamp,
        rng: &mut R,
    ) -> Result<Self, AdmissionError> {
        config.validate()?;
        let verbosity = config.verbosity;
        let resolution = config.resolution_secs;

        let mut entries: FxHashMap<String, ResourceEntry> = FxHashMap::default();
        for resource in resources {
            let per_job = demands.get(&resource.name);
            let demand_of = |job: &Job| {
                per_job
                    .and_then(|d| d.get(&job.id))
                    .copied()
                    .unwrap_or_else(|| Demand::fallback(job, &resource.name))
            };

            let mut timeline = UsageTimeline::new(i64::from(resource.used));
            let mut rates = RateAccumulator::new();
            let mut running: Vec<RunningUse> = Vec::new();
            let mut pending_count = 0usize;

            for job in jobs {
                let demand = demand_of(job);
                let value = demand.requirement.value();
                if job.is_running() {
                    let end = demand
                        .time_limit(job)
                        .map(|minutes| job.start_time + minutes_to_secs(minutes));
                    let reserved_end = end.map(|e| super::round_up(e, resolution));
                    match (demand.requirement, reserved_end) {
                        (Requirement::Explicit(v), Some(end)) => {
                            timeline.remove_till_end(end, i64::from(v));
                        }
                        (Requirement::Explicit(_), None) => {}
                        (Requirement::Predicted(v), Some(end)) if v > 0 => {
                            timeline.add_usage(ORIGIN, end, i64::from(v));
                        }
                        (Requirement::Predicted(v), None) if v > 0 => {
                            timeline.add(i64::from(v));
                        }
                        (Requirement::Predicted(_), _) => {}
                    }
                    if reserved_end.is_none() && value > 0 {
                        log_checks!(
                            verbosity,
                            "  Job {} holds {} {} with no time limit",
                            job.id,
                            value,
                            resource.name
                        );
                    }
                    if let Some(end) = end {
                        rates.add_running(value, job.nodes, end - now);
                    }
                    running.push(RunningUse {
                        value,
                        nodes: job.nodes,
                        end: reserved_end,
                    });
                } else if job.is_pending() {
                    pending_count += 1;
                    let duration = demand.duration(job).map(minutes_to_secs);
                    rates.add_pending(value, job.nodes, duration);
                }
            }

            let base = BaselineEntry::new(&resource.name, resource.total, timeline);
            let entry = match config.policy {
                AdmissionPolicy::Aware => ResourceEntry::Baseline(base),
                AdmissionPolicy::TwoGroup => {
                    let stats = rates.finish();
                    let nodes = config.total_node_count.unwrap_or(0);
                    let target = star_target(&stats, resource.total, nodes, config.two_group_fraction);
                    let jitter: f64 = rng.random();
                    let mut star = StarState::new(&stats, target, jitter);
                    for job in &running {
                        let excess = star.excess(job.value, job.nodes);
                        if excess <= 0 {
                            continue;
                        }
                        match job.end {
                            Some(end) => star.timeline.add_usage(ORIGIN, end, excess),
                            None => star.timeline.add(excess),
                        }
                    }
                    log_debug!(
                        verbosity,
                        "  {}: r_target={:.4} r_star={:.4} r_bar={:.4} n_total={} star_target={} jitter={:.3}",
                        resource.name,
                        star.target_rate,
                        star.star_rate,
                        star.mean_rate,
                        star.pending_demand,
                        star.star_target,
                        star.jitter
                    );
                    ResourceEntry::Adaptive(AdaptiveEntry { base, star })
                }
            };

            log_changes!(
                verbosity,
                "Resource {}: capacity={} used={} running={} pending={} policy={}",
                resource.name,
                resource.total,
                resource.used,
                running.len(),
                pending_count,
                config.policy
            );
            log_debug!(verbosity, "{}", entry.base().timeline.dump());

            entries.insert(resource.name.clone(), entry);
        }

        Ok(Self {
            entries,
            demands,
            resolution_secs: resolution,
            now,
            verbosity,
        })
    }
}
