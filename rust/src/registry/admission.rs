//! Admission queries and commits.
//!
//! Capacity violations are ordinary answers ([`Admission::Never`], `true`
//! from [`Registry::overlap`]); errors are reserved for misuse.

use crate::models::{minutes_to_secs, Admission, ConsumptionEstimate, Job, Requirement};
use crate::timeline::Timestamp;
use crate::{log_changes, log_checks};

use super::{AdmissionError, Registry};

/// Seconds the job holds the resource: the estimate's run time, else the job's limit.
pub(crate) fn duration_secs(job: &Job, estimate: &ConsumptionEstimate) -> Result<i64, AdmissionError> {
    estimate
        .time_limit_minutes
        .or(job.time_limit_minutes)
        .map(minutes_to_secs)
        .ok_or(AdmissionError::MissingTimeLimit(job.id))
}

impl Registry {
    /// Earliest start at or after `proposed` at which `job` fits on `resource`.
    ///
    /// An unknown resource or a zero requirement admits the job at `proposed`.
    /// An explicit request above capacity is never admissible.
    pub fn test_job(
        &self,
        resource: &str,
        job: &Job,
        estimate: &ConsumptionEstimate,
        proposed: Timestamp,
    ) -> Result<Admission, AdmissionError> {
        let Some(entry) = self.entry(resource) else {
            return Ok(Admission::At(proposed));
        };
        let requirement = Requirement::resolve(job, resource, estimate);
        if requirement.value() == 0 {
            return Ok(Admission::At(proposed));
        }
        let Some(amount) = requirement.effective(entry.capacity()) else {
            log_checks!(
                self.verbosity,
                "  Job {} requests {} {} above capacity {}, never admissible",
                job.id,
                requirement.value(),
                resource,
                entry.capacity()
            );
            return Ok(Admission::Never);
        };
        let duration = duration_secs(job, estimate)?;

        let admission = match entry.earliest_fit(proposed, duration, amount, job.nodes) {
            Some(when) => Admission::At(when),
            None => Admission::Never,
        };
        log_checks!(
            self.verbosity,
            "  Job {} needs {} {} for {}s from {}: {:?}",
            job.id,
            amount,
            resource,
            duration,
            proposed,
            admission
        );
        Ok(admission)
    }

    /// Whether committing `job` at `when` would push `resource` over its
    /// limits somewhere in `[when, when + duration)`.
    pub fn overlap(
        &self,
        resource: &str,
        job: &Job,
        estimate: &ConsumptionEstimate,
        when: Timestamp,
    ) -> Result<bool, AdmissionError> {
        let Some(entry) = self.entry(resource) else {
            return Ok(false);
        };
        let requirement = Requirement::resolve(job, resource, estimate);
        if requirement.value() == 0 {
            return Ok(false);
        }
        let Some(amount) = requirement.effective(entry.capacity()) else {
            return Ok(true);
        };
        let duration = duration_secs(job, estimate)?;
        Ok(entry.earliest_fit(when, duration, amount, job.nodes) != Some(when))
    }

    /// Reserve the job's requirement on `resource` over `[start, end)`.
    ///
    /// The interval is widened to the resolution grid. The full requirement is
    /// booked even when it exceeds capacity.
    pub fn alloc_job(
        &mut self,
        resource: &str,
        job: &Job,
        estimate: &ConsumptionEstimate,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<(), AdmissionError> {
        if end < start {
            return Err(AdmissionError::InvalidInterval { start, end });
        }
        let (from, to) = (self.round_down(start), self.round_up(end));
        let verbosity = self.verbosity;
        let entry = self
            .entries
            .get_mut(resource)
            .ok_or_else(|| AdmissionError::UnknownResource(resource.to_string()))?;

        let amount = Requirement::resolve(job, resource, estimate).value();
        if amount == 0 || end == start {
            return Ok(());
        }
        entry.commit(from, to, amount, job.nodes);
        log_changes!(
            verbosity,
            "Committed job {}: {} {} over [{}, {})",
            job.id,
            amount,
            resource,
            from,
            to
        );
        Ok(())
    }

    /// Earliest start at which `job` fits on every configured resource,
    /// using the estimates gathered at construction.
    pub fn test_job_all(&self, job: &Job, proposed: Timestamp) -> Result<Admission, AdmissionError> {
        let names = self.names();
        let mut when = proposed;
        loop {
            let mut latest = when;
            for name in &names {
                let estimate = self.estimate_for(job, name);
                match self.test_job(name, job, &estimate, when)? {
                    Admission::Never => return Ok(Admission::Never),
                    Admission::At(t) => latest = latest.max(t),
                }
            }
            if latest == when {
                return Ok(Admission::At(when));
            }
            when = latest;
        }
    }

    /// Commit `job` on every configured resource.
    pub fn alloc_job_all(&mut self, job: &Job, start: Timestamp, end: Timestamp) -> Result<(), AdmissionError> {
        let names: Vec<String> = self.names().into_iter().map(str::to_string).collect();
        for name in &names {
            let estimate = self.estimate_for(job, name);
            self.alloc_job(name, job, &estimate, start, end)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdmissionConfig;
    use crate::models::{JobState, ResourceState};
    use crate::predictor::NoPredictor;
    use crate::test_support::{lustre, pending, pending_cycle, running_with_requests, FixedJitter};
    use crate::timeline::UsageTimeline;

    fn registry(config: &AdmissionConfig, total: u32, extra: Vec<Job>) -> Registry {
        let mut jobs = running_with_requests();
        jobs.extend(extra);
        Registry::build(config, &lustre(total), &jobs, &NoPredictor, 10000, &mut FixedJitter)
            .unwrap()
            .unwrap()
    }

    fn baseline() -> Registry {
        registry(&AdmissionConfig::default(), 1000, Vec::new())
    }

    fn est(value: u32) -> ConsumptionEstimate {
        ConsumptionEstimate::new(value)
    }

    fn steps(registry: &Registry) -> Vec<(Timestamp, i64)> {
        registry.timeline("lustre").map(|t| t.to_pairs()).unwrap_or_default()
    }

    fn star_steps(registry: &Registry) -> Vec<(Timestamp, i64)> {
        registry.star_timeline("lustre").map(|t| t.to_pairs()).unwrap_or_default()
    }

    const AFTER_COMMIT: [(Timestamp, i64); 5] =
        [(-1, 500), (12060, 400), (12240, 300), (12360, 1200), (18420, 0)];

    #[test]
    fn test_initial_timeline() {
        assert_eq!(
            steps(&baseline()),
            vec![(-1, 500), (12060, 400), (12240, 300), (12360, 0)]
        );
    }

    #[test]
    fn test_job_estimates() {
        let registry = baseline();
        let job = pending(101);
        assert_eq!(registry.test_job("lustre", &job, &est(0), 10000), Ok(Admission::At(10000)));
        assert_eq!(registry.test_job("lustre", &job, &est(600), 10000), Ok(Admission::At(12060)));
        // Over-estimate is clamped to capacity
        assert_eq!(registry.test_job("lustre", &job, &est(1200), 10000), Ok(Admission::At(12360)));
    }

    #[test]
    fn test_job_never_earlier_than_proposed() {
        let registry = baseline();
        let job = pending(101);
        assert_eq!(registry.test_job("lustre", &job, &est(600), 13000), Ok(Admission::At(13000)));
        assert_eq!(registry.test_job("lustre", &job, &est(600), 12100), Ok(Admission::At(12100)));
    }

    #[test]
    fn test_job_and_alloc_job_estimates() {
        let mut registry = baseline();
        let mut job1 = pending(101);
        let job2 = pending(102);

        assert_eq!(registry.test_job("lustre", &job1, &est(600), 10000), Ok(Admission::At(12060)));
        let when = registry
            .test_job("lustre", &job2, &est(1200), 10000)
            .unwrap()
            .start()
            .unwrap();
        assert_eq!(when, 12360);

        registry
            .alloc_job("lustre", &job2, &est(1200), when, when + 100 * 60)
            .unwrap();
        assert_eq!(steps(&registry), AFTER_COMMIT.to_vec());

        assert_eq!(registry.test_job("lustre", &job1, &est(600), 10000), Ok(Admission::At(18420)));
        job1.time_limit_minutes = Some(4);
        assert_eq!(registry.test_job("lustre", &job1, &est(600), 10000), Ok(Admission::At(12060)));
        assert_eq!(registry.test_job("lustre", &job1, &est(0), 10000), Ok(Admission::At(10000)));
    }

    #[test]
    fn test_job_and_alloc_job_explicit_requests() {
        let mut registry = baseline();
        let mut job1 = pending(101).with_request("lustre", 600);
        let job2 = pending(102).with_request("lustre", 1200);

        assert_eq!(registry.test_job("lustre", &job1, &est(0), 10000), Ok(Admission::At(12060)));
        let admission = registry.test_job("lustre", &job2, &est(0), 10000).unwrap();
        assert_eq!(admission, Admission::Never);
        assert_eq!(admission.as_when(), -1);

        // A reservation above capacity can still be booked
        registry
            .alloc_job("lustre", &job2, &est(0), 12360, 12360 + 100 * 60)
            .unwrap();
        assert_eq!(steps(&registry), AFTER_COMMIT.to_vec());

        assert_eq!(registry.test_job("lustre", &job1, &est(0), 10000), Ok(Admission::At(18420)));
        job1.time_limit_minutes = Some(4);
        assert_eq!(registry.test_job("lustre", &job1, &est(0), 10000), Ok(Admission::At(12060)));
    }

    #[test]
    fn test_overlap() {
        let mut registry = baseline();
        let mut job1 = pending(101);
        let job2 = pending(102);
        let overlap = |r: &Registry, job: &Job, value: u32, when: Timestamp| {
            r.overlap("lustre", job, &est(value), when).unwrap()
        };

        assert!(overlap(&registry, &job1, 600, 10000));
        assert!(!overlap(&registry, &job1, 600, 12060));
        assert!(!overlap(&registry, &job1, 600, 12160));
        assert!(overlap(&registry, &job2, 1200, 12160));
        assert!(!overlap(&registry, &job2, 1200, 12360));

        registry
            .alloc_job("lustre", &job2, &est(1200), 12360, 12360 + 100 * 60)
            .unwrap();
        assert_eq!(steps(&registry), AFTER_COMMIT.to_vec());

        assert!(overlap(&registry, &job1, 600, 10000));
        assert!(overlap(&registry, &job1, 600, 12060));
        assert!(overlap(&registry, &job1, 600, 12160));

        job1.time_limit_minutes = Some(4);
        assert!(overlap(&registry, &job1, 600, 10000));
        assert!(!overlap(&registry, &job1, 600, 12060));
        assert!(overlap(&registry, &job1, 600, 12160));

        for when in [10000, 12060, 12160, 15160] {
            assert!(!overlap(&registry, &job1, 0, when));
        }
    }

    #[test]
    fn test_overlap_explicit_above_capacity() {
        let registry = baseline();
        let job = pending(102).with_request("lustre", 1200);
        assert_eq!(registry.overlap("lustre", &job, &est(0), 12360), Ok(true));
    }

    #[test]
    fn test_capacity_boundary() {
        let config = AdmissionConfig::default();
        let registry = Registry::build(&config, &lustre(1000), &[], &NoPredictor, 0, &mut FixedJitter)
            .unwrap()
            .unwrap();
        let job = pending(101);
        assert_eq!(registry.test_job("lustre", &job, &est(500), 10000), Ok(Admission::At(10000)));
        assert_eq!(registry.overlap("lustre", &job, &est(500), 10000), Ok(false));
        assert_eq!(registry.test_job("lustre", &job, &est(501), 10000), Ok(Admission::Never));
        assert_eq!(registry.overlap("lustre", &job, &est(501), 10000), Ok(true));
    }

    #[test]
    fn test_zero_requirement_on_full_resource() {
        let resources = vec![ResourceState::new("lustre", 1000, 1000)];
        let registry = Registry::build(
            &AdmissionConfig::default(),
            &resources,
            &[],
            &NoPredictor,
            0,
            &mut FixedJitter,
        )
        .unwrap()
        .unwrap();
        // No time limit is needed when nothing is required
        let job = Job::new(1, JobState::Pending, 0, None, 10);
        for proposed in [0, 10000, 99999] {
            assert_eq!(
                registry.test_job("lustre", &job, &est(0), proposed),
                Ok(Admission::At(proposed))
            );
        }
        assert_eq!(registry.test_job("lustre", &pending(2), &est(1), 0), Ok(Admission::Never));
    }

    #[test]
    fn test_zero_capacity() {
        let resources = vec![ResourceState::new("lustre", 0, 0)];
        let registry = Registry::build(
            &AdmissionConfig::default(),
            &resources,
            &[],
            &NoPredictor,
            0,
            &mut FixedJitter,
        )
        .unwrap()
        .unwrap();
        let job = pending(1);
        assert_eq!(registry.test_job("lustre", &job, &est(1), 0), Ok(Admission::Never));
        let explicit = pending(2).with_request("lustre", 1);
        assert_eq!(registry.test_job("lustre", &explicit, &est(0), 0), Ok(Admission::Never));
    }

    #[test]
    fn test_unknown_resource() {
        let mut registry = baseline();
        let job = pending(101).with_request("scratch", 5000);
        assert_eq!(registry.test_job("scratch", &job, &est(0), 10000), Ok(Admission::At(10000)));
        assert_eq!(registry.overlap("scratch", &job, &est(0), 10000), Ok(false));
        assert_eq!(
            registry.alloc_job("scratch", &job, &est(0), 10000, 16000),
            Err(AdmissionError::UnknownResource("scratch".to_string()))
        );
    }

    #[test]
    fn test_invalid_interval() {
        let mut registry = baseline();
        let before = steps(&registry);
        assert_eq!(
            registry.alloc_job("lustre", &pending(101), &est(100), 12000, 11000),
            Err(AdmissionError::InvalidInterval {
                start: 12000,
                end: 11000
            })
        );
        // Zero-length commits book nothing
        registry
            .alloc_job("lustre", &pending(101), &est(100), 12000, 12000)
            .unwrap();
        assert_eq!(steps(&registry), before);
    }

    #[test]
    fn test_missing_time_limit() {
        let registry = baseline();
        let job = Job::new(101, JobState::Pending, 0, None, 10);
        assert_eq!(
            registry.test_job("lustre", &job, &est(100), 10000),
            Err(AdmissionError::MissingTimeLimit(101))
        );
        assert_eq!(
            registry.test_job("lustre", &job, &est(100).with_time_limit(10), 10000),
            Ok(Admission::At(10000))
        );
    }

    #[test]
    fn test_two_group_without_pending_jobs() {
        let config = AdmissionConfig::two_group(100);
        let mut registry = registry(&config, 1000, Vec::new());
        let star = registry.entry("lustre").and_then(|e| e.star()).unwrap();
        assert_eq!(star.star_target, 1000);
        assert_eq!(
            star_steps(&registry),
            vec![(-1, 500), (12060, 400), (12240, 300), (12360, 0)]
        );

        let job1 = pending(101);
        let job2 = pending(102);
        let when = registry.test_job("lustre", &job1, &est(300), 10000).unwrap();
        assert_eq!(when, Admission::At(10000));
        registry
            .alloc_job("lustre", &job1, &est(300), 10000, 10000 + 10 * 60)
            .unwrap();

        assert_eq!(registry.test_job("lustre", &job2, &est(300), 10000), Ok(Admission::At(10620)));
        assert_eq!(registry.test_job("lustre", &job2, &est(600), 10620), Ok(Admission::At(12060)));
    }

    #[test]
    fn test_two_group_larger_capacity_without_pending_jobs() {
        let config = AdmissionConfig::two_group(100);
        let mut registry = registry(&config, 10000, Vec::new());
        assert_eq!(
            registry.entry("lustre").and_then(|e| e.star()).map(|s| s.star_target),
            Some(10000)
        );

        let job1 = pending(101);
        let job2 = pending(102);
        assert_eq!(registry.test_job("lustre", &job1, &est(300), 10000), Ok(Admission::At(10000)));
        registry
            .alloc_job("lustre", &job1, &est(300), 10000, 10000 + 10 * 60)
            .unwrap();
        assert_eq!(registry.test_job("lustre", &job2, &est(300), 10000), Ok(Admission::At(10000)));
        assert_eq!(registry.test_job("lustre", &job2, &est(600), 10000), Ok(Admission::At(10000)));
    }

    #[test]
    fn test_two_group_star_target_decreases_with_population() {
        let config = AdmissionConfig::two_group(100);
        let target = |extra: Vec<Job>| {
            registry(&config, 10000, extra)
                .entry("lustre")
                .and_then(|e| e.star())
                .map(|s| (s.star_target, s.star_rate))
                .unwrap()
        };
        let (none, _) = target(Vec::new());
        let (thirty, thirty_rate) = target(pending_cycle(10, 1000));
        let (three_hundred, _) = target(pending_cycle(100, 1000));
        assert_eq!(none, 10000);
        assert_eq!(thirty, 668);
        assert!((thirty_rate - 10.0).abs() < 1e-9);
        assert_eq!(three_hundred, 667);
        assert!(none > thirty && thirty > three_hundred);
        assert!(three_hundred >= 500);
    }

    #[test]
    fn test_two_group_with_pending_population() {
        let config = AdmissionConfig::two_group(100);
        let mut registry = registry(&config, 10000, pending_cycle(100, 1000));
        assert_eq!(star_steps(&registry), vec![(-1, 200), (12360, 0)]);

        let job1 = pending(101);
        let job2 = pending(102);
        assert_eq!(registry.test_job("lustre", &job1, &est(300), 10000), Ok(Admission::At(10000)));
        registry
            .alloc_job("lustre", &job1, &est(300), 10000, 10000 + 10 * 60)
            .unwrap();
        assert_eq!(
            star_steps(&registry),
            vec![(-1, 200), (9960, 400), (10620, 200), (12360, 0)]
        );

        let expected = [(300, 10000), (600, 10000), (700, 10620), (3000, 10620), (10000, 12360)];
        for (value, when) in expected {
            assert_eq!(
                registry.test_job("lustre", &job2, &est(value), 10000),
                Ok(Admission::At(when)),
                "requirement {}",
                value
            );
        }
    }

    #[test]
    fn test_two_group_overlap_checks_star_timeline() {
        let config = AdmissionConfig::two_group(100);
        let mut registry = registry(&config, 10000, pending_cycle(100, 1000));
        let job = pending(101);
        registry
            .alloc_job("lustre", &job, &est(300), 10000, 10600)
            .unwrap();
        // Capacity alone would allow 700 at 10000
        assert_eq!(registry.overlap("lustre", &job, &est(700), 10000), Ok(true));
        assert_eq!(registry.overlap("lustre", &job, &est(700), 10620), Ok(false));
    }

    #[test]
    fn test_round_trip_occupancy() {
        let config = AdmissionConfig {
            resolution_secs: 0,
            ..AdmissionConfig::default()
        };
        let resources = vec![ResourceState::new("lustre", 100_000, 0)];
        let mut registry =
            Registry::build(&config, &resources, &[], &NoPredictor, 0, &mut FixedJitter)
                .unwrap()
                .unwrap();
        let commits: [(Timestamp, Timestamp, u32); 6] = [
            (100, 700, 300),
            (400, 900, 200),
            (700, 1300, 50),
            (0, 100, 10),
            (1300, 1400, 999),
            (450, 460, 7),
        ];
        for (i, &(start, end, value)) in commits.iter().enumerate() {
            let job = pending(i as u32 + 1);
            registry.alloc_job("lustre", &job, &est(value), start, end).unwrap();
        }

        let timeline: &UsageTimeline = registry.timeline("lustre").unwrap();
        for t in (-10..1500).step_by(5) {
            let expected: i64 = commits
                .iter()
                .filter(|&&(start, end, _)| start <= t && t < end)
                .map(|&(_, _, v)| i64::from(v))
                .sum();
            assert_eq!(timeline.value_at(t), expected, "at {}", t);
        }
    }

    #[test]
    fn test_job_all_across_resources() {
        let resources = vec![
            ResourceState::new("lustre", 1000, 500),
            ResourceState::new("scratch", 100, 100),
        ];
        let mut jobs = running_with_requests();
        jobs.push(Job::new(7, JobState::Running, 6000, Some(200), 10).with_request("scratch", 100));
        let candidate = pending(101)
            .with_request("lustre", 600)
            .with_request("scratch", 50);
        jobs.push(candidate.clone());

        let mut registry = Registry::build(
            &AdmissionConfig::default(),
            &resources,
            &jobs,
            &NoPredictor,
            10000,
            &mut FixedJitter,
        )
        .unwrap()
        .unwrap();

        // lustre frees up at 12060, scratch only at 18060
        assert_eq!(registry.test_job_all(&candidate, 10000), Ok(Admission::At(18060)));

        registry
            .alloc_job_all(&candidate, 18060, 18060 + 100 * 60)
            .unwrap();
        assert_eq!(
            registry.timeline("scratch").map(|t| t.to_pairs()),
            Some(vec![(-1, 100), (18060, 50), (24120, 0)])
        );
        assert_eq!(registry.timeline("lustre").map(|t| t.value_at(18060)), Some(600));
    }
}
