//! Serial backfill driver over a registry.
//!
//! Pending jobs are considered in the order the caller presents them. Each
//! admitted job is committed right away, so earlier jobs take resources
//! before later ones see them.

use crate::models::{Admission, ConsumptionEstimate, Job, JobId, Requirement};
use crate::registry::{duration_secs, AdmissionError, Registry};
use crate::timeline::Timestamp;
use crate::{log_changes, log_checks};

/// Outcome for one pending job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    pub job_id: JobId,
    /// Reserved start, `None` if the job was not placed
    pub start: Option<Timestamp>,
}

/// What a job holds on one resource, and for how long.
struct Hold {
    resource: String,
    estimate: ConsumptionEstimate,
    secs: i64,
}

/// One backfill pass over a freshly built registry.
pub struct BackfillPass<'a> {
    registry: &'a mut Registry,
    verbosity: u8,
}

impl<'a> BackfillPass<'a> {
    pub fn new(registry: &'a mut Registry) -> Self {
        let verbosity = registry.verbosity();
        Self {
            registry,
            verbosity,
        }
    }

    /// Holds on every resource the job needs. Each hold lasts exactly as long
    /// as the window [`Registry::test_job`] checks for that resource.
    /// `None` when a needed resource has no run time to check against.
    fn holds(&self, job: &Job) -> Option<Vec<Hold>> {
        let mut holds = Vec::new();
        for name in self.registry.names() {
            let estimate = self.registry.estimate_for(job, name);
            if Requirement::resolve(job, name, &estimate).value() == 0 {
                continue;
            }
            let secs = duration_secs(job, &estimate).ok()?;
            holds.push(Hold {
                resource: name.to_string(),
                estimate,
                secs,
            });
        }
        Some(holds)
    }

    /// Find the earliest start at or after `proposed` and reserve the job there.
    pub fn place(&mut self, job: &Job, proposed: Timestamp) -> Result<Placement, AdmissionError> {
        let Some(holds) = self.holds(job) else {
            log_checks!(self.verbosity, "  Job {} skipped: no time limit", job.id);
            return Ok(Placement {
                job_id: job.id,
                start: None,
            });
        };

        match self.registry.test_job_all(job, proposed)? {
            Admission::At(start) => {
                for hold in &holds {
                    self.registry.alloc_job(
                        &hold.resource,
                        job,
                        &hold.estimate,
                        start,
                        start + hold.secs,
                    )?;
                }
                log_changes!(
                    self.verbosity,
                    "Reserved job {} at {} on {} resources",
                    job.id,
                    start,
                    holds.len()
                );
                Ok(Placement {
                    job_id: job.id,
                    start: Some(start),
                })
            }
            Admission::Never => {
                log_checks!(self.verbosity, "  Job {} can never be admitted", job.id);
                Ok(Placement {
                    job_id: job.id,
                    start: None,
                })
            }
        }
    }

    /// Place every pending job in `jobs`, in order, starting at the registry's cycle time.
    pub fn run(&mut self, jobs: &[Job]) -> Result<Vec<Placement>, AdmissionError> {
        let proposed = self.registry.now();
        let mut placements = Vec::new();
        for job in jobs.iter().filter(|j| j.is_pending()) {
            placements.push(self.place(job, proposed)?);
        }
        let placed = placements.iter().filter(|p| p.start.is_some()).count();
        log_changes!(
            self.verbosity,
            "Backfill pass: {} of {} pending jobs placed",
            placed,
            placements.len()
        );
        Ok(placements)
    }
}
