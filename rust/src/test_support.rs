//! Fixtures shared by unit tests.

use rand::RngCore;

use crate::models::{Job, JobId, JobState, ResourceState};

/// Random source whose every `f64` draw is exactly 0.5.
pub(crate) struct FixedJitter;

impl RngCore for FixedJitter {
    fn next_u32(&mut self) -> u32 {
        1 << 31
    }

    fn next_u64(&mut self) -> u64 {
        1 << 63
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        dst.fill(0x80);
    }
}

/// A single `lustre` resource with 500 units in use.
pub(crate) fn lustre(total: u32) -> Vec<ResourceState> {
    vec![ResourceState::new("lustre", total, 500)]
}

/// Three running 10-node jobs holding 100, 100 and 300 units until
/// 12000, 12200 and 12300.
pub(crate) fn running_with_requests() -> Vec<Job> {
    vec![
        Job::new(4, JobState::Running, 6000, Some(100), 10).with_request("lustre", 100),
        Job::new(5, JobState::Running, 6200, Some(100), 10).with_request("lustre", 100),
        Job::new(6, JobState::Running, 6300, Some(100), 10).with_request("lustre", 300),
    ]
}

/// `times` repetitions of three pending 100-minute jobs requesting 100, 100
/// and 300 units, numbered from `first_id`.
pub(crate) fn pending_cycle(times: u32, first_id: JobId) -> Vec<Job> {
    let mut jobs = Vec::new();
    for i in 0..times {
        for (j, amount) in [100, 100, 300].into_iter().enumerate() {
            let id = first_id + i * 3 + j as JobId;
            jobs.push(
                Job::new(id, JobState::Pending, 0, Some(100), 10).with_request("lustre", amount),
            );
        }
    }
    jobs
}

/// Pending 100-minute, 10-node job without requests.
pub(crate) fn pending(id: JobId) -> Job {
    Job::new(id, JobState::Pending, 0, Some(100), 10)
}
