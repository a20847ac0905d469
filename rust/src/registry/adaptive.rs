//! Population statistics for the two-group policy.
//!
//! Running and pending jobs are weighted by how long they hold the resource,
//! which yields the target per-node rate. Pending jobs at or below that rate
//! form the adaptive group; the gap between the target and the group's mean
//! rate, scaled to the whole cluster, becomes the star target.

/// Tolerance for comparing per-node rates.
const RATE_EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug)]
struct PendingRate {
    value: u32,
    rate: f64,
}

/// Collects demand while the registry walks the job list.
#[derive(Clone, Debug, Default)]
pub struct RateAccumulator {
    weighted_demand: f64,
    weighted_nodes: f64,
    pending: Vec<PendingRate>,
}

/// Result of [`RateAccumulator::finish`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RateStats {
    /// Time-weighted demand per node over running and pending jobs
    pub target_rate: f64,
    /// Mean per-node rate of the adaptive group
    pub star_rate: f64,
    /// Mean per-node rate over all pending jobs
    pub mean_rate: f64,
    /// Pending jobs with a nonzero requirement
    pub pending_demand: u32,
    /// All pending jobs seen
    pub pending_population: u32,
}

fn per_node(value: u32, nodes: u32) -> f64 {
    f64::from(value) / f64::from(nodes.max(1))
}

impl RateAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_weighted(&mut self, value: u32, nodes: u32, weight: f64) {
        self.weighted_demand += f64::from(value) * weight;
        self.weighted_nodes += f64::from(nodes) * weight;
    }

    /// A running job holding `value` for `remaining_secs` more seconds.
    /// Jobs already past their end carry no weight.
    pub fn add_running(&mut self, value: u32, nodes: u32, remaining_secs: i64) {
        if remaining_secs > 0 {
            self.add_weighted(value, nodes, remaining_secs as f64);
        }
    }

    /// A pending job expected to hold `value` for `duration_secs`.
    pub fn add_pending(&mut self, value: u32, nodes: u32, duration_secs: Option<i64>) {
        self.pending.push(PendingRate {
            value,
            rate: per_node(value, nodes),
        });
        if let Some(d) = duration_secs.filter(|d| *d > 0) {
            self.add_weighted(value, nodes, d as f64);
        }
    }

    pub fn finish(&self) -> RateStats {
        let target_rate = if self.weighted_nodes > 0.0 {
            self.weighted_demand / self.weighted_nodes
        } else {
            0.0
        };

        let population = self.pending.len();
        let mean_rate = if population > 0 {
            self.pending.iter().map(|p| p.rate).sum::<f64>() / population as f64
        } else {
            0.0
        };

        let demanding = self.pending.iter().filter(|p| p.value > 0);
        let pending_demand = demanding.clone().count();

        let (group_sum, group_len) = demanding
            .filter(|p| p.rate <= target_rate + RATE_EPSILON)
            .fold((0.0, 0usize), |(sum, n), p| (sum + p.rate, n + 1));
        let star_rate = if group_len > 0 {
            group_sum / group_len as f64
        } else {
            0.0
        };

        RateStats {
            target_rate,
            star_rate,
            mean_rate,
            pending_demand: u32::try_from(pending_demand).unwrap_or(u32::MAX),
            pending_population: u32::try_from(population).unwrap_or(u32::MAX),
        }
    }
}

/// Admission cap enforced on the star timeline.
///
/// Equals `capacity` when nothing pending needs the resource. Otherwise it is
/// the headroom between the target rate and the adaptive group's rate across
/// `total_node_count` nodes, kept within `[ceil(floor_fraction * capacity),
/// capacity]`.
pub fn star_target(stats: &RateStats, capacity: u32, total_node_count: u32, floor_fraction: f64) -> i64 {
    let capacity = i64::from(capacity);
    if stats.pending_demand == 0 {
        return capacity;
    }
    let floor = ((floor_fraction * capacity as f64).ceil() as i64).clamp(0, capacity);
    let raw = (f64::from(total_node_count) * (stats.target_rate - stats.star_rate)).round() as i64;
    raw.clamp(floor, capacity)
}
