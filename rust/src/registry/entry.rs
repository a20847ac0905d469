//! Resource entries: the baseline capacity timeline and the adaptive extension.

use crate::timeline::{Timestamp, UsageTimeline};

use super::adaptive::RateStats;

/// Capacity and committed usage of one resource.
#[derive(Clone, Debug, PartialEq)]
pub struct BaselineEntry {
    pub name: String,
    pub capacity: u32,
    pub timeline: UsageTimeline,
}

impl BaselineEntry {
    pub fn new(name: &str, capacity: u32, timeline: UsageTimeline) -> Self {
        Self {
            name: name.to_string(),
            capacity,
            timeline,
        }
    }

    /// Earliest start at or after `after` where `amount` more units fit for
    /// `duration` seconds. `amount` must not exceed capacity.
    pub fn earliest_fit(&self, after: Timestamp, duration: i64, amount: u32) -> Option<Timestamp> {
        let max_value = i64::from(self.capacity) - i64::from(amount) + 1;
        self.timeline.when_below(after, duration, max_value)
    }
}

/// Two-group state kept next to the baseline timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct StarState {
    /// Committed excess over the adaptive group's rate
    pub timeline: UsageTimeline,
    pub target_rate: f64,
    pub star_rate: f64,
    pub mean_rate: f64,
    /// Cap on the star timeline
    pub star_target: i64,
    pub pending_demand: u32,
    pub pending_population: u32,
    /// Drawn from `[0, 1)` once per build
    pub jitter: f64,
}

impl StarState {
    pub fn new(stats: &RateStats, star_target: i64, jitter: f64) -> Self {
        Self {
            timeline: UsageTimeline::new(0),
            target_rate: stats.target_rate,
            star_rate: stats.star_rate,
            mean_rate: stats.mean_rate,
            star_target,
            pending_demand: stats.pending_demand,
            pending_population: stats.pending_population,
            jitter,
        }
    }

    /// Amount by which `value` exceeds what `nodes` nodes at the adaptive
    /// group's rate would use. May be negative.
    pub fn excess(&self, value: u32, nodes: u32) -> i64 {
        i64::from(value) - (self.star_rate * f64::from(nodes)).round() as i64
    }

    /// Strict upper bound for the star timeline while a job with `excess`
    /// runs, or `None` when the job is not limited by the star target.
    ///
    /// Only `(1 - jitter)` of the excess is charged against the target.
    pub fn threshold(&self, excess: i64) -> Option<i64> {
        let charged = excess.min(self.star_target);
        if charged <= 0 {
            return None;
        }
        let charged = ((1.0 - self.jitter) * charged as f64).ceil() as i64;
        Some(self.star_target - charged + 1)
    }

    /// Earliest start at or after `after` that passes the star check.
    pub fn earliest_fit(&self, after: Timestamp, duration: i64, excess: i64) -> Option<Timestamp> {
        match self.threshold(excess) {
            None => Some(after),
            Some(max_value) => self.timeline.when_below(after, duration, max_value),
        }
    }
}

/// Baseline capacity tracking, optionally extended by the two-group policy.
#[derive(Clone, Debug, PartialEq)]
pub struct AdaptiveEntry {
    pub base: BaselineEntry,
    pub star: StarState,
}

/// Per-resource entry of the registry.
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceEntry {
    Baseline(BaselineEntry),
    Adaptive(AdaptiveEntry),
}

impl ResourceEntry {
    pub fn base(&self) -> &BaselineEntry {
        match self {
            Self::Baseline(base) => base,
            Self::Adaptive(adaptive) => &adaptive.base,
        }
    }

    pub fn star(&self) -> Option<&StarState> {
        match self {
            Self::Baseline(_) => None,
            Self::Adaptive(adaptive) => Some(&adaptive.star),
        }
    }

    pub fn name(&self) -> &str {
        &self.base().name
    }

    pub fn capacity(&self) -> u32 {
        self.base().capacity
    }

    /// Earliest start that passes every check of this entry.
    ///
    /// Adaptive entries alternate between the capacity search and the star
    /// search until both accept the same instant. Both searches only move
    /// forward, so this ends after at most one round per breakpoint.
    pub fn earliest_fit(
        &self,
        after: Timestamp,
        duration: i64,
        amount: u32,
        nodes: u32,
    ) -> Option<Timestamp> {
        match self {
            Self::Baseline(base) => base.earliest_fit(after, duration, amount),
            Self::Adaptive(AdaptiveEntry { base, star }) => {
                let excess = star.excess(amount, nodes);
                let mut when = after;
                loop {
                    let fit = base.earliest_fit(when, duration, amount)?;
                    let star_fit = star.earliest_fit(fit, duration, excess)?;
                    if star_fit == fit {
                        return Some(fit);
                    }
                    when = star_fit;
                }
            }
        }
    }

    /// Add `amount` over `[start, end)`; adaptive entries also book the excess
    /// on the star timeline.
    pub(crate) fn commit(&mut self, start: Timestamp, end: Timestamp, amount: u32, nodes: u32) {
        match self {
            Self::Baseline(base) => base.timeline.add_usage(start, end, i64::from(amount)),
            Self::Adaptive(AdaptiveEntry { base, star }) => {
                base.timeline.add_usage(start, end, i64::from(amount));
                let excess = star.excess(amount, nodes);
                if excess > 0 {
                    star.timeline.add_usage(start, end, excess);
                }
            }
        }
    }
}
