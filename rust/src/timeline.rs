//! Usage timeline: committed resource usage as a step function of time.

use chrono::DateTime;

/// Seconds since the epoch.
pub type Timestamp = i64;

/// Start of the sentinel breakpoint. Any start at or before it means "since forever".
pub const ORIGIN: Timestamp = -1;

/// One step of a timeline: `value` holds from `start` until the next breakpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Breakpoint {
    pub start: Timestamp,
    pub value: i64,
}

/// Tracks the usage of a single resource as a right-continuous step function.
///
/// Maintains the invariant that `steps` is sorted by start with unique starts,
/// begins with the sentinel at [`ORIGIN`], and never holds two neighbouring
/// steps with the same value. Lookups use binary search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsageTimeline {
    steps: Vec<Breakpoint>,
}

impl UsageTimeline {
    /// Create a timeline holding `initial_value` for all time.
    pub fn new(initial_value: i64) -> Self {
        Self {
            steps: vec![Breakpoint {
                start: ORIGIN,
                value: initial_value,
            }],
        }
    }

    /// Build a timeline from `(start, value)` pairs; the first pair gives the initial value.
    pub fn from_steps(steps: &[(Timestamp, i64)]) -> Self {
        let Some(&(_, initial)) = steps.first() else {
            return Self::new(0);
        };
        let mut timeline = Self::new(initial);
        let mut previous = initial;
        for &(start, value) in &steps[1..] {
            timeline.remove_till_end(start, previous - value);
            previous = value;
        }
        timeline
    }

    /// Value of the sentinel, i.e. the usage in force before any explicit event.
    pub fn initial_value(&self) -> i64 {
        self.steps[0].value
    }

    /// All breakpoints, sentinel first.
    pub fn steps(&self) -> &[Breakpoint] {
        &self.steps
    }

    /// Breakpoints as `(start, value)` pairs.
    pub fn to_pairs(&self) -> Vec<(Timestamp, i64)> {
        self.steps.iter().map(|s| (s.start, s.value)).collect()
    }

    /// Usage in force at `at`.
    pub fn value_at(&self, at: Timestamp) -> i64 {
        let idx = self.steps.partition_point(|s| s.start <= at);
        self.steps[idx.saturating_sub(1)].value
    }

    /// Index of the breakpoint starting exactly at `at`, splitting the covering step if needed.
    fn split_at(&mut self, at: Timestamp) -> usize {
        if at <= ORIGIN {
            return 0;
        }
        let idx = self.steps.partition_point(|s| s.start < at);
        if idx < self.steps.len() && self.steps[idx].start == at {
            return idx;
        }
        // idx >= 1: the sentinel always starts before `at`
        let value = self.steps[idx - 1].value;
        self.steps.insert(idx, Breakpoint { start: at, value });
        idx
    }

    /// Merge neighbouring steps that carry the same value.
    fn coalesce(&mut self) {
        self.steps.dedup_by(|next, prev| next.value == prev.value);
    }

    /// Raise usage by `delta` over the half-open interval `[start, end)`.
    ///
    /// A `start` at or before [`ORIGIN`] folds into the sentinel. Empty
    /// intervals and a zero delta leave the timeline untouched.
    pub fn add_usage(&mut self, start: Timestamp, end: Timestamp, delta: i64) {
        if delta == 0 || end <= start || end <= ORIGIN {
            return;
        }
        let from = self.split_at(start);
        let to = self.split_at(end);
        for step in &mut self.steps[from..to] {
            step.value += delta;
        }
        self.coalesce();
    }

    /// Lower usage by `delta` from `start` until the end of time.
    pub fn remove_till_end(&mut self, start: Timestamp, delta: i64) {
        if delta == 0 {
            return;
        }
        let from = self.split_at(start);
        for step in &mut self.steps[from..] {
            step.value -= delta;
        }
        self.coalesce();
    }

    /// Shift the whole function, sentinel included, by `delta`.
    pub fn add(&mut self, delta: i64) {
        for step in &mut self.steps {
            step.value += delta;
        }
    }

    /// Earliest `t >= after` such that usage stays strictly below `max_value`
    /// for the whole window `[t, t + duration)`.
    ///
    /// Returns `None` when no such window exists, e.g. when the last step is
    /// at or above `max_value`. The search has no horizon.
    pub fn when_below(&self, after: Timestamp, duration: i64, max_value: i64) -> Option<Timestamp> {
        if duration <= 0 {
            return Some(after);
        }

        let first = self
            .steps
            .partition_point(|s| s.start <= after)
            .saturating_sub(1);
        let mut candidate: Option<Timestamp> = None;

        for (idx, step) in self.steps.iter().enumerate().skip(first) {
            if step.value >= max_value {
                // Any open window is broken; the next one starts after this step
                candidate = None;
                continue;
            }
            let begin = if idx == first { after } else { step.start };
            let window_start = *candidate.get_or_insert(begin);
            match self.steps.get(idx + 1) {
                None => return Some(window_start),
                Some(next) if next.start - window_start >= duration => return Some(window_start),
                Some(_) => {}
            }
        }

        None
    }

    /// Human-readable listing of the breakpoints, one per line.
    pub fn dump(&self) -> String {
        self.steps
            .iter()
            .map(|step| {
                let when = if step.start <= ORIGIN {
                    "-inf".to_string()
                } else {
                    DateTime::from_timestamp(step.start, 0)
                        .map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string())
                        .unwrap_or_else(|| step.start.to_string())
                };
                format!("{:>12} {:<21} {}", step.start, when, step.value)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
