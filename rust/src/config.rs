//! Configuration types for the admission engine.

use std::fmt;
use std::str::FromStr;

use crate::registry::AdmissionError;

/// Which admission policy the registry applies to every configured resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AdmissionPolicy {
    /// Capacity-aware only: a job fits when the usage timeline has headroom.
    #[default]
    Aware,
    /// Capacity-aware plus the two-group rate cap on the star timeline.
    TwoGroup,
}

impl FromStr for AdmissionPolicy {
    type Err = AdmissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "AWARE" => Ok(Self::Aware),
            "TWO_GROUP" => Ok(Self::TwoGroup),
            other => Err(AdmissionError::InvalidConfig(format!(
                "unknown admission policy: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for AdmissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aware => write!(f, "AWARE"),
            Self::TwoGroup => write!(f, "TWO_GROUP"),
        }
    }
}

/// Default lower bound of the star target, as a fraction of capacity.
pub const DEFAULT_TWO_GROUP_FRACTION: f64 = 0.05;

/// Configuration for registry construction and admission.
#[derive(Clone, Debug, PartialEq)]
pub struct AdmissionConfig {
    /// Admission policy applied to every resource
    pub policy: AdmissionPolicy,
    /// Lower bound of the star target as a fraction of capacity (two-group only)
    pub two_group_fraction: f64,
    /// Node count of the cluster, used to turn per-node rates into totals (two-group only)
    pub total_node_count: Option<u32>,
    /// Reservation boundaries are aligned to this many seconds (0 disables alignment)
    pub resolution_secs: i64,
    /// Logging verbosity (0-3)
    pub verbosity: u8,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            policy: AdmissionPolicy::Aware,
            two_group_fraction: DEFAULT_TWO_GROUP_FRACTION,
            total_node_count: None,
            resolution_secs: 60,
            verbosity: 0,
        }
    }
}

impl AdmissionConfig {
    /// Two-group configuration for a cluster of `total_node_count` nodes.
    pub fn two_group(total_node_count: u32) -> Self {
        Self {
            policy: AdmissionPolicy::TwoGroup,
            total_node_count: Some(total_node_count),
            ..Self::default()
        }
    }

    /// Check the configuration before a registry is built from it.
    pub fn validate(&self) -> Result<(), AdmissionError> {
        if !(0.0..=1.0).contains(&self.two_group_fraction) {
            return Err(AdmissionError::InvalidConfig(format!(
                "two_group_fraction must be within [0, 1], got {}",
                self.two_group_fraction
            )));
        }
        if self.resolution_secs < 0 {
            return Err(AdmissionError::InvalidConfig(format!(
                "resolution_secs must not be negative, got {}",
                self.resolution_secs
            )));
        }
        if self.policy == AdmissionPolicy::TwoGroup && self.total_node_count.unwrap_or(0) == 0 {
            return Err(AdmissionError::InvalidConfig(
                "TWO_GROUP policy requires a positive total_node_count".to_string(),
            ));
        }
        Ok(())
    }
}
