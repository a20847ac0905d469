//! Time-indexed license admission engine.
//!
//! Tracks committed usage of named, quantized resources as step functions of
//! time and answers, for a prospective job, the earliest start that keeps every
//! resource within capacity. An optional two-group policy additionally caps the
//! aggregate consumption rate of the pending population.
//!
//! A [`Registry`] is built once per scheduling cycle from the running and
//! pending jobs, queried and committed to in the order the host scheduler
//! considers jobs, and dropped at the end of the cycle.

// Allow clippy warning triggered by PyO3 macro expansion
#![cfg_attr(feature = "python", allow(clippy::useless_conversion))]

pub mod backfill;
#[cfg(feature = "python")]
mod bindings;
pub mod config;
pub mod logging;
pub mod models;
pub mod predictor;
pub mod registry;
pub mod timeline;

#[cfg(test)]
pub(crate) mod test_support;

pub use backfill::{BackfillPass, Placement};
pub use config::{AdmissionConfig, AdmissionPolicy, DEFAULT_TWO_GROUP_FRACTION};
pub use logging::init_tracing;
pub use models::{Admission, ConsumptionEstimate, Job, JobId, JobState, Requirement, ResourceState};
pub use predictor::{NoPredictor, Prediction, Predictor, StaticPredictor};
pub use registry::{AdmissionError, Demand, Registry, ResourceEntry};
pub use timeline::{Breakpoint, Timestamp, UsageTimeline, ORIGIN};
