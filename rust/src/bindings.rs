//! Python bindings, built with the `python` feature.

use std::collections::HashMap;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::backfill::BackfillPass;
use crate::config::{AdmissionConfig, AdmissionPolicy};
use crate::logging::init_tracing;
use crate::models::{ConsumptionEstimate, Job, JobState, ResourceState};
use crate::predictor::{Prediction, StaticPredictor};
use crate::registry::{AdmissionError, Registry};
use crate::timeline::{Timestamp, UsageTimeline};

fn to_py_err(err: AdmissionError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

fn parse_state(state: &str) -> JobState {
    match state.to_ascii_uppercase().as_str() {
        "PENDING" => JobState::Pending,
        "RUNNING" => JobState::Running,
        _ => JobState::Other,
    }
}

/// Job record (PyO3 wrapper).
#[pyclass(name = "Job")]
#[derive(Clone, Debug)]
pub struct PyJob {
    #[pyo3(get, set)]
    pub id: u32,
    /// "PENDING", "RUNNING" or anything else
    #[pyo3(get, set)]
    pub state: String,
    #[pyo3(get, set)]
    pub start_time: i64,
    #[pyo3(get, set)]
    pub time_limit_minutes: Option<u32>,
    #[pyo3(get, set)]
    pub nodes: u32,
    #[pyo3(get, set)]
    pub requests: HashMap<String, u32>,
    #[pyo3(get, set)]
    pub metadata: HashMap<String, String>,
}

#[pymethods]
impl PyJob {
    #[new]
    #[pyo3(signature = (id, state, start_time=0, time_limit_minutes=None, nodes=1, requests=None, metadata=None))]
    fn new(
        id: u32,
        state: String,
        start_time: i64,
        time_limit_minutes: Option<u32>,
        nodes: u32,
        requests: Option<HashMap<String, u32>>,
        metadata: Option<HashMap<String, String>>,
    ) -> Self {
        Self {
            id,
            state,
            start_time,
            time_limit_minutes,
            nodes,
            requests: requests.unwrap_or_default(),
            metadata: metadata.unwrap_or_default(),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "Job(id={}, state={}, start_time={}, time_limit_minutes={:?}, nodes={})",
            self.id, self.state, self.start_time, self.time_limit_minutes, self.nodes
        )
    }
}

impl From<&PyJob> for Job {
    fn from(job: &PyJob) -> Self {
        Self {
            id: job.id,
            state: parse_state(&job.state),
            start_time: job.start_time,
            time_limit_minutes: job.time_limit_minutes,
            nodes: job.nodes,
            requests: job.requests.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            metadata: job.metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

/// Configured resource with its externally tracked usage (PyO3 wrapper).
#[pyclass(name = "ResourceState")]
#[derive(Clone, Debug)]
pub struct PyResourceState {
    #[pyo3(get, set)]
    pub name: String,
    #[pyo3(get, set)]
    pub total: u32,
    #[pyo3(get, set)]
    pub used: u32,
}

#[pymethods]
impl PyResourceState {
    #[new]
    #[pyo3(signature = (name, total, used=0))]
    fn new(name: String, total: u32, used: u32) -> Self {
        Self { name, total, used }
    }

    fn __repr__(&self) -> String {
        format!(
            "ResourceState(name={}, total={}, used={})",
            self.name, self.total, self.used
        )
    }
}

/// Admission configuration (PyO3 wrapper).
#[pyclass(name = "AdmissionConfig")]
#[derive(Clone, Debug)]
pub struct PyAdmissionConfig {
    /// "AWARE" or "TWO_GROUP"
    #[pyo3(get, set)]
    pub policy: String,
    #[pyo3(get, set)]
    pub two_group_fraction: f64,
    #[pyo3(get, set)]
    pub total_node_count: Option<u32>,
    #[pyo3(get, set)]
    pub resolution_secs: i64,
    #[pyo3(get, set)]
    pub verbosity: u8,
}

#[pymethods]
impl PyAdmissionConfig {
    #[new]
    #[pyo3(signature = (policy="AWARE".to_string(), two_group_fraction=0.05, total_node_count=None, resolution_secs=60, verbosity=0))]
    fn new(
        policy: String,
        two_group_fraction: f64,
        total_node_count: Option<u32>,
        resolution_secs: i64,
        verbosity: u8,
    ) -> PyResult<Self> {
        let config = Self {
            policy,
            two_group_fraction,
            total_node_count,
            resolution_secs,
            verbosity,
        };
        config.to_config()?;
        Ok(config)
    }

    fn __repr__(&self) -> String {
        format!(
            "AdmissionConfig(policy={}, two_group_fraction={}, total_node_count={:?}, resolution_secs={}, verbosity={})",
            self.policy,
            self.two_group_fraction,
            self.total_node_count,
            self.resolution_secs,
            self.verbosity
        )
    }
}

impl PyAdmissionConfig {
    fn to_config(&self) -> PyResult<AdmissionConfig> {
        let policy: AdmissionPolicy = self.policy.parse().map_err(to_py_err)?;
        let config = AdmissionConfig {
            policy,
            two_group_fraction: self.two_group_fraction,
            total_node_count: self.total_node_count,
            resolution_secs: self.resolution_secs,
            verbosity: self.verbosity,
        };
        config.validate().map_err(to_py_err)?;
        Ok(config)
    }
}

fn pairs(timeline: Option<&UsageTimeline>) -> Option<Vec<(Timestamp, i64)>> {
    timeline.map(UsageTimeline::to_pairs)
}

/// Registry for one scheduling cycle.
#[pyclass(name = "Registry")]
pub struct PyRegistry {
    inner: Registry,
}

#[pymethods]
impl PyRegistry {
    /// Build the registry from the current job list.
    ///
    /// `predictions` maps `(resource, job_id)` to `(value, time_limit_minutes)`.
    /// Returns None when no resource is configured.
    ///
    /// # Raises
    /// * ValueError if the configuration is invalid
    #[staticmethod]
    #[pyo3(signature = (config, resources, jobs, now, predictions=None, seed=None))]
    fn build(
        config: &PyAdmissionConfig,
        resources: Vec<PyResourceState>,
        jobs: Vec<PyJob>,
        now: Timestamp,
        predictions: Option<HashMap<(String, u32), (u32, Option<u32>)>>,
        seed: Option<u64>,
    ) -> PyResult<Option<Self>> {
        let config = config.to_config()?;
        let resources: Vec<ResourceState> = resources
            .iter()
            .map(|r| ResourceState::new(&r.name, r.total, r.used))
            .collect();
        let jobs: Vec<Job> = jobs.iter().map(Job::from).collect();

        let mut predictor = StaticPredictor::new();
        for ((resource, job_id), (value, time_limit_minutes)) in predictions.unwrap_or_default() {
            predictor.insert(
                &resource,
                job_id,
                Prediction::Estimate {
                    value,
                    time_limit_minutes,
                },
            );
        }

        let mut rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_rng(&mut rand::rng()),
        };
        let registry = Registry::build(&config, &resources, &jobs, &predictor, now, &mut rng)
            .map_err(to_py_err)?;
        Ok(registry.map(|inner| Self { inner }))
    }

    /// Earliest start for `job` on `resource`, or -1 if it can never run.
    #[pyo3(signature = (resource, job, value, proposed, time_limit_minutes=None))]
    fn test_job(
        &self,
        resource: &str,
        job: &PyJob,
        value: u32,
        proposed: Timestamp,
        time_limit_minutes: Option<u32>,
    ) -> PyResult<Timestamp> {
        let estimate = ConsumptionEstimate {
            value,
            time_limit_minutes,
        };
        self.inner
            .test_job(resource, &Job::from(job), &estimate, proposed)
            .map(|admission| admission.as_when())
            .map_err(to_py_err)
    }

    #[pyo3(signature = (resource, job, value, when, time_limit_minutes=None))]
    fn overlap(
        &self,
        resource: &str,
        job: &PyJob,
        value: u32,
        when: Timestamp,
        time_limit_minutes: Option<u32>,
    ) -> PyResult<bool> {
        let estimate = ConsumptionEstimate {
            value,
            time_limit_minutes,
        };
        self.inner
            .overlap(resource, &Job::from(job), &estimate, when)
            .map_err(to_py_err)
    }

    fn alloc_job(
        &mut self,
        resource: &str,
        job: &PyJob,
        value: u32,
        start: Timestamp,
        end: Timestamp,
    ) -> PyResult<()> {
        self.inner
            .alloc_job(resource, &Job::from(job), &ConsumptionEstimate::new(value), start, end)
            .map_err(to_py_err)
    }

    /// Place pending jobs in order; returns `(job_id, start or None)` pairs.
    fn backfill(&mut self, jobs: Vec<PyJob>) -> PyResult<Vec<(u32, Option<Timestamp>)>> {
        let jobs: Vec<Job> = jobs.iter().map(Job::from).collect();
        let placements = BackfillPass::new(&mut self.inner)
            .run(&jobs)
            .map_err(to_py_err)?;
        Ok(placements.into_iter().map(|p| (p.job_id, p.start)).collect())
    }

    fn names(&self) -> Vec<String> {
        self.inner.names().into_iter().map(str::to_string).collect()
    }

    fn steps(&self, resource: &str) -> Option<Vec<(Timestamp, i64)>> {
        pairs(self.inner.timeline(resource))
    }

    fn star_steps(&self, resource: &str) -> Option<Vec<(Timestamp, i64)>> {
        pairs(self.inner.star_timeline(resource))
    }

    fn __repr__(&self) -> String {
        format!("Registry(resources={:?}, now={})", self.inner.names(), self.inner.now())
    }
}

/// Route log output to stderr, filtered by `RUST_LOG`.
#[pyfunction]
fn init_logging() {
    init_tracing();
}

/// The lictrack.rust Python module.
#[pymodule]
fn rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Data types
    m.add_class::<PyJob>()?;
    m.add_class::<PyResourceState>()?;

    // Config types
    m.add_class::<PyAdmissionConfig>()?;

    // Engine
    m.add_class::<PyRegistry>()?;
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;

    Ok(())
}
