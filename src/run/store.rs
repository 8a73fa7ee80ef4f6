//! Collected runs and the store that serves them.
//!
//! `RunStore` keeps the canonical per-worker outputs. Every read hands out an
//! owned copy (or something derived from one), so display transforms never
//! leak back into the cache.

use super::worker::WorkerOutput;
use crate::aggregator::normalizer::{step_view, StepMap};
use crate::aggregator::summary::{communication_timing, TimingSummary};
use crate::dag::schema::DagMap;
use crate::dag::synthesizer::synthesize;
use crate::output::schema::{RunReport, WorkerReport};
use crate::parser::schema::OperatorTreeMap;
use crate::utils::config::AnalysisConfig;
use crate::utils::error::StoreError;
use log::{debug, info};
use std::collections::BTreeMap;

/// Named collection of worker outputs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Run {
    pub name: String,
    pub profiles: BTreeMap<String, WorkerOutput>,
}

impl Run {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            profiles: BTreeMap::new(),
        }
    }

    /// Accept one worker output; arrival order does not matter
    pub fn add_profile(&mut self, output: WorkerOutput) {
        debug!("Run '{}' received worker '{}'", self.name, output.worker);
        if let Some(previous) = self.profiles.insert(output.worker.clone(), output) {
            debug!("Replaced earlier output of worker '{}'", previous.worker);
        }
    }

    pub fn worker_names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    pub fn worker_count(&self) -> usize {
        self.profiles.len()
    }
}

/// Accepts finished runs
pub trait ResultSink {
    fn publish(&mut self, run: Run);
}

/// In-memory cache of finished runs
#[derive(Debug, Clone, Default)]
pub struct RunStore {
    config: AnalysisConfig,
    runs: BTreeMap<String, Run>,
}

impl ResultSink for RunStore {
    fn publish(&mut self, run: Run) {
        info!("Publishing run '{}' ({} workers)", run.name, run.worker_count());
        self.runs.insert(run.name.clone(), run);
    }
}

impl RunStore {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            runs: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn run_names(&self) -> Vec<String> {
        self.runs.keys().cloned().collect()
    }

    fn run(&self, run: &str) -> Result<&Run, StoreError> {
        self.runs
            .get(run)
            .ok_or_else(|| StoreError::RunNotFound(run.to_string()))
    }

    fn profile(&self, run: &str, worker: &str) -> Result<&WorkerOutput, StoreError> {
        self.run(run)?
            .profiles
            .get(worker)
            .ok_or_else(|| StoreError::WorkerNotFound {
                run: run.to_string(),
                worker: worker.to_string(),
            })
    }

    pub fn workers(&self, run: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.run(run)?.worker_names())
    }

    pub fn operator_trees(&self, run: &str, worker: &str) -> Result<OperatorTreeMap, StoreError> {
        Ok(self.profile(run, worker)?.operator_trees.clone())
    }

    pub fn framework_trees(&self, run: &str, worker: &str) -> Result<OperatorTreeMap, StoreError> {
        Ok(self.profile(run, worker)?.framework_trees.clone())
    }

    /// Normalized steps in display units
    pub fn steps(&self, run: &str, worker: &str) -> Result<StepMap, StoreError> {
        Ok(self.profile(run, worker)?.steps.clone())
    }

    /// Prettified, per-step rescaled copy of the normalized steps
    pub fn step_view(&self, run: &str, worker: &str) -> Result<StepMap, StoreError> {
        Ok(step_view(&self.profile(run, worker)?.steps, &self.config))
    }

    /// Step DAGs, built from the step view unless `raw_times` is set
    pub fn dag(&self, run: &str, worker: &str, raw_times: bool) -> Result<DagMap, StoreError> {
        let steps = if raw_times {
            self.steps(run, worker)?
        } else {
            self.step_view(run, worker)?
        };
        Ok(synthesize(&steps, &self.config))
    }

    /// Mean communication time per slot across every worker of a run
    pub fn communication_timing(&self, run: &str) -> Result<TimingSummary, StoreError> {
        let run = self.run(run)?;
        Ok(communication_timing(
            run.profiles.values().map(|p| &p.steps),
            &self.config.markers,
        ))
    }

    /// Communication-timing summary of every run
    pub fn summary(&self) -> BTreeMap<String, TimingSummary> {
        self.runs
            .values()
            .map(|run| {
                let timing = communication_timing(
                    run.profiles.values().map(|p| &p.steps),
                    &self.config.markers,
                );
                (run.name.clone(), timing)
            })
            .collect()
    }

    pub fn worker_report(&self, run: &str, worker: &str, raw_times: bool) -> Result<WorkerReport, StoreError> {
        let steps = if raw_times {
            self.steps(run, worker)?
        } else {
            self.step_view(run, worker)?
        };
        let dag = synthesize(&steps, &self.config);

        Ok(WorkerReport::new(
            run,
            worker,
            self.operator_trees(run, worker)?,
            steps,
            dag,
        )
        .with_framework_trees(self.framework_trees(run, worker)?))
    }

    pub fn run_report(&self, run: &str) -> Result<RunReport, StoreError> {
        Ok(RunReport::new(
            run,
            self.workers(run)?,
            self.communication_timing(run)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(worker: &str) -> WorkerOutput {
        WorkerOutput {
            worker: worker.to_string(),
            operator_trees: OperatorTreeMap::new(),
            framework_trees: OperatorTreeMap::new(),
            steps: StepMap::new(),
        }
    }

    #[test]
    fn test_add_profile_any_order() {
        let mut run = Run::new("r");
        run.add_profile(output("w2"));
        run.add_profile(output("w0"));
        assert_eq!(run.worker_names(), vec!["w0", "w2"]);
    }

    #[test]
    fn test_lookup_errors() {
        let mut store = RunStore::new(AnalysisConfig::default());
        let mut run = Run::new("r");
        run.add_profile(output("w0"));
        store.publish(run);

        assert!(store.steps("r", "w0").is_ok());
        assert_eq!(
            store.steps("missing", "w0").unwrap_err(),
            StoreError::RunNotFound("missing".to_string())
        );
        assert_eq!(
            store.dag("r", "w9", false).unwrap_err(),
            StoreError::WorkerNotFound {
                run: "r".to_string(),
                worker: "w9".to_string()
            }
        );
        assert!(store.communication_timing("r").unwrap().is_empty());
        assert_eq!(store.summary().len(), 1);
    }
}
