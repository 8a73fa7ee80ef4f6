//! Parallel per-worker ingestion.
//!
//! Each worker trace is fetched and processed as an independent rayon task
//! that owns its payload. Results come back over a channel and are collected
//! in completion order. A failed task is logged and contributes nothing.

use super::store::Run;
use super::worker::{process_payload, WorkerOutput};
use crate::source::TraceSupplier;
use crate::utils::config::AnalysisConfig;
use crate::utils::error::SourceError;
use log::{info, warn};
use std::sync::mpsc;
use std::time::Instant;

/// Loads every worker of a run
pub struct RunLoader {
    config: AnalysisConfig,
    num_threads: Option<usize>,
}

impl RunLoader {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            num_threads: None,
        }
    }

    /// Use a dedicated pool of `n` threads instead of the global pool
    pub fn with_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n.max(1));
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Fetch and process every worker of `supplier`
    ///
    /// # Errors
    /// * `SourceError` - the worker list itself cannot be obtained
    pub fn load<S: TraceSupplier>(&self, name: &str, supplier: &S) -> Result<Run, SourceError> {
        let start_time = Instant::now();
        let workers = supplier.workers()?;

        info!("Loading run '{}' ({} workers)", name, workers.len());

        let (tx, rx) = mpsc::channel::<WorkerOutput>();
        let config = &self.config;

        let pool = self.num_threads.and_then(|n| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| warn!("Falling back to the global thread pool: {}", e))
                .ok()
        });

        match pool {
            Some(pool) => pool.scope(|s| spawn_units(s, &workers, supplier, config, name, &tx)),
            None => rayon::scope(|s| spawn_units(s, &workers, supplier, config, name, &tx)),
        }
        drop(tx);

        let mut run = Run::new(name);
        for output in rx {
            run.add_profile(output);
        }

        info!(
            "Run '{}' loaded: {}/{} workers in {:.2}s",
            name,
            run.worker_count(),
            workers.len(),
            start_time.elapsed().as_secs_f64()
        );

        Ok(run)
    }
}

/// Spawn one task per worker; each sends its output or logs its failure
///
/// **Private** - internal helper for RunLoader::load
fn spawn_units<'scope, S: TraceSupplier>(
    scope: &rayon::Scope<'scope>,
    workers: &'scope [String],
    supplier: &'scope S,
    config: &'scope AnalysisConfig,
    run: &'scope str,
    tx: &mpsc::Sender<WorkerOutput>,
) {
    for worker in workers {
        let tx = tx.clone();
        scope.spawn(move |_| match supplier.fetch(worker) {
            Ok(payload) => {
                let output = process_payload(worker, &payload, config);
                // The receiver outlives the scope
                let _ = tx.send(output);
            }
            Err(e) => warn!("Skipping worker '{}' of run '{}': {}", worker, run, e),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySupplier;
    use serde_json::json;

    #[test]
    fn test_failed_worker_is_skipped() {
        let supplier = InMemorySupplier::new()
            .with_trace("w0", json!([]))
            .with_trace("w1", json!("not a trace"))
            .with_trace("w2", json!({"traceEvents": []}));

        let run = RunLoader::new(AnalysisConfig::default())
            .with_threads(2)
            .load("r", &supplier)
            .unwrap();

        assert_eq!(run.worker_names(), vec!["w0", "w2"]);
    }
}
