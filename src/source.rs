//! Trace suppliers: where decoded payloads come from.
//!
//! The pipeline only needs a list of worker names and, per worker, one
//! decoded payload. A run directory on disk and an in-memory map both
//! satisfy that.

use crate::parser::trace::TracePayload;
use crate::utils::config::TRACE_FILE_SUFFIXES;
use crate::utils::error::SourceError;
use log::{debug, info};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Supplies decoded trace payloads, one per worker
///
/// `Sync` so that one supplier can feed parallel per-worker units.
pub trait TraceSupplier: Sync {
    /// Worker names, sorted
    fn workers(&self) -> Result<Vec<String>, SourceError>;

    /// Decoded payload of one worker
    fn fetch(&self, worker: &str) -> Result<TracePayload, SourceError>;
}

/// Worker name encoded in a trace file name, if it is a trace file
///
/// `worker0.pt.trace.json` -> `worker0`
pub fn worker_name(file_name: &str) -> Option<&str> {
    TRACE_FILE_SUFFIXES
        .iter()
        .find_map(|suffix| file_name.strip_suffix(suffix))
        .filter(|name| !name.is_empty())
}

/// Read and decode one trace file
///
/// # Errors
/// * `SourceError::NotFound` - the file does not exist
/// * `SourceError::Io` - the file cannot be read
/// * `SourceError::Parse` - the contents are not a trace
pub fn read_trace_file(path: impl AsRef<Path>) -> Result<TracePayload, SourceError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(SourceError::NotFound(path.display().to_string()));
    }

    debug!("Reading trace file: {}", path.display());
    let contents = fs::read_to_string(path)?;
    let payload = TracePayload::parse_str(&contents)?;
    Ok(payload)
}

/// One directory per run, one trace file per worker
#[derive(Debug, Clone)]
pub struct DirectorySupplier {
    dir: PathBuf,
}

impl DirectorySupplier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Worker name -> trace file path
    fn trace_files(&self) -> Result<BTreeMap<String, PathBuf>, SourceError> {
        if !self.dir.is_dir() {
            return Err(SourceError::NotFound(self.dir.display().to_string()));
        }

        let mut files = BTreeMap::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(worker) = worker_name(file_name) {
                files.insert(worker.to_string(), path.clone());
            }
        }
        Ok(files)
    }
}

impl TraceSupplier for DirectorySupplier {
    fn workers(&self) -> Result<Vec<String>, SourceError> {
        let workers: Vec<String> = self.trace_files()?.into_keys().collect();
        info!(
            "Found {} worker traces in {}",
            workers.len(),
            self.dir.display()
        );
        Ok(workers)
    }

    fn fetch(&self, worker: &str) -> Result<TracePayload, SourceError> {
        let path = self
            .trace_files()?
            .remove(worker)
            .ok_or_else(|| SourceError::NotFound(format!("worker '{}'", worker)))?;
        read_trace_file(path)
    }
}

/// Raw trace JSON held in memory, keyed by worker
#[derive(Debug, Clone, Default)]
pub struct InMemorySupplier {
    traces: BTreeMap<String, Value>,
}

impl InMemorySupplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace(mut self, worker: impl Into<String>, trace: Value) -> Self {
        self.traces.insert(worker.into(), trace);
        self
    }
}

impl TraceSupplier for InMemorySupplier {
    fn workers(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.traces.keys().cloned().collect())
    }

    fn fetch(&self, worker: &str) -> Result<TracePayload, SourceError> {
        let raw = self
            .traces
            .get(worker)
            .ok_or_else(|| SourceError::NotFound(format!("worker '{}'", worker)))?;
        Ok(TracePayload::from_json(raw)?)
    }
}
