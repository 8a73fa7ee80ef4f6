//! Trace DAG Studio
//!
//! Operator trees, per-step role breakdowns and compute/communication
//! overlap graphs from distributed-training execution traces.
//!
//! The pipeline, leaves first:
//! - [`parser`] decodes trace records, builds typed nodes and per-thread trees
//! - [`aggregator`] classifies trees into training steps and normalizes them
//! - [`dag`] turns each normalized step into a node/edge graph
//! - [`run`] processes every worker of a run and serves the results
//!
//! This crate provides the core implementation for the `trace-dag` CLI tool.
//!
//! ## Getting Started
//!
//! ```bash
//! trace-dag analyze --trace worker0.pt.trace.json --output worker0.json
//! trace-dag run --dir ./traces/run_a --output run_a.json
//! ```

pub mod aggregator;
pub mod commands;
pub mod dag;
pub mod output;
pub mod parser;
pub mod run;
pub mod source;
pub mod utils;
