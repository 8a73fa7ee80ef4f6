//! Aggregation of operator trees into per-step role breakdowns.
//!
//! This module transforms per-thread trees into:
//! - Step records (forward, loss, backward, optimizer, broadcasts)
//! - Normalized, trimmed role nodes and display views
//! - Communication-timing summaries

pub mod classifier;
pub mod normalizer;
pub mod roles;
pub mod step;
pub mod summary;

// Re-export main types and functions
pub use classifier::{classify_steps, extract_step_number, Phase, StepClassifier};
pub use normalizer::{normalize_steps, retrim_steps, step_view, StepMap, Trim, TrimmedNode};
pub use roles::{MarkerTable, MatchRule, Marker, Role};
pub use step::{Category, RoleNodes, StepAccumulator, StepRecord};
pub use summary::{communication_timing, TimingSummary};
