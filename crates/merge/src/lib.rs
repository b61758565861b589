//! Offline aggregation of many round-robin files into one.
//!
//! - [`factory`] creates validated files and clones schemas.
//! - [`aggregation`] holds the sum and delta merge strategies.
//! - [`orchestrator`] drives a full glob-to-destination run.

pub mod aggregation;
pub mod factory;
pub mod orchestrator;

pub use aggregation::{merge_into, strategy_for, DeltaMerge, MergeStrategy, SumMerge};
pub use orchestrator::{resolve_sources, MergeConfig, MergeReport, MergeState, Orchestrator};
