// src/engine/mod.rs
// =============================================================================
// The engine turns a set of candidate URLs into the set of valid ones.
//
// Submodules:
// - pool: the worker pool, admission gate and cache protocol
// - metrics: counters and timings reported at the end of a run
// =============================================================================

mod metrics;
mod pool;

pub use metrics::Metrics;
pub use pool::{Engine, RunReport};
