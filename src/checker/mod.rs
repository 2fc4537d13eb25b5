// src/checker/mod.rs
// =============================================================================
// This module contains the URL existence check.
//
// Submodules:
// - probe: HEAD requests with retries, backoff and user agent rotation
//
// This file (mod.rs) is the module root - it re-exports the pieces the
// engine and the pipeline need.
// =============================================================================

mod probe;

pub use probe::{random_between, HttpProber, Probe, ProbeError, RetryPolicy, Verdict};
pub(crate) use probe::{BROWSER_ACCEPT, BROWSER_ACCEPT_LANGUAGE, USER_AGENTS};
