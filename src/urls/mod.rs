// src/urls/mod.rs
// =============================================================================
// Everything about candidate URLs: building them from facets and deciding
// which ones are worth checking.
//
// Submodules:
// - generator: facet combinations -> candidate URL set
// - validator: is_valid / should_skip / normalize rules
// =============================================================================

mod generator;
mod validator;

pub use generator::{candidate_count, generate_urls, FacetMap};
pub use validator::{is_valid, should_skip};
