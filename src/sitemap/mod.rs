// src/sitemap/mod.rs
// =============================================================================
// Sitemap output.
//
// Submodules:
// - writer: renders the valid URLs as sitemap XML and writes the file
// =============================================================================

mod writer;

pub use writer::{sitemap_from_cache, write_sitemap};
