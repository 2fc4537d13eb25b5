// src/facets/mod.rs
// =============================================================================
// Facet acquisition: where the values the URLs are built from come from.
//
// Submodules:
// - scrape: read the filter form off the catalog page, with a fixed fallback
// - translit: Cyrillic labels -> Latin path segments
// =============================================================================

mod scrape;
mod translit;

pub use scrape::{fallback_facets, fetch_facets, normalize_facets, page_client};
pub use translit::Transliterator;
