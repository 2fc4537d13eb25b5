// src/cache/mod.rs
// =============================================================================
// The on-disk URL validity cache.
//
// Repeated runs against the same catalog only probe URLs the cache has not
// seen recently, which turns a long, polite run into a quick one.
// =============================================================================

mod store;

pub use store::{Cache, CacheError};
