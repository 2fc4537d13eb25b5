// src/cli.rs
// =============================================================================
// Command-line interface, built with clap's derive API.
//
// Two subcommands:
// - generate: scrape facets, build candidates, validate them, write the sitemap
// - from-cache: write the sitemap straight from a previous run's cache
//
// The flags of `generate` map one to one onto `Config`; `into_config()` does
// the unit conversions (seconds, milliseconds, hours -> Duration).
//
// Rust concepts:
// - Derive macros: #[derive(Parser)] generates the whole argument parser
// - Doc comments (///) on fields become the --help text
// - Enum variants can hold a struct (Generate) or inline fields (FromCache)
// - Struct update syntax: `..Config::default()` fills the remaining fields
// =============================================================================

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{Config, DEFAULT_BASE_URL};

// The whole command line
//
// `global = true` lets --verbose appear before or after the subcommand
#[derive(Parser, Debug)]
#[command(
    name = "facet-sitemap",
    version,
    about = "Builds a sitemap of catalog filter pages that actually exist",
    long_about = "facet-sitemap reads the filter facets of a catalog page, builds every \
                  combination of filter values as a URL, checks which of them the site \
                  really serves and writes the valid ones to a sitemap. Results are cached \
                  so later runs only check what they have not seen recently."
)]
pub struct Cli {
    /// Log debug output (RUST_LOG overrides this)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

// One variant per subcommand; clap turns FromCache into `from-cache`
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover valid filter URLs and write the sitemap
    ///
    /// Example: facet-sitemap generate --url https://example.com/catalog --gate 5
    Generate(GenerateArgs),

    /// Write the sitemap from the cache file only, without network access
    FromCache {
        #[arg(long, default_value = "sitemap_cache.json")]
        cache: PathBuf,

        #[arg(long, default_value = "sitemap_filters.xml")]
        output: PathBuf,

        /// Catalog URL, used to give the catalog page its priority
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        url: String,

        /// Entries older than this are ignored
        #[arg(long, default_value_t = 24)]
        cache_ttl_hours: u64,
    },
}

// Flags of the `generate` subcommand
//
// Plain numbers on the command line (seconds, milliseconds, hours); they
// become Durations in into_config()
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Catalog page the filter URLs are built on
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub url: String,

    /// Worker tasks pulling candidates off the queue
    #[arg(long, default_value_t = 100)]
    pub workers: usize,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 2)]
    pub timeout: u64,

    /// Queue capacity, also how often progress is logged
    #[arg(long, default_value_t = 200)]
    pub batch: usize,

    /// Attempts per URL
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Probes allowed on the network at the same time
    #[arg(long, default_value_t = 10)]
    pub gate: usize,

    /// Shortest pause before a probe, in milliseconds
    #[arg(long, default_value_t = 500)]
    pub min_delay: u64,

    /// Longest pause before a probe, in milliseconds
    #[arg(long, default_value_t = 1500)]
    pub max_delay: u64,

    #[arg(long, default_value = "sitemap_filters.xml")]
    pub output: PathBuf,

    #[arg(long, default_value = "sitemap_cache.json")]
    pub cache: PathBuf,

    #[arg(long, default_value_t = 24)]
    pub cache_ttl_hours: u64,

    /// Probe every candidate, even those the cache already knows
    #[arg(long)]
    pub ignore_cache: bool,

    /// Proxy for all requests, e.g. http://127.0.0.1:8080
    #[arg(long)]
    pub proxy: Option<String>,

    /// Seed the random pauses and user agent picks, for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl GenerateArgs {
    /// Turns the flags into a run configuration. Fixed knobs keep their
    /// defaults.
    pub fn into_config(self) -> Config {
        Config {
            base_url: self.url,
            workers: self.workers,
            timeout: Duration::from_secs(self.timeout),
            batch_size: self.batch,
            max_retries: self.retries,
            gate_size: self.gate,
            min_delay: Duration::from_millis(self.min_delay),
            max_delay: Duration::from_millis(self.max_delay),
            output_file: self.output,
            cache_file: self.cache,
            cache_ttl: hours(self.cache_ttl_hours),
            ignore_cache: self.ignore_cache,
            proxy: self.proxy,
            seed: self.seed,
            ..Config::default()
        }
    }
}

// Hours -> Duration; saturates instead of overflowing on absurd values
pub fn hours(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(60 * 60))
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why are the durations plain integers here?
//    - clap parses numbers out of the box; "--timeout 2" reads better than
//      "--timeout 2s" for a flag that is always in seconds
//    - Config only ever sees Duration, so unit mix-ups stop at this file
//
// 2. Why is `hours()` public?
//    - `from-cache` has no Config, main.rs converts its TTL with it directly
// -----------------------------------------------------------------------------
