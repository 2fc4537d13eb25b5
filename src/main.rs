// src/main.rs
// =============================================================================
// Entry point of the facet-sitemap CLI.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Install the tracing subscriber (info by default, debug with --verbose)
// 3. Dispatch to the subcommand handler
// 4. Exit with a proper code (0 = success, 1 = failure, 130 = interrupted)
//
// The `generate` pipeline:
//   facets -> candidate URLs -> engine (cache + probes) -> sitemap + cache file
//
// Ctrl-C (or SIGTERM) cancels the run. The engine stops early and hands back
// what it found so far: the sitemap is written from that partial result, the
// cache is saved, and the process exits with 130 so scripts can tell an
// interrupted run from a complete one.
//
// Rust concepts:
// - #[tokio::main]: turns async fn main into a real main with a runtime
// - anyhow::Context: attach a human readable message to any error
// - CancellationToken: one shared "stop now" flag every task can wait on
// - #[cfg(unix)]: compile a function only on Unix-like systems
// =============================================================================

mod cache;
mod checker;
mod cli;
mod config;
mod engine;
mod facets;
mod sitemap;
mod urls;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cache::Cache;
use checker::HttpProber;
use cli::{Cli, Commands, GenerateArgs};
use engine::{Engine, Metrics, RunReport};
use facets::Transliterator;

const EXIT_OK: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            EXIT_FAILURE
        }
    };

    std::process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "facet_sitemap=debug,info"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Generate(args) => handle_generate(args).await,
        Commands::FromCache {
            cache,
            output,
            url,
            cache_ttl_hours,
        } => {
            let written =
                sitemap::sitemap_from_cache(&cache, &output, &url, cli::hours(cache_ttl_hours))
                    .context("failed to build sitemap from cache")?;
            info!(urls = written, "done");
            Ok(EXIT_OK)
        }
    }
}

async fn handle_generate(args: GenerateArgs) -> Result<i32> {
    let json = args.json;
    let config = args.into_config();
    config.validate().context("invalid configuration")?;

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    let cache = Arc::new(Cache::new(&config.cache_file, config.cache_ttl));
    if let Err(e) = cache.load() {
        // A broken cache file only costs us extra probes
        warn!("{}; starting with an empty cache", e);
    }
    if cache.is_empty() {
        info!("cache is empty, every candidate will be probed");
    } else {
        info!(
            entries = cache.len(),
            ttl_hours = cache.ttl().as_secs() / 3600,
            "cache ready"
        );
    }

    let prober = HttpProber::new(config.timeout, config.proxy.as_deref())
        .context("failed to build HTTP client")?;
    let page_client = facets::page_client(config.timeout, config.proxy.as_deref())
        .context("failed to build HTTP client")?;

    // No facets means no candidates, so any failure here falls back to a
    // fixed set instead of ending the run
    let translit = Transliterator::new();
    let raw_facets = match facets::fetch_facets(&page_client, &config.base_url, &translit).await {
        Ok(found) if !found.is_empty() => found,
        Ok(_) => {
            warn!("catalog page has no facets, using the fallback set");
            facets::fallback_facets()
        }
        Err(e) => {
            warn!("{}; using the fallback set", e);
            facets::fallback_facets()
        }
    };
    let facet_map = facets::normalize_facets(raw_facets, &translit);
    for (name, values) in &facet_map {
        info!(facet = %name, values = values.len(), "facet");
    }

    let candidates = urls::generate_urls(&config.base_url, &facet_map);
    info!(
        candidates = candidates.len(),
        combinations = urls::candidate_count(&facet_map),
        "candidate urls generated"
    );
    for url in candidates.iter().take(10) {
        info!(%url, "example candidate");
    }

    let output_file = config.output_file.clone();
    let base_url = config.base_url.clone();
    let metrics = Arc::new(Metrics::new());
    let engine = Engine::new(config, prober, Arc::clone(&cache), metrics);

    let report = engine.run(candidates, &cancel).await?;
    let exit_code = write_results(&report, &output_file, &base_url);

    // Saved even after a failed sitemap write: the probes are still worth keeping
    if let Err(e) = cache.save() {
        error!("{}", e);
    }

    let summary = engine.metrics().summary();
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!(
            total = summary.total_urls,
            valid = report.valid_urls.len(),
            checked = summary.new_checks,
            failed = summary.failed_urls,
            errors = summary.probe_errors,
            cache_hits = summary.cache_hits,
            cache_valid_hits = summary.cache_valid_hits,
            success_rate = %format!("{:.1}%", summary.success_rate * 100.0),
            elapsed_ms = summary.elapsed_ms as u64,
            urls_per_second = %format!("{:.2}", summary.urls_per_second),
            avg_response_ms = summary.avg_response_ms as u64,
            "run finished"
        );
        for (status, count) in &summary.status_codes {
            info!(status, count, "status code");
        }
    }

    Ok(exit_code)
}

// Writes the sitemap for whatever the run found and picks the exit code.
//
// An interrupted run still gets its (partial) sitemap, but exits with 130.
// A sitemap that cannot be written is a failure (1).
fn write_results(report: &RunReport, output: &Path, base_url: &str) -> i32 {
    if let Err(e) = sitemap::write_sitemap(output, &report.valid_urls, base_url) {
        error!("{}", e);
        return EXIT_FAILURE;
    }

    if report.cancelled {
        warn!(
            urls = report.valid_urls.len(),
            "interrupted, sitemap holds only the urls confirmed so far"
        );
        return EXIT_INTERRUPTED;
    }
    EXIT_OK
}

// Cancels the run on Ctrl-C, or SIGTERM on Unix
fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown().await;
        warn!("shutdown requested, finishing in-flight probes");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
