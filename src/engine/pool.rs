// src/engine/pool.rs
// =============================================================================
// The worker pool that validates candidate URLs.
//
// How a run works:
// 1. Every candidate is looked up in the cache first (unless ignore_cache).
//    A fresh hit never touches the network: valid hits go straight into the
//    result, invalid hits are dropped.
// 2. The misses are pushed into a bounded queue by a producer task.
// 3. `workers` tasks drain the queue. For each URL a worker:
//    - sleeps a random [min_delay, max_delay] pause (human-like pacing)
//    - acquires a slot of the admission gate
//    - probes the URL
//    - releases the slot right away, success or failure
//    - records the outcome in the cache and the metrics
//    - sleeps a short random pause before taking the next URL
// 4. The result is the union of valid cache hits and valid probe outcomes.
//
// Two separate limits:
// - workers: how many URLs are "in progress" (sleeping, waiting, probing)
// - gate_size: how many probes hit the network at the same instant
// This lets a big pool stay polite towards the remote server.
//
// Cancellation:
// - The producer stops feeding the queue
// - Workers stop picking up URLs and wake up from sleeps and the gate
// - A probe already on the wire finishes (bounded by the request timeout);
//   the cache only ever receives whole entries
//
// Rust concepts:
// - Generics: Engine<P> works with any Probe, real or fake
// - Arc: shared ownership of the config, cache and metrics across tasks
// - tokio::sync::Semaphore: a counter of free slots, awaited asynchronously
// - mpsc channel: the producer sends URLs, the workers receive them
// - tokio::select!: wait for whichever happens first (work or cancellation)
// =============================================================================

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::metrics::Metrics;
use crate::cache::Cache;
use crate::checker::{random_between, Probe, ProbeError, Verdict};
use crate::config::Config;

/// What a run produced.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Every candidate confirmed valid, from the cache or from a probe
    pub valid_urls: BTreeSet<String>,
    /// True when the run stopped early because it was cancelled
    pub cancelled: bool,
}

/// Failures of the orchestration itself; a single URL never causes one.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Validates candidate URLs with a bounded pool of workers.
pub struct Engine<P> {
    config: Arc<Config>,
    prober: Arc<P>,
    cache: Arc<Cache>,
    metrics: Arc<Metrics>,
    gate: Arc<Semaphore>,
}

// Everything a worker task needs, cloned once per worker
struct Worker<P> {
    id: usize,
    config: Arc<Config>,
    prober: Arc<P>,
    cache: Arc<Cache>,
    metrics: Arc<Metrics>,
    gate: Arc<Semaphore>,
    queue: Arc<Mutex<mpsc::Receiver<String>>>,
    processed: Arc<AtomicUsize>,
    to_check: usize,
    cancel: CancellationToken,
    rng: StdRng,
}

impl<P: Probe + 'static> Engine<P> {
    pub fn new(config: Config, prober: P, cache: Arc<Cache>, metrics: Arc<Metrics>) -> Self {
        let gate = Arc::new(Semaphore::new(config.gate_size));
        Self {
            config: Arc::new(config),
            prober: Arc::new(prober),
            cache,
            metrics,
            gate,
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Validates every candidate and returns the valid ones.
    ///
    /// Per-URL failures are logged and counted, never returned. Cancelling
    /// `cancel` makes the run stop early and return what it has so far.
    pub async fn run(
        &self,
        candidates: BTreeSet<String>,
        cancel: &CancellationToken,
    ) -> Result<RunReport, EngineError> {
        self.metrics.set_total(candidates.len());

        let (mut valid_urls, misses) = self.split_cached(candidates);
        info!(
            from_cache = valid_urls.len(),
            to_check = misses.len(),
            "cache consulted"
        );

        if misses.is_empty() {
            return Ok(RunReport {
                valid_urls,
                cancelled: cancel.is_cancelled(),
            });
        }

        let to_check = misses.len();
        // Bounded: the producer waits when batch_size URLs are queued
        let (tx, rx) = mpsc::channel(self.config.batch_size);
        // A Receiver has a single owner, so the workers take turns on it
        let queue = Arc::new(Mutex::new(rx));
        let processed = Arc::new(AtomicUsize::new(0));

        let producer = tokio::spawn(feed_queue(misses, tx, cancel.clone()));

        // Spawn the pool; each task returns the valid URLs it found

        let workers: Vec<JoinHandle<Vec<String>>> = (0..self.config.workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    config: Arc::clone(&self.config),
                    prober: Arc::clone(&self.prober),
                    cache: Arc::clone(&self.cache),
                    metrics: Arc::clone(&self.metrics),
                    gate: Arc::clone(&self.gate),
                    queue: Arc::clone(&queue),
                    processed: Arc::clone(&processed),
                    to_check,
                    cancel: cancel.clone(),
                    rng: worker_rng(self.config.seed, id),
                };
                tokio::spawn(worker.run())
            })
            .collect();
        // Workers hold the only receivers now; once they are all gone the
        // producer's send fails instead of blocking forever
        drop(queue);

        // `?` turns a panicked worker into EngineError::Worker
        for found in futures::future::join_all(workers).await {
            valid_urls.extend(found?);
        }
        producer.await?;

        let cancelled = cancel.is_cancelled();
        if cancelled {
            warn!(
                processed = processed.load(Ordering::Relaxed),
                to_check, "run cancelled before every candidate was checked"
            );
        }

        Ok(RunReport {
            valid_urls,
            cancelled,
        })
    }

    // Splits candidates into (valid cache hits, URLs that need a probe)
    fn split_cached(&self, candidates: BTreeSet<String>) -> (BTreeSet<String>, Vec<String>) {
        if self.config.ignore_cache {
            return (BTreeSet::new(), candidates.into_iter().collect());
        }

        let mut valid = BTreeSet::new();
        let mut misses = Vec::new();

        for url in candidates {
            match self.cache.get(&url) {
                Some(entry) => {
                    self.metrics.record_cache_hit(entry.valid);
                    if entry.valid {
                        valid.insert(url);
                    }
                }
                None => misses.push(url),
            }
        }

        (valid, misses)
    }
}

impl<P: Probe + 'static> Worker<P> {
    async fn run(mut self) -> Vec<String> {
        let mut found = Vec::new();
        let policy = self.config.retry_policy();

        while let Some(url) = self.next_url().await {
            self.metrics.record_new_check();
            debug!(worker = self.id, url = %url, "checking");

            let pause = random_between(self.config.min_delay, self.config.max_delay, &mut self.rng);
            if !self.sleep(pause).await {
                break;
            }

            // Wait for a free slot; the permit is released when dropped
            let permit = tokio::select! {
                _ = self.cancel.cancelled() => break,
                permit = self.gate.acquire() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let outcome = self
                .prober
                .check(&url, &policy, &mut self.rng, &self.cancel)
                .await;
            drop(permit);

            match outcome {
                Ok(Verdict {
                    valid,
                    status,
                    elapsed,
                }) => {
                    self.cache.set(&url, valid);
                    if let Some(status) = status {
                        self.metrics.add_status_code(status);
                    }
                    self.metrics.add_response_time(&url, elapsed);

                    if valid {
                        debug!(url = %url, "valid");
                        self.metrics.increment_valid();
                        found.push(url);
                    } else {
                        debug!(url = %url, "not valid");
                        self.metrics.increment_failed();
                    }
                }
                // Nothing was decided, so nothing goes into the cache
                Err(ProbeError::Cancelled) => break,
                Err(e) => {
                    debug!(url = %url, error = %e, "probe error");
                    self.cache.set(&url, false);
                    self.metrics.increment_failed();
                    self.metrics.increment_errors();
                }
            }

            self.report_progress();

            let pause = random_between(
                self.config.inter_request_min,
                self.config.inter_request_max,
                &mut self.rng,
            );
            if !self.sleep(pause).await {
                break;
            }
        }

        found
    }

    // Next URL off the shared queue, None once the queue is drained or the
    // run is cancelled
    async fn next_url(&self) -> Option<String> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let mut queue = self.queue.lock().await;
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            url = queue.recv() => url,
        }
    }

    // Sleeps unless cancelled first; returns false on cancellation
    async fn sleep(&self, pause: Duration) -> bool {
        if pause.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(pause) => true,
        }
    }

    // Logs every batch_size processed URLs, and once at the very end
    fn report_progress(&self) {
        let done = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if done % self.config.batch_size == 0 || done == self.to_check {
            let percent = done as f64 / self.to_check as f64 * 100.0;
            info!("checked {}/{} urls ({:.1}%)", done, self.to_check, percent);
        }
    }
}

// Producer task: pushes the URLs to check into the queue, one by one
async fn feed_queue(urls: Vec<String>, tx: mpsc::Sender<String>, cancel: CancellationToken) {
    for url in urls {
        tokio::select! {
            _ = cancel.cancelled() => return,
            sent = tx.send(url) => {
                // Every receiver is gone, nobody is left to check the rest
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}

// Each worker gets its own generator; a seed makes a run repeatable
fn worker_rng(seed: Option<u64>, id: usize) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
        None => StdRng::from_os_rng(),
    }
}
