// src/checker/probe.rs
// =============================================================================
// Checks whether a single URL exists, with retries.
//
// Key functionality:
// - Makes HTTP HEAD requests (lightweight, no body download)
// - Rotates the User-Agent and sends headers an ordinary browser would send
// - Retries transient failures (429, 5xx, network errors) with exponential
//   backoff plus random jitter, so workers don't retry in lockstep
// - Gives up immediately on a definite "no" (404, 403, 301, ...)
//
// The Probe trait is the seam the engine is generic over: the real engine
// uses HttpProber, tests plug in a fake that never touches the network.
//
// Randomness (jitter, user agent) comes from an RNG the caller passes in,
// so every worker owns its own generator and tests can seed it.
//
// Rust concepts:
// - Traits: Probe describes "something that can check a URL"
// - impl Future in a trait: the async method every Probe provides
// - thiserror: ProbeError gets Display and Error impls from attributes
// - tokio::select!: race a backoff sleep against cancellation
// =============================================================================

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::Rng;
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CACHE_CONTROL, CONNECTION, PRAGMA,
    UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

// Identities we rotate through, one picked per request
pub(crate) const USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

pub(crate) const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
pub(crate) const BROWSER_ACCEPT_LANGUAGE: &str = "ru-RU,ru;q=0.8,en-US;q=0.5,en;q=0.3";

// Backoff exponent cap, keeps 2^n from overflowing on silly retry counts
const MAX_BACKOFF_SHIFT: u32 = 16;

/// How hard a single probe tries before giving up.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts (not "extra" attempts)
    pub max_retries: u32,
    /// Delay before the 2nd attempt; doubles for each later attempt
    pub backoff_base: Duration,
    /// Upper bound (exclusive) of the random jitter added to each backoff
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(100),
            max_jitter: Duration::from_millis(200),
        }
    }
}

/// The decision a probe reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// True only for a 200 response
    pub valid: bool,
    /// Status of the last response received
    pub status: Option<u16>,
    /// How long the last request took
    pub elapsed: Duration,
}

/// Why a probe could not reach a decision.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe cancelled")]
    Cancelled,

    #[error("request to {url} failed: {message}")]
    Transport {
        url: String,
        message: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("retries exhausted for {url} after {attempts} attempt(s)")]
    RetriesExhausted { url: String, attempts: u32 },
}

/// A single URL existence check.
pub trait Probe: Send + Sync {
    fn check(
        &self,
        url: &str,
        policy: &RetryPolicy,
        rng: &mut StdRng,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Verdict, ProbeError>> + Send;
}

// What a status code means for the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    Valid,
    Transient,
    Invalid,
}

fn classify(status: StatusCode) -> Classification {
    if status == StatusCode::OK {
        Classification::Valid
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Classification::Transient
    } else {
        Classification::Invalid
    }
}

/// Exponential backoff for `attempt` (1-based retry index) plus jitter.
pub fn backoff_delay(attempt: u32, policy: &RetryPolicy, rng: &mut StdRng) -> Duration {
    let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    let base = policy.backoff_base.saturating_mul(1 << shift);
    base + random_below(policy.max_jitter, rng)
}

/// A uniformly random duration in `[min, max]`.
pub fn random_between(min: Duration, max: Duration, rng: &mut StdRng) -> Duration {
    if max <= min {
        return min;
    }
    let millis = rng.random_range(min.as_millis()..=max.as_millis());
    Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
}

// A uniformly random duration in [0, bound)
fn random_below(bound: Duration, rng: &mut StdRng) -> Duration {
    if bound.is_zero() {
        return Duration::ZERO;
    }
    Duration::from_nanos(rng.random_range(0..bound.as_nanos().min(u64::MAX as u128) as u64))
}

// Picks a short, human readable reason out of a reqwest error
fn describe_transport_error(error: &reqwest::Error) -> &'static str {
    if error.is_timeout() {
        "request timed out"
    } else if error.is_connect() {
        "connection failed"
    } else if error.is_request() {
        "could not send request"
    } else {
        "transport error"
    }
}

/// The real prober: HEAD requests through a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    /// Builds the HTTP client used for every probe.
    ///
    /// `timeout` bounds each request; `proxy` routes all traffic through the
    /// given proxy URL.
    pub fn new(timeout: Duration, proxy: Option<&str>) -> Result<Self, reqwest::Error> {
        // One client for the whole run: reqwest pools connections per host,
        // so thousands of probes to the same site reuse a handful of sockets
        let mut builder = Client::builder()
            .timeout(timeout) // per request, retries get a fresh timeout
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(20)
            .pool_idle_timeout(Duration::from_secs(90))
            // Never follow redirects: a filter URL that redirects is not a
            // page of its own, and its 3xx must reach classify() as-is
            .redirect(reqwest::redirect::Policy::none());

        // `?` turns a malformed proxy URL into an early Err return
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    // Sends one HEAD request with a randomly picked user agent
    async fn head(
        &self,
        url: &str,
        rng: &mut StdRng,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let user_agent = USER_AGENTS.choose(rng).copied().unwrap_or(USER_AGENTS[0]);

        self.client
            .head(url)
            .header(USER_AGENT, user_agent)
            .header(ACCEPT, BROWSER_ACCEPT)
            .header(ACCEPT_LANGUAGE, BROWSER_ACCEPT_LANGUAGE)
            .header(ACCEPT_ENCODING, "gzip, deflate")
            .header(CONNECTION, "keep-alive")
            .header(UPGRADE_INSECURE_REQUESTS, "1")
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await
    }
}

impl Probe for HttpProber {
    async fn check(
        &self,
        url: &str,
        policy: &RetryPolicy,
        rng: &mut StdRng,
        cancel: &CancellationToken,
    ) -> Result<Verdict, ProbeError> {
        for attempt in 0..policy.max_retries {
            if cancel.is_cancelled() {
                return Err(ProbeError::Cancelled);
            }

            if attempt > 0 {
                let delay = backoff_delay(attempt, policy, rng);
                debug!(url, attempt = attempt + 1, ?delay, "retrying");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let is_last = attempt + 1 == policy.max_retries;
            let started = Instant::now();

            let response = match self.head(url, rng).await {
                Ok(response) => response,
                Err(source) => {
                    let message = describe_transport_error(&source);
                    debug!(url, attempt = attempt + 1, error = %source, message, "probe failed");
                    if is_last {
                        return Err(ProbeError::Transport {
                            url: url.to_string(),
                            message,
                            source,
                        });
                    }
                    continue;
                }
            };

            let status = response.status();
            let verdict = |valid| Verdict {
                valid,
                status: Some(status.as_u16()),
                elapsed: started.elapsed(),
            };

            match classify(status) {
                Classification::Valid => return Ok(verdict(true)),
                Classification::Transient => {
                    debug!(url, status = status.as_u16(), "transient status, will retry");
                    if is_last {
                        return Ok(verdict(false));
                    }
                }
                Classification::Invalid => {
                    debug!(url, status = status.as_u16(), "url rejected");
                    return Ok(verdict(false));
                }
            }
        }

        Err(ProbeError::RetriesExhausted {
            url: url.to_string(),
            attempts: policy.max_retries,
        })
    }
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why HEAD and not GET?
//    - We only care whether the page exists, not what is on it
//    - HEAD skips the body, so thousands of probes cost almost no bandwidth
//
// 2. Which statuses are retried?
//    - 429 Too Many Requests and every 5xx: the site is busy or pushing back,
//      asking again later may well succeed
//    - Anything else is the site's final answer
//
// 3. What about redirects?
//    - They are not followed. A 301/302 is the site saying "this filter
//      page does not exist, go elsewhere", so it counts as not valid
//    - Following it would record the status of the target page instead
//
// 4. Why does the RNG come in as a parameter?
//    - No global random state: each worker owns its generator
//    - A seeded StdRng makes delays and user agents reproducible in tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use rand::SeedableRng;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_base: Duration::from_millis(1),
            max_jitter: Duration::ZERO,
        }
    }

    fn prober() -> HttpProber {
        HttpProber::new(Duration::from_secs(2), None).unwrap()
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(StatusCode::OK), Classification::Valid);
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS), Classification::Transient);
        assert_eq!(classify(StatusCode::BAD_GATEWAY), Classification::Transient);
        assert_eq!(classify(StatusCode::NOT_FOUND), Classification::Invalid);
        assert_eq!(classify(StatusCode::NO_CONTENT), Classification::Invalid);
        assert_eq!(classify(StatusCode::MOVED_PERMANENTLY), Classification::Invalid);
    }

    #[test]
    fn test_backoff_grows() {
        let policy = RetryPolicy {
            max_retries: 5,
            backoff_base: Duration::from_millis(100),
            max_jitter: Duration::ZERO,
        };
        let mut rng = rng();
        assert_eq!(backoff_delay(1, &policy, &mut rng), Duration::from_millis(100));
        assert_eq!(backoff_delay(2, &policy, &mut rng), Duration::from_millis(200));
        assert_eq!(backoff_delay(3, &policy, &mut rng), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_jitter_is_bounded() {
        let policy = RetryPolicy::default();
        let mut rng = rng();
        for _ in 0..100 {
            let delay = backoff_delay(1, &policy, &mut rng);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay < Duration::from_millis(300));
        }
    }

    #[test]
    fn test_random_between() {
        let mut rng = rng();
        let min = Duration::from_millis(10);
        let max = Duration::from_millis(20);
        for _ in 0..100 {
            let d = random_between(min, max, &mut rng);
            assert!(d >= min && d <= max);
        }
        assert_eq!(random_between(max, max, &mut rng), max);
        assert_eq!(random_between(max, min, &mut rng), max);
    }

    #[tokio::test]
    async fn test_ok_is_valid() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("HEAD", "/catalog/red/")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let url = format!("{}/catalog/red/", server.url());
        let verdict = prober()
            .check(&url, &fast_policy(3), &mut rng(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(verdict.valid);
        assert_eq!(verdict.status, Some(200));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_redirect_is_not_followed() {
        let mut server = Server::new_async().await;
        let moved = server
            .mock("HEAD", "/catalog/bogus/")
            .with_status(301)
            .with_header("location", "/catalog")
            .expect(1)
            .create_async()
            .await;
        let target = server
            .mock("HEAD", "/catalog")
            .with_status(200)
            .expect(0)
            .create_async()
            .await;

        let url = format!("{}/catalog/bogus/", server.url());
        let verdict = prober()
            .check(&url, &fast_policy(3), &mut rng(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!verdict.valid);
        assert_eq!(verdict.status, Some(301));
        moved.assert_async().await;
        target.assert_async().await;
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("HEAD", "/missing/")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let url = format!("{}/missing/", server.url());
        let verdict = prober()
            .check(&url, &fast_policy(3), &mut rng(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!verdict.valid);
        assert_eq!(verdict.status, Some(404));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_retry_until_exhausted() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("HEAD", "/busy/")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let url = format!("{}/busy/", server.url());
        let verdict = prober()
            .check(&url, &fast_policy(3), &mut rng(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!verdict.valid);
        assert_eq!(verdict.status, Some(503));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limited_is_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("HEAD", "/slow/")
            .with_status(429)
            .expect(2)
            .create_async()
            .await;

        let url = format!("{}/slow/", server.url());
        let verdict = prober()
            .check(&url, &fast_policy(2), &mut rng(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!verdict.valid);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_sends_browser_headers() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("HEAD", "/")
            .match_header("user-agent", Matcher::Regex("^Mozilla/5.0".to_string()))
            .match_header("accept-language", BROWSER_ACCEPT_LANGUAGE)
            .with_status(200)
            .create_async()
            .await;

        let url = format!("{}/", server.url());
        let verdict = prober()
            .check(&url, &fast_policy(1), &mut rng(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(verdict.valid);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_connection_error_is_returned_after_retries() {
        // Nothing listens on port 1
        let result = prober()
            .check(
                "http://127.0.0.1:1/",
                &fast_policy(2),
                &mut rng(),
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(ProbeError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = prober()
            .check("http://127.0.0.1:1/", &fast_policy(3), &mut rng(), &cancel)
            .await;

        assert!(matches!(result, Err(ProbeError::Cancelled)));
    }

    #[tokio::test]
    async fn test_zero_retries_is_exhausted() {
        let result = prober()
            .check(
                "http://127.0.0.1:1/",
                &fast_policy(0),
                &mut rng(),
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(
            result,
            Err(ProbeError::RetriesExhausted { attempts: 0, .. })
        ));
    }
}
