//! Source fetching with retry, jitter and identity rotation.
//!
//! The fetcher owns the retry policy; transports only perform a single request.
//! Every attempt is preceded by a random pause inside the configured jitter
//! window, and failed attempts add an exponential backoff on top of it:
//!
//! ```text
//! delay(n) = uniform(jitter_min, jitter_max) + min(jitter_min * 2^(n-2), max_backoff)   for n >= 2
//! ```
//!
//! Each attempt picks an endpoint and a request identity at random, avoiding
//! the ones used by the previous attempt when there is a choice, so repeated
//! requests do not form an easily recognised pattern.
//!
//! Attempt outcomes are classified as:
//! - transport failure (connect error, timeout): retry
//! - non-2xx status: retry
//! - 2xx with a body shorter than `min_body_bytes`: treated as an anti-bot page, retry
//! - 2xx with an adequate body: done
//!
//! # Transports
//!
//! | Transport | Module | Notes |
//! |-----------|--------|-------|
//! | Direct HTTP | [`http`] | `reqwest` with rotated headers |
//! | Browser | [`browser`] | Drives a WebDriver server; slower, harder to fingerprint |

pub mod browser;
pub mod http;

use crate::config::CrawlConfig;
use crate::error::{FetchError, TransportError};
use crate::events::{AttemptOutcome, EventSink, PipelineEvent};
use crate::extract::DocumentKind;
use browser::BrowserTransport;
use http::HttpTransport;
use rand::{Rng, rng};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, instrument};

/// Headers presented to the remote side for one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestIdentity {
    /// Position in the identity pool, for observability.
    pub index: usize,
    pub user_agent: String,
    pub accept: &'static str,
    pub referer: String,
}

/// Status and body of one transport call.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// A raw document ready for extraction.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub endpoint: String,
    pub body: String,
    pub kind: DocumentKind,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

/// Performs a single request. Retrying is the fetcher's job.
pub trait Transport {
    async fn get(
        &self,
        url: &str,
        identity: &RequestIdentity,
    ) -> Result<TransportResponse, TransportError>;

    /// Upper bound for one call, given the configured request timeout.
    fn call_budget(&self, request_timeout: Duration) -> Duration {
        request_timeout
    }
}

/// Transport chosen at runtime from configuration.
#[derive(Debug)]
pub enum AnyTransport {
    Http(HttpTransport),
    Browser(BrowserTransport),
}

impl Transport for AnyTransport {
    async fn get(
        &self,
        url: &str,
        identity: &RequestIdentity,
    ) -> Result<TransportResponse, TransportError> {
        match self {
            AnyTransport::Http(t) => t.get(url, identity).await,
            AnyTransport::Browser(t) => t.get(url, identity).await,
        }
    }

    fn call_budget(&self, request_timeout: Duration) -> Duration {
        match self {
            AnyTransport::Http(t) => t.call_budget(request_timeout),
            AnyTransport::Browser(t) => t.call_budget(request_timeout),
        }
    }
}

/// Retry policy and identity pool for the fetcher.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub max_attempts: u32,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    pub max_backoff: Duration,
    pub min_body_bytes: usize,
    pub request_timeout: Duration,
    pub user_agents: Vec<String>,
    pub referer: String,
}

impl FetchSettings {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            jitter_min: Duration::from_millis(config.jitter_min_ms),
            jitter_max: Duration::from_millis(config.jitter_max_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            min_body_bytes: config.min_body_bytes,
            request_timeout: config.timeout(),
            user_agents: config.user_agents.clone(),
            referer: format!("{}/", config.site_origin.trim_end_matches('/')),
        }
    }

    /// Pause before attempt `attempt` (1-based). Always at least `jitter_min`.
    fn delay_for(&self, attempt: u32) -> Duration {
        let low = self.jitter_min.as_millis() as u64;
        let high = (self.jitter_max.as_millis() as u64).max(low);
        let jitter = Duration::from_millis(rng().random_range(low..=high));
        if attempt < 2 {
            return jitter;
        }
        let backoff = self
            .jitter_min
            .saturating_mul(1 << (attempt - 2).min(16))
            .min(self.max_backoff);
        jitter + backoff
    }

    fn identity(&self, index: usize, kind: DocumentKind) -> RequestIdentity {
        RequestIdentity {
            index,
            user_agent: self.user_agents.get(index).cloned().unwrap_or_default(),
            accept: kind.accept_header(),
            referer: self.referer.clone(),
        }
    }
}

/// Random index in `0..len`, different from `avoid` whenever `len > 1`.
fn pick_index(len: usize, avoid: Option<usize>) -> usize {
    let mut rng = rng();
    match avoid {
        Some(prev) if len > 1 => {
            let i = rng.random_range(0..len - 1);
            if i >= prev { i + 1 } else { i }
        }
        _ => rng.random_range(0..len),
    }
}

/// Retrying fetcher over a [`Transport`].
pub struct Fetcher<T> {
    transport: T,
    settings: FetchSettings,
    sink: Arc<dyn EventSink>,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, settings: FetchSettings, sink: Arc<dyn EventSink>) -> Self {
        Self {
            transport,
            settings,
            sink,
        }
    }

    /// Fetch one document from any of `endpoints`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NoEndpoints`] for an empty endpoint list, otherwise
    /// the failure class of the last attempt once `max_attempts` are used.
    #[instrument(level = "info", skip_all, fields(endpoints = endpoints.len(), ?kind))]
    pub async fn fetch(
        &self,
        endpoints: &[String],
        kind: DocumentKind,
    ) -> Result<RawDocument, FetchError> {
        if endpoints.is_empty() {
            return Err(FetchError::NoEndpoints);
        }

        let max_attempts = self.settings.max_attempts.max(1);
        let budget = self.transport.call_budget(self.settings.request_timeout);
        let pool_size = self.settings.user_agents.len().max(1);
        let total_t0 = Instant::now();

        let mut prev_endpoint = None;
        let mut prev_identity = None;
        let mut last: Option<(String, AttemptOutcome)> = None;

        for attempt in 1..=max_attempts {
            let delay = self.settings.delay_for(attempt);
            sleep(delay).await;

            let endpoint_idx = pick_index(endpoints.len(), prev_endpoint);
            let identity_idx = pick_index(pool_size, prev_identity);
            prev_endpoint = Some(endpoint_idx);
            prev_identity = Some(identity_idx);

            let endpoint = &endpoints[endpoint_idx];
            let identity = self.settings.identity(identity_idx, kind);
            debug!(attempt, %endpoint, identity = identity_idx, ?delay, "Issuing request");

            let outcome = match timeout(budget, self.transport.get(endpoint, &identity)).await {
                Err(_) => AttemptOutcome::Transport {
                    message: TransportError::Timeout(budget).to_string(),
                },
                Ok(Err(e)) => AttemptOutcome::Transport {
                    message: e.to_string(),
                },
                Ok(Ok(response)) if !(200..300).contains(&response.status) => {
                    AttemptOutcome::HttpStatus {
                        status: response.status,
                    }
                }
                Ok(Ok(response)) if response.body.len() < self.settings.min_body_bytes => {
                    AttemptOutcome::Blocked {
                        bytes: response.body.len(),
                    }
                }
                Ok(Ok(response)) => {
                    self.sink.emit(PipelineEvent::FetchAttempt {
                        attempt,
                        max_attempts,
                        endpoint: endpoint.clone(),
                        identity: identity_idx,
                        delay,
                        outcome: AttemptOutcome::Success {
                            bytes: response.body.len(),
                        },
                    });
                    debug!(elapsed_ms_total = total_t0.elapsed().as_millis() as u64, "Fetch succeeded");
                    return Ok(RawDocument {
                        endpoint: endpoint.clone(),
                        body: response.body,
                        kind,
                        attempts: attempt,
                    });
                }
            };

            self.sink.emit(PipelineEvent::FetchAttempt {
                attempt,
                max_attempts,
                endpoint: endpoint.clone(),
                identity: identity_idx,
                delay,
                outcome: outcome.clone(),
            });
            last = Some((endpoint.clone(), outcome));
        }

        let (endpoint, outcome) = last.unwrap_or_else(|| {
            (
                endpoints[0].clone(),
                AttemptOutcome::Transport {
                    message: "no attempt was made".into(),
                },
            )
        });
        let error = match outcome {
            AttemptOutcome::HttpStatus { status } => FetchError::HttpStatus {
                attempts: max_attempts,
                endpoint,
                status,
            },
            AttemptOutcome::Blocked { bytes } => FetchError::Blocked {
                attempts: max_attempts,
                endpoint,
                bytes,
            },
            AttemptOutcome::Transport { message } => FetchError::Transport {
                attempts: max_attempts,
                endpoint,
                message,
            },
            AttemptOutcome::Success { .. } => FetchError::Transport {
                attempts: max_attempts,
                endpoint,
                message: "unreachable success outcome".into(),
            },
        };
        self.sink.emit(PipelineEvent::FetchFailed {
            reason: error.reason(),
            attempts: max_attempts,
        });
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn fast_settings(max_attempts: u32, user_agents: usize) -> FetchSettings {
        FetchSettings {
            max_attempts,
            jitter_min: Duration::from_millis(1),
            jitter_max: Duration::from_millis(5),
            max_backoff: Duration::from_millis(5),
            min_body_bytes: 20,
            request_timeout: Duration::from_secs(2),
            user_agents: (0..user_agents).map(|i| format!("agent-{i}")).collect(),
            referer: "https://s.weibo.com/".into(),
        }
    }

    /// Replays scripted responses and records which endpoint/identity was used.
    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
        calls: Mutex<Vec<(String, usize)>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<TransportResponse, TransportError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for ScriptedTransport {
        async fn get(
            &self,
            url: &str,
            identity: &RequestIdentity,
        ) -> Result<TransportResponse, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), identity.index));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Connect("script exhausted".into())))
        }
    }

    fn ok(body: &str) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse {
            status: 200,
            body: body.to_string(),
        })
    }

    fn endpoints(urls: &[&str]) -> Vec<String> {
        urls.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_unreachable_endpoints_fail_with_transport_error() {
        let sink = Arc::new(MemorySink::default());
        let transport = HttpTransport::new(Duration::from_secs(2)).unwrap();
        let fetcher = Fetcher::new(transport, fast_settings(3, 6), sink.clone());

        let err = fetcher
            .fetch(
                &endpoints(&[
                    "http://127.0.0.1:1/top",
                    "http://127.0.0.1:2/top",
                    "http://127.0.0.1:3/top",
                ]),
                DocumentKind::Html,
            )
            .await
            .unwrap_err();

        assert_eq!(err.reason(), "transport");
        assert_eq!(err.attempts(), 3);

        let attempts: Vec<_> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::FetchAttempt { delay, outcome, .. } => Some((delay, outcome)),
                _ => None,
            })
            .collect();
        assert_eq!(attempts.len(), 3);
        for (delay, outcome) in &attempts {
            assert!(*delay > Duration::ZERO);
            assert_eq!(outcome.code(), "transport");
        }
        assert_eq!(sink.kinds().last(), Some(&"fetch.failed"));
    }

    /// Never answers within its own call budget.
    struct StallingTransport;

    impl Transport for StallingTransport {
        async fn get(
            &self,
            _url: &str,
            _identity: &RequestIdentity,
        ) -> Result<TransportResponse, TransportError> {
            sleep(Duration::from_secs(5)).await;
            ok("<html>too late to matter</html>")
        }

        fn call_budget(&self, _request_timeout: Duration) -> Duration {
            Duration::from_millis(20)
        }
    }

    #[tokio::test]
    async fn test_stalled_transport_times_out_each_attempt() {
        let sink = Arc::new(MemorySink::default());
        let fetcher = Fetcher::new(StallingTransport, fast_settings(3, 6), sink.clone());

        let started = Instant::now();
        let err = fetcher
            .fetch(&endpoints(&["https://s.weibo.com/top/summary"]), DocumentKind::Html)
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(err.reason(), "transport");
        assert_eq!(err.attempts(), 3);
        assert!(err.to_string().contains("timed out"));
        assert_eq!(
            sink.kinds(),
            vec!["fetch.attempt", "fetch.attempt", "fetch.attempt", "fetch.failed"]
        );
    }

    #[tokio::test]
    async fn test_short_body_is_blocked_and_rotates() {
        let sink = Arc::new(MemorySink::default());
        let transport = ScriptedTransport::new(vec![
            ok("captcha"),
            ok("captcha"),
        ]);
        let fetcher = Fetcher::new(transport, fast_settings(2, 2), sink.clone());

        let err = fetcher
            .fetch(&endpoints(&["https://a.example", "https://b.example"]), DocumentKind::Html)
            .await
            .unwrap_err();

        assert_eq!(err.reason(), "blocked");
        let calls = fetcher.transport.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].0, calls[1].0);
        assert_ne!(calls[0].1, calls[1].1);
    }

    #[tokio::test]
    async fn test_recovers_after_status_failure() {
        let sink = Arc::new(MemorySink::default());
        let body = "x".repeat(64);
        let transport = ScriptedTransport::new(vec![
            Ok(TransportResponse {
                status: 503,
                body: String::new(),
            }),
            ok(&body),
        ]);
        let fetcher = Fetcher::new(transport, fast_settings(3, 3), sink.clone());

        let doc = fetcher
            .fetch(&endpoints(&["https://a.example"]), DocumentKind::Json)
            .await
            .unwrap();

        assert_eq!(doc.attempts, 2);
        assert_eq!(doc.body, body);
        assert_eq!(doc.endpoint, "https://a.example");
        assert_eq!(doc.kind, DocumentKind::Json);
        let outcomes: Vec<_> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::FetchAttempt { outcome, .. } => Some(outcome.code()),
                _ => None,
            })
            .collect();
        assert_eq!(outcomes, vec!["http_status", "success"]);
    }

    #[tokio::test]
    async fn test_final_status_error_is_reported() {
        let sink = Arc::new(MemorySink::default());
        let transport = ScriptedTransport::new(vec![Ok(TransportResponse {
            status: 418,
            body: String::new(),
        })]);
        let fetcher = Fetcher::new(transport, fast_settings(1, 1), sink);

        let err = fetcher
            .fetch(&endpoints(&["https://a.example"]), DocumentKind::Html)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 418, .. }));
    }

    #[tokio::test]
    async fn test_empty_endpoint_list() {
        let fetcher = Fetcher::new(
            ScriptedTransport::default(),
            fast_settings(3, 1),
            Arc::new(MemorySink::default()),
        );
        let err = fetcher.fetch(&[], DocumentKind::Html).await.unwrap_err();
        assert!(matches!(err, FetchError::NoEndpoints));
    }

    #[test]
    fn test_delay_stays_positive_and_bounded() {
        let settings = fast_settings(5, 1);
        for attempt in 1..=5 {
            let delay = settings.delay_for(attempt);
            assert!(delay >= Duration::from_millis(1));
            assert!(delay <= Duration::from_millis(10));
        }
    }

    #[test]
    fn test_pick_index_avoids_previous() {
        for _ in 0..100 {
            assert_ne!(pick_index(3, Some(1)), 1);
            assert_eq!(pick_index(1, Some(0)), 0);
            assert!(pick_index(4, None) < 4);
        }
    }
}
