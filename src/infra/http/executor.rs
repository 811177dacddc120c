//! Resilient request execution.
//!
//! One logical request: cache short-circuit, bounded attempts each capped by
//! a timeout, linear backoff between transient failures, and no retry at all
//! for 4xx responses. A body is written to the cache only once the caller's
//! decode step has accepted it. The executor reports where a value came from
//! but never keeps a call log of its own; callers attach the source to their
//! own run.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::{debug, instrument, warn};

use super::error::{RequestError, TransientError};
use super::request::RequestDescriptor;
use super::transport::{Transport, TransportError};
use crate::cache::CacheStore;
use crate::domain::types::CallSource;

const METRIC_REQUEST_ATTEMPT: &str = "embodied_request_attempt_total";
const METRIC_REQUEST_RETRY: &str = "embodied_request_retry_total";
const METRIC_REQUEST_FAILURE: &str = "embodied_request_failure_total";

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Attempt budget, per-attempt timeout and backoff step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: NonZeroU32,
    pub timeout: Duration,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: NonZeroU32::new(DEFAULT_RETRY_ATTEMPTS).unwrap_or(NonZeroU32::MIN),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl From<&crate::config::HttpSettings> for RetryPolicy {
    fn from(settings: &crate::config::HttpSettings) -> Self {
        Self {
            attempts: settings.retry_attempts,
            timeout: settings.timeout,
            retry_delay: settings.retry_delay,
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt number `attempt` (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.retry_delay.saturating_mul(attempt)
    }
}

/// A value together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub source: CallSource,
}

impl<T> Fetched<T> {
    pub fn new(value: T, source: CallSource) -> Self {
        Self { value, source }
    }

    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Fetched<U>, E> {
        Ok(Fetched {
            value: f(self.value)?,
            source: self.source,
        })
    }
}

enum AttemptFailure {
    Client { status: u16, body: String },
    Transient(TransientError),
}

impl From<TransportError> for AttemptFailure {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Status { status, body } if (400..500).contains(&status) => {
                AttemptFailure::Client { status, body }
            }
            TransportError::Status { status, body } => {
                AttemptFailure::Transient(TransientError::Server { status, body })
            }
            TransportError::Network(message) => {
                AttemptFailure::Transient(TransientError::Network(message))
            }
            TransportError::InvalidBody(message) => {
                AttemptFailure::Transient(TransientError::InvalidBody(message))
            }
        }
    }
}

#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    cache: Arc<CacheStore>,
    policy: RetryPolicy,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<CacheStore>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            cache,
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub async fn execute(&self, request: &RequestDescriptor) -> Result<Fetched<Value>, RequestError> {
        self.execute_with(request, Ok).await
    }

    /// Runs `request` and hands the body to `accept`. Only bodies that
    /// `accept` takes are cached, so a rejected body is refetched next time.
    #[instrument(skip(self, request, accept), fields(method = %request.method, url = %request.url))]
    pub async fn execute_with<T, F>(
        &self,
        request: &RequestDescriptor,
        accept: F,
    ) -> Result<Fetched<T>, RequestError>
    where
        T: Send,
        F: FnOnce(Value) -> Result<T, RequestError> + Send,
    {
        let key = request.cache_key();
        if request.cacheable
            && let Some(value) = self.cache.get(&key)
        {
            debug!(key = %key, "served from cache");
            return Fetched::new(value, CallSource::Cache).try_map(accept);
        }

        let max_attempts = self.policy.attempts.get();
        let mut attempt = 1;
        loop {
            counter!(METRIC_REQUEST_ATTEMPT).increment(1);
            let outcome = match timeout(self.policy.timeout, self.transport.send(request)).await {
                Ok(result) => result.map_err(AttemptFailure::from),
                Err(_elapsed) => Err(AttemptFailure::Transient(TransientError::Timeout {
                    after: self.policy.timeout,
                })),
            };

            match outcome {
                Ok(value) => {
                    let raw = request.cacheable.then(|| value.clone());
                    let accepted = accept(value).inspect_err(|err| {
                        counter!(METRIC_REQUEST_FAILURE, "kind" => "decode").increment(1);
                        warn!(attempt, error = %err, "upstream body rejected; not caching");
                    })?;
                    if let Some(raw) = raw {
                        self.cache.put(key, raw, request.ttl);
                    }
                    debug!(attempt, "fetched live");
                    return Ok(Fetched::new(accepted, CallSource::Live));
                }
                Err(AttemptFailure::Client { status, body }) => {
                    counter!(METRIC_REQUEST_FAILURE, "kind" => "client").increment(1);
                    warn!(attempt, status, "upstream rejected request; not retrying");
                    return Err(RequestError::Client { status, body });
                }
                Err(AttemptFailure::Transient(error)) if attempt < max_attempts => {
                    let delay = self.policy.backoff_after(attempt);
                    counter!(METRIC_REQUEST_RETRY).increment(1);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient upstream failure; backing off"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(AttemptFailure::Transient(last)) => {
                    counter!(METRIC_REQUEST_FAILURE, "kind" => "exhausted_retries").increment(1);
                    warn!(attempts = attempt, error = %last, "retry budget exhausted");
                    return Err(RequestError::ExhaustedRetries {
                        attempts: attempt,
                        last,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::time::Instant;
    use url::Url;

    use super::*;

    enum Step {
        Ok(Value),
        Status(u16),
        Network,
        Hang,
    }

    /// Replays scripted steps; repeats the last one once the script runs out.
    struct ScriptedTransport {
        steps: Mutex<VecDeque<Step>>,
        last: Mutex<Option<Step>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                last: Mutex::new(None),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn next_step(&self) -> Step {
            let mut steps = self.steps.lock().expect("steps lock");
            let mut last = self.last.lock().expect("last lock");
            match steps.pop_front() {
                Some(step) => {
                    *last = Some(clone_step(&step));
                    step
                }
                None => last.as_ref().map(clone_step).unwrap_or(Step::Network),
            }
        }
    }

    fn clone_step(step: &Step) -> Step {
        match step {
            Step::Ok(value) => Step::Ok(value.clone()),
            Step::Status(status) => Step::Status(*status),
            Step::Network => Step::Network,
            Step::Hang => Step::Hang,
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _request: &RequestDescriptor) -> Result<Value, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.next_step() {
                Step::Ok(value) => Ok(value),
                Step::Status(status) => Err(TransportError::Status {
                    status,
                    body: format!("status {status}"),
                }),
                Step::Network => Err(TransportError::Network("connection reset".to_string())),
                Step::Hang => {
                    sleep(Duration::from_secs(3_600)).await;
                    Ok(Value::Null)
                }
            }
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempts: NonZeroU32::new(3).expect("non-zero"),
            timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(1),
        }
    }

    fn executor(transport: Arc<ScriptedTransport>) -> RequestExecutor {
        RequestExecutor::new(transport, Arc::new(CacheStore::new()), policy())
    }

    fn request() -> RequestDescriptor {
        let url = Url::parse("https://registry.test/materials/steel_rebar_12mm").expect("url");
        RequestDescriptor::get(url).cached_for(Duration::from_secs(3_600))
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_use_the_whole_budget() {
        let transport = ScriptedTransport::new(vec![Step::Status(503)]);
        let executor = executor(Arc::clone(&transport));

        let err = executor.execute(&request()).await.expect_err("should exhaust");

        assert_eq!(transport.calls(), 3);
        match err {
            RequestError::ExhaustedRetries { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(last, TransientError::Server { status: 503, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_are_not_retried() {
        let transport = ScriptedTransport::new(vec![Step::Status(404)]);
        let executor = executor(Arc::clone(&transport));

        let err = executor.execute(&request()).await.expect_err("should fail");

        assert_eq!(transport.calls(), 1);
        assert!(matches!(err, RequestError::Client { status: 404, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_linearly_with_attempt_number() {
        let transport = ScriptedTransport::new(vec![Step::Network]);
        let executor = executor(Arc::clone(&transport));
        let started = Instant::now();

        let _ = executor.execute(&request()).await;

        // 1s after the first failure, 2s after the second, none after the last.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_time_out_and_are_retried() {
        let transport = ScriptedTransport::new(vec![Step::Hang, Step::Ok(json!({"ok": true}))]);
        let executor = executor(Arc::clone(&transport));
        let started = Instant::now();

        let fetched = executor.execute(&request()).await.expect("second attempt succeeds");

        assert_eq!(fetched.value, json!({"ok": true}));
        assert_eq!(fetched.source, CallSource::Live);
        assert_eq!(transport.calls(), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn every_attempt_timing_out_reports_timeout() {
        let transport = ScriptedTransport::new(vec![Step::Hang]);
        let executor = executor(Arc::clone(&transport));

        let err = executor.execute(&request()).await.expect_err("should exhaust");

        assert!(matches!(
            err,
            RequestError::ExhaustedRetries {
                attempts: 3,
                last: TransientError::Timeout { .. }
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_cache_entry_short_circuits_the_network() {
        let transport = ScriptedTransport::new(vec![Step::Ok(json!({"rate": 1.65}))]);
        let executor = executor(Arc::clone(&transport));

        let first = executor.execute(&request()).await.expect("live fetch");
        let second = executor.execute(&request()).await.expect("cached fetch");

        assert_eq!(first.source, CallSource::Live);
        assert_eq!(second.source, CallSource::Cache);
        assert_eq!(second.value, json!({"rate": 1.65}));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_goes_back_to_the_network() {
        let transport = ScriptedTransport::new(vec![Step::Ok(json!(1)), Step::Ok(json!(2))]);
        let executor = executor(Arc::clone(&transport));

        executor.execute(&request()).await.expect("first fetch");
        tokio::time::advance(Duration::from_secs(3_601)).await;
        let refreshed = executor.execute(&request()).await.expect("refetch");

        assert_eq!(refreshed.value, json!(2));
        assert_eq!(refreshed.source, CallSource::Live);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn non_cacheable_requests_always_hit_the_network() {
        let transport = ScriptedTransport::new(vec![Step::Ok(json!(1))]);
        let executor = executor(Arc::clone(&transport));
        let url = Url::parse("https://backend.test/projects").expect("url");
        let uncached = RequestDescriptor::get(url);

        executor.execute(&uncached).await.expect("first");
        executor.execute(&uncached).await.expect("second");

        assert_eq!(transport.calls(), 2);
        assert_eq!(executor.cache().size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_never_cached() {
        let transport = ScriptedTransport::new(vec![Step::Status(500)]);
        let executor = executor(Arc::clone(&transport));

        let _ = executor.execute(&request()).await;

        assert_eq!(executor.cache().size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_bodies_are_not_cached() {
        let transport = ScriptedTransport::new(vec![
            Step::Ok(json!({"rate": "not a number"})),
            Step::Ok(json!({"rate": 1.65})),
        ]);
        let executor = executor(Arc::clone(&transport));
        let accept_rate = |value: Value| {
            value["rate"]
                .as_f64()
                .ok_or_else(|| RequestError::decode("rate", "not a number"))
        };

        let err = executor
            .execute_with(&request(), accept_rate)
            .await
            .expect_err("first body is rejected");
        assert_eq!(err.kind(), "decode");
        assert_eq!(transport.calls(), 1);
        assert_eq!(executor.cache().size(), 0);

        let fetched = executor
            .execute_with(&request(), accept_rate)
            .await
            .expect("second body is accepted");
        assert_eq!(fetched.value, 1.65);
        assert_eq!(fetched.source, CallSource::Live);
        assert_eq!(transport.calls(), 2);
        assert_eq!(executor.cache().size(), 1);
    }

    #[test]
    fn default_policy_matches_documented_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts.get(), 3);
        assert_eq!(policy.timeout, Duration::from_secs(30));
        assert_eq!(policy.backoff_after(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_after(2), Duration::from_secs(2));
    }
}
