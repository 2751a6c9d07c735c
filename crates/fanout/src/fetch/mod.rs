//! Bounded, fail-fast fan-out over a list of URLs.
//!
//! [`Orchestrator::drive`] dispatches one fetch task per URL, in input order, never
//! running more than `bound` of them at once. The first unrecoverable failure is
//! captured, fires the shared [`CancelSignal`], and stops both further dispatch and the
//! tasks still in flight. Voluntary cancellation of the caller's [`FetchContext`] ends
//! the operation without an error.

use std::{sync::Arc, time::Duration};

use tokio::{sync::Semaphore, task::JoinSet};

use crate::FetchError;

mod aggregate;
mod captured;
mod context;
mod signal;
mod task;
mod transport;

pub use aggregate::*;
pub use captured::*;
pub use context::*;
pub use signal::*;
pub use transport::*;

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(1);

/// State shared by the tasks of one `drive` call.
#[derive(Debug)]
pub(crate) struct Shared {
    urls: Arc<[String]>,
    fetch_timeout: Duration,
    signal: CancelSignal,
    captured: CapturedError,
    results: ResultAggregate,
}

impl Shared {
    fn new(urls: Arc<[String]>, fetch_timeout: Duration) -> Self {
        let results = ResultAggregate::with_len(urls.len());
        Self {
            urls,
            fetch_timeout,
            signal: CancelSignal::new(),
            captured: CapturedError::new(),
            results,
        }
    }

    fn into_outcome(self) -> FetchOutcome {
        FetchOutcome {
            results: self.results.into_vec(),
            error: self.captured.into_inner(),
        }
    }

    fn snapshot(&self) -> FetchOutcome {
        FetchOutcome {
            results: self.results.clone().into_vec(),
            error: self.captured.read(),
        }
    }
}

/// What a fan-out produced. `results` keeps whatever completed even when `error` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub results: Vec<UrlResult>,
    pub error: Option<FetchError>,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<Vec<UrlResult>, FetchError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.results),
        }
    }
}

#[derive(Debug)]
pub struct Orchestrator<T> {
    transport: Arc<T>,
    urls: Arc<[String]>,
    bound: usize,
}

impl<T: Transport> Orchestrator<T> {
    /// `bound == 0` falls back to [`DEFAULT_CONCURRENCY`].
    pub fn new(transport: Arc<T>, urls: impl Into<Arc<[String]>>, bound: usize) -> Self {
        Self {
            transport,
            urls: urls.into(),
            bound: if bound == 0 { DEFAULT_CONCURRENCY } else { bound },
        }
    }

    /// Runs the fan-out to completion. Every dispatched task has finished when this
    /// returns; the outcome carries the ordered results and the captured error, if any.
    pub async fn drive(self, ctx: &FetchContext) -> FetchOutcome {
        let shared = Arc::new(Shared::new(self.urls, FETCH_TIMEOUT));
        let gate = Arc::new(Semaphore::new(self.bound));
        let walk_ctx = ctx.child();
        let mut tasks = JoinSet::new();

        for idx in 0..shared.urls.len() {
            let permit = tokio::select! {
                biased;
                _ = shared.signal.fired() => {
                    log::debug!("dispatch stopped before url[{idx}]");
                    walk_ctx.cancel();
                    break;
                }
                permit = gate.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    // the gate is never closed
                    Err(_) => break,
                },
            };

            log::trace!("dispatch url[{idx}] {}", shared.urls[idx]);
            let shared = shared.clone();
            let transport = self.transport.clone();
            let task_ctx = walk_ctx.clone();
            tasks.spawn(async move {
                let _permit = permit;
                task::fetch_one(&shared, transport.as_ref(), &task_ctx, idx).await;
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                let err = FetchError::internal(format!("fetch task failed: {e}"));
                if shared.captured.try_capture(err) {
                    log::error!("fetch task failed: {e}");
                }
                shared.signal.fire();
            }
        }
        walk_ctx.cancel();

        let outcome = match Arc::try_unwrap(shared) {
            Ok(shared) => shared.into_outcome(),
            Err(shared) => shared.snapshot(),
        };
        log::debug!(
            "fan-out of {} urls finished, ok={}",
            outcome.results.len(),
            outcome.is_success()
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio_util::sync::CancellationToken;
    use url::Url;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;
    use crate::ErrorKind;

    /// Transport scripted by query parameters: `delay` (ms) and `status`.
    /// Echoes the URL as the body and tracks how many requests are in flight.
    #[derive(Debug, Default)]
    struct ScriptedTransport {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        started: AtomicUsize,
        completed: AtomicUsize,
    }

    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl Transport for ScriptedTransport {
        async fn get(&self, url: Url) -> Result<String, TransportError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight(&self.in_flight);

            let param = |name: &str| {
                url.query_pairs()
                    .find(|(k, _)| k == name)
                    .and_then(|(_, v)| v.parse::<u64>().ok())
            };
            let delay = param("delay").unwrap_or(0);
            let status = param("status").unwrap_or(200) as u16;

            tokio::time::sleep(Duration::from_millis(delay)).await;
            if status >= 400 {
                return Err(TransportError::Status(status));
            }
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(url.to_string())
        }
    }

    fn scripted(query: &str, n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("http://mock.test/{i}?{query}"))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_follow_input_order_within_bound() {
        let transport = Arc::new(ScriptedTransport::default());
        let urls = scripted("delay=100", 10);

        let outcome = Orchestrator::new(transport.clone(), urls.clone(), 3)
            .drive(&FetchContext::new())
            .await;

        assert!(outcome.is_success());
        let results = outcome.into_result().unwrap();
        assert_eq!(results.len(), urls.len());
        for (item, url) in results.iter().zip(&urls) {
            assert_eq!(&item.url, url);
            assert_eq!(&item.result, url);
        }
        assert_eq!(transport.peak.load(Ordering::SeqCst), 3);
        assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_bound_defaults_to_four() {
        let transport = Arc::new(ScriptedTransport::default());
        let outcome = Orchestrator::new(transport.clone(), scripted("delay=50", 9), 0)
            .drive(&FetchContext::new())
            .await;
        assert!(outcome.is_success());
        assert_eq!(transport.peak.load(Ordering::SeqCst), DEFAULT_CONCURRENCY);
    }

    #[tokio::test]
    async fn test_empty_list_succeeds_immediately() {
        let transport = Arc::new(ScriptedTransport::default());
        let outcome = Orchestrator::new(transport.clone(), Vec::<String>::new(), 4)
            .drive(&FetchContext::new())
            .await;
        assert_eq!(outcome.into_result(), Ok(vec![]));
        assert_eq!(transport.started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_failure_stops_remaining_work() {
        let transport = Arc::new(ScriptedTransport::default());
        let mut urls = scripted("delay=900", 9);
        urls[4] = "http://mock.test/4?delay=10&status=500".into();

        let outcome = Orchestrator::new(transport.clone(), urls.clone(), 4)
            .drive(&FetchContext::new())
            .await;

        let err = outcome.error.clone().expect("operation must fail");
        assert_eq!(err.kind(), ErrorKind::Unprocessable);
        assert_eq!(err.url(), Some(urls[4].as_str()));
        let completed = transport.completed.load(Ordering::SeqCst);
        assert!(completed < urls.len(), "completed {completed} of 9");
        // the first wave finished before the failure and keeps its slots
        assert_eq!(outcome.results[0].url, urls[0]);
        assert_eq!(outcome.results[4], UrlResult::default());
        assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_url_times_out_and_aborts() {
        let transport = Arc::new(ScriptedTransport::default());
        let mut urls = scripted("delay=900", 9);
        urls[5] = "http://mock.test/5?delay=1500".into();

        let outcome = Orchestrator::new(transport.clone(), urls.clone(), 4)
            .drive(&FetchContext::new())
            .await;

        assert_eq!(outcome.error, Some(FetchError::timeout(urls[5].as_str())));
        assert!(transport.completed.load(Ordering::SeqCst) < urls.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_failures_keep_exactly_one() {
        let transport = Arc::new(ScriptedTransport::default());
        let urls = scripted("delay=20&status=502", 4);

        let outcome = Orchestrator::new(transport, urls.clone(), 4)
            .drive(&FetchContext::new())
            .await;

        let err = outcome.error.expect("operation must fail");
        assert!(matches!(err, FetchError::Unprocessable { .. }));
        assert!(urls.iter().any(|u| Some(u.as_str()) == err.url()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_cancellation_is_not_an_error() {
        let transport = Arc::new(ScriptedTransport::default());
        let token = CancellationToken::new();
        let ctx = FetchContext::with_token(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
        let outcome = Orchestrator::new(transport.clone(), scripted("delay=500", 6), 2)
            .drive(&ctx)
            .await;
        canceller.await.unwrap();

        assert_eq!(outcome.error, None);
        assert_eq!(transport.completed.load(Ordering::SeqCst), 0);
        assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_deadline_surfaces_as_timeout() {
        let transport = Arc::new(ScriptedTransport::default());
        let ctx = FetchContext::new().with_timeout(Duration::from_millis(200));
        let urls = scripted("delay=500", 2);

        let outcome = Orchestrator::new(transport, urls, 2).drive(&ctx).await;
        assert_eq!(outcome.error.map(|e| e.kind()), Some(ErrorKind::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_url_fails_without_network() {
        let transport = Arc::new(ScriptedTransport::default());
        let urls = vec!["http://[::1".to_string()];

        let outcome = Orchestrator::new(transport.clone(), urls, 4)
            .drive(&FetchContext::new())
            .await;

        assert_eq!(outcome.error.map(|e| e.kind()), Some(ErrorKind::BadUrl));
        assert_eq!(transport.started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_slow_upstream_is_classified_as_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(1500))
                    .set_body_string("late"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fast"))
            .respond_with(ResponseTemplate::new(200).set_body_string("fast"))
            .mount(&server)
            .await;

        let transport = Arc::new(ReqwestTransport::new().unwrap());
        let slow = format!("{}/slow", server.uri());
        let urls = vec![format!("{}/fast", server.uri()), slow.clone()];
        let ctx = FetchContext::new().with_timeout(Duration::from_secs(10));

        let outcome = Orchestrator::new(transport, urls, 4).drive(&ctx).await;
        assert_eq!(outcome.error, Some(FetchError::timeout(slow)));
        assert_eq!(outcome.results[0].result, "fast");
    }
}
