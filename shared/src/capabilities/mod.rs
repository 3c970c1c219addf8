mod http;
mod navigation;

pub use self::http::{
    ApiPath, HttpError, HttpHeaders, HttpMethod, HttpRequest, HttpResponse,
    HttpResult, HttpTransport, DEFAULT_TIMEOUT_MS, MAX_PATH_LENGTH, MAX_TIMEOUT_MS,
};
pub use self::navigation::{Navigator, NoopNavigator};

use std::sync::Arc;

/// Side-effecting collaborators injected into the store.
#[derive(Clone)]
pub struct Capabilities {
    pub http: Arc<dyn HttpTransport>,
    pub navigation: Arc<dyn Navigator>,
}

impl Capabilities {
    pub fn new(http: Arc<dyn HttpTransport>, navigation: Arc<dyn Navigator>) -> Self {
        Self { http, navigation }
    }

    /// Capabilities without routing, for headless sessions.
    pub fn headless(http: Arc<dyn HttpTransport>) -> Self {
        Self::new(http, Arc::new(NoopNavigator))
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use super::*;
    use crate::model::CaseNo;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use tokio::sync::Notify;

    type BodyMatcher = Box<dyn Fn(&Value) -> bool + Send + Sync>;

    enum Reply {
        Json { status: u16, body: Value },
        Fail(HttpError),
    }

    struct Expectation {
        method: HttpMethod,
        path: String,
        matcher: Option<BodyMatcher>,
        gate: Option<Arc<Notify>>,
        reply: Reply,
    }

    impl Expectation {
        fn matches(&self, request: &HttpRequest) -> bool {
            if self.method != request.method() || self.path != request.path().as_str() {
                return false;
            }
            match &self.matcher {
                Some(matcher) => request.body_json().is_some_and(|body| matcher(&body)),
                None => true,
            }
        }
    }

    /// Scripted transport. Each expectation answers exactly one request with
    /// the same method and path; requests without a matching expectation fail
    /// with [`HttpError::UnexpectedRequest`].
    #[derive(Default)]
    pub struct MockTransport {
        expectations: Mutex<Vec<Expectation>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn expect(&self, method: HttpMethod, path: &str, status: u16, body: Value) {
            self.push(method, path, None, None, Reply::Json { status, body });
        }

        /// Expectation that only answers requests whose JSON body passes `matcher`.
        pub fn expect_matching<F>(
            &self,
            method: HttpMethod,
            path: &str,
            matcher: F,
            status: u16,
            body: Value,
        ) where
            F: Fn(&Value) -> bool + Send + Sync + 'static,
        {
            self.push(
                method,
                path,
                Some(Box::new(matcher)),
                None,
                Reply::Json { status, body },
            );
        }

        /// Expectation whose response is held back until `gate` is notified.
        pub fn expect_gated(
            &self,
            method: HttpMethod,
            path: &str,
            gate: Arc<Notify>,
            status: u16,
            body: Value,
        ) {
            self.push(method, path, None, Some(gate), Reply::Json { status, body });
        }

        pub fn expect_error(&self, method: HttpMethod, path: &str, error: HttpError) {
            self.push(method, path, None, None, Reply::Fail(error));
        }

        fn push(
            &self,
            method: HttpMethod,
            path: &str,
            matcher: Option<BodyMatcher>,
            gate: Option<Arc<Notify>>,
            reply: Reply,
        ) {
            lock(&self.expectations).push(Expectation {
                method,
                path: path.to_string(),
                matcher,
                gate,
                reply,
            });
        }

        /// Panics if any expectation was never consumed.
        pub fn verify_no_outstanding_expectation(&self) {
            let pending: Vec<String> = lock(&self.expectations)
                .iter()
                .map(|e| format!("{} {}", e.method, e.path))
                .collect();
            assert!(pending.is_empty(), "unsatisfied expectations: {pending:?}");
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            lock(&self.requests).clone()
        }

        pub fn request_count(&self) -> usize {
            lock(&self.requests).len()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn execute(&self, request: HttpRequest) -> HttpResult {
            lock(&self.requests).push(request.clone());

            let expectation = {
                let mut expectations = lock(&self.expectations);
                let index = expectations.iter().position(|e| e.matches(&request));
                index.map(|i| expectations.remove(i))
            };

            let Some(expectation) = expectation else {
                return Err(HttpError::UnexpectedRequest {
                    method: request.method(),
                    path: request.path().to_string(),
                });
            };

            if let Some(gate) = &expectation.gate {
                gate.notified().await;
            }

            match expectation.reply {
                Reply::Json { status, body } if (200..300).contains(&status) => {
                    Ok(HttpResponse::json_for(&request, status, &body))
                }
                Reply::Json { status, body } => {
                    let response = HttpResponse::json_for(&request, status, &body);
                    Err(HttpError::HttpStatus {
                        status,
                        message: String::from_utf8_lossy(response.body()).into_owned(),
                        request_id: request.request_id().to_string(),
                    })
                }
                Reply::Fail(error) => Err(error),
            }
        }
    }

    /// Navigator that records every call.
    #[derive(Debug, Default)]
    pub struct RecordingNavigator {
        not_found_calls: AtomicUsize,
        navigations: Mutex<Vec<CaseNo>>,
    }

    impl RecordingNavigator {
        pub fn not_found_calls(&self) -> usize {
            self.not_found_calls.load(Ordering::SeqCst)
        }

        pub fn navigations(&self) -> Vec<CaseNo> {
            lock(&self.navigations).clone()
        }
    }

    impl Navigator for RecordingNavigator {
        fn not_found(&self) {
            self.not_found_calls.fetch_add(1, Ordering::SeqCst);
        }

        fn navigate_to(&self, case_no: CaseNo) {
            lock(&self.navigations).push(case_no);
        }
    }

    pub fn mock_capabilities() -> (Capabilities, Arc<MockTransport>, Arc<RecordingNavigator>) {
        let http = Arc::new(MockTransport::new());
        let navigation = Arc::new(RecordingNavigator::default());
        let caps = Capabilities::new(http.clone(), navigation.clone());
        (caps, http, navigation)
    }
}
