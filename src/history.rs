use crate::{
    common::{
        data::{MockResponse, NormalizedRequest, RequestOptions},
        util::Join,
    },
    config::MockConfig,
    matchers::{self, compile, custom::CustomMatcher, url::UrlPattern, MatcherSpec},
    route::{Route, RouteHandle},
};
use futures_util::future::{try_join_all, BoxFuture, FutureExt, Shared};
use std::{
    borrow::Borrow,
    fmt,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
};

/// The error a pending task finished with. It is cloneable because a task can be awaited by
/// more than one flush.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("pending task failed: {0}")]
    Failed(String),
}

// ************************************************************************************************
// PendingTask
// ************************************************************************************************
/// Asynchronous work that a call has started, such as generating its response.
#[derive(Clone)]
pub struct PendingTask(Shared<BoxFuture<'static, Result<(), TaskError>>>);

impl PendingTask {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        PendingTask(future.boxed().shared())
    }

    /// `true` once the task has finished, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.0.peek().is_some()
    }

    pub async fn wait(&self) -> Result<(), TaskError> {
        self.0.clone().await
    }
}

impl fmt::Debug for PendingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTask")
            .field("finished", &self.is_finished())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ************************************************************************************************
// CallLog
// ************************************************************************************************
/// A single intercepted call. Apart from its response, which is set once, and the list of
/// pending tasks, which only grows, a call log never changes after it has been recorded.
pub struct CallLog {
    request: NormalizedRequest,
    route: Option<RouteHandle>,
    response: OnceLock<MockResponse>,
    pending: Mutex<Vec<PendingTask>>,
}

impl CallLog {
    pub fn new(request: NormalizedRequest, route: Option<RouteHandle>) -> Self {
        Self {
            request,
            route,
            response: OnceLock::new(),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn url(&self) -> &str {
        self.request.url()
    }

    pub fn options(&self) -> RequestOptions {
        self.request.options()
    }

    pub fn request(&self) -> &NormalizedRequest {
        &self.request
    }

    pub fn raw_request(&self) -> Option<&http::Request<bytes::Bytes>> {
        self.request.raw_request()
    }

    /// The route that handled the call. `None` if the call was unmatched.
    pub fn route(&self) -> Option<&RouteHandle> {
        self.route.as_ref()
    }

    pub fn is_matched(&self) -> bool {
        self.route.is_some()
    }

    pub fn response(&self) -> Option<&MockResponse> {
        self.response.get()
    }

    /// Stores the response of the call. Returns `false` if a response was already stored.
    pub fn set_response(&self, response: MockResponse) -> bool {
        self.response.set(response).is_ok()
    }

    pub fn add_pending(&self, task: PendingTask) {
        lock(&self.pending).push(task);
    }

    /// A snapshot of the pending tasks. The list may grow after this returns.
    pub fn pending_tasks(&self) -> Vec<PendingTask> {
        lock(&self.pending).clone()
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl fmt::Debug for CallLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallLog")
            .field("request", &self.request)
            .field("route", &self.route)
            .field("response", &self.response.get())
            .field("pending", &self.pending_count())
            .finish()
    }
}

// ************************************************************************************************
// CallHistoryFilter
// ************************************************************************************************
/// Selects calls from the history.
#[derive(Clone, Debug, Default)]
pub enum CallHistoryFilter {
    /// Every call.
    #[default]
    All,
    /// Matched calls (`true`) or unmatched calls (`false`).
    Matched(bool),
    /// Calls handled by the route with this name.
    RouteName(String),
    /// Calls whose request satisfies the matcher.
    Matcher(MatcherSpec),
}

impl CallHistoryFilter {
    /// Interprets a string filter: `matched` and `unmatched` select by match status, a bare
    /// token of letters, digits and hyphens is a route name, and anything else is a URL pattern.
    pub fn parse(filter: &str) -> Self {
        match filter {
            "matched" => CallHistoryFilter::Matched(true),
            "unmatched" => CallHistoryFilter::Matched(false),
            _ if is_route_name(filter) => CallHistoryFilter::RouteName(filter.to_string()),
            _ => CallHistoryFilter::Matcher(MatcherSpec::from(filter)),
        }
    }
}

fn is_route_name(filter: &str) -> bool {
    !filter.is_empty()
        && filter
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

impl From<bool> for CallHistoryFilter {
    fn from(matched: bool) -> Self {
        CallHistoryFilter::Matched(matched)
    }
}

impl From<&str> for CallHistoryFilter {
    fn from(filter: &str) -> Self {
        CallHistoryFilter::parse(filter)
    }
}

impl From<String> for CallHistoryFilter {
    fn from(filter: String) -> Self {
        CallHistoryFilter::parse(&filter)
    }
}

impl From<MatcherSpec> for CallHistoryFilter {
    fn from(spec: MatcherSpec) -> Self {
        CallHistoryFilter::Matcher(spec)
    }
}

impl From<UrlPattern> for CallHistoryFilter {
    fn from(pattern: UrlPattern) -> Self {
        CallHistoryFilter::Matcher(MatcherSpec::from(pattern))
    }
}

impl From<regex::Regex> for CallHistoryFilter {
    fn from(pattern: regex::Regex) -> Self {
        CallHistoryFilter::Matcher(MatcherSpec::from(pattern))
    }
}

impl From<CustomMatcher> for CallHistoryFilter {
    fn from(custom: CustomMatcher) -> Self {
        CallHistoryFilter::Matcher(MatcherSpec::from(custom))
    }
}

impl<T: Into<CallHistoryFilter>> From<Option<T>> for CallHistoryFilter {
    fn from(filter: Option<T>) -> Self {
        filter.map_or(CallHistoryFilter::All, Into::into)
    }
}

// ************************************************************************************************
// Unsatisfied
// ************************************************************************************************
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsatisfiedReason {
    NeverCalled,
    CalledTooFew { actual: usize, expected: usize },
}

/// A route that has not received the calls it expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsatisfied {
    pub route: RouteHandle,
    pub reason: UnsatisfiedReason,
}

impl fmt::Display for Unsatisfied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            UnsatisfiedReason::NeverCalled => write!(f, "{} not called", self.route),
            UnsatisfiedReason::CalledTooFew { actual, expected } => write!(
                f,
                "{} only called {} times, but {} expected",
                self.route, actual, expected
            ),
        }
    }
}

// ************************************************************************************************
// CallHistory
// ************************************************************************************************
/// The append-only ledger of every intercepted call.
pub struct CallHistory {
    call_logs: Mutex<Vec<Arc<CallLog>>>,
    config: MockConfig,
}

impl Default for CallHistory {
    fn default() -> Self {
        CallHistory::new(MockConfig::default())
    }
}

impl CallHistory {
    pub fn new(config: MockConfig) -> Self {
        Self {
            call_logs: Mutex::new(Vec::new()),
            config,
        }
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    pub fn record_call(&self, call_log: CallLog) -> Arc<CallLog> {
        let call_log = Arc::new(call_log);
        lock(&self.call_logs).push(call_log.clone());
        call_log
    }

    pub fn len(&self) -> usize {
        lock(&self.call_logs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every recorded call. Meant for the owner of the history to reset state between
    /// independent tests.
    pub fn clear(&self) {
        lock(&self.call_logs).clear();
        tracing::trace!("Deleted call history");
    }

    fn snapshot(&self) -> Vec<Arc<CallLog>> {
        lock(&self.call_logs).clone()
    }

    /// Returns the recorded calls that pass `filter`, in the order they were recorded.
    ///
    /// `options` only applies to matcher filters. Its criteria are added to the filter's and
    /// replace them where both define the same criterion.
    pub fn filter_calls<F: Into<CallHistoryFilter>>(
        &self,
        filter: F,
        options: Option<&MatcherSpec>,
    ) -> Result<Vec<Arc<CallLog>>, matchers::Error> {
        let calls = self.snapshot();

        let calls = match filter.into() {
            CallHistoryFilter::All => calls,
            CallHistoryFilter::Matched(matched) => calls
                .into_iter()
                .filter(|call| call.is_matched() == matched)
                .collect(),
            CallHistoryFilter::RouteName(name) => calls
                .into_iter()
                .filter(|call| {
                    call.route()
                        .and_then(|route| route.name())
                        .map_or(false, |n| n == name)
                })
                .collect(),
            CallHistoryFilter::Matcher(spec) => {
                let spec = match options {
                    Some(options) => spec.with_options(options),
                    None => spec,
                };

                // A matcher without criteria selects nothing.
                if spec.is_empty() {
                    return Ok(Vec::new());
                }

                let matcher = compile(&spec, &self.config)?;
                calls
                    .into_iter()
                    .filter(|call| matcher.matches(call.request()))
                    .collect()
            }
        };

        Ok(calls)
    }

    pub fn calls<F: Into<CallHistoryFilter>>(
        &self,
        filter: F,
        options: Option<&MatcherSpec>,
    ) -> Result<Vec<Arc<CallLog>>, matchers::Error> {
        self.filter_calls(filter, options)
    }

    pub fn called<F: Into<CallHistoryFilter>>(
        &self,
        filter: F,
        options: Option<&MatcherSpec>,
    ) -> Result<bool, matchers::Error> {
        Ok(!self.filter_calls(filter, options)?.is_empty())
    }

    /// The most recent call that passes `filter`, or `None` if there is none.
    pub fn last_call<F: Into<CallHistoryFilter>>(
        &self,
        filter: F,
        options: Option<&MatcherSpec>,
    ) -> Result<Option<Arc<CallLog>>, matchers::Error> {
        Ok(self.filter_calls(filter, options)?.pop())
    }

    /// Checks every route (restricted to `route_names` if given) and reports each one that was
    /// never called or was called fewer times than its `repeat` count.
    pub fn unsatisfied<R: Borrow<Route>>(
        &self,
        routes: &[R],
        route_names: Option<&[&str]>,
    ) -> Vec<Unsatisfied> {
        let calls = self.snapshot();
        let mut result = Vec::new();

        for route in routes {
            let route: &Route = route.borrow();

            if let Some(names) = route_names {
                if !route.name().map_or(false, |n| names.contains(&n)) {
                    continue;
                }
            }

            let actual = calls
                .iter()
                .filter(|call| call.route().map_or(false, |r| r.id() == route.id()))
                .count();

            let reason = match (actual, route.repeat()) {
                (0, _) => UnsatisfiedReason::NeverCalled,
                (actual, Some(expected)) if actual < expected => {
                    UnsatisfiedReason::CalledTooFew { actual, expected }
                }
                _ => continue,
            };

            result.push(Unsatisfied {
                route: route.handle(),
                reason,
            });
        }

        result
    }

    /// `true` if every selected route has been called (at least `repeat` times, if set).
    /// A warning is logged for each route that is not done.
    pub fn done<R: Borrow<Route>>(&self, routes: &[R], route_names: Option<&[&str]>) -> bool {
        let unsatisfied = self.unsatisfied(routes, route_names);
        for entry in &unsatisfied {
            tracing::warn!("Warning: {}", entry);
        }
        unsatisfied.is_empty()
    }

    /// Waits for the pending tasks of all recorded calls. With `wait_for_response_body` set, it
    /// waits a second time for tasks that were added while the first round was running.
    /// The first failing task fails the flush.
    pub async fn flush(&self, wait_for_response_body: bool) -> Result<(), TaskError> {
        self.drain_pending().await?;
        if wait_for_response_body {
            self.drain_pending().await?;
        }
        Ok(())
    }

    /// Blocks the current thread until [`CallHistory::flush`] has completed.
    pub fn flush_blocking(&self, wait_for_response_body: bool) -> Result<(), TaskError> {
        self.flush(wait_for_response_body).join()
    }

    async fn drain_pending(&self) -> Result<(), TaskError> {
        let tasks: Vec<PendingTask> = self
            .snapshot()
            .iter()
            .flat_map(|call| call.pending_tasks())
            .collect();

        tracing::trace!("Waiting for {} pending tasks", tasks.len());

        try_join_all(tasks.into_iter().map(|task| task.0)).await?;
        Ok(())
    }
}
