use crate::{
    common::data::{
        self, normalize_raw_request, normalize_request, MockResponse, NormalizedRequest,
        RequestOptions,
    },
    config::MockConfig,
    history::{CallHistory, CallHistoryFilter, CallLog, PendingTask, TaskError},
    matchers::{self, MatcherSpec},
    route::{self, Route, RouteConfig, RouteHandle, RouteId, RouteResponse},
};
use bytes::Bytes;
use futures_timer::Delay;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot register route: {0}")]
    Route(#[from] route::Error),
    #[error("cannot normalize call: {0}")]
    Request(#[from] data::Error),
    #[error("no route matched {method} {url} and no fallback response is defined")]
    NoRouteMatched { method: String, url: String },
    #[error("the call to {0} was aborted")]
    Aborted(String),
    #[error(transparent)]
    Task(#[from] TaskError),
}

struct ActiveRoute {
    route: Arc<Route>,
    call_counter: usize,
}

impl ActiveRoute {
    fn is_exhausted(&self) -> bool {
        self.route
            .repeat()
            .map_or(false, |repeat| self.call_counter >= repeat)
    }
}

#[derive(Default)]
struct SessionState {
    routes: Vec<ActiveRoute>,
    fallback: Option<RouteResponse>,
}

/// A mocking session. It owns a set of routes, the history of every call it handled and the
/// configuration both are compiled and queried with.
///
/// Calls are answered by the first route (in registration order) that matches them. Calls no
/// route matches are answered by the fallback response set with [`FetchMock::catch`], if any.
/// Every call is recorded, whether it matched or not.
pub struct FetchMock {
    state: Mutex<SessionState>,
    history: CallHistory,
    config: MockConfig,
}

impl Default for FetchMock {
    fn default() -> Self {
        FetchMock::new(MockConfig::default())
    }
}

impl FetchMock {
    pub fn new(config: MockConfig) -> Self {
        Self {
            state: Mutex::new(SessionState::default()),
            history: CallHistory::new(config.clone()),
            config,
        }
    }

    /// Creates a session configured from the environment (see [`MockConfig::from_env`]).
    pub fn from_env() -> Self {
        FetchMock::new(MockConfig::from_env())
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    pub fn history(&self) -> &CallHistory {
        &self.history
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Compiles and registers a route. Routes are tried in the order they were registered.
    pub fn route(&self, config: RouteConfig) -> Result<RouteId, Error> {
        let route = Route::compile(config, &self.config)?;
        let mut state = self.state();

        if let Some(name) = route.name() {
            if state.routes.iter().any(|r| r.route.name() == Some(name)) {
                return Err(route::Error::DuplicateRouteName(name.to_string()).into());
            }
        }

        tracing::debug!("Adding new route {:?}", route);

        let id = route.id();
        state.routes.push(ActiveRoute {
            route: Arc::new(route),
            call_counter: 0,
        });

        Ok(id)
    }

    /// Sets the response for calls that no route matches.
    pub fn catch<R: Into<RouteResponse>>(&self, response: R) {
        self.state().fallback = Some(response.into());
    }

    /// Removes the routes with the given names, or all routes and the fallback if `names` is
    /// `None`.
    pub fn remove_routes(&self, names: Option<&[&str]>) {
        let mut state = self.state();
        match names {
            Some(names) => state
                .routes
                .retain(|r| !r.route.name().map_or(false, |n| names.contains(&n))),
            None => {
                state.routes.clear();
                state.fallback = None;
            }
        }
        tracing::debug!("{} routes left after removal", state.routes.len());
    }

    /// Removes every route and the fallback and forgets the call history.
    pub fn reset(&self) {
        self.remove_routes(None);
        self.clear_history();
    }

    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.state().routes.iter().map(|r| r.route.clone()).collect()
    }

    /// Selects the route for a call, counts the call against it and records it. The call is
    /// recorded under the session lock, so the ledger order is the order calls were counted in.
    fn select_and_record(
        &self,
        req: NormalizedRequest,
    ) -> (Arc<CallLog>, Option<Arc<Route>>, Option<RouteResponse>) {
        let mut guard = self.state();
        let state = &mut *guard;

        let selected = state
            .routes
            .iter_mut()
            .find(|r| !r.is_exhausted() && r.route.matches(&req));

        let (route, response) = match selected {
            Some(active) => {
                active.call_counter += 1;
                tracing::debug!(
                    "Matched {} {} with route {}",
                    req.method(),
                    req.url(),
                    active.route.handle()
                );
                let response = active.route.response().clone();
                (Some(active.route.clone()), Some(response))
            }
            None => (None, state.fallback.clone()),
        };

        let call_log = self
            .history
            .record_call(CallLog::new(req, route.as_ref().map(|r| r.handle())));

        (call_log, route, response)
    }

    /// Handles a call: normalizes it, answers it with the first matching route and records it.
    pub async fn handle(&self, url: &str, options: RequestOptions) -> Result<MockResponse, Error> {
        let req = normalize_request(url, &options, &self.config)?;
        self.serve(req).await
    }

    /// Handles a raw platform request. The request is kept on the call log and can be read back
    /// with [`CallLog::raw_request`].
    pub async fn handle_request(
        &self,
        req: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, Error> {
        let req = normalize_raw_request(&req, &self.config)?;
        let response = self.serve(req).await?;
        Ok(response.to_http_response()?)
    }

    async fn serve(&self, req: NormalizedRequest) -> Result<MockResponse, Error> {
        let (call_log, route, response) = self.select_and_record(req);

        let response = match response {
            Some(response) => response.to_response(),
            None => {
                return Err(Error::NoRouteMatched {
                    method: call_log.request().method().to_string(),
                    url: call_log.url().to_string(),
                })
            }
        };

        if route.is_none() && self.config.warn_on_fallback {
            tracing::warn!(
                "Unmatched {} to {}, answered with the fallback response",
                call_log.request().method(),
                call_log.url()
            );
        }

        if is_aborted(&call_log) {
            return Err(Error::Aborted(call_log.url().to_string()));
        }

        let delay = route.as_ref().and_then(|r| r.delay());
        let log = call_log.clone();
        let generated = response.clone();
        let task = PendingTask::new(async move {
            if let Some(delay) = delay {
                Delay::new(delay).await;
            }
            log.set_response(generated);
            Ok(())
        });

        call_log.add_pending(task.clone());
        task.wait().await?;

        if is_aborted(&call_log) {
            return Err(Error::Aborted(call_log.url().to_string()));
        }

        Ok(response)
    }

    pub fn calls<F: Into<CallHistoryFilter>>(
        &self,
        filter: F,
        options: Option<&MatcherSpec>,
    ) -> Result<Vec<Arc<CallLog>>, matchers::Error> {
        self.history.calls(filter, options)
    }

    pub fn called<F: Into<CallHistoryFilter>>(
        &self,
        filter: F,
        options: Option<&MatcherSpec>,
    ) -> Result<bool, matchers::Error> {
        self.history.called(filter, options)
    }

    pub fn last_call<F: Into<CallHistoryFilter>>(
        &self,
        filter: F,
        options: Option<&MatcherSpec>,
    ) -> Result<Option<Arc<CallLog>>, matchers::Error> {
        self.history.last_call(filter, options)
    }

    /// See [`CallHistory::done`].
    pub fn done(&self, route_names: Option<&[&str]>) -> bool {
        self.history.done(&self.routes(), route_names)
    }

    pub async fn flush(&self, wait_for_response_body: bool) -> Result<(), Error> {
        Ok(self.history.flush(wait_for_response_body).await?)
    }

    /// Forgets every recorded call and starts counting the calls of every route from zero.
    pub fn clear_history(&self) {
        let mut state = self.state();
        for active in state.routes.iter_mut() {
            active.call_counter = 0;
        }
        self.history.clear();
    }

    /// The handle of every registered route, in registration order.
    pub fn route_handles(&self) -> Vec<RouteHandle> {
        self.state().routes.iter().map(|r| r.route.handle()).collect()
    }
}

fn is_aborted(call_log: &CallLog) -> bool {
    call_log
        .request()
        .signal()
        .map_or(false, |signal| signal.is_aborted())
}
