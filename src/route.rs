use crate::{
    common::{
        data::{normalize_request, MockResponse, NormalizedRequest, RequestOptions},
        util::MockBytes,
    },
    config::MockConfig,
    matchers::{self, compile, MatcherSpec, Mismatch, RouteMatcher},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid route matcher: {0}")]
    Matcher(#[from] matchers::Error),
    #[error("each route must specify some criteria for matching calls")]
    MissingMatcher,
    #[error("each route must define a response")]
    MissingResponse,
    #[error("repeat must be a positive integer")]
    InvalidRepeat,
    #[error("a route named {0:?} is already registered")]
    DuplicateRouteName(String),
}

static NEXT_ROUTE_ID: AtomicUsize = AtomicUsize::new(0);

/// Process-wide unique identity of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteId(usize);

impl RouteId {
    fn next() -> Self {
        RouteId(NEXT_ROUTE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A non-owning reference to a route, kept by the call logs the route served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteHandle {
    id: RouteId,
    name: Option<Arc<str>>,
}

impl RouteHandle {
    pub fn id(&self) -> RouteId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Display for RouteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "route {}", self.id),
        }
    }
}

// ************************************************************************************************
// RouteResponse
// ************************************************************************************************
/// Describes the response a route answers with.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RouteResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<MockBytes>,
}

impl RouteResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body<B: Into<MockBytes>>(mut self, body: B) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Uses the serialized JSON value as body and sets a JSON content type unless one is set.
    pub fn json_body(mut self, body: &Value) -> Self {
        if !self
            .headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        {
            self.headers
                .push(("content-type".to_string(), "application/json".to_string()));
        }
        self.body = Some(MockBytes::from(body));
        self
    }

    pub fn to_response(&self) -> MockResponse {
        MockResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone().unwrap_or_default(),
        }
    }
}

impl From<u16> for RouteResponse {
    fn from(status: u16) -> Self {
        RouteResponse::new(status)
    }
}

impl From<&'static str> for RouteResponse {
    fn from(body: &'static str) -> Self {
        RouteResponse::new(200).body(body)
    }
}

impl From<Value> for RouteResponse {
    fn from(body: Value) -> Self {
        RouteResponse::new(200).json_body(&body)
    }
}

// ************************************************************************************************
// RouteConfig
// ************************************************************************************************
/// The declarative configuration of a route.
#[derive(Clone, Debug, Default)]
pub struct RouteConfig {
    pub name: Option<String>,
    pub matcher: Option<MatcherSpec>,
    pub response: Option<RouteResponse>,
    /// The number of calls the route answers; it is also the number of calls it expects.
    pub repeat: Option<usize>,
    /// How long generating the response takes.
    pub delay: Option<Duration>,
}

impl RouteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn matcher<M: Into<MatcherSpec>>(mut self, matcher: M) -> Self {
        self.matcher = Some(matcher.into());
        self
    }

    pub fn response<R: Into<RouteResponse>>(mut self, response: R) -> Self {
        self.response = Some(response.into());
        self
    }

    pub fn repeat(mut self, times: usize) -> Self {
        self.repeat = Some(times);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

// ************************************************************************************************
// Route
// ************************************************************************************************
/// A registered rule pairing a compiled matcher with a response. Immutable once created.
pub struct Route {
    id: RouteId,
    config: RouteConfig,
    response: RouteResponse,
    matcher: RouteMatcher,
    global: MockConfig,
}

impl Route {
    /// Compiles a route using the default global configuration.
    pub fn new(config: RouteConfig) -> Result<Self, Error> {
        Self::compile(config, &MockConfig::default())
    }

    pub fn compile(config: RouteConfig, global: &MockConfig) -> Result<Self, Error> {
        let spec = match &config.matcher {
            Some(spec) if !spec.is_empty() => spec,
            _ => return Err(Error::MissingMatcher),
        };

        let response = config.response.clone().ok_or(Error::MissingResponse)?;

        if config.repeat == Some(0) {
            return Err(Error::InvalidRepeat);
        }

        let matcher = compile(spec, global)?;

        Ok(Route {
            id: RouteId::next(),
            response,
            matcher,
            config,
            global: global.clone(),
        })
    }

    pub fn id(&self) -> RouteId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.config.name.as_deref()
    }

    pub fn config(&self) -> &RouteConfig {
        &self.config
    }

    pub fn repeat(&self) -> Option<usize> {
        self.config.repeat
    }

    pub fn delay(&self) -> Option<Duration> {
        self.config.delay
    }

    pub fn response(&self) -> &RouteResponse {
        &self.response
    }

    pub fn handle(&self) -> RouteHandle {
        RouteHandle {
            id: self.id,
            name: self.config.name.as_deref().map(Arc::from),
        }
    }

    pub fn matches(&self, req: &NormalizedRequest) -> bool {
        self.matcher.matches(req)
    }

    /// Normalizes the call and runs the matcher on it. A call that cannot be normalized never
    /// matches.
    pub fn matches_call(&self, url: &str, options: &RequestOptions) -> bool {
        match normalize_request(url, options, &self.global) {
            Ok(req) => self.matches(&req),
            Err(e) => {
                tracing::debug!("Cannot normalize call to {}: {}", url, e);
                false
            }
        }
    }

    pub fn mismatches(&self, req: &NormalizedRequest) -> Vec<Mismatch> {
        self.matcher.mismatches(req)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("matcher", &self.matcher)
            .field("repeat", &self.config.repeat)
            .finish()
    }
}
