use crate::{
    common::data::NormalizedRequest,
    config::MockConfig,
    matchers::{
        body::BodyMatcher,
        custom::{CustomFunctionMatcher, CustomMatcher},
        headers::HeadersMatcher,
        method::MethodMatcher,
        query::QueryMatcher,
        url::{ParamsMatcher, UrlMatcher, UrlPattern},
    },
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub mod body;
pub mod custom;
pub mod headers;
pub mod method;
pub mod query;
pub mod url;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid regular expression in url pattern: {0}")]
    InvalidRegex(#[from] regex::Error),
    #[error("invalid url in url pattern: {0}")]
    InvalidUrl(String),
    #[error("invalid path template {0:?}: templates must start with '/'")]
    InvalidPathTemplate(String),
    #[error("matching on params is only possible with an express: url pattern")]
    ParamsWithoutTemplate,
    #[error("a matcher must specify at least one criterion for matching calls")]
    EmptyMatcher,
}

/// Describes why a single sub-matcher rejected a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub entity: String,
    pub expected: String,
    pub actual: String,
    pub diff: Option<String>,
}

pub trait Matcher {
    fn matches(&self, req: &NormalizedRequest) -> bool;
    fn mismatches(&self, req: &NormalizedRequest) -> Vec<Mismatch>;
    fn name(&self) -> &'static str;
}

// ************************************************************************************************
// MatcherSpec
// ************************************************************************************************
/// The declarative description of which calls a route applies to. Every criterion that is
/// set must hold for a call to match; criteria that are not set match anything.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct MatcherSpec {
    pub url: Option<UrlPattern>,
    pub method: Option<String>,
    pub headers: Option<Vec<(String, String)>>,
    pub query: Option<Vec<(String, String)>>,
    pub params: Option<Vec<(String, String)>>,
    pub body: Option<Value>,
    pub match_partial_body: Option<bool>,
    #[serde(skip)]
    pub custom: Option<CustomMatcher>,
}

impl MatcherSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url<P: Into<UrlPattern>>(mut self, pattern: P) -> Self {
        self.url = Some(pattern.into());
        self
    }

    pub fn method<S: Into<String>>(mut self, method: S) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers
            .get_or_insert_with(Vec::new)
            .push((name.into(), value.into()));
        self
    }

    pub fn query_param<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.query
            .get_or_insert_with(Vec::new)
            .push((name.into(), value.into()));
        self
    }

    pub fn param<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.params
            .get_or_insert_with(Vec::new)
            .push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn match_partial_body(mut self, enabled: bool) -> Self {
        self.match_partial_body = Some(enabled);
        self
    }

    pub fn custom<F>(mut self, f: F) -> Self
    where
        F: Fn(&NormalizedRequest) -> bool + Send + Sync + 'static,
    {
        self.custom = Some(CustomMatcher::new(f));
        self
    }

    /// `true` if no criterion at all is set.
    pub fn is_empty(&self) -> bool {
        self.url.is_none()
            && self.method.is_none()
            && self.headers.is_none()
            && self.query.is_none()
            && self.params.is_none()
            && self.body.is_none()
            && self.custom.is_none()
    }

    /// Overlays `options` onto this spec: every criterion set in `options` replaces the one
    /// in `self`, everything else is kept.
    pub fn with_options(mut self, options: &MatcherSpec) -> Self {
        let options = options.clone();
        self.url = options.url.or(self.url);
        self.method = options.method.or(self.method);
        self.headers = options.headers.or(self.headers);
        self.query = options.query.or(self.query);
        self.params = options.params.or(self.params);
        self.body = options.body.or(self.body);
        self.match_partial_body = options.match_partial_body.or(self.match_partial_body);
        self.custom = options.custom.or(self.custom);
        self
    }
}

impl fmt::Debug for MatcherSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatcherSpec")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("query", &self.query)
            .field("params", &self.params)
            .field("body", &self.body)
            .field("match_partial_body", &self.match_partial_body)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

impl From<UrlPattern> for MatcherSpec {
    fn from(pattern: UrlPattern) -> Self {
        MatcherSpec::new().url(pattern)
    }
}

impl From<&str> for MatcherSpec {
    fn from(pattern: &str) -> Self {
        MatcherSpec::new().url(pattern)
    }
}

impl From<String> for MatcherSpec {
    fn from(pattern: String) -> Self {
        MatcherSpec::new().url(pattern)
    }
}

impl From<regex::Regex> for MatcherSpec {
    fn from(pattern: regex::Regex) -> Self {
        MatcherSpec::new().url(pattern)
    }
}

impl From<CustomMatcher> for MatcherSpec {
    fn from(custom: CustomMatcher) -> Self {
        MatcherSpec {
            custom: Some(custom),
            ..MatcherSpec::default()
        }
    }
}

// ************************************************************************************************
// RouteMatcher
// ************************************************************************************************
/// The compiled form of a [`MatcherSpec`]: a conjunction of sub-matchers.
pub struct RouteMatcher {
    matchers: Vec<Box<dyn Matcher + Send + Sync>>,
}

impl RouteMatcher {
    pub fn matches(&self, req: &NormalizedRequest) -> bool {
        match self.matchers.iter().find(|m| !m.matches(req)) {
            None => true,
            Some(rejecting) => {
                tracing::trace!(
                    "Request {} {} rejected by {} matcher",
                    req.method(),
                    req.url(),
                    rejecting.name()
                );
                false
            }
        }
    }

    /// Evaluates every sub-matcher and collects the reasons the request does not match.
    pub fn mismatches(&self, req: &NormalizedRequest) -> Vec<Mismatch> {
        self.matchers
            .iter()
            .flat_map(|m| m.mismatches(req))
            .collect()
    }

    pub fn matcher_names(&self) -> Vec<&'static str> {
        self.matchers.iter().map(|m| m.name()).collect()
    }
}

impl fmt::Debug for RouteMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatcher")
            .field("matchers", &self.matcher_names())
            .finish()
    }
}

/// Compiles a [`MatcherSpec`] into a [`RouteMatcher`]. Malformed patterns are reported here
/// rather than at match time.
///
/// The body matcher always runs last, so cheaper criteria can reject a request before its body
/// gets parsed.
pub fn compile(spec: &MatcherSpec, config: &MockConfig) -> Result<RouteMatcher, Error> {
    if spec.is_empty() {
        return Err(Error::EmptyMatcher);
    }

    let mut matchers: Vec<Box<dyn Matcher + Send + Sync>> = Vec::new();

    if let Some(pattern) = &spec.url {
        matchers.push(Box::new(UrlMatcher::compile(
            pattern,
            spec.query.is_some(),
            config,
        )?));
    }

    if let Some(method) = &spec.method {
        matchers.push(Box::new(MethodMatcher::new(method)));
    }

    if let Some(headers) = &spec.headers {
        matchers.push(Box::new(HeadersMatcher::new(headers)));
    }

    if let Some(query) = &spec.query {
        matchers.push(Box::new(QueryMatcher::new(query)));
    }

    if let Some(params) = &spec.params {
        let template = match &spec.url {
            Some(UrlPattern::Express(template)) => template,
            _ => return Err(Error::ParamsWithoutTemplate),
        };
        matchers.push(Box::new(ParamsMatcher::compile(template, params)?));
    }

    if let Some(custom) = &spec.custom {
        matchers.push(Box::new(CustomFunctionMatcher::new(custom.clone())));
    }

    if let Some(body) = &spec.body {
        let partial = spec
            .match_partial_body
            .unwrap_or(config.match_partial_body);
        matchers.push(Box::new(BodyMatcher::new(body.clone(), partial)));
    }

    Ok(RouteMatcher { matchers })
}
