use crate::{
    common::{
        data::Error::{InvalidHeader, InvalidMethod, InvalidUrl, RequestConversionError},
        util::MockBytes,
    },
    config::MockConfig,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    convert::TryFrom,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
};
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url {0}")]
    InvalidUrl(String),
    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    #[error("cannot convert request to/from internal structure: {0}")]
    RequestConversionError(String),
}

// ************************************************************************************************
// AbortSignal
// ************************************************************************************************
/// A cancellation flag passed along with a call. It is carried through normalization untouched;
/// observing it is the interception layer's business.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ************************************************************************************************
// RequestOptions
// ************************************************************************************************
/// The options a call site passes along with the URL (method, headers, body, signal).
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    pub method: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<MockBytes>,
    pub signal: Option<AbortSignal>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method<S: Into<String>>(mut self, method: S) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body<B: Into<MockBytes>>(mut self, body: B) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `body` to JSON and uses it as the request body.
    pub fn json_body(mut self, body: &Value) -> Self {
        self.body = Some(MockBytes::from(body));
        self
    }

    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }
}

// ************************************************************************************************
// NormalizedRequest
// ************************************************************************************************
/// The canonical form of a single intercepted call. Every matcher works on this structure.
///
/// - `url` is absolute whenever it could be resolved (see [`normalize_url`]),
/// - `method` is upper case,
/// - header names are lower case and keep their original order,
/// - the body is kept raw and parsed as JSON lazily, at most once.
#[derive(Clone)]
pub struct NormalizedRequest {
    url: String,
    method: String,
    headers: Vec<(String, String)>,
    body: Option<MockBytes>,
    json_body: OnceLock<Option<Value>>,
    signal: Option<AbortSignal>,
    raw_request: Option<Arc<http::Request<Bytes>>>,
}

impl NormalizedRequest {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn headers(&self) -> &Vec<(String, String)> {
        &self.headers
    }

    /// Returns the value of the header with the given name (case-insensitive). Multiple
    /// occurrences are joined with `", "`.
    pub fn header(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect();

        match values.is_empty() {
            true => None,
            false => Some(values.join(", ")),
        }
    }

    pub fn body(&self) -> Option<&MockBytes> {
        self.body.as_ref()
    }

    /// The body parsed as JSON. `None` if there is no body or it is not valid JSON.
    pub fn json_body(&self) -> Option<&Value> {
        self.json_body
            .get_or_init(|| {
                self.body.as_ref().and_then(|b| match b.parse_json() {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::trace!("Cannot parse json value: {}", e);
                        None
                    }
                })
            })
            .as_ref()
    }

    pub fn signal(&self) -> Option<&AbortSignal> {
        self.signal.as_ref()
    }

    /// The raw platform request object this request was normalized from, if any.
    pub fn raw_request(&self) -> Option<&http::Request<Bytes>> {
        self.raw_request.as_deref()
    }

    /// Path component of the URL, without query string or fragment.
    pub fn path(&self) -> String {
        self.parsed_url()
            .map(|u| u.path().to_string())
            .unwrap_or_else(|| strip_query(&self.url).to_string())
    }

    /// The URL without query string and fragment.
    pub fn url_without_query(&self) -> &str {
        strip_query(&self.url)
    }

    /// The decoded query parameters in the order they appear in the URL.
    pub fn query_params_vec(&self) -> Vec<(String, String)> {
        let query = match self.parsed_url() {
            Some(url) => url.query().map(str::to_string),
            None => None,
        };

        query
            .map(|q| {
                form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect::<Vec<(String, String)>>()
            })
            .unwrap_or_default()
    }

    /// Re-creates the call options this request was built from.
    pub fn options(&self) -> RequestOptions {
        RequestOptions {
            method: Some(self.method.clone()),
            headers: self.headers.clone(),
            body: self.body.clone(),
            signal: self.signal.clone(),
        }
    }

    fn parsed_url(&self) -> Option<Url> {
        // Relative URLs are kept as paths, so we prefix a dummy origin for parsing.
        match Url::parse(&self.url) {
            Ok(url) => Some(url),
            Err(_) => Url::parse("http://dummy")
                .and_then(|base| base.join(&self.url))
                .ok(),
        }
    }
}

impl fmt::Debug for NormalizedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizedRequest")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(|b| b.to_string()))
            .field("has_raw_request", &self.raw_request.is_some())
            .finish()
    }
}

impl TryFrom<&http::Request<Bytes>> for NormalizedRequest {
    type Error = Error;

    fn try_from(req: &http::Request<Bytes>) -> Result<Self, Self::Error> {
        normalize_raw_request(req, &MockConfig::default())
    }
}

/// Builds the [`NormalizedRequest`] for a raw platform request and keeps the request as its
/// opaque `raw_request` handle. A relative request URI is resolved like a call URL.
pub fn normalize_raw_request(
    req: &http::Request<Bytes>,
    config: &MockConfig,
) -> Result<NormalizedRequest, Error> {
    let headers = http_headers_to_vec(req)?;
    let body = match req.body().is_empty() {
        true => None,
        false => Some(MockBytes::from(req.body().clone())),
    };

    Ok(NormalizedRequest {
        url: normalize_url(&req.uri().to_string(), config.base_url.as_deref())?,
        method: req.method().as_str().to_uppercase(),
        headers: normalize_headers(headers),
        body,
        json_body: OnceLock::new(),
        signal: None,
        raw_request: Some(Arc::new(req.clone())),
    })
}

fn http_headers_to_vec<T>(req: &http::Request<T>) -> Result<Vec<(String, String)>, Error> {
    req.headers()
        .iter()
        .map(|(name, value)| {
            let value_str = value
                .to_str()
                .map_err(|e| RequestConversionError(e.to_string()))?;
            Ok((name.as_str().to_string(), value_str.to_string()))
        })
        .collect()
}

fn strip_query(url: &str) -> &str {
    let end = url.find(|c| c == '?' || c == '#').unwrap_or(url.len());
    &url[..end]
}

fn normalize_headers(headers: Vec<(String, String)>) -> Vec<(String, String)> {
    headers
        .into_iter()
        .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
        .collect()
}

/// Brings a URL into the canonical form used for matching.
///
/// Absolute URLs are parsed and re-serialized (`http://A.com` becomes `http://a.com/`).
/// Protocol-relative URLs get the `http:` scheme. Relative URLs are resolved against
/// `base_url` if there is one, otherwise they are kept as a path with a leading slash.
pub fn normalize_url(url: &str, base_url: Option<&str>) -> Result<String, Error> {
    if url.starts_with("//") {
        return normalize_url(&format!("http:{}", url), None);
    }

    match Url::parse(url) {
        Ok(parsed) => Ok(parsed.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base_url {
            Some(base) => {
                let base = Url::parse(base).map_err(|e| InvalidUrl(format!("{}: {}", base, e)))?;
                base.join(url)
                    .map(|u| u.to_string())
                    .map_err(|e| InvalidUrl(format!("{}: {}", url, e)))
            }
            None => match url.starts_with('/') {
                true => Ok(url.to_string()),
                false => Ok(format!("/{}", url)),
            },
        },
        Err(e) => Err(InvalidUrl(format!("{}: {}", url, e))),
    }
}

/// Builds the [`NormalizedRequest`] for a call described by a URL and its options.
pub fn normalize_request(
    url: &str,
    options: &RequestOptions,
    config: &MockConfig,
) -> Result<NormalizedRequest, Error> {
    let method = options
        .method
        .as_deref()
        .unwrap_or("GET")
        .trim()
        .to_uppercase();

    http::Method::from_bytes(method.as_bytes()).map_err(|_| InvalidMethod(method.clone()))?;

    for (name, _) in &options.headers {
        http::HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| InvalidHeader(format!("{:?}: {}", name, e)))?;
    }

    Ok(NormalizedRequest {
        url: normalize_url(url, config.base_url.as_deref())?,
        method,
        headers: normalize_headers(options.headers.clone()),
        body: options.body.clone(),
        json_body: OnceLock::new(),
        signal: options.signal.clone(),
        raw_request: None,
    })
}

// ************************************************************************************************
// MockResponse
// ************************************************************************************************
/// The response a route produced for a call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: MockBytes,
}

impl MockResponse {
    pub fn body_string(&self) -> String {
        self.body.to_string()
    }

    pub fn json_body(&self) -> Option<Value> {
        self.body.parse_json().ok()
    }

    pub fn to_http_response(&self) -> Result<http::Response<Bytes>, Error> {
        let mut builder = http::Response::builder().status(self.status);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder
            .body(Bytes::from(self.body.clone()))
            .map_err(|e| RequestConversionError(e.to_string()))
    }
}
