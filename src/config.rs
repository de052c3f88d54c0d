use crate::common::util::{parse_bool, read_env};
use serde::{Deserialize, Serialize};

/// Global matching configuration shared by the routes and the call history of one session.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MockConfig {
    /// Default body matching mode for routes that do not set `match_partial_body` themselves.
    pub match_partial_body: bool,
    /// Base URL relative call URLs are resolved against.
    pub base_url: Option<String>,
    /// Whether to log a warning when a call is answered by the fallback response.
    pub warn_on_fallback: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            match_partial_body: false,
            base_url: None,
            warn_on_fallback: true,
        }
    }
}

impl MockConfig {
    pub fn builder() -> MockConfigBuilder {
        MockConfigBuilder::new()
    }

    /// Creates a configuration from the defaults, overridden by the environment variables
    /// `FETCHMOCK_MATCH_PARTIAL_BODY`, `FETCHMOCK_BASE_URL` and `FETCHMOCK_WARN_ON_FALLBACK`.
    /// Unparsable values are ignored.
    pub fn from_env() -> Self {
        let base_url = read_env("FETCHMOCK_BASE_URL", "");

        MockConfigBuilder::new()
            .match_partial_body_option(parse_bool(&read_env("FETCHMOCK_MATCH_PARTIAL_BODY", "")))
            .warn_on_fallback_option(parse_bool(&read_env("FETCHMOCK_WARN_ON_FALLBACK", "")))
            .base_url_option(match base_url.is_empty() {
                true => None,
                false => Some(base_url),
            })
            .build()
    }
}

/// Builds a [`MockConfig`]. Every value that is not set falls back to its default.
#[derive(Default)]
pub struct MockConfigBuilder {
    match_partial_body: Option<bool>,
    base_url: Option<String>,
    warn_on_fallback: Option<bool>,
}

impl MockConfigBuilder {
    /// Creates a new instance of `MockConfigBuilder` with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default body matching mode.
    ///
    /// # Parameters
    /// - `enabled`: `true` to compare bodies as subsets, `false` for exact comparison.
    ///
    /// # Returns
    /// A modified `MockConfigBuilder` instance for method chaining.
    pub fn match_partial_body(mut self, enabled: bool) -> Self {
        self.match_partial_body = Some(enabled);
        self
    }

    /// Sets the default body matching mode as an optional value.
    ///
    /// # Returns
    /// A modified `MockConfigBuilder` instance for method chaining.
    pub fn match_partial_body_option(mut self, enabled: Option<bool>) -> Self {
        self.match_partial_body = enabled;
        self
    }

    /// Sets the base URL relative call URLs are resolved against.
    ///
    /// # Parameters
    /// - `url`: An absolute URL, such as `http://localhost:8080`.
    ///
    /// # Returns
    /// A modified `MockConfigBuilder` instance for method chaining.
    pub fn base_url<IntoString: Into<String>>(mut self, url: IntoString) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the base URL as an optional value.
    ///
    /// # Returns
    /// A modified `MockConfigBuilder` instance for method chaining.
    pub fn base_url_option<IntoString: Into<String>>(mut self, url: Option<IntoString>) -> Self {
        self.base_url = url.map(|u| u.into());
        self
    }

    /// Sets whether calls answered by the fallback response are logged as warnings.
    ///
    /// # Returns
    /// A modified `MockConfigBuilder` instance for method chaining.
    pub fn warn_on_fallback(mut self, enabled: bool) -> Self {
        self.warn_on_fallback = Some(enabled);
        self
    }

    /// Sets whether calls answered by the fallback response are logged, as an optional value.
    ///
    /// # Returns
    /// A modified `MockConfigBuilder` instance for method chaining.
    pub fn warn_on_fallback_option(mut self, enabled: Option<bool>) -> Self {
        self.warn_on_fallback = enabled;
        self
    }

    pub fn build(self) -> MockConfig {
        let defaults = MockConfig::default();
        MockConfig {
            match_partial_body: self
                .match_partial_body
                .unwrap_or(defaults.match_partial_body),
            base_url: self.base_url.or(defaults.base_url),
            warn_on_fallback: self.warn_on_fallback.unwrap_or(defaults.warn_on_fallback),
        }
    }
}
