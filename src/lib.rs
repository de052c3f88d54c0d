//! `fetchmock` lets you mock HTTP calls in your tests without running a server. It contains
//! two major components:
//!
//! * a **matching engine** that decides which registered route answers a call, and
//! * a **call history** that records every call so that tests can inspect and verify them.
//!
//! Both are owned by a [FetchMock](session/struct.FetchMock.html) session. Your code under test
//! hands its calls to the session instead of sending them over the network, and your test uses
//! the same session to check what was called.
//!
//! # Getting Started
//! Add `fetchmock` in your `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! fetchmock = "0.1"
//! ```
//!
//! You can then use `fetchmock` in your tests like shown in the following example:
//! ```rust
//! use fetchmock::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn create_user_test() {
//!     let fm = FetchMock::default();
//!
//!     fm.route(
//!         RouteConfig::new()
//!             .name("create-user")
//!             .matcher(
//!                 MatcherSpec::from("http://api.example.com/users")
//!                     .method("POST")
//!                     .body(json!({ "name": "Fred" })),
//!             )
//!             .response(201),
//!     )
//!     .unwrap();
//!
//!     let response = fm
//!         .handle(
//!             "http://api.example.com/users",
//!             RequestOptions::new()
//!                 .method("POST")
//!                 .json_body(&json!({ "name": "Fred" })),
//!         )
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(response.status, 201);
//!     assert!(fm.called("create-user", None).unwrap());
//!     assert!(fm.done(None));
//! }
//! ```
//!
//! # Matching
//! A route applies to a call if every criterion of its [MatcherSpec](matchers/struct.MatcherSpec.html)
//! holds. URL patterns are given as strings with a prefix that selects how they are matched:
//! `begin:`, `end:`, `path:`, `glob:` and `express:`. `*` matches any URL and any other string is
//! compared with the normalized call URL. Request bodies are compared as JSON, either exactly or
//! partially (see [MockConfig](config/struct.MockConfig.html)).
//!
//! # Call History
//! Calls can be selected with a [CallHistoryFilter](history/enum.CallHistoryFilter.html):
//! `"matched"` and `"unmatched"` select by match status, a plain name selects the calls of a
//! named route, and anything else is used as a matcher. Pending asynchronous work, such as delayed
//! responses, can be awaited with [FetchMock::flush](session/struct.FetchMock.html#method.flush).
//!
//! # Configuration
//! The session configuration can be built with [MockConfig::builder](config/struct.MockConfig.html#method.builder)
//! or read from the environment variables `FETCHMOCK_MATCH_PARTIAL_BODY`, `FETCHMOCK_BASE_URL`
//! and `FETCHMOCK_WARN_ON_FALLBACK`.
//!
//! # Debugging
//! `fetchmock` logs through the `tracing` crate with the `log` bridge enabled, so any `log`
//! compatible logger (such as `env_logger`) shows why calls were or were not matched.
pub mod common;
pub mod config;
pub mod history;
pub mod matchers;
pub mod route;
pub mod session;

pub use common::{
    data::{AbortSignal, MockResponse, NormalizedRequest, RequestOptions},
    util::MockBytes,
};
pub use config::{MockConfig, MockConfigBuilder};
pub use history::{CallHistory, CallHistoryFilter, CallLog, PendingTask, TaskError};
pub use matchers::{url::UrlPattern, MatcherSpec};
pub use route::{Route, RouteConfig, RouteHandle, RouteId, RouteResponse};
pub use session::FetchMock;

pub mod prelude {
    #[doc(no_inline)]
    pub use crate::{
        common::{
            data::{AbortSignal, MockResponse, NormalizedRequest, RequestOptions},
            util::{Join, MockBytes},
        },
        config::MockConfig,
        history::{CallHistoryFilter, CallLog},
        matchers::{custom::CustomMatcher, url::UrlPattern, MatcherSpec},
        route::{RouteConfig, RouteResponse},
        session::FetchMock,
    };
}
