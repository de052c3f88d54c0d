use std::{
    future::Future,
    sync::Arc,
    task::{Context, Poll},
};

use base64::Engine;
use bytes::Bytes;
use crossbeam_utils::sync::{Parker, Unparker};
use futures_util::{pin_mut, task::ArcWake};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ===============================================================================================
// Environment
// ===============================================================================================
#[doc(hidden)]
pub(crate) fn read_env(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(value) => value,
        Err(_) => default.to_string(),
    }
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ===============================================================================================
// Futures
// ===============================================================================================
/// Extension trait for efficiently blocking on a future.
#[doc(hidden)]
pub trait Join: Future {
    fn join(self) -> <Self as Future>::Output;
}

impl<F: Future> Join for F {
    fn join(self) -> <Self as Future>::Output {
        struct ThreadWaker(Unparker);

        impl ArcWake for ThreadWaker {
            fn wake_by_ref(arc_self: &Arc<Self>) {
                arc_self.0.unpark();
            }
        }

        let parker = Parker::new();
        let waker = futures_util::task::waker(Arc::new(ThreadWaker(parker.unparker().clone())));
        let mut context = Context::from_waker(&waker);

        let future = self;
        pin_mut!(future);

        loop {
            match future.as_mut().poll(&mut context) {
                Poll::Ready(output) => return output,
                Poll::Pending => parker.park(),
            }
        }
    }
}

// ===============================================================================================
// Bytes
// ===============================================================================================
/// A wrapper around `bytes::Bytes` holding a raw request or response body.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MockBytes(pub Bytes);

impl MockBytes {
    /// Attempts to parse the bytes as a JSON document.
    pub fn parse_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.0)
    }
}

impl From<Bytes> for MockBytes {
    fn from(value: Bytes) -> Self {
        MockBytes(value)
    }
}

impl From<MockBytes> for Bytes {
    fn from(value: MockBytes) -> Self {
        value.0
    }
}

impl From<&'static str> for MockBytes {
    fn from(value: &'static str) -> Self {
        MockBytes(Bytes::from_static(value.as_bytes()))
    }
}

impl From<String> for MockBytes {
    fn from(value: String) -> Self {
        MockBytes(Bytes::from(value))
    }
}

impl From<Vec<u8>> for MockBytes {
    fn from(value: Vec<u8>) -> Self {
        MockBytes(Bytes::from(value))
    }
}

impl From<&Value> for MockBytes {
    fn from(value: &Value) -> Self {
        MockBytes::from(value.to_string())
    }
}

impl PartialEq for MockBytes {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl std::fmt::Display for MockBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(result) => write!(f, "{}", result),
            Err(_) => write!(
                f,
                "{}",
                base64::engine::general_purpose::STANDARD.encode(&self.0)
            ),
        }
    }
}
