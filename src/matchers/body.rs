use crate::{
    common::data::NormalizedRequest,
    matchers::{Matcher, Mismatch},
};
use assert_json_diff::{assert_json_eq_no_panic, assert_json_include_no_panic};
use serde_json::Value;

/// Methods that conventionally carry no body. Body expectations are ignored for them.
const BODYLESS_METHODS: &[&str] = &["GET", "HEAD"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareMode {
    /// Deep equality. Object key order is irrelevant, array order is significant.
    Exact,
    /// Every expected key must be present with a matching value at the same depth, extra keys
    /// are ignored at every level, and expected arrays must be a prefix of the actual ones.
    Partial,
}

impl CompareMode {
    pub fn from_partial_flag(partial: bool) -> Self {
        match partial {
            true => CompareMode::Partial,
            false => CompareMode::Exact,
        }
    }
}

/// Structurally compares two JSON values. The mode is applied at every nesting level.
pub fn json_matches(expected: &Value, actual: &Value, mode: CompareMode) -> bool {
    match (expected, actual) {
        (Value::Object(expected), Value::Object(actual)) => {
            if mode == CompareMode::Exact && expected.len() != actual.len() {
                return false;
            }

            expected.iter().all(|(key, expected_value)| {
                actual
                    .get(key)
                    .map_or(false, |actual_value| json_matches(expected_value, actual_value, mode))
            })
        }
        (Value::Array(expected), Value::Array(actual)) => {
            let length_ok = match mode {
                CompareMode::Exact => expected.len() == actual.len(),
                CompareMode::Partial => expected.len() <= actual.len(),
            };

            length_ok
                && expected
                    .iter()
                    .zip(actual.iter())
                    .all(|(e, a)| json_matches(e, a, mode))
        }
        (Value::Number(expected), Value::Number(actual)) => {
            if expected == actual {
                return true;
            }
            // 1 and 1.0 are the same number in a JSON document.
            match (expected.as_f64(), actual.as_f64()) {
                (Some(e), Some(a)) => e == a,
                _ => false,
            }
        }
        (expected, actual) => expected == actual,
    }
}

fn is_bodyless_method(method: &str) -> bool {
    BODYLESS_METHODS
        .iter()
        .any(|m| m.eq_ignore_ascii_case(method))
}

pub(crate) struct BodyMatcher {
    expected: Value,
    mode: CompareMode,
}

impl BodyMatcher {
    pub fn new(expected: Value, partial: bool) -> Self {
        Self {
            expected,
            mode: CompareMode::from_partial_flag(partial),
        }
    }

    fn describe_difference(&self, actual: &Value) -> Option<String> {
        let result = match self.mode {
            CompareMode::Exact => assert_json_eq_no_panic(actual, &self.expected),
            CompareMode::Partial => assert_json_include_no_panic(actual, &self.expected),
        };

        result.err()
    }
}

impl Matcher for BodyMatcher {
    /// The body is only ever interpreted as JSON, whatever the content type says. A missing
    /// body or one that cannot be parsed never matches. For methods without a conventional
    /// body (`GET`, `HEAD`) the expectation is not evaluated.
    fn matches(&self, req: &NormalizedRequest) -> bool {
        if is_bodyless_method(req.method()) {
            return true;
        }

        let result = match (req.body(), req.json_body()) {
            (None, _) => false,
            (Some(_), None) => false,
            (Some(_), Some(actual)) => json_matches(&self.expected, actual, self.mode),
        };

        if !result {
            if let Some(diff) = req.json_body().and_then(|a| self.describe_difference(a)) {
                tracing::debug!("Request body does not match expectation:\n{}", diff);
            }
        }

        result
    }

    fn mismatches(&self, req: &NormalizedRequest) -> Vec<Mismatch> {
        if self.matches(req) {
            return Vec::new();
        }

        let operator = match self.mode {
            CompareMode::Exact => "body",
            CompareMode::Partial => "body (partial)",
        };

        vec![Mismatch {
            entity: operator.to_string(),
            expected: self.expected.to_string(),
            actual: req.body().map_or(String::new(), |b| b.to_string()),
            diff: req.json_body().and_then(|a| self.describe_difference(a)),
        }]
    }

    fn name(&self) -> &'static str {
        "body"
    }
}
