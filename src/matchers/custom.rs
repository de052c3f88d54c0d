use crate::{
    common::data::NormalizedRequest,
    matchers::{Matcher, Mismatch},
};
use std::{fmt, sync::Arc};

/// A user supplied predicate over the normalized request.
#[derive(Clone)]
pub struct CustomMatcher(Arc<dyn Fn(&NormalizedRequest) -> bool + Send + Sync>);

impl CustomMatcher {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&NormalizedRequest) -> bool + Send + Sync + 'static,
    {
        CustomMatcher(Arc::new(f))
    }

    pub fn call(&self, req: &NormalizedRequest) -> bool {
        (self.0)(req)
    }
}

impl fmt::Debug for CustomMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomMatcher(<function>)")
    }
}

pub(crate) struct CustomFunctionMatcher {
    function: CustomMatcher,
}

impl CustomFunctionMatcher {
    pub fn new(function: CustomMatcher) -> Self {
        Self { function }
    }
}

impl Matcher for CustomFunctionMatcher {
    fn matches(&self, req: &NormalizedRequest) -> bool {
        self.function.call(req)
    }

    fn mismatches(&self, req: &NormalizedRequest) -> Vec<Mismatch> {
        match self.matches(req) {
            true => Vec::new(),
            false => vec![Mismatch {
                entity: self.name().to_string(),
                expected: "custom function to return true".to_string(),
                actual: "false".to_string(),
                diff: None,
            }],
        }
    }

    fn name(&self) -> &'static str {
        "custom"
    }
}
