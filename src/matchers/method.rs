use crate::{
    common::data::NormalizedRequest,
    matchers::{Matcher, Mismatch},
};

pub(crate) struct MethodMatcher {
    expected: String,
}

impl MethodMatcher {
    pub fn new(method: &str) -> Self {
        Self {
            expected: method.trim().to_uppercase(),
        }
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, req: &NormalizedRequest) -> bool {
        req.method().eq_ignore_ascii_case(&self.expected)
    }

    fn mismatches(&self, req: &NormalizedRequest) -> Vec<Mismatch> {
        match self.matches(req) {
            true => Vec::new(),
            false => vec![Mismatch {
                entity: self.name().to_string(),
                expected: self.expected.clone(),
                actual: req.method().to_string(),
                diff: None,
            }],
        }
    }

    fn name(&self) -> &'static str {
        "method"
    }
}
