use crate::{
    common::data::NormalizedRequest,
    matchers::{Matcher, Mismatch},
};

/// Every expected header must be present (names compare case-insensitively) with an equal
/// value. Additional request headers are ignored.
pub(crate) struct HeadersMatcher {
    expected: Vec<(String, String)>,
}

impl HeadersMatcher {
    pub fn new(expected: &[(String, String)]) -> Self {
        Self {
            expected: expected
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
                .collect(),
        }
    }

    fn find_unmatched(&self, req: &NormalizedRequest) -> Vec<&(String, String)> {
        self.expected
            .iter()
            .filter(|(name, value)| req.header(name).map_or(true, |actual| actual != *value))
            .collect()
    }
}

impl Matcher for HeadersMatcher {
    fn matches(&self, req: &NormalizedRequest) -> bool {
        self.find_unmatched(req).is_empty()
    }

    fn mismatches(&self, req: &NormalizedRequest) -> Vec<Mismatch> {
        self.find_unmatched(req)
            .into_iter()
            .map(|(name, value)| Mismatch {
                entity: self.name().to_string(),
                expected: format!("{}: {}", name, value),
                actual: req
                    .header(name)
                    .map_or(String::new(), |v| format!("{}: {}", name, v)),
                diff: None,
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "headers"
    }
}
