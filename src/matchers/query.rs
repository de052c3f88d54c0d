use crate::{
    common::data::NormalizedRequest,
    matchers::{Matcher, Mismatch},
};

/// Matches decoded query parameters independently of the URL pattern.
///
/// A name that is expected once must have that value as its first occurrence in the request.
/// A name that is expected several times must occur with exactly these values, in any order.
/// Parameters that are not expected are ignored.
pub(crate) struct QueryMatcher {
    expected: Vec<(String, Vec<String>)>,
}

impl QueryMatcher {
    pub fn new(expected: &[(String, String)]) -> Self {
        let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
        for (name, value) in expected {
            match grouped.iter_mut().find(|(n, _)| n == name) {
                Some((_, values)) => values.push(value.clone()),
                None => grouped.push((name.clone(), vec![value.clone()])),
            }
        }

        Self { expected: grouped }
    }

    fn find_unmatched<'a>(
        &'a self,
        actual: &[(String, String)],
    ) -> Vec<&'a (String, Vec<String>)> {
        self.expected
            .iter()
            .filter(|(name, expected_values)| {
                let mut actual_values: Vec<&String> = actual
                    .iter()
                    .filter(|(k, _)| k == name)
                    .map(|(_, v)| v)
                    .collect();

                if expected_values.len() == 1 {
                    return actual_values.first() != Some(&&expected_values[0]);
                }

                let mut expected_values: Vec<&String> = expected_values.iter().collect();
                expected_values.sort();
                actual_values.sort();
                actual_values != expected_values
            })
            .collect()
    }
}

impl Matcher for QueryMatcher {
    fn matches(&self, req: &NormalizedRequest) -> bool {
        self.find_unmatched(&req.query_params_vec()).is_empty()
    }

    fn mismatches(&self, req: &NormalizedRequest) -> Vec<Mismatch> {
        let actual = req.query_params_vec();
        self.find_unmatched(&actual)
            .into_iter()
            .map(|(name, values)| Mismatch {
                entity: self.name().to_string(),
                expected: values
                    .iter()
                    .map(|v| format!("{}={}", name, v))
                    .collect::<Vec<String>>()
                    .join("&"),
                actual: actual
                    .iter()
                    .filter(|(k, _)| k == name)
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<String>>()
                    .join("&"),
                diff: None,
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "query"
    }
}
