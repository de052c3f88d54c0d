use crate::{
    common::data::{normalize_url, NormalizedRequest},
    config::MockConfig,
    matchers::{Error, Matcher, Mismatch},
};
use path_tree::PathTree;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A pattern the URL of a call is matched against.
///
/// Strings are parsed by prefix: `*` matches any URL, `begin:`, `end:`, `path:`, `glob:` and
/// `express:` select the respective strategy, everything else is an exact URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UrlPattern {
    Any,
    Exact(String),
    Begin(String),
    End(String),
    Path(String),
    Glob(String),
    Express(String),
    Regex(String),
}

impl UrlPattern {
    pub fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            return UrlPattern::Any;
        }

        let prefixed: [(&str, fn(String) -> UrlPattern); 5] = [
            ("begin:", UrlPattern::Begin),
            ("end:", UrlPattern::End),
            ("path:", UrlPattern::Path),
            ("glob:", UrlPattern::Glob),
            ("express:", UrlPattern::Express),
        ];

        for (prefix, constructor) in prefixed {
            if let Some(rest) = pattern.strip_prefix(prefix) {
                return constructor(rest.to_string());
            }
        }

        UrlPattern::Exact(pattern.to_string())
    }

    /// A regular expression pattern. The expression is only validated when it gets compiled.
    pub fn regex<S: Into<String>>(source: S) -> Self {
        UrlPattern::Regex(source.into())
    }
}

impl From<&str> for UrlPattern {
    fn from(value: &str) -> Self {
        UrlPattern::parse(value)
    }
}

impl From<String> for UrlPattern {
    fn from(value: String) -> Self {
        UrlPattern::parse(&value)
    }
}

impl From<Regex> for UrlPattern {
    fn from(value: Regex) -> Self {
        UrlPattern::Regex(value.as_str().to_string())
    }
}

impl std::fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrlPattern::Any => write!(f, "*"),
            UrlPattern::Exact(v) => write!(f, "{}", v),
            UrlPattern::Begin(v) => write!(f, "begin:{}", v),
            UrlPattern::End(v) => write!(f, "end:{}", v),
            UrlPattern::Path(v) => write!(f, "path:{}", v),
            UrlPattern::Glob(v) => write!(f, "glob:{}", v),
            UrlPattern::Express(v) => write!(f, "express:{}", v),
            UrlPattern::Regex(v) => write!(f, "/{}/", v),
        }
    }
}

/// Translates a glob into an anchored regular expression: `*` matches any run of characters,
/// `?` exactly one character.
pub(crate) fn glob_to_regex(glob: &str) -> Result<Regex, Error> {
    let mut source = String::with_capacity(glob.len() + 8);
    source.push('^');

    let mut literal = String::new();
    for c in glob.chars() {
        match c {
            '*' | '?' => {
                source.push_str(&regex::escape(&literal));
                literal.clear();
                source.push_str(if c == '*' { ".*" } else { "." });
            }
            _ => literal.push(c),
        }
    }

    source.push_str(&regex::escape(&literal));
    source.push('$');

    Ok(Regex::new(&source)?)
}

fn compile_template(template: &str) -> Result<PathTree<()>, Error> {
    if !template.starts_with('/') {
        return Err(Error::InvalidPathTemplate(template.to_string()));
    }

    let mut tree = PathTree::new();
    let _ = tree.insert(template, ());
    Ok(tree)
}

// ************************************************************************************************
// UrlMatcher
// ************************************************************************************************
enum Strategy {
    Any,
    Exact { url: String, ignore_query: bool },
    Begin(String),
    End(String),
    Path(String),
    Regex(Regex),
    Express(PathTree<()>),
}

pub(crate) struct UrlMatcher {
    pattern: UrlPattern,
    strategy: Strategy,
}

impl UrlMatcher {
    /// `has_query_matcher` tells whether the route matches the query string separately, in which
    /// case an exact URL without query string ignores the query of the call.
    pub fn compile(
        pattern: &UrlPattern,
        has_query_matcher: bool,
        config: &MockConfig,
    ) -> Result<Self, Error> {
        let strategy = match pattern {
            UrlPattern::Any => Strategy::Any,
            UrlPattern::Exact(url) => Strategy::Exact {
                url: normalize_url(url, config.base_url.as_deref())
                    .map_err(|e| Error::InvalidUrl(e.to_string()))?,
                ignore_query: has_query_matcher && !url.contains('?'),
            },
            UrlPattern::Begin(prefix) => Strategy::Begin(prefix.clone()),
            UrlPattern::End(suffix) => Strategy::End(suffix.clone()),
            UrlPattern::Path(path) => Strategy::Path(path.clone()),
            UrlPattern::Glob(glob) => Strategy::Regex(glob_to_regex(glob)?),
            UrlPattern::Regex(source) => Strategy::Regex(Regex::new(source)?),
            UrlPattern::Express(template) => Strategy::Express(compile_template(template)?),
        };

        Ok(Self {
            pattern: pattern.clone(),
            strategy,
        })
    }
}

impl Matcher for UrlMatcher {
    fn matches(&self, req: &NormalizedRequest) -> bool {
        match &self.strategy {
            Strategy::Any => true,
            Strategy::Exact { url, ignore_query } => match ignore_query {
                true => req.url_without_query() == url,
                false => req.url() == url,
            },
            Strategy::Begin(prefix) => req.url().starts_with(prefix.as_str()),
            Strategy::End(suffix) => req.url().ends_with(suffix.as_str()),
            Strategy::Path(path) => req.path() == *path,
            Strategy::Regex(re) => re.is_match(req.url()),
            Strategy::Express(tree) => tree.find(&req.path()).is_some(),
        }
    }

    fn mismatches(&self, req: &NormalizedRequest) -> Vec<Mismatch> {
        match self.matches(req) {
            true => Vec::new(),
            false => vec![Mismatch {
                entity: self.name().to_string(),
                expected: self.pattern.to_string(),
                actual: req.url().to_string(),
                diff: None,
            }],
        }
    }

    fn name(&self) -> &'static str {
        "url"
    }
}

// ************************************************************************************************
// ParamsMatcher
// ************************************************************************************************
/// Matches the named segments captured by an `express:` path template.
pub(crate) struct ParamsMatcher {
    tree: PathTree<()>,
    expected: Vec<(String, String)>,
}

impl ParamsMatcher {
    pub fn compile(template: &str, expected: &[(String, String)]) -> Result<Self, Error> {
        Ok(Self {
            tree: compile_template(template)?,
            expected: expected.to_vec(),
        })
    }

    fn find_unmatched(&self, req: &NormalizedRequest) -> Vec<&(String, String)> {
        let path = req.path();
        let captured: Vec<(String, String)> = match self.tree.find(&path) {
            Some((_, matched)) => matched
                .params()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            None => return self.expected.iter().collect(),
        };

        self.expected
            .iter()
            .filter(|(name, value)| !captured.iter().any(|(k, v)| k == name && v == value))
            .collect()
    }
}

impl Matcher for ParamsMatcher {
    fn matches(&self, req: &NormalizedRequest) -> bool {
        self.find_unmatched(req).is_empty()
    }

    fn mismatches(&self, req: &NormalizedRequest) -> Vec<Mismatch> {
        self.find_unmatched(req)
            .into_iter()
            .map(|(name, value)| Mismatch {
                entity: self.name().to_string(),
                expected: format!("{}={}", name, value),
                actual: req.path(),
                diff: None,
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "params"
    }
}
