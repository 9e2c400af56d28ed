//! Request routing.
//!
//! Routes are tried in registration order and the first route whose method
//! and pattern both match wins. Patterns are `/`-separated; `:name` binds a
//! parameter and `*` matches whatever remains of the path.
//!
//! Matching stops at the first `*`. A pattern such as `/files/*/meta` is
//! accepted, but `meta` is never compared: it behaves exactly like
//! `/files/*`.

use std::sync::Arc;

use thiserror::Error;

use crate::http::middleware::{BoxHandler, HandlerResult};
use crate::http::query::split_target;
use crate::http::request::{Method, Request};
use crate::http::server_request::ServerRequest;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern {pattern:?} binds parameter {name:?} twice")]
    DuplicateParam { pattern: String, name: String },
    #[error("pattern {0:?} has an unnamed parameter")]
    EmptyParam(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let mut segments = Vec::new();
        for seg in raw.split('/').filter(|s| !s.is_empty()) {
            let segment = if seg == "*" {
                Segment::Wildcard
            } else if let Some(name) = seg.strip_prefix(':') {
                if name.is_empty() {
                    return Err(PatternError::EmptyParam(raw.to_string()));
                }
                let taken = segments
                    .iter()
                    .any(|s| matches!(s, Segment::Param(n) if n == name));
                if taken {
                    return Err(PatternError::DuplicateParam {
                        pattern: raw.to_string(),
                        name: name.to_string(),
                    });
                }
                Segment::Param(name.to_string())
            } else {
                Segment::Literal(seg.to_string())
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Matches a request path, returning the bound parameters.
    ///
    /// Any query string is ignored.
    pub fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        let (path, _) = split_target(path);
        let mut actual = path.split('/').filter(|s| !s.is_empty());
        let mut params = Vec::new();

        for segment in &self.segments {
            match segment {
                Segment::Wildcard => return Some(params),
                Segment::Literal(lit) => {
                    if actual.next()? != lit {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = actual.next()?;
                    params.push((name.clone(), value.to_string()));
                }
            }
        }

        match actual.next() {
            Some(_) => None,
            None => Some(params),
        }
    }
}

pub struct Route {
    pub method: Method,
    pub pattern: Pattern,
    pub handler: BoxHandler,
}

/// Ordered route table. Read-only once the server starts.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<H>(&mut self, method: Method, pattern: &str, handler: H) -> Result<(), PatternError>
    where
        H: Fn(&ServerRequest) -> HandlerResult + Send + Sync + 'static,
    {
        self.add_boxed(method, pattern, Arc::new(handler))
    }

    pub fn add_boxed(
        &mut self,
        method: Method,
        pattern: &str,
        handler: BoxHandler,
    ) -> Result<(), PatternError> {
        let pattern = Pattern::parse(pattern)?;
        tracing::debug!(method = %method, pattern = pattern.as_str(), "Route registered");
        self.routes.push(Route {
            method,
            pattern,
            handler,
        });
        Ok(())
    }

    /// First route whose method and pattern match, with its parameters.
    pub fn find_route(&self, request: &Request) -> Option<(&Route, Vec<(String, String)>)> {
        self.routes
            .iter()
            .filter(|route| route.method == request.method)
            .find_map(|route| route.pattern.matches(&request.path).map(|p| (route, p)))
    }

    /// Every method with a route whose pattern matches `path`.
    ///
    /// An empty result means no route knows the path at all (404); otherwise
    /// the request only used the wrong method (405).
    pub fn find_methods_for_path(&self, path: &str) -> Vec<Method> {
        let mut methods = Vec::new();
        for route in &self.routes {
            if !methods.contains(&route.method) && route.pattern.matches(path).is_some() {
                methods.push(route.method);
            }
        }
        methods
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_segments() {
        let pattern = Pattern::parse("/users/:id/posts").unwrap();
        assert_eq!(
            pattern.segments(),
            &[
                Segment::Literal("users".into()),
                Segment::Param("id".into()),
                Segment::Literal("posts".into()),
            ]
        );
    }

    #[test]
    fn rejects_duplicate_param_names() {
        assert!(matches!(
            Pattern::parse("/a/:id/b/:id"),
            Err(PatternError::DuplicateParam { .. })
        ));
    }

    #[test]
    fn query_string_is_ignored() {
        let pattern = Pattern::parse("/users/:id").unwrap();
        let params = pattern.matches("/users/42?full=true").unwrap();
        assert_eq!(params, vec![("id".to_string(), "42".to_string())]);
    }

    #[test]
    fn segment_count_must_agree_without_wildcard() {
        let pattern = Pattern::parse("/users/:id").unwrap();
        assert!(pattern.matches("/users").is_none());
        assert!(pattern.matches("/users/1/extra").is_none());
    }

    #[test]
    fn wildcard_matches_empty_and_long_suffixes() {
        let pattern = Pattern::parse("/static/*").unwrap();
        assert!(pattern.matches("/static").is_some());
        assert!(pattern.matches("/static/css/site.css").is_some());
        assert!(pattern.matches("/other").is_none());
    }

    #[test]
    fn segments_after_wildcard_are_never_compared() {
        let pattern = Pattern::parse("/files/*/meta").unwrap();
        assert!(pattern.matches("/files/a/b/c").is_some());
        assert!(pattern.matches("/files").is_some());
    }

    #[test]
    fn root_pattern_matches_only_root() {
        let pattern = Pattern::parse("/").unwrap();
        assert!(pattern.matches("/").is_some());
        assert!(pattern.matches("/x").is_none());
    }
}
