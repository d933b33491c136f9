//! The routing table.
//!
//! A [`Route`] pairs a regular expression with the [`RequestHandler`] that
//! serves the paths it matches. Patterns are anchored at both ends: a `$` is
//! appended when missing and matching always starts at the beginning of the
//! path. Routes are tried in declaration order and the first match wins.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use thiserror::Error;

use crate::handler::RequestHandler;

#[derive(Debug, Error)]
#[error("invalid route pattern {pattern:?}: {source}")]
pub struct RouteError {
    pattern: String,
    #[source]
    source: regex::Error,
}

pub struct Route {
    pattern: String,
    regex: Regex,
    handler: Arc<dyn RequestHandler>,
    name: Option<String>,
    suppress_logging: bool,
}

impl Route {
    pub fn new<H: RequestHandler + 'static>(pattern: impl Into<String>, handler: H) -> Result<Self, RouteError> {
        Self::with_handler(pattern, Arc::new(handler))
    }

    /// Like [`Route::new`] for a handler that is already shared.
    pub fn with_handler(pattern: impl Into<String>, handler: Arc<dyn RequestHandler>) -> Result<Self, RouteError> {
        let mut pattern = pattern.into();
        if !pattern.ends_with('$') {
            pattern.push('$');
        }

        let regex = match Regex::new(&format!("^(?:{pattern})")) {
            Ok(regex) => regex,
            Err(source) => return Err(RouteError { pattern, source }),
        };

        Ok(Self { pattern, regex, handler, name: None, suppress_logging: false })
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Skips the access log for requests served by this route.
    #[must_use]
    pub fn suppress_logging(mut self, suppress: bool) -> Self {
        self.suppress_logging = suppress;
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn route_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_logging_suppressed(&self) -> bool {
        self.suppress_logging
    }

    pub fn handler(&self) -> &dyn RequestHandler {
        self.handler.as_ref()
    }

    /// Matches `path`, capturing unnamed groups as positional arguments and
    /// named groups as keyword arguments. Unnamed groups that did not take
    /// part in the match capture an empty string; named ones are left out.
    pub fn matches<'r>(&'r self, path: &str) -> Option<RouteMatch<'r>> {
        let captures = self.regex.captures(path)?;

        let mut args = Vec::new();
        let mut kwargs = HashMap::new();
        for (index, name) in self.regex.capture_names().enumerate().skip(1) {
            let value = captures.get(index).map(|m| m.as_str().to_string());
            match name {
                Some(name) => {
                    if let Some(value) = value {
                        kwargs.insert(name.to_string(), value);
                    }
                }
                None => args.push(value.unwrap_or_default()),
            }
        }

        Some(RouteMatch { route: self, args, kwargs })
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .field("name", &self.name)
            .field("suppress_logging", &self.suppress_logging)
            .finish_non_exhaustive()
    }
}

/// A route that matched a path, with what its groups captured.
#[derive(Debug)]
pub struct RouteMatch<'r> {
    pub route: &'r Route,
    pub args: Vec<String>,
    pub kwargs: HashMap<String, String>,
}

/// The first route in `routes` matching `path`.
pub(crate) fn match_routes<'r>(routes: &'r [Route], path: &str) -> Option<RouteMatch<'r>> {
    routes.iter().find_map(|route| route.matches(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::DefaultHandler;

    fn route(pattern: &str) -> Route {
        Route::new(pattern, DefaultHandler).unwrap()
    }

    #[test]
    fn patterns_are_anchored() {
        let users = route("/users");
        assert_eq!(users.pattern(), "/users$");
        assert!(users.matches("/users").is_some());
        assert!(users.matches("/users/1").is_none());
        assert!(users.matches("/api/users").is_none());

        assert_eq!(route("/exact$").pattern(), "/exact$");
    }

    #[test]
    fn alternation_stays_anchored() {
        let either = route("/a|/b");
        assert!(either.matches("/a").is_some());
        assert!(either.matches("/b").is_some());
        assert!(either.matches("/a/b").is_none());
        assert!(either.matches("/xb").is_none());
    }

    #[test]
    fn captures_args_and_kwargs() {
        let item = route(r"/(\w+)/(?P<id>\d+)(?:/(\w+))?");
        let matched = item.matches("/users/42").unwrap();
        assert_eq!(matched.args, ["users", ""]);
        assert_eq!(matched.kwargs.get("id").map(String::as_str), Some("42"));

        let matched = item.matches("/users/42/edit").unwrap();
        assert_eq!(matched.args, ["users", "edit"]);
    }

    #[test]
    fn first_declared_route_wins() {
        let routes = vec![route("/items/new").name("new"), route(r"/items/(\w+)").name("item"), route("/.*").name("default")];

        assert_eq!(match_routes(&routes, "/items/new").unwrap().route.route_name(), Some("new"));
        let matched = match_routes(&routes, "/items/7").unwrap();
        assert_eq!(matched.route.route_name(), Some("item"));
        assert_eq!(matched.args, ["7"]);
        assert_eq!(match_routes(&routes, "/elsewhere").unwrap().route.route_name(), Some("default"));
        assert!(match_routes(&routes, "*").is_none());
    }

    #[test]
    fn invalid_pattern() {
        let error = Route::new("/(unclosed", DefaultHandler).unwrap_err();
        assert!(error.to_string().contains("/(unclosed$"));
    }

    #[test]
    fn debug_shows_pattern_and_name() {
        let debug = format!("{:?}", route("/health").name("health").suppress_logging(true));
        assert!(debug.contains("\"/health$\""));
        assert!(debug.contains("Some(\"health\")"));
    }
}
