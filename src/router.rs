//! Route table.
//!
//! Patterns are parsed once, at registration, into a list of segment
//! descriptors. Matching walks the registered routes for the request method in
//! registration order and returns the first that fits: **the first registered
//! route wins** when two patterns overlap.
//!
//! | Pattern        | Matches                              | Binds                       |
//! |----------------|--------------------------------------|-----------------------------|
//! | `/`            | `/`                                  | —                           |
//! | `/health`      | `/health`                            | —                           |
//! | `/data/:city`  | `/data/Paris`                        | `city = "Paris"`            |
//! | `/assets/*`    | `/assets`, `/assets/css/site.css`    | `* = ""`, `* = "css/site.css"` |
//!
//! The raw path is split on `/` first and each segment is then percent-decoded
//! on its own, so an encoded `%2F` stays inside its segment. A segment that
//! does not decode to UTF-8 matches nothing. Matching is case-sensitive.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use percent_encoding::percent_decode_str;

use crate::error::ConfigError;
use crate::handler::BoxedHandler;
use crate::method::Method;

/// Key the trailing wildcard's capture is stored under.
pub const WILDCARD: &str = "*";

// ── Params ────────────────────────────────────────────────────────────────────

/// Path parameters bound by a match, in pattern order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params(Vec<(Arc<str>, String)>);

impl Params {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| &**k == name).map(|(_, v)| v.as_str())
    }

    /// The remainder captured by a trailing wildcard.
    pub fn wildcard(&self) -> Option<&str> {
        self.get(WILDCARD)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (&**k, v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        f.write_str("}")
    }
}

// ── Pattern ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
enum Segment {
    Literal(Box<str>),
    Param(Arc<str>),
    Wildcard,
}

impl Segment {
    /// Param names don't change what a pattern matches.
    fn same_shape(&self, other: &Segment) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Param(_), Self::Param(_)) | (Self::Wildcard, Self::Wildcard) => true,
            _ => false,
        }
    }
}

/// A parsed route pattern.
#[derive(Clone, Debug)]
pub(crate) struct Pattern {
    raw: Arc<str>,
    segments: Box<[Segment]>,
}

impl Pattern {
    pub(crate) fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason| ConfigError::InvalidPattern { pattern: raw.to_owned(), reason };

        let Some(rest) = raw.strip_prefix('/') else {
            return Err(invalid("must start with `/`"));
        };

        let mut segments = Vec::new();
        if !rest.is_empty() {
            for part in rest.split('/') {
                if matches!(segments.last(), Some(Segment::Wildcard)) {
                    return Err(invalid("wildcard must be the last segment"));
                }
                let segment = match part {
                    "" => return Err(invalid("empty segment")),
                    "*" => Segment::Wildcard,
                    _ => match part.strip_prefix(':') {
                        Some(name) => {
                            if !is_param_name_valid(name) {
                                return Err(invalid("invalid parameter name"));
                            }
                            let duplicate = segments
                                .iter()
                                .any(|s| matches!(s, Segment::Param(n) if &**n == name));
                            if duplicate {
                                return Err(invalid("duplicate parameter name"));
                            }
                            Segment::Param(name.into())
                        }
                        None if part.contains('*') => {
                            return Err(invalid("`*` is only allowed as a whole segment"));
                        }
                        None => Segment::Literal(part.into()),
                    },
                };
                segments.push(segment);
            }
        }

        Ok(Self { raw: raw.into(), segments: segments.into_boxed_slice() })
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.raw
    }

    fn same_shape(&self, other: &Pattern) -> bool {
        self.segments.len() == other.segments.len()
            && self.segments.iter().zip(other.segments.iter()).all(|(a, b)| a.same_shape(b))
    }

    /// Matches a raw, still percent-encoded path.
    fn capture(&self, path: &str) -> Option<Params> {
        // `None` means no segments are left; `/` itself has none.
        let mut rest = Some(path.strip_prefix('/')?).filter(|r| !r.is_empty());
        let mut params = Vec::new();

        for segment in self.segments.iter() {
            if let Segment::Wildcard = segment {
                let remainder = decode(rest.unwrap_or(""))?;
                params.push((Arc::from(WILDCARD), remainder.into_owned()));
                return Some(Params(params));
            }

            let current = rest?;
            let (raw, tail) = match current.split_once('/') {
                Some((raw, tail)) => (raw, Some(tail)),
                None => (current, None),
            };
            rest = tail;
            let value = decode(raw)?;

            match segment {
                Segment::Literal(lit) if **lit == *value => {}
                Segment::Param(name) if !value.is_empty() => {
                    params.push((Arc::clone(name), value.into_owned()));
                }
                _ => return None,
            }
        }

        match rest {
            None => Some(Params(params)),
            Some(_) => None,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn is_param_name_valid(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

// ── RouteTable ────────────────────────────────────────────────────────────────

struct Route {
    pattern: Pattern,
    handler: BoxedHandler,
}

/// Outcome of [`RouteTable::lookup`].
pub(crate) enum RouteLookup {
    Matched {
        handler: BoxedHandler,
        pattern: Arc<str>,
        params: Params,
    },
    /// The path is routed, just not for this method.
    MethodNotAllowed { allowed: Vec<Method> },
    NotFound,
}

/// (method, pattern) → handler bindings. Immutable once the app is built.
#[derive(Default)]
pub(crate) struct RouteTable {
    routes: HashMap<Method, Vec<Route>>,
}

impl RouteTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(
        &mut self,
        method: Method,
        pattern: &str,
        handler: BoxedHandler,
    ) -> Result<(), ConfigError> {
        let pattern = Pattern::parse(pattern)?;
        let routes = self.routes.entry(method).or_default();
        if routes.iter().any(|r| r.pattern.same_shape(&pattern)) {
            return Err(ConfigError::DuplicateRoute {
                method,
                pattern: pattern.as_str().to_owned(),
            });
        }
        routes.push(Route { pattern, handler });
        Ok(())
    }

    /// Resolves `method` + raw (still percent-encoded) `path`.
    ///
    /// `method` is `None` for verbs no route can be registered under.
    pub(crate) fn lookup(&self, method: Option<Method>, path: &str) -> RouteLookup {
        let matched = method
            .and_then(|m| self.routes.get(&m))
            .and_then(|routes| {
                routes.iter().find_map(|r| r.pattern.capture(path).map(|params| (r, params)))
            });
        if let Some((route, params)) = matched {
            return RouteLookup::Matched {
                handler: Arc::clone(&route.handler),
                pattern: Arc::clone(&route.pattern.raw),
                params,
            };
        }

        let mut allowed: Vec<Method> = self
            .routes
            .iter()
            .filter(|(m, routes)| {
                Some(**m) != method && routes.iter().any(|r| r.pattern.capture(path).is_some())
            })
            .map(|(m, _)| *m)
            .collect();
        if allowed.is_empty() {
            return RouteLookup::NotFound;
        }
        allowed.sort();
        RouteLookup::MethodNotAllowed { allowed }
    }

    pub(crate) fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }
}

/// `None` when the decoded bytes are not UTF-8.
fn decode(raw: &str) -> Option<Cow<'_, str>> {
    percent_decode_str(raw).decode_utf8().ok()
}
