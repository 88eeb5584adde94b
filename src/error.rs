//! Error types.
//!
//! Handlers never build error responses themselves. They return an [`Error`]
//! and the [`Errors`](crate::middleware::Errors) layer decides what the client
//! sees. [`ConfigError`] covers mistakes made while wiring the application,
//! [`ServeError`] covers the listener.

use std::fmt;

use http::StatusCode;

use crate::method::Method;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used by handlers and middleware.
pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// The error a handler (or any middleware) returns.
///
/// Only [`Error::Validation`] carries text that reaches the client. Every
/// other message stays in the logs.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The client sent something we refuse to process (400).
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The requested resource does not exist (404).
    #[error("not found")]
    NotFound,

    /// The path exists, but not for this method (405).
    #[error("method not allowed")]
    MethodNotAllowed { allowed: Vec<Method> },

    /// Anything the server got wrong (500).
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A handler panicked. Produced by the [`Panics`](crate::middleware::Panics) layer.
    #[error("handler panicked: {message}")]
    Panic {
        message: String,
        trace: PanicTrace,
    },

    /// The client went away or the request deadline elapsed.
    #[error("request cancelled")]
    Cancelled,

    /// The process can no longer serve requests and must shut down (500).
    #[error("shutdown requested: {reason}")]
    Shutdown { reason: String },
}

impl Error {
    /// Client-caused failure. `message` is sent back verbatim.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), source: None }
    }

    /// Like [`Error::validation`], keeping the underlying cause for the logs only.
    pub fn validation_with(
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Validation { message: message.into(), source: Some(source.into()) }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    pub fn internal_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Internal { message: message.into(), source: Some(source.into()) }
    }

    /// Fatal for the whole process: the request gets a 500 and the server
    /// begins a graceful shutdown.
    pub fn shutdown(reason: impl Into<String>) -> Self {
        Self::Shutdown { reason: reason.into() }
    }

    /// The status this error is answered with.
    ///
    /// [`Error::Cancelled`] maps to 499 (client closed request) for metrics and
    /// logs only. No response is ever written for it.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::Cancelled => client_closed_request(),
            Self::Internal { .. } | Self::Panic { .. } | Self::Shutdown { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown { .. })
    }
}

fn client_closed_request() -> StatusCode {
    // 499 is nginx's convention; always a valid code.
    StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST)
}

/// Where a recovered handler panic happened.
///
/// Recorded by a panic hook while the panicking frame is still on the stack.
/// Both parts are `None` if another hook replaced kiln's.
pub struct PanicTrace {
    location: Option<String>,
    backtrace: Option<backtrace::Backtrace>,
}

impl PanicTrace {
    pub(crate) fn new(location: Option<String>, backtrace: Option<backtrace::Backtrace>) -> Self {
        Self { location, backtrace }
    }

    /// `file:line:column` of the `panic!`.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn backtrace(&self) -> Option<&backtrace::Backtrace> {
        self.backtrace.as_ref()
    }
}

impl fmt::Debug for PanicTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => writeln!(f, "panicked at {location}")?,
            None => writeln!(f, "panicked at an unknown location")?,
        }
        match &self.backtrace {
            Some(backtrace) => fmt::Debug::fmt(backtrace, f),
            None => f.write_str("<no backtrace>"),
        }
    }
}

/// Mistakes in how the application is put together: bad route patterns,
/// duplicate routes, unreadable configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },

    #[error("route `{method} {pattern}` is already registered")]
    DuplicateRoute { method: Method, pattern: String },

    #[error("invalid socket address `{0}`")]
    InvalidAddr(String),

    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Infrastructure failures: binding the listener.
#[derive(Debug, thiserror::Error)]
#[error("io: {0}")]
pub struct ServeError(#[from] std::io::Error);
