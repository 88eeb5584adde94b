//! Outgoing HTTP response type, the [`IntoResponse`] conversion trait, and the
//! per-request [`ResponseSink`].
//!
//! A handler builds a [`Response`] and writes it into the sink it was given.
//! The sink accepts exactly one response. If the handler returns an error
//! instead, the [`Errors`](crate::middleware::Errors) layer writes the error
//! response into the same sink, so a request can never be answered twice.

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;

use crate::error::Error;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
pub enum ContentType {
    Css,          // text/css
    Html,         // text/html; charset=utf-8
    JavaScript,   // text/javascript
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Png,          // image/png
    Svg,          // image/svg+xml
    Text,         // text/plain; charset=utf-8
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Css         => "text/css",
            Self::Html        => "text/html; charset=utf-8",
            Self::JavaScript  => "text/javascript",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Png         => "image/png",
            Self::Svg         => "image/svg+xml",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }

    /// Guesses the content type from a file extension. Unknown extensions are
    /// served as `application/octet-stream`.
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "css"         => Self::Css,
            "html" | "htm" => Self::Html,
            "js" | "mjs"  => Self::JavaScript,
            "json"        => Self::Json,
            "png"         => Self::Png,
            "svg"         => Self::Svg,
            "txt"         => Self::Text,
            _             => Self::OctetStream,
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use kiln::{ContentType, Response, StatusCode};
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .bytes(ContentType::Json, br#"{"id":42}"#.to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) body: Bytes,
    pub(crate) headers: HeaderMap,
    pub(crate) status: StatusCode,
}

impl Response {
    /// `200 OK` — `application/json`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().bytes(ContentType::Json, body)
    }

    /// `200 OK` — `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// `200 OK` — `text/html; charset=utf-8`.
    pub fn html(body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::builder().bytes(ContentType::Html, body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { body: Bytes::new(), headers: HeaderMap::new(), status: code }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method — you always know what you're sending.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Appends a header. Names or values that are not valid HTTP are dropped
    /// with a warning rather than failing the response.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::warn!(header = name, "dropping invalid response header"),
        }
        self
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        let body: String = body.into();
        self.bytes(ContentType::Text, body)
    }

    /// Terminate with a typed body.
    pub fn bytes(self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        let mut headers = self.headers;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
        Response { body: body.into(), headers, status: self.status }
    }

    /// Terminate with no body (e.g. `204 No Content`, redirects).
    pub fn no_body(self) -> Response {
        Response { body: Bytes::new(), headers: self.headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to write them straight into a [`ResponseSink`].
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

// ── ResponseSink ──────────────────────────────────────────────────────────────

/// The slot a request's single response is written into.
///
/// Cloning the sink yields another handle to the same slot; middleware keep a
/// clone to inspect what the handler wrote after it returns.
#[derive(Clone, Default)]
pub struct ResponseSink {
    slot: Arc<Mutex<Slot>>,
}

#[derive(Default)]
enum Slot {
    #[default]
    Empty,
    Written(Response),
    Taken(StatusCode),
}

impl ResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the response for this request.
    ///
    /// Fails with [`Error::Internal`] if a response was already written. The
    /// first response is kept.
    pub fn write(&self, response: impl IntoResponse) -> Result<(), Error> {
        let mut slot = self.lock();
        if !matches!(*slot, Slot::Empty) {
            return Err(Error::internal("response already written"));
        }
        *slot = Slot::Written(response.into_response());
        Ok(())
    }

    pub fn is_written(&self) -> bool {
        !matches!(*self.lock(), Slot::Empty)
    }

    /// Status of the written response, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match &*self.lock() {
            Slot::Empty => None,
            Slot::Written(res) => Some(res.status),
            Slot::Taken(status) => Some(*status),
        }
    }

    /// Removes the response for flushing. Later writes still fail.
    pub(crate) fn take(&self) -> Option<Response> {
        let mut slot = self.lock();
        match std::mem::take(&mut *slot) {
            Slot::Written(res) => {
                *slot = Slot::Taken(res.status);
                Some(res)
            }
            other => {
                *slot = other;
                None
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // A poisoned slot still holds a consistent value: every update is a
        // single assignment.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_accepts_exactly_one_write() {
        let sink = ResponseSink::new();
        assert!(!sink.is_written());

        sink.write(Response::text("first")).unwrap();
        let err = sink.write(StatusCode::INTERNAL_SERVER_ERROR).unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));

        let res = sink.take().unwrap();
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"first");
    }

    #[test]
    fn sink_remembers_status_after_take() {
        let sink = ResponseSink::new();
        let observer = sink.clone();
        sink.write(StatusCode::CREATED).unwrap();
        assert!(sink.take().is_some());
        assert!(sink.take().is_none());
        assert_eq!(observer.status(), Some(StatusCode::CREATED));
        assert!(observer.write("late").is_err());
    }

    #[test]
    fn builder_sets_headers_and_content_type() {
        let res = Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/users/42")
            .header("bad header", "x")
            .bytes(ContentType::Json, "{}");
        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.headers()["location"], "/users/42");
        assert_eq!(res.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(res.headers().len(), 2);
    }

    #[test]
    fn content_type_from_extension() {
        assert_eq!(ContentType::from_extension("css").as_str(), "text/css");
        assert_eq!(ContentType::from_extension("bin").as_str(), "application/octet-stream");
    }
}
