//! Incoming HTTP request type.

use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Uri};

use crate::router::Params;

/// An incoming HTTP request with its body fully read.
#[derive(Debug)]
pub struct Request {
    pub(crate) method: http::Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: Params,
    pub(crate) remote_addr: Option<SocketAddr>,
}

impl Request {
    pub fn method(&self) -> &http::Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup. Values that are not visible ASCII are
    /// treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/data/:city`, `req.param("city")` on `/data/Paris` returns `Some("Paris")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key)
    }

    /// The part of the path captured by a trailing `*`.
    ///
    /// For a route `/assets/*`, `/assets/css/site.css` yields `Some("css/site.css")`.
    pub fn wildcard(&self) -> Option<&str> {
        self.params.wildcard()
    }

    pub fn params(&self) -> &Params { &self.params }

    /// Peer address of the connection, when served over a socket.
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    pub(crate) fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub(crate) fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params: Params::default(),
            remote_addr: None,
        }
    }
}
