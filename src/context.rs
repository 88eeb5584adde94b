//! Per-request context.
//!
//! A [`Context`] is created by the dispatcher for every request and handed to
//! each middleware layer and finally the handler. Clones are cheap and all
//! refer to the same request.
//!
//! The cancellation token is the only way a request is ever stopped: it fires
//! when the client disconnects, when the request deadline elapses, or when the
//! server gives up draining during shutdown. Nothing is preempted, so long
//! running handlers should poll [`Context::check`] or race
//! [`Context::cancelled`] against their work.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

use crate::error::Error;
use crate::router::Params;

/// Short-lived state for one request.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    trace_id: Uuid,
    method: http::Method,
    path: String,
    route: Option<Arc<str>>,
    params: Params,
    started: Instant,
    deadline: Option<Instant>,
    cancel: CancellationToken,
    values: HashMap<String, String>,
}

impl Context {
    pub(crate) fn builder(method: http::Method, path: impl Into<String>) -> ContextBuilder {
        ContextBuilder {
            method,
            path: path.into(),
            route: None,
            params: Params::default(),
            deadline: None,
            cancel: CancellationToken::new(),
            values: HashMap::new(),
        }
    }

    /// Unique id for correlating this request's log lines.
    pub fn trace_id(&self) -> Uuid { self.inner.trace_id }
    pub fn method(&self) -> &http::Method { &self.inner.method }
    pub fn path(&self) -> &str { &self.inner.path }

    /// The pattern the request matched, e.g. `/data/:city`. `None` when no
    /// route matched.
    pub fn route(&self) -> Option<&str> { self.inner.route.as_deref() }
    pub fn params(&self) -> &Params { &self.inner.params }
    pub fn started(&self) -> Instant { self.inner.started }
    pub fn elapsed(&self) -> Duration { self.inner.started.elapsed() }
    pub fn deadline(&self) -> Option<Instant> { self.inner.deadline }

    /// A value attached to the request at dispatch time. `trace_id` is always present.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.inner.values.get(key).map(String::as_str)
    }

    pub fn cancellation_token(&self) -> &CancellationToken { &self.inner.cancel }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
            || self.inner.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the request is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.cancel.cancelled()
    }

    /// `Err(Error::Cancelled)` once the request has been cancelled.
    ///
    /// ```rust,no_run
    /// # use kiln::{Context, Error, Request, ResponseSink};
    /// # async fn step(_: usize) {}
    /// async fn report(ctx: Context, sink: ResponseSink, _req: Request) -> Result<(), Error> {
    ///     for chunk in 0..100 {
    ///         ctx.check()?;
    ///         step(chunk).await;
    ///     }
    ///     sink.write("done")
    /// }
    /// ```
    pub fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() { Err(Error::Cancelled) } else { Ok(()) }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("trace_id", &self.inner.trace_id)
            .field("method", &self.inner.method)
            .field("path", &self.inner.path)
            .field("route", &self.inner.route)
            .field("params", &self.inner.params)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

pub(crate) struct ContextBuilder {
    method: http::Method,
    path: String,
    route: Option<Arc<str>>,
    params: Params,
    deadline: Option<Instant>,
    cancel: CancellationToken,
    values: HashMap<String, String>,
}

impl ContextBuilder {
    pub(crate) fn route(mut self, route: Arc<str>, params: Params) -> Self {
        self.route = Some(route);
        self.params = params;
        self
    }

    pub(crate) fn deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub(crate) fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub(crate) fn value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub(crate) fn build(self) -> Context {
        let trace_id = Uuid::new_v4();
        let mut values = self.values;
        values.insert("trace_id".to_owned(), trace_id.to_string());
        Context {
            inner: Arc::new(Inner {
                trace_id,
                method: self.method,
                path: self.path,
                route: self.route,
                params: self.params,
                started: Instant::now(),
                deadline: self.deadline,
                cancel: self.cancel,
                values,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_token_cancellation() {
        let token = CancellationToken::new();
        let ctx = Context::builder(http::Method::GET, "/slow").cancel(token.clone()).build();

        assert!(ctx.check().is_ok());
        token.cancel();
        ctx.cancelled().await;
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check(), Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn elapsed_deadline_counts_as_cancelled() {
        let ctx = Context::builder(http::Method::GET, "/slow")
            .deadline(Some(Instant::now()))
            .build();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn carries_trace_id_value() {
        let ctx = Context::builder(http::Method::GET, "/").value("remote", "10.0.0.1").build();
        assert_eq!(ctx.value("trace_id"), Some(ctx.trace_id().to_string().as_str()));
        assert_eq!(ctx.value("remote"), Some("10.0.0.1"));
        assert_eq!(ctx.route(), None);
    }
}
