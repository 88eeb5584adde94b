//! Middleware layer.
//!
//! A [`Middleware`] turns one handler into another with the same signature.
//! A [`Chain`] is an ordered list of them: the **first** middleware in the
//! list is the **outermost** layer, first to see the request and last to see
//! the result.
//!
//! Every route of an [`App`](crate::App) built with [`Chain::standard`] runs
//! through the layers named in [`STANDARD_ORDER`]:
//!
//! ```text
//! Logger → Errors → Metrics → Panics → handler
//! ```
//!
//! - **Panics** is innermost so that nothing between it and the handler can
//!   unwind past it. A panic leaves it as an ordinary [`Error::Panic`].
//! - **Metrics** sits inside **Errors** and sees the error value before it is
//!   turned into a response, which is enough to know the outcome class.
//! - **Errors** is the only place an error becomes a response, panics
//!   included.
//! - **Logger** is outermost, so its timer covers the whole chain and it sees
//!   the response **Errors** wrote.

mod errors;
mod logger;
mod metrics;
mod panics;

use std::sync::Arc;

use http::StatusCode;

use crate::error::Error;
use crate::handler::BoxedHandler;
use crate::response::ResponseSink;
use crate::shutdown::ShutdownHandle;

pub use self::errors::Errors;
pub use self::logger::Logger;
pub use self::metrics::{Metrics, MetricsSnapshot};
pub use self::panics::Panics;

pub(crate) use self::panics::{catch, install_hook};

/// Layer order of [`Chain::standard`], outermost first.
pub const STANDARD_ORDER: [&str; 4] = [Logger::NAME, Errors::NAME, Metrics::NAME, Panics::NAME];

/// Wraps a handler into another handler.
///
/// Implementations are built once at startup and shared by every request, so
/// anything they hold must be safe to use concurrently.
pub trait Middleware: Send + Sync + 'static {
    /// Short name used in logs and by [`Chain::names`].
    fn name(&self) -> &'static str;

    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

/// An ordered middleware list, outermost first.
#[derive(Clone, Default)]
pub struct Chain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four layers of [`STANDARD_ORDER`], in that order.
    pub fn standard(shutdown: ShutdownHandle, metrics: Metrics) -> Self {
        Self::new()
            .with(Logger)
            .with(Errors::new(shutdown))
            .with(metrics)
            .with(Panics)
    }

    /// Appends `middleware` as the new innermost layer.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|m| m.name()).collect()
    }

    /// Wraps `handler` in every layer, innermost first, so the first layer
    /// ends up outermost.
    pub fn compose(&self, handler: BoxedHandler) -> BoxedHandler {
        self.layers.iter().rev().fold(handler, |next, layer| layer.wrap(next))
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// The status a request ended with, as far as a layer can tell: what was
/// written if anything, otherwise what the error will be answered with.
pub(crate) fn outcome_status(result: &Result<(), Error>, sink: &ResponseSink) -> StatusCode {
    match (sink.status(), result) {
        (Some(status), _) => status,
        (None, Err(err)) => err.status(),
        (None, Ok(())) => StatusCode::OK,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::context::Context;
    use crate::handler::{BoxFuture, ErasedHandler, Handler};
    use crate::request::Request;
    use crate::shutdown;

    pub(crate) fn request(path: &str) -> (Context, ResponseSink, Request) {
        let req: Request = http::Request::get(path)
            .body(bytes::Bytes::new())
            .expect("valid request")
            .into();
        let ctx = Context::builder(http::Method::GET, path).build();
        (ctx, ResponseSink::new(), req)
    }

    /// Records the order layers are entered and left in.
    struct Tracer {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Tracer {
        fn name(&self) -> &'static str {
            self.name
        }

        fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
            Arc::new(Traced { name: self.name, log: Arc::clone(&self.log), next })
        }
    }

    struct Traced {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        next: BoxedHandler,
    }

    impl ErasedHandler for Traced {
        fn call(&self, ctx: Context, sink: ResponseSink, req: Request) -> BoxFuture {
            let (name, log, next) = (self.name, Arc::clone(&self.log), Arc::clone(&self.next));
            Box::pin(async move {
                log.lock().unwrap().push(format!("{name} in"));
                let result = next.call(ctx, sink, req).await;
                log.lock().unwrap().push(format!("{name} out"));
                result
            })
        }
    }

    #[tokio::test]
    async fn first_layer_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::new()
            .with(Tracer { name: "a", log: Arc::clone(&log) })
            .with(Tracer { name: "b", log: Arc::clone(&log) });
        assert_eq!(chain.names(), ["a", "b"]);

        let handler_log = Arc::clone(&log);
        let handler = move |_: Context, _: ResponseSink, _: Request| {
            let log = Arc::clone(&handler_log);
            async move {
                log.lock().unwrap().push("handler".to_owned());
                Ok::<_, Error>(())
            }
        };

        let (ctx, sink, req) = request("/");
        chain.compose(handler.into_boxed_handler()).call(ctx, sink, req).await.unwrap();
        assert_eq!(*log.lock().unwrap(), ["a in", "b in", "handler", "b out", "a out"]);
    }

    #[test]
    fn standard_chain_follows_named_order() {
        let (handle, _signal) = shutdown::channel(1);
        let chain = Chain::standard(handle, Metrics::new());
        assert_eq!(chain.names(), STANDARD_ORDER);
        assert_eq!(STANDARD_ORDER, ["logger", "errors", "metrics", "panics"]);
    }

    #[test]
    fn outcome_prefers_written_status() {
        let sink = ResponseSink::new();
        assert_eq!(outcome_status(&Ok(()), &sink), StatusCode::OK);
        assert_eq!(outcome_status(&Err(Error::NotFound), &sink), StatusCode::NOT_FOUND);
        sink.write(StatusCode::ACCEPTED).unwrap();
        assert_eq!(outcome_status(&Err(Error::NotFound), &sink), StatusCode::ACCEPTED);
    }
}
