//! The application: route table, middleware chain, and request dispatch.
//!
//! An [`App`] is assembled once at startup and is read-only afterwards. Every
//! route handler is wrapped in the app's [`Chain`] as it is registered, so a
//! request costs one table lookup and one call into an already-composed
//! handler.
//!
//! ```rust,no_run
//! use kiln::{App, Context, Error, Metrics, Request, ResponseSink, Server, shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (handle, signal) = shutdown::channel(shutdown::DEFAULT_BUFFER);
//!
//!     let app = App::standard(handle, Metrics::new())
//!         .get("/data/:city", city)?;
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app, signal).await?;
//!     Ok(())
//! }
//!
//! async fn city(_ctx: Context, sink: ResponseSink, req: Request) -> Result<(), Error> {
//!     match req.param("city") {
//!         Some(city) => sink.write(format!("weather for {city}")),
//!         None => Err(Error::validation("city is required")),
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::context::Context;
use crate::error::{ConfigError, Error};
use crate::handler::{BoxedHandler, ErasedHandler, Handler};
use crate::method::Method;
use crate::middleware::{Chain, Metrics, catch, install_hook};
use crate::request::Request;
use crate::response::{Response, ResponseSink};
use crate::router::{RouteLookup, RouteTable};
use crate::shutdown::{ShutdownHandle, ShutdownReason};

/// Routes plus the middleware every route runs through.
pub struct App {
    table: RouteTable,
    chain: Chain,
    not_found: BoxedHandler,
    shutdown: ShutdownHandle,
    request_timeout: Option<Duration>,
}

impl App {
    /// An app whose routes run through `chain`.
    ///
    /// Requests that match no route go through the same chain, around a
    /// handler that fails with [`Error::NotFound`] or [`Error::MethodNotAllowed`].
    pub fn new(shutdown: ShutdownHandle, chain: Chain) -> Self {
        install_hook();
        let not_found = chain.compose(not_found.into_boxed_handler());
        Self { table: RouteTable::new(), chain, not_found, shutdown, request_timeout: None }
    }

    /// An app using [`Chain::standard`]: Logger, Errors, Metrics, Panics.
    pub fn standard(shutdown: ShutdownHandle, metrics: Metrics) -> Self {
        let chain = Chain::standard(shutdown.clone(), metrics);
        Self::new(shutdown, chain)
    }

    /// Every request's context is cancelled once `timeout` has elapsed.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Registers `handler` for `method` + `pattern`. Returns `self` for chaining.
    ///
    /// Patterns are `/`-separated segments: literals, `:name` parameters, and
    /// an optional trailing `*`. When two patterns overlap, the one registered
    /// first wins.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidPattern`] for malformed patterns and
    /// [`ConfigError::DuplicateRoute`] when the same method already has a
    /// pattern of the same shape.
    pub fn on(
        mut self,
        method: Method,
        pattern: &str,
        handler: impl Handler,
    ) -> Result<Self, ConfigError> {
        let handler = self.chain.compose(handler.into_boxed_handler());
        self.table.register(method, pattern, handler)?;
        Ok(self)
    }

    pub fn get(self, pattern: &str, handler: impl Handler) -> Result<Self, ConfigError> {
        self.on(Method::Get, pattern, handler)
    }

    pub fn post(self, pattern: &str, handler: impl Handler) -> Result<Self, ConfigError> {
        self.on(Method::Post, pattern, handler)
    }

    pub fn put(self, pattern: &str, handler: impl Handler) -> Result<Self, ConfigError> {
        self.on(Method::Put, pattern, handler)
    }

    pub fn delete(self, pattern: &str, handler: impl Handler) -> Result<Self, ConfigError> {
        self.on(Method::Delete, pattern, handler)
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn route_count(&self) -> usize {
        self.table.len()
    }

    pub fn shutdown_handle(&self) -> &ShutdownHandle {
        &self.shutdown
    }

    /// Asks the server to shut down gracefully. Never blocks.
    pub fn signal_shutdown(&self, reason: impl Into<String>) -> bool {
        self.shutdown.request(ShutdownReason::Requested(reason.into()))
    }

    /// Wraps the chain around a handler failing with [`Error::MethodNotAllowed`].
    fn method_not_allowed(&self, allowed: Vec<Method>) -> BoxedHandler {
        let handler = move |_: Context, _: ResponseSink, _: Request| {
            let allowed = allowed.clone();
            async move { Err::<(), _>(Error::MethodNotAllowed { allowed }) }
        };
        self.chain.compose(handler.into_boxed_handler())
    }

    /// Routes one request and produces its response.
    ///
    /// The composed chain runs on its own task. `cancel` should fire when the
    /// client goes away; dropping the returned future has the same effect, so
    /// the handler always gets to observe the cancellation.
    ///
    /// # Errors
    ///
    /// Only [`Error::Cancelled`], when the request was abandoned before a
    /// response was written. The connection should be closed without writing
    /// anything.
    pub async fn dispatch(
        &self,
        req: Request,
        cancel: CancellationToken,
    ) -> Result<Response, Error> {
        let token = cancel.child_token();
        let _cancel_on_exit = token.clone().drop_guard();

        let mut ctx = Context::builder(req.method().clone(), req.path())
            .cancel(token.clone())
            .deadline(self.request_timeout.map(|t| Instant::now() + t));
        if let Some(addr) = req.remote_addr() {
            ctx = ctx.value("remote_addr", addr.to_string());
        }

        let method = Method::try_from(req.method()).ok();
        let (handler, req) = match self.table.lookup(method, req.path()) {
            RouteLookup::Matched { handler, pattern, params } => {
                ctx = ctx.route(pattern, params.clone());
                (handler, req.with_params(params))
            }
            RouteLookup::MethodNotAllowed { allowed } => (self.method_not_allowed(allowed), req),
            RouteLookup::NotFound => (Arc::clone(&self.not_found), req),
        };
        let ctx = ctx.build();
        let trace_id = ctx.trace_id();

        if let Some(deadline) = ctx.deadline() {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = tokio::time::sleep_until(deadline) => token.cancel(),
                    () = token.cancelled() => {}
                }
            });
        }

        let sink = ResponseSink::new();
        // Caught on the task itself, where the panic site was recorded.
        let task = tokio::spawn({
            let sink = sink.clone();
            catch(async move { handler.call(ctx, sink, req).await })
        });

        // The task never unwinds, so a join error means the runtime dropped it.
        let result = task.await.unwrap_or_else(|_| Err(Error::Cancelled));

        if result.as_ref().is_err_and(Error::is_shutdown) {
            warn!(%trace_id, "handler requested shutdown");
        }

        match (sink.take(), result) {
            (Some(response), _) => Ok(response),
            (None, Err(Error::Cancelled)) => Err(Error::Cancelled),
            (None, Err(err)) => {
                match &err {
                    Error::Panic { message, trace } => {
                        error!(%trace_id, panic = %message, trace = ?trace, "handler panicked");
                    }
                    _ => error!(%trace_id, error = %err, "error escaped the middleware chain"),
                }
                let status = err.status();
                Ok(Response::builder()
                    .status(status)
                    .text(status.canonical_reason().unwrap_or("")))
            }
            (None, Ok(())) => Ok(Response::status(StatusCode::OK)),
        }
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("routes", &self.table.len())
            .field("chain", &self.chain)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

async fn not_found(_ctx: Context, _sink: ResponseSink, _req: Request) -> Result<(), Error> {
    Err(Error::NotFound)
}
