//! Request logging.

use std::sync::Arc;

use tracing::{debug, info};

use crate::context::Context;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::middleware::{Middleware, outcome_status};
use crate::request::Request;
use crate::response::ResponseSink;
use crate::status::StatusClass;

/// Emits one `info` event per completed request: trace id, method, path,
/// matched pattern, path parameters, status, status class and latency.
///
/// Never changes the result it wraps.
#[derive(Clone, Copy, Debug, Default)]
pub struct Logger;

impl Logger {
    pub const NAME: &'static str = "logger";
}

impl Middleware for Logger {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Logged { next })
    }
}

struct Logged {
    next: BoxedHandler,
}

impl ErasedHandler for Logged {
    fn call(&self, ctx: Context, sink: ResponseSink, req: Request) -> BoxFuture {
        let next = Arc::clone(&self.next);
        Box::pin(async move {
            debug!(
                trace_id = %ctx.trace_id(),
                method = %ctx.method(),
                path = ctx.path(),
                "request started",
            );

            let result = next.call(ctx.clone(), sink.clone(), req).await;

            let status = outcome_status(&result, &sink);
            info!(
                trace_id = %ctx.trace_id(),
                method = %ctx.method(),
                path = ctx.path(),
                route = ctx.route().unwrap_or("-"),
                params = %ctx.params(),
                status = status.as_u16(),
                class = %StatusClass::of(status),
                elapsed = ?ctx.elapsed(),
                "request completed",
            );

            result
        })
    }
}
