//! Error-to-response translation.

use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, error, warn};

use crate::context::Context;
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::{Response, ResponseSink};
use crate::shutdown::{ShutdownHandle, ShutdownReason};

/// Writes the response for any error the inner chain returns.
///
/// | Error                 | Response                                   | Returns          |
/// |-----------------------|--------------------------------------------|------------------|
/// | `Validation`          | 400, body = the safe message               | `Ok(())`         |
/// | `NotFound`            | 404                                        | `Ok(())`         |
/// | `MethodNotAllowed`    | 405 with `allow`                           | `Ok(())`         |
/// | `Internal`, `Panic`   | 500, generic body                          | `Ok(())`         |
/// | `Shutdown`            | 500, generic body, shutdown requested      | the error        |
/// | `Cancelled`           | nothing                                    | the error        |
///
/// A handler that already wrote a response keeps it: the error is still
/// logged, but nothing is written over it.
#[derive(Clone, Debug)]
pub struct Errors {
    shutdown: ShutdownHandle,
}

impl Errors {
    pub const NAME: &'static str = "errors";

    pub fn new(shutdown: ShutdownHandle) -> Self {
        Self { shutdown }
    }
}

impl Middleware for Errors {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Translated { shutdown: self.shutdown.clone(), next })
    }
}

struct Translated {
    shutdown: ShutdownHandle,
    next: BoxedHandler,
}

impl ErasedHandler for Translated {
    fn call(&self, ctx: Context, sink: ResponseSink, req: Request) -> BoxFuture {
        let next = Arc::clone(&self.next);
        let shutdown = self.shutdown.clone();
        Box::pin(async move {
            let err = match next.call(ctx.clone(), sink.clone(), req).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };
            let trace_id = ctx.trace_id();

            let response = match &err {
                Error::Cancelled => {
                    debug!(%trace_id, "request cancelled, closing without a response");
                    return Err(err);
                }
                Error::Validation { message, source } => {
                    warn!(%trace_id, error = %err, source = ?source, "rejected request");
                    Response::builder().status(StatusCode::BAD_REQUEST).text(message.clone())
                }
                Error::NotFound => generic(StatusCode::NOT_FOUND),
                Error::MethodNotAllowed { allowed } => {
                    let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
                    Response::builder()
                        .status(StatusCode::METHOD_NOT_ALLOWED)
                        .header("allow", &allow)
                        .text(reason(StatusCode::METHOD_NOT_ALLOWED))
                }
                Error::Panic { message, trace } => {
                    error!(%trace_id, panic = %message, trace = ?trace, "handler panicked");
                    generic(StatusCode::INTERNAL_SERVER_ERROR)
                }
                Error::Internal { source, .. } => {
                    error!(%trace_id, error = %err, source = ?source, "request failed");
                    generic(StatusCode::INTERNAL_SERVER_ERROR)
                }
                Error::Shutdown { reason } => {
                    error!(%trace_id, %reason, "fatal error, requesting shutdown");
                    respond(&sink, generic(StatusCode::INTERNAL_SERVER_ERROR), &ctx);
                    shutdown.request(ShutdownReason::Requested(reason.clone()));
                    return Err(err);
                }
            };

            respond(&sink, response, &ctx);
            Ok(())
        })
    }
}

fn respond(sink: &ResponseSink, response: Response, ctx: &Context) {
    if sink.write(response).is_err() {
        warn!(
            trace_id = %ctx.trace_id(),
            status = ?sink.status(),
            "handler wrote a response before failing, keeping it",
        );
    }
}

fn reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("")
}

fn generic(status: StatusCode) -> Response {
    Response::builder().status(status).text(reason(status))
}
