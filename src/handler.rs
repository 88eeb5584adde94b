//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The route table holds handlers of *different* types side by side, and every
//! middleware layer must be able to wrap any of them. Both only work through a
//! common trait object, so every handler is erased into a [`BoxedHandler`]:
//!
//! ```text
//! async fn city(ctx, sink, req) -> Result<(), Error> { … }   ← user writes this
//!        ↓ app.get("/data/:city", city)
//! city.into_boxed_handler()                                 ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(city))                                 ← heap-allocated wrapper
//!        ↓  wrapped by Panics, Metrics, Errors, Logger
//! handler.call(ctx, sink, req)  at request time             ← one vtable dispatch per layer
//! ```
//!
//! Middleware layers are themselves [`ErasedHandler`]s holding the next
//! [`BoxedHandler`], so the composed chain is just nested trait objects.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::request::Request;
use crate::response::ResponseSink;

/// A heap-allocated, type-erased future resolving to the handler's outcome.
///
/// `Send + 'static` lets tokio run it on its own task.
pub type BoxFuture = Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'static>>;

/// Object-safe dispatch interface shared by handlers and middleware layers.
///
/// Implement this directly when writing a middleware layer; route handlers
/// are plain `async fn`s and get it through [`Handler`].
pub trait ErasedHandler {
    fn call(&self, ctx: Context, sink: ResponseSink, req: Request) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` (or closure returning a future) with the signature:
///
/// ```text
/// async fn name(ctx: Context, sink: ResponseSink, req: Request) -> Result<(), Error>
/// ```
///
/// A handler writes its success response into `sink` and returns `Ok(())`,
/// or returns an error and leaves the response to the middleware.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut> private::Sealed for F
where
    F: Fn(Context, ResponseSink, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
}

impl<F, Fut> Handler for F
where
    F: Fn(Context, ResponseSink, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

struct FnHandler<F>(F);

impl<F, Fut> ErasedHandler for FnHandler<F>
where
    F: Fn(Context, ResponseSink, Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn call(&self, ctx: Context, sink: ResponseSink, req: Request) -> BoxFuture {
        Box::pin((self.0)(ctx, sink, req))
    }
}
