//! # kiln
//!
//! A minimal HTTP application framework for services behind a reverse proxy.
//!
//! ## The contract
//!
//! A kiln app is a route table and one middleware chain. Every route runs
//! through the same layers, always in the same order:
//!
//! ```text
//! Logger → Errors → Metrics → Panics → handler
//! ```
//!
//! Handlers stay small: they write a success response or return an
//! [`Error`]. Turning errors into responses, recovering from panics, counting
//! requests and logging them is the chain's job.
//!
//! What kiln owns:
//!
//! - Routing: literal segments, `:name` parameters, a trailing `*`
//! - The middleware chain: see [`middleware`]
//! - Cancellation: one token per request, see [`Context`]
//! - Graceful shutdown: SIGTERM / Ctrl-C, or a handler asking for it,
//!   see [`shutdown`]
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use kiln::{App, Context, Error, Metrics, Request, Response, ResponseSink, Server, shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (handle, signal) = shutdown::channel(shutdown::DEFAULT_BUFFER);
//!
//!     let app = App::standard(handle, Metrics::new())
//!         .get("/users/:id", get_user)?
//!         .post("/users", create_user)?;
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app, signal).await?;
//!     Ok(())
//! }
//!
//! async fn get_user(_ctx: Context, sink: ResponseSink, req: Request) -> Result<(), Error> {
//!     let id = req.param("id").unwrap_or("unknown");
//!     sink.write(Response::json(format!(r#"{{"id":"{id}"}}"#)))
//! }
//!
//! async fn create_user(_ctx: Context, sink: ResponseSink, req: Request) -> Result<(), Error> {
//!     if req.body().is_empty() {
//!         return Err(Error::validation("body is required"));
//!     }
//!     sink.write(
//!         Response::builder()
//!             .status(kiln::StatusCode::CREATED)
//!             .header("location", "/users/99")
//!             .no_body(),
//!     )
//! }
//! ```

mod app;
mod config;
mod context;
mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;
mod status;

pub mod health;
pub mod middleware;
pub mod shutdown;

pub use app::App;
pub use config::ServerConfig;
pub use context::Context;
pub use error::{ConfigError, Error, PanicTrace, Result, ServeError};
pub use handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
pub use method::{Method, UnknownMethod};
pub use middleware::{Chain, Metrics, MetricsSnapshot, Middleware};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder, ResponseSink};
pub use router::{Params, WILDCARD};
pub use server::Server;
pub use shutdown::{ShutdownHandle, ShutdownReason, ShutdownSignal};
pub use status::StatusClass;

pub use http::StatusCode;
pub use tokio_util::sync::CancellationToken;
