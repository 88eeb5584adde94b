//! Built-in health-check handlers.
//!
//! | Probe | Question |
//! |---|---|
//! | **Liveness** | Is the process alive? Failure → restart. |
//! | **Readiness** | Can the pod serve traffic? Failure → pulled from load-balancer. |
//! | **Check** | Which build is running? |
//!
//! Register them on your app:
//!
//! ```rust,no_run
//! use kiln::{App, Metrics, health, shutdown};
//!
//! # fn main() -> Result<(), kiln::ConfigError> {
//! let (handle, _signal) = shutdown::channel(shutdown::DEFAULT_BUFFER);
//! let app = App::standard(handle, Metrics::new())
//!     .get("/healthz", health::liveness)?
//!     .get("/readyz", health::readiness)?
//!     .get("/health", health::Check::new("v1.4.2").handler())?;
//! # Ok(())
//! # }
//! ```
//!
//! Replace `readiness` with your own handler if you need to gate on
//! dependency availability (database connections, downstream services, etc.).

use std::sync::Arc;

use serde::Serialize;

use crate::context::Context;
use crate::error::Error;
use crate::handler::Handler;
use crate::request::Request;
use crate::response::{Response, ResponseSink};

/// Liveness probe. Always `200 OK` with body `"ok"`.
pub async fn liveness(_ctx: Context, sink: ResponseSink, _req: Request) -> Result<(), Error> {
    sink.write("ok")
}

/// Readiness probe (default implementation). `200 OK` with body `"ready"`.
pub async fn readiness(_ctx: Context, sink: ResponseSink, _req: Request) -> Result<(), Error> {
    sink.write("ready")
}

/// Build-info endpoint: `{"status":"ok","build":"<build>"}`.
#[derive(Clone, Debug)]
pub struct Check {
    build: Arc<str>,
}

#[derive(Serialize)]
struct Report<'a> {
    status: &'a str,
    build: &'a str,
}

impl Check {
    pub fn new(build: impl Into<Arc<str>>) -> Self {
        Self { build: build.into() }
    }

    pub fn report(&self) -> Result<Response, Error> {
        let body = serde_json::to_vec(&Report { status: "ok", build: &self.build })
            .map_err(|e| Error::internal_with("encoding health report", e))?;
        Ok(Response::json(body))
    }

    pub fn handler(self) -> impl Handler {
        move |_: Context, sink: ResponseSink, _: Request| {
            let report = self.report();
            async move { sink.write(report?) }
        }
    }
}
