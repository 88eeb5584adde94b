//! Request metrics.
//!
//! Counters live in process as atomics so they can be read back with
//! [`Metrics::snapshot`], and every update is mirrored to the `metrics`
//! crate facade so an installed exporter (Prometheus, statsd, …) sees them too:
//!
//! - `http_requests_total{class}` (counter)
//! - `http_requests_in_flight` (gauge)
//! - `http_request_errors_total` (counter)
//! - `http_request_duration_seconds` (histogram)

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use crate::context::Context;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::middleware::{Middleware, outcome_status};
use crate::request::Request;
use crate::response::ResponseSink;
use crate::status::StatusClass;

/// Request counters shared by every route. Clones share the same counters.
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    in_flight: AtomicU64,
    errors: AtomicU64,
    success: AtomicU64,
    client_errors: AtomicU64,
    server_errors: AtomicU64,
    cancelled: AtomicU64,
    latency_micros: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub in_flight: u64,
    pub errors: u64,
    pub success: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    pub cancelled: u64,
    pub total_latency: Duration,
}

impl Metrics {
    pub const NAME: &'static str = "metrics";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = &self.counters;
        MetricsSnapshot {
            requests: c.requests.load(Ordering::Relaxed),
            in_flight: c.in_flight.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
            success: c.success.load(Ordering::Relaxed),
            client_errors: c.client_errors.load(Ordering::Relaxed),
            server_errors: c.server_errors.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
            total_latency: Duration::from_micros(c.latency_micros.load(Ordering::Relaxed)),
        }
    }

    fn begin(&self) -> InFlight {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        self.counters.in_flight.fetch_add(1, Ordering::Relaxed);
        ::metrics::gauge!("http_requests_in_flight").increment(1.0);
        InFlight { counters: Arc::clone(&self.counters), started: Instant::now() }
    }
}

/// Decrements the in-flight gauge even if the request future is dropped.
struct InFlight {
    counters: Arc<Counters>,
    started: Instant,
}

impl InFlight {
    fn finish(self, class: StatusClass, failed: bool) {
        let c = &self.counters;
        let counter = match class {
            StatusClass::Success => &c.success,
            StatusClass::ClientError => &c.client_errors,
            StatusClass::ServerError => &c.server_errors,
            StatusClass::Cancelled => &c.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("http_requests_total", "class" => class.as_str()).increment(1);

        if failed {
            c.errors.fetch_add(1, Ordering::Relaxed);
            ::metrics::counter!("http_request_errors_total").increment(1);
        }

        let elapsed = self.started.elapsed();
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        c.latency_micros.fetch_add(micros, Ordering::Relaxed);
        ::metrics::histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::Relaxed);
        ::metrics::gauge!("http_requests_in_flight").decrement(1.0);
    }
}

impl Middleware for Metrics {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Measured { metrics: self.clone(), next })
    }
}

struct Measured {
    metrics: Metrics,
    next: BoxedHandler,
}

impl ErasedHandler for Measured {
    fn call(&self, ctx: Context, sink: ResponseSink, req: Request) -> BoxFuture {
        let next = Arc::clone(&self.next);
        let metrics = self.metrics.clone();
        Box::pin(async move {
            let in_flight = metrics.begin();
            let result = next.call(ctx, sink.clone(), req).await;
            in_flight.finish(StatusClass::of(outcome_status(&result, &sink)), result.is_err());
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::handler::Handler;
    use crate::middleware::tests::request;

    async fn ok(_: Context, sink: ResponseSink, _: Request) -> crate::Result {
        sink.write("ok")
    }

    async fn invalid(_: Context, _: ResponseSink, _: Request) -> crate::Result {
        Err(Error::validation("bad city"))
    }

    async fn broken(_: Context, _: ResponseSink, _: Request) -> crate::Result {
        Err(Error::internal("db down"))
    }

    async fn call(metrics: &Metrics, handler: impl Handler) -> crate::Result {
        let (ctx, sink, req) = request("/");
        metrics.wrap(handler.into_boxed_handler()).call(ctx, sink, req).await
    }

    #[tokio::test]
    async fn counts_outcomes_by_class() {
        let metrics = Metrics::new();
        call(&metrics, ok).await.unwrap();
        assert!(call(&metrics, invalid).await.is_err());
        assert!(call(&metrics, broken).await.is_err());

        let snap = metrics.snapshot();
        assert_eq!(snap.requests, 3);
        assert_eq!(snap.success, 1);
        assert_eq!(snap.client_errors, 1);
        assert_eq!(snap.server_errors, 1);
        assert_eq!(snap.errors, 2);
        assert_eq!(snap.in_flight, 0);
    }

    #[tokio::test]
    async fn does_not_touch_the_result() {
        let metrics = Metrics::new();
        match call(&metrics, invalid).await {
            Err(Error::Validation { message, .. }) => assert_eq!(message, "bad city"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_request_leaves_in_flight_at_zero() {
        let metrics = Metrics::new();
        let slow = |ctx: Context, _: ResponseSink, _: Request| async move {
            ctx.cancelled().await;
            Ok::<_, Error>(())
        };
        let (ctx, sink, req) = request("/");
        let fut = metrics.wrap(slow.into_boxed_handler()).call(ctx, sink, req);
        let timed_out = tokio::time::timeout(Duration::from_millis(10), fut).await;
        assert!(timed_out.is_err());
        assert_eq!(metrics.snapshot().in_flight, 0);
        assert_eq!(metrics.snapshot().requests, 1);
    }
}
