//! Panic recovery.

use std::any::Any;
use std::cell::RefCell;
use std::future::Future;
use std::panic::{AssertUnwindSafe, PanicHookInfo};
use std::sync::{Arc, Once};

use backtrace::Backtrace;
use futures_util::FutureExt;

use crate::context::Context;
use crate::error::{Error, PanicTrace};
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::ResponseSink;

/// Turns a panic anywhere below it into [`Error::Panic`].
///
/// The panic message, its location and a backtrace of the panicking frame are
/// kept on the error for the logs; the client only ever sees a generic 500.
#[derive(Clone, Copy, Debug, Default)]
pub struct Panics;

impl Panics {
    pub const NAME: &'static str = "panics";
}

impl Middleware for Panics {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        install_hook();
        Arc::new(Recovered { next })
    }
}

struct Recovered {
    next: BoxedHandler,
}

impl ErasedHandler for Recovered {
    fn call(&self, ctx: Context, sink: ResponseSink, req: Request) -> BoxFuture {
        let next = Arc::clone(&self.next);
        // `call` itself runs inside the guarded future, so a handler that
        // panics before returning its future is caught too.
        Box::pin(catch(async move { next.call(ctx, sink, req).await }))
    }
}

/// Runs `fut`, turning a panic into [`Error::Panic`].
pub(crate) async fn catch<F>(fut: F) -> Result<(), Error>
where
    F: Future<Output = Result<(), Error>>,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(recovered(payload)))
}

// ── Panic site capture ────────────────────────────────────────────────────────

thread_local! {
    static PANIC_LOCATION: RefCell<Option<String>> = const { RefCell::new(None) };
    static PANIC_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Chains a process-wide panic hook, once, that records the location and a
/// backtrace of each panic on the panicking thread. The previous hook still
/// runs first.
pub(crate) fn install_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
            previous(info);
            record(info);
        }));
    });
}

fn record(info: &PanicHookInfo<'_>) {
    PANIC_LOCATION.replace(info.location().map(ToString::to_string));
    PANIC_BACKTRACE.replace(Some(Backtrace::new()));
}

/// Builds [`Error::Panic`] from a caught payload.
///
/// Runs on the thread that panicked, right after `catch_unwind`, so the
/// recorded site is this panic's.
fn recovered(payload: Box<dyn Any + Send>) -> Error {
    Error::Panic {
        message: panic_message(payload.as_ref()),
        trace: PanicTrace::new(PANIC_LOCATION.take(), PANIC_BACKTRACE.take()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_owned()
    }
}
