//! Request handlers.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::logger::LogLevel;
use crate::task::Task;

/// Terminal stage of the request pipeline.
///
/// Handlers run on a pipeline coroutine, never on the connection itself,
/// so brief blocking work is acceptable. The task carries the parsed
/// request, the routed metadata and the response under construction.
pub trait Handler: Send + Sync {
    fn service(&self, task: &mut Task);
}

/// Adapter turning a closure into a [`Handler`].
///
/// Panics inside the closure are caught and logged at warning level
/// through the server logger; whatever response the closure managed to
/// build is still written.
pub struct FnHandler<F>(F);

impl<F> FnHandler<F>
where
    F: Fn(&mut Task) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&mut Task) + Send + Sync,
{
    fn service(&self, task: &mut Task) {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (self.0)(&mut *task))) {
            let message = panic_message(panic.as_ref());
            task.log(LogLevel::Warn, &format!("handler panicked: {message}"));
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

/// Handler used when no route matches and no default handler is
/// configured: a JSON 404 body with keep-alive forced off.
pub(crate) struct FallbackHandler;

impl Handler for FallbackHandler {
    fn service(&self, task: &mut Task) {
        task.set_header("Content-Type", "application/json");
        task.set_body(
            serde_json::json!({
                "message": "Service is not available currently",
                "code": 404,
            })
            .to_string(),
        );
        task.set_keep_alive(false);
    }
}
