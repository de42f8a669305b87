//! Unit-level failure isolation.
//!
//! Every page, image and table goes through [`isolate`] (or
//! [`isolate_async`]) so the degrade policy lives in one place: the failure
//! is logged with the unit's coordinates and the request id, turned into an
//! [`Isolated`], and the caller substitutes its documented default. Panics
//! inside a synchronous unit are caught too; pdfium and the text-layer
//! reader both sit behind FFI or third-party parsing code.

use crate::context::IngestContext;
use crate::error::{Isolated, Unit};
use std::fmt::Display;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

/// Run one synchronous unit of work, isolating any error or panic.
pub fn isolate<T, E, F>(ctx: &IngestContext, unit: Unit, op: F) -> Result<T, Isolated>
where
    E: Display,
    F: FnOnce() -> Result<T, E>,
{
    let outcome = catch_unwind(AssertUnwindSafe(op));
    let reason = match outcome {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(e)) => e.to_string(),
        Err(panic) => panic_message(panic.as_ref()),
    };
    Err(degrade(ctx, unit, reason))
}

/// Run one asynchronous unit of work, isolating its error.
pub async fn isolate_async<T, E, Fut>(
    ctx: &IngestContext,
    unit: Unit,
    op: Fut,
) -> Result<T, Isolated>
where
    E: Display,
    Fut: Future<Output = Result<T, E>>,
{
    match op.await {
        Ok(value) => Ok(value),
        Err(e) => Err(degrade(ctx, unit, e.to_string())),
    }
}

fn degrade(ctx: &IngestContext, unit: Unit, reason: String) -> Isolated {
    warn!(
        request_id = %ctx.request_id(),
        unit = %unit,
        reason = %reason,
        "unit failed; continuing with default"
    );
    Isolated { unit, reason }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
