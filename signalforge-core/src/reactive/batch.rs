//! Batching.
//!
//! Writes inside a batch mark and queue their subscribers but nothing runs
//! until the outermost batch closes. Batches nest; only the outermost one
//! flushes.
//!
//! ```rust,ignore
//! batch(|| {
//!     first.set("Ada".into());
//!     last.set("Lovelace".into());
//! }); // effects reading both names run once, here
//! ```

use std::panic::{self, AssertUnwindSafe};

use super::runtime::Runtime;
use crate::error::Result;

/// Run `f` inside a batch and return its result.
///
/// A flush that fails to settle is handed to the error reporter; use
/// [`try_batch`] to get it back instead.
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    let (value, flushed) = run_batch(f);
    if let Err(err) = flushed {
        Runtime::report(&err);
    }
    value
}

/// Like [`batch`], but returns the closing flush's error.
pub fn try_batch<T>(f: impl FnOnce() -> T) -> Result<T> {
    let (value, flushed) = run_batch(f);
    flushed.map(|()| value)
}

fn run_batch<T>(f: impl FnOnce() -> T) -> (T, Result<()>) {
    Runtime::start_batch();
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));
    // The scope closes and flushes even if the body unwound.
    let flushed = Runtime::end_batch();
    match outcome {
        Ok(value) => (value, flushed),
        Err(payload) => {
            if let Err(err) = flushed {
                Runtime::report(&err);
            }
            panic::resume_unwind(payload)
        }
    }
}

/// Open a batch scope. Must be paired with [`end_batch`].
pub fn start_batch() {
    Runtime::start_batch();
}

/// Close a batch scope, flushing if it was the outermost one.
///
/// Calling it with no open scope logs a warning and does nothing.
pub fn end_batch() -> Result<()> {
    Runtime::end_batch()
}

/// Flush pending work now, even inside an open batch.
pub fn flush_sync() -> Result<()> {
    Runtime::flush()
}

/// Current batch nesting depth.
pub fn batch_depth() -> usize {
    Runtime::batch_depth()
}
