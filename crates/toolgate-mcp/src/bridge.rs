//! Synchronous entry into async transport code.
//!
//! Every facade operation runs its future to completion on a fresh
//! single-threaded runtime that is torn down when the call returns. No
//! runtime state leaks between calls, so a poisoned timer or a leaked
//! blocked read in one call cannot affect the next.

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};

use tokio::runtime::{Builder, Handle, Runtime};

/// Run `future` to completion and return its output.
///
/// Safe to call from inside an existing tokio runtime: the future is
/// then driven on a dedicated OS thread with its own runtime, and the
/// calling thread blocks until it finishes. Panics from the future are
/// propagated to the caller.
pub fn run_to_completion<F>(future: F) -> F::Output
where
    F: Future + Send,
    F::Output: Send,
{
    if Handle::try_current().is_ok() {
        // block_on would panic inside a runtime; drive the future on
        // its own thread instead.
        std::thread::scope(|scope| {
            let handle = scope.spawn(move || block_on_fresh(future));
            match handle.join() {
                Ok(output) => output,
                Err(panic) => resume_unwind(panic),
            }
        })
    } else {
        block_on_fresh(future)
    }
}

fn block_on_fresh<F: Future>(future: F) -> F::Output {
    let runtime = new_runtime();
    let result = catch_unwind(AssertUnwindSafe(|| runtime.block_on(future)));
    // A timed-out stdio read can leave a blocking-pool thread parked on
    // the pipe; a plain drop would wait for it. Detach instead.
    runtime.shutdown_background();
    match result {
        Ok(output) => output,
        Err(panic) => resume_unwind(panic),
    }
}

fn new_runtime() -> Runtime {
    match Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        // Runtime construction only fails when the OS is out of basic
        // resources (threads, fds); nothing sensible to do but abort
        // the operation.
        Err(e) => panic!("failed to build tokio runtime: {e}"),
    }
}
