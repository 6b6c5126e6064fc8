//! The user-supplied processing hook.

use std::path::Path;

/// Transform applied to each file after it has been moved into the
/// pipeline's `working/` directory.
///
/// Runs on a blocking thread, so implementations may do synchronous IO
/// freely. An `Err` is captured into the task's result — it is never
/// propagated across the pool — and materialises as the file landing in
/// `failed/` beside a `<name>.log` report carrying the error chain.
pub trait FileProcessor: Send + Sync + 'static {
    /// Process one file in place.
    ///
    /// # Errors
    ///
    /// Any error marks the file as failed.
    fn process(&self, file: &Path) -> anyhow::Result<()>;
}
