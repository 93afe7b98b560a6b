use std::{
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    thread,
};

/// A single deferred unit of work submitted to a thread pool.
///
/// The closure and everything it captures are boxed at submission time and
/// handed off as one unit to whichever worker dequeues the task. Tasks are
/// fire-and-forget: nothing is returned to the submitter, so any result must
/// be communicated through side effects the closure itself arranges, such as
/// writing to a channel or shared memory the submitter owns.
pub(crate) struct Task(Box<dyn FnOnce() + Send + 'static>);

impl Task {
    pub(crate) fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(f))
    }

    /// Run the task body to completion, containing any panic it raises.
    ///
    /// A panicking task must not take down the worker thread executing it, so
    /// the panic is caught here and reported to the worker instead.
    pub(crate) fn run(self) -> thread::Result<()> {
        catch_unwind(AssertUnwindSafe(self.0))
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Task(..)")
    }
}
