use std::{error::Error, fmt};

/// An error returned when a task could not be submitted because the thread
/// pool has begun shutting down.
///
/// Contains the original closure that was rejected. This allows you to run it
/// somewhere else or take some other action. A rejected closure never reaches
/// the queue and is never executed by the pool.
pub struct PoolStoppedError<T>(pub(crate) T);

impl<T> PoolStoppedError<T> {
    /// Extracts the inner closure that could not be submitted.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Error for PoolStoppedError<T> {}

impl<T> fmt::Debug for PoolStoppedError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PoolStoppedError(..)")
    }
}

impl<T> fmt::Display for PoolStoppedError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("thread pool is shutting down")
    }
}

/// An error returned when attempting to configure the common thread pool after
/// it has already been initialized.
pub struct CommonAlreadyInitializedError(());

impl CommonAlreadyInitializedError {
    pub(crate) fn new() -> Self {
        Self(())
    }
}

impl Error for CommonAlreadyInitializedError {}

impl fmt::Debug for CommonAlreadyInitializedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CommonAlreadyInitializedError")
    }
}

impl fmt::Display for CommonAlreadyInitializedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("common thread pool already initialized")
    }
}
