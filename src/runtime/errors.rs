//! Scheduler faults

use std::fmt;

use thiserror::Error;

/// A fault raised inside a task body.
///
/// The fault is captured on the frame where it occurred and re-raised by
/// the pool from the `tick` call that resumed the frame; the frame
/// itself is left exactly where it failed.
#[derive(Debug, Error)]
#[error("task fault: {0}")]
pub struct TaskFault(anyhow::Error);

impl TaskFault {
    /// Create a fault from a printable message.
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self(anyhow::anyhow!(message))
    }

    /// Wrap an arbitrary host error.
    pub fn new<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self(err.into())
    }

    /// Get the underlying host error.
    #[inline]
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// Unwrap into the underlying host error.
    #[inline]
    pub fn into_inner(self) -> anyhow::Error {
        self.0
    }
}

impl From<anyhow::Error> for TaskFault {
    fn from(err: anyhow::Error) -> Self {
        Self(err)
    }
}
