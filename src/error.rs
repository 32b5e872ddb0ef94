use std::io;
use std::time::Duration;
use thiserror::Error;

/// Why a blocking buffer operation or a pacing sleep gave up.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("operation cancelled")]
    Cancelled,
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// A failed `add`. The value never entered the buffer and is handed back.
#[derive(Debug, Error)]
#[error("value not added: {reason}")]
pub struct AddError<T> {
    pub reason: BufferError,
    pub value: T,
}

impl<T> AddError<T> {
    pub fn into_inner(self) -> T {
        self.value
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to spawn worker thread")]
    Spawn(#[from] io::Error),
    #[error("{0} thread panicked")]
    Panicked(&'static str),
}
