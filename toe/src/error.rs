use crate::storage::BufferAddress;

/// Errors returned by the engine.
///
/// Applications never see protocol failures here, those are reported as statuses and
/// notifications. An `Err` from [`Toe::poll`] means the engine was misconfigured, misused or found
/// one of its own invariants broken.
///
/// [`Toe::poll`]: struct.Toe.html#method.poll
#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum Error {
    /// Invalid configuration: {0}
    Config(&'static str),
    /// An inbound queue is full, poll before submitting more
    Backpressure,
    /// Buffer memory access failed at {0}
    Memory(BufferAddress),
    /// Internal error: {0}
    Internal(#[from] InternalError),
}

/// A broken internal invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, displaydoc::Display)]
pub enum InternalError {
    /// Session id {0} is out of range
    InvalidSession(u16),
    /// Never-dropping queue `{0}` overflowed
    QueueFull(&'static str),
    /// Static port {0} can not be released
    StaticPortRelease(u16),
    /// Application pointer of session {0} would pass the received pointer
    AppPointerOverrun(u16),
    /// Buffer access of {len} bytes at offset {offset} crosses the end of the region
    MemoryRange { offset: usize, len: usize },
    /// The engine did not settle after {0} polls
    NoProgress(usize),
}

/// The result type of the engine.
pub type Result<T> = core::result::Result<T, Error>;
