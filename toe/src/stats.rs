//! Diagnostic counters.
use core::cell::Cell;

/// Counters incremented by the processes.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub sessions_registered: Cell<u64>,
    pub sessions_released: Cell<u64>,
    pub segments_received: Cell<u64>,
    pub segments_sent: Cell<u64>,
    pub segments_dropped: Cell<u64>,
    pub retransmissions: Cell<u64>,
    pub aborted: Cell<u64>,
}

pub(crate) fn bump(counter: &Cell<u64>) {
    counter.set(counter.get() + 1);
}

/// A snapshot of the engine counters, see [`Toe::statistics`].
///
/// [`Toe::statistics`]: ../struct.Toe.html#method.statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    /// Sessions created by the lookup controller.
    pub sessions_registered: u64,
    /// Sessions whose id returned to the free pool.
    pub sessions_released: u64,
    /// Segments that passed header validation.
    pub segments_received: u64,
    /// Segments emitted by the transmit engine.
    pub segments_sent: u64,
    /// Frames dropped as malformed, misaddressed or with a bad checksum.
    pub segments_dropped: u64,
    /// Segments sent again on timeout or duplicate acknowledgements.
    pub retransmissions: u64,
    /// Sessions aborted after exhausting their retransmissions.
    pub aborted: u64,
    /// Notifications lost because the application did not collect them.
    pub notifications_dropped: u64,
    /// Responses to requests lost because the application did not collect them.
    pub responses_dropped: u64,
    /// Received data chunks lost because the application did not collect them.
    pub data_dropped: u64,
}
