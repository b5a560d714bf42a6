//! Retransmission, probe and close timers.
//!
//! Every timer keeps one deadline per session in a [`DeadlineQueue`] and checks it against the
//! time passed to `poll`. Within one round the retransmit timer runs before the probe timer, so
//! its events are queued first.
//!
//! [`DeadlineQueue`]: ../storage/struct.DeadlineQueue.html
use crate::table::SessionId;

mod close;
mod probe;
mod retransmit;

pub use self::close::CloseTimer;
pub use self::probe::ProbeTimer;
pub use self::retransmit::{Expiry, RetransmitTimer};

/// What the transmit engine sent when it armed the retransmit timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetransmitKind {
    Syn,
    SynAck,
    Fin,
    Data,
}

/// Arm the retransmit timer unless it is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetransmitSet {
    pub session: SessionId,
    pub kind: RetransmitKind,
}

/// Acknowledgement progress reported by the receive engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetransmitClear {
    pub session: SessionId,
    /// Everything was acknowledged, otherwise the timer restarts for the remaining data.
    pub stop: bool,
}
