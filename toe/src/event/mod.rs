//! Events requesting segments from the transmit engine.
//!
//! Events come from the receive engine, the timers and the application interface. The
//! [`EventEngine`] arbitrates between them and the [`AckDelayer`] coalesces acknowledgements
//! before they reach the transmit engine.
use core::cell::Cell;

use crate::table::{FourTuple, SessionId};
use crate::wire::TcpSeqNumber;

mod ack_delay;
mod engine;

pub use self::ack_delay::AckDelayer;
pub use self::engine::EventEngine;

/// A reset to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reset {
    /// Reset a registered session, addressed through the reverse lookup.
    Session {
        session: SessionId,
        seq: TcpSeqNumber,
        ack: Option<TcpSeqNumber>,
    },
    /// Answer a segment that matched no session.
    Stray {
        tuple: FourTuple,
        seq: TcpSeqNumber,
        ack: Option<TcpSeqNumber>,
    },
}

/// A request for the transmit engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Send pending data.
    Tx { session: SessionId },
    /// Send again from the oldest unacknowledged byte.
    Retransmit { session: SessionId, fast: bool },
    /// An acknowledgement that may be delayed and coalesced.
    Ack { session: SessionId },
    /// An acknowledgement to send right away.
    AckNoDelay { session: SessionId },
    /// Open actively, `retry` resends the original SYN.
    Syn { session: SessionId, retry: bool },
    /// Answer a SYN, `retry` resends the original SYN-ACK.
    SynAck { session: SessionId, retry: bool },
    /// Send our FIN once all data was sent.
    Fin { session: SessionId },
    Rst(Reset),
}

impl Event {
    /// The session this event belongs to, absent for stray resets.
    pub fn session(&self) -> Option<SessionId> {
        match *self {
            Event::Tx { session }
            | Event::Retransmit { session, .. }
            | Event::Ack { session }
            | Event::AckNoDelay { session }
            | Event::Syn { session, .. }
            | Event::SynAck { session, .. }
            | Event::Fin { session }
            | Event::Rst(Reset::Session { session, .. }) => Some(session),
            Event::Rst(Reset::Stray { .. }) => None,
        }
    }
}

/// Write and read counters of the two stages behind the event engine.
///
/// Timer and application events are admitted only while both pairs match, that is while nothing
/// forwarded earlier is still waiting in the ack delayer or before the transmit engine.
#[derive(Debug, Default)]
pub struct Credits {
    pub(crate) events_written: Cell<u64>,
    pub(crate) events_read: Cell<u64>,
    pub(crate) acks_written: Cell<u64>,
    pub(crate) acks_read: Cell<u64>,
}

impl Credits {
    /// Whether every forwarded event was consumed by both stages.
    pub fn drained(&self) -> bool {
        self.events_written.get() == self.events_read.get()
            && self.acks_written.get() == self.acks_read.get()
    }
}
