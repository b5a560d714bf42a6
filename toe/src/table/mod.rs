//! The per-session tables and their request/reply processes.
//!
//! Each table is owned by exactly one process and reached only through the queues in
//! [`Links`](../link/struct.Links.html). Per-session storage is a vector indexed by a validated
//! [`SessionId`].
use core::fmt;

use crate::wire::Ipv4Address;
use crate::error::InternalError;

mod lookup;
mod port;
mod rx_sar;
mod state;
mod tx_sar;

#[cfg(test)]
mod tests;

pub use self::lookup::{LookupReply, LookupRequest, LookupSource, SessionLookup};
pub use self::port::{PortState, PortTable, FIRST_EPHEMERAL_PORT};
pub use self::rx_sar::{RxSarApp, RxSarEntry, RxSarRequest, RxSarTable, RxSarWrite};
pub use self::state::{StateAccess, StateClient, StateRequest, StateTable, TcpState};
pub use self::tx_sar::{AckPush, AppPush, Retry, TxAck, TxSarEntry, TxSarRx, TxSarTable, TxSarTx, TxWrite};
pub(crate) use self::tx_sar::TxDefaults;

/// The index of a session in every per-session table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u16);

impl SessionId {
    /// Wrap a raw id, checking it against the number of sessions.
    pub fn new(raw: u16, max_sessions: usize) -> Result<Self, InternalError> {
        if usize::from(raw) < max_sessions {
            Ok(SessionId(raw))
        } else {
            Err(InternalError::InvalidSession(raw))
        }
    }

    /// Enumerate all ids of a table with `max_sessions` entries.
    pub(crate) fn all(max_sessions: usize) -> impl Iterator<Item=SessionId> {
        (0..max_sessions).map(|raw| SessionId(raw as u16))
    }

    /// The raw id.
    pub fn raw(self) -> u16 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The connection identification of a session, seen from this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourTuple {
    pub local: Ipv4Address,
    pub local_port: u16,
    pub remote: Ipv4Address,
    pub remote_port: u16,
}

impl fmt::Display for FourTuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{} <-> {}:{}", self.local, self.local_port, self.remote, self.remote_port)
    }
}

/// Per-session storage that refuses ids outside of its range.
#[derive(Debug)]
pub(crate) struct PerSession<T> {
    entries: Vec<T>,
}

impl<T: Clone> PerSession<T> {
    pub(crate) fn new(max_sessions: usize, init: T) -> Self {
        PerSession { entries: vec![init; max_sessions] }
    }
}

impl<T> PerSession<T> {
    pub(crate) fn get(&self, session: SessionId) -> Result<&T, InternalError> {
        self.entries.get(session.index())
            .ok_or(InternalError::InvalidSession(session.raw()))
    }

    pub(crate) fn get_mut(&mut self, session: SessionId) -> Result<&mut T, InternalError> {
        self.entries.get_mut(session.index())
            .ok_or(InternalError::InvalidSession(session.raw()))
    }
}
