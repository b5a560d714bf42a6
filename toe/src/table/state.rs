//! The TCP state table.
//!
//! Reads by the connection setup path and the receive engine lock their session until the same
//! client writes it back. Any other client's request for a locked session is parked in that
//! client's single deferred slot and retried before the client's next new request.
use crate::error::Result;
use crate::fifo::Fifo;
use crate::link::Links;
use super::{PerSession, SessionId};

/// The states of RFC 793, without `LISTEN` which is tracked per port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TcpState {
    Closed,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    Closing,
    TimeWait,
    CloseWait,
    LastAck,
}

impl TcpState {
    /// Whether data may still be queued for sending.
    pub fn may_send(self) -> bool {
        match self {
            TcpState::Established | TcpState::CloseWait => true,
            _ => false,
        }
    }
}

/// The clients of the table, in order of priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateClient {
    /// Active opens and closes of the application interface.
    TxConnect,
    /// Send requests of the application interface.
    TxStream,
    /// The receive engine.
    Rx,
    /// Close commands of the retransmit and close timers.
    TimerClose,
}

impl StateClient {
    fn locks(self) -> bool {
        match self {
            StateClient::TxConnect | StateClient::Rx => true,
            StateClient::TxStream | StateClient::TimerClose => false,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Read a session's state, or write it when `write` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateRequest {
    pub session: SessionId,
    pub write: Option<TcpState>,
}

impl StateRequest {
    pub fn read(session: SessionId) -> Self {
        StateRequest { session, write: None }
    }

    pub fn write(session: SessionId, state: TcpState) -> Self {
        StateRequest { session, write: Some(state) }
    }
}

/// The effect of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateAccess {
    /// The current state, the session is locked if the client locks.
    Read(TcpState),
    /// The state was stored. `released` is set when it newly became `Closed`.
    Written { released: bool },
    /// Another client holds the session, try again later.
    Deferred,
}

const CLIENTS: [StateClient; 4] = [
    StateClient::TxConnect,
    StateClient::TxStream,
    StateClient::Rx,
    StateClient::TimerClose,
];

/// Per-session TCP state with lock-and-defer arbitration.
#[derive(Debug)]
pub struct StateTable {
    states: PerSession<TcpState>,
    locks: PerSession<Option<StateClient>>,
    deferred: [Option<StateRequest>; 4],
}

impl StateTable {
    pub fn new(max_sessions: usize) -> Self {
        StateTable {
            states: PerSession::new(max_sessions, TcpState::Closed),
            locks: PerSession::new(max_sessions, None),
            deferred: [None; 4],
        }
    }

    /// Apply a request of `client`.
    pub fn access(&mut self, client: StateClient, request: StateRequest) -> Result<StateAccess> {
        let lock = *self.locks.get(request.session)?;
        if let Some(holder) = lock {
            if holder != client {
                return Ok(StateAccess::Deferred);
            }
        }

        match request.write {
            None => {
                if client.locks() {
                    *self.locks.get_mut(request.session)? = Some(client);
                }
                Ok(StateAccess::Read(*self.states.get(request.session)?))
            },
            Some(next) => {
                let state = self.states.get_mut(request.session)?;
                let released = next == TcpState::Closed && *state != TcpState::Closed;
                net_trace!("session {} {:?} -> {:?}", request.session, *state, next);
                *state = next;
                *self.locks.get_mut(request.session)? = None;
                Ok(StateAccess::Written { released })
            },
        }
    }

    /// Whether no request waits in a deferred slot.
    pub(crate) fn is_idle(&self) -> bool {
        self.deferred.iter().all(Option::is_none)
    }

    /// The stored state, bypassing arbitration.
    pub fn peek(&self, session: SessionId) -> Result<TcpState> {
        Ok(*self.states.get(session)?)
    }

    /// One round: at most one request per client in priority order.
    pub(crate) fn poll(&mut self, links: &Links) -> Result<()> {
        for &client in CLIENTS.iter() {
            let (requests, replies) = match client {
                StateClient::TxConnect => (&links.state_connect_req, Some(&links.state_connect_rsp)),
                StateClient::TxStream => (&links.state_stream_req, Some(&links.state_stream_rsp)),
                StateClient::Rx => (&links.state_rx_req, Some(&links.state_rx_rsp)),
                StateClient::TimerClose => (&links.timer_close, None),
            };
            self.serve(client, requests, replies, links)?;
        }
        Ok(())
    }

    fn serve(
        &mut self,
        client: StateClient,
        requests: &Fifo<StateRequest>,
        replies: Option<&Fifo<TcpState>>,
        links: &Links,
    ) -> Result<()> {
        if replies.map_or(false, Fifo::is_full) || links.session_release.is_full() {
            return Ok(());
        }

        let request = match self.deferred[client.slot()].take() {
            Some(request) => request,
            None => match requests.pop() {
                Some(request) => request,
                None => return Ok(()),
            },
        };

        match self.access(client, request)? {
            StateAccess::Read(state) => match replies {
                Some(replies) => replies.push(state)?,
                None => net_warn!("{:?} read session {} without a reply queue", client, request.session),
            },
            StateAccess::Written { released } => if released {
                links.session_release.push(request.session)?;
            },
            StateAccess::Deferred => {
                net_trace!("{:?} deferred on session {}", client, request.session);
                self.deferred[client.slot()] = Some(request);
            },
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u16) -> SessionId {
        SessionId::new(raw, 4).unwrap()
    }

    #[test]
    fn lock_defers_other_clients() {
        let mut table = StateTable::new(4);
        let read = table.access(StateClient::Rx, StateRequest::read(id(1))).unwrap();
        assert_eq!(read, StateAccess::Read(TcpState::Closed));

        let blocked = table.access(StateClient::TxConnect, StateRequest::read(id(1))).unwrap();
        assert_eq!(blocked, StateAccess::Deferred);
        let close = table.access(StateClient::TimerClose, StateRequest::write(id(1), TcpState::Closed)).unwrap();
        assert_eq!(close, StateAccess::Deferred);

        // Other sessions are not affected.
        let other = table.access(StateClient::TxConnect, StateRequest::read(id(2))).unwrap();
        assert_eq!(other, StateAccess::Read(TcpState::Closed));

        let write = table.access(StateClient::Rx, StateRequest::write(id(1), TcpState::SynReceived)).unwrap();
        assert_eq!(write, StateAccess::Written { released: false });
        let retry = table.access(StateClient::TxConnect, StateRequest::read(id(1))).unwrap();
        assert_eq!(retry, StateAccess::Read(TcpState::SynReceived));
    }

    #[test]
    fn stream_reads_do_not_lock() {
        let mut table = StateTable::new(4);
        table.access(StateClient::TxStream, StateRequest::read(id(0))).unwrap();
        let rx = table.access(StateClient::Rx, StateRequest::read(id(0))).unwrap();
        assert_eq!(rx, StateAccess::Read(TcpState::Closed));
    }

    #[test]
    fn closing_releases_once() {
        let mut table = StateTable::new(4);
        table.access(StateClient::Rx, StateRequest::write(id(3), TcpState::LastAck)).unwrap();
        let first = table.access(StateClient::Rx, StateRequest::write(id(3), TcpState::Closed)).unwrap();
        assert_eq!(first, StateAccess::Written { released: true });
        let second = table.access(StateClient::TimerClose, StateRequest::write(id(3), TcpState::Closed)).unwrap();
        assert_eq!(second, StateAccess::Written { released: false });
    }
}
