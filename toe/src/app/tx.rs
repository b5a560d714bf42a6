use std::collections::HashMap;

use crate::config::Config;
use crate::error::Result;
use crate::event::Event;
use crate::link::Links;
use crate::storage::{write_circular, BufferMemory, Direction};
use crate::table::{AppPush, FourTuple, LookupRequest, PerSession, SessionId, StateRequest, TcpState};
use crate::wire::{Ipv4Address, TcpSeqNumber};
use super::{AppResponse, ConnectRequest, ConnectStatus, SendRequest, SendStatus};

/// The interface's own view of a session's transmit buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Pointers {
    ackd: TcpSeqNumber,
    appw: TcpSeqNumber,
}

impl Pointers {
    fn free(&self, buffer_size: usize) -> usize {
        buffer_size.saturating_sub(self.appw - self.ackd)
    }
}

#[derive(Debug)]
enum Connect {
    Idle,
    Port { remote: Ipv4Address, port: u16 },
    Lookup { tuple: FourTuple },
    Open { session: SessionId, tuple: FourTuple },
    Close { session: SessionId },
}

#[derive(Debug)]
enum Stream {
    Idle,
    State(SendRequest),
}

/// Opens, closes and sends of the application.
///
/// Opens and closes walk through the port table, the session lookup and the state table one
/// reply at a time. Sends are checked against a local copy of the transmit pointers that the
/// transmit sequence table keeps up to date, so no round trip to that table is needed.
#[derive(Debug)]
pub struct TxAppInterface {
    local_addr: Ipv4Address,
    buffer_size: usize,
    pointers: PerSession<Pointers>,
    /// Active opens waiting for the handshake, by session.
    opening: HashMap<SessionId, (Ipv4Address, u16)>,
    connect: Connect,
    stream: Stream,
}

impl TxAppInterface {
    pub fn new(config: &Config) -> Self {
        TxAppInterface {
            local_addr: config.local_addr,
            buffer_size: config.buffer_size,
            pointers: PerSession::new(config.max_sessions, Pointers::default()),
            opening: HashMap::new(),
            connect: Connect::Idle,
            stream: Stream::Idle,
        }
    }

    /// The free transmit buffer of a session as last reported.
    pub fn writable(&self, session: SessionId) -> Result<usize> {
        Ok(self.pointers.get(session)?.free(self.buffer_size))
    }

    pub(crate) fn is_idle(&self) -> bool {
        match (&self.connect, &self.stream) {
            (Connect::Idle, Stream::Idle) => true,
            _ => false,
        }
    }

    pub(crate) fn poll<M: BufferMemory + ?Sized>(&mut self, links: &Links, memory: &mut M) -> Result<()> {
        while let Some(push) = links.ack_push.pop() {
            let pointers = self.pointers.get_mut(push.session)?;
            pointers.ackd = push.ackd;
            if let Some(appw) = push.init {
                pointers.appw = appw;
            }
        }

        self.poll_open_status(links)?;
        self.poll_connect(links)?;
        self.poll_stream(links, memory)
    }

    fn poll_open_status(&mut self, links: &Links) -> Result<()> {
        if let Some(status) = links.open_status.pop() {
            self.respond_open(links, status.session, status.status)?;
        }
        if let Some(session) = links.connect_failed.pop() {
            self.respond_open(links, session, ConnectStatus::TimedOut)?;
        }
        Ok(())
    }

    fn respond_open(&mut self, links: &Links, session: SessionId, status: ConnectStatus) -> Result<()> {
        match self.opening.remove(&session) {
            Some((remote, port)) => links.app_rsp.push(AppResponse::Connect {
                session: Some(session),
                remote,
                port,
                status,
            })?,
            None => net_debug!("open status {:?} for unknown session {}", status, session),
        }
        Ok(())
    }

    fn poll_connect(&mut self, links: &Links) -> Result<()> {
        // Every stage holds its input until the queues it feeds have room.
        let next = match core::mem::replace(&mut self.connect, Connect::Idle) {
            Connect::Idle if !(links.free_port_req.has_room(1) && links.state_connect_req.has_room(1)) => {
                Connect::Idle
            },
            Connect::Idle => match links.app_connect_req.pop() {
                Some(ConnectRequest::Open { remote, port }) => {
                    links.free_port_req.push(())?;
                    Connect::Port { remote, port }
                },
                Some(ConnectRequest::Close(session)) => {
                    links.state_connect_req.push(StateRequest::read(session))?;
                    Connect::Close { session }
                },
                None => Connect::Idle,
            },
            Connect::Port { remote, port } if !links.app_lookup_req.has_room(1) => Connect::Port { remote, port },
            Connect::Port { remote, port } => match links.free_port_rsp.pop() {
                None => Connect::Port { remote, port },
                Some(None) => {
                    net_debug!("no ephemeral port for {}:{}", remote, port);
                    links.app_rsp.push(AppResponse::Connect {
                        session: None,
                        remote,
                        port,
                        status: ConnectStatus::NoFreePort,
                    })?;
                    Connect::Idle
                },
                Some(Some(local_port)) => {
                    let tuple = FourTuple {
                        local: self.local_addr,
                        local_port,
                        remote,
                        remote_port: port,
                    };
                    links.app_lookup_req.push(LookupRequest { tuple, allow_create: true })?;
                    Connect::Lookup { tuple }
                },
            },
            Connect::Lookup { tuple } if !(links.state_connect_req.has_room(1) && links.port_release.has_room(1)) => {
                Connect::Lookup { tuple }
            },
            Connect::Lookup { tuple } => match links.app_lookup_rsp.pop() {
                None => Connect::Lookup { tuple },
                Some(reply) => match reply.session {
                    Some(session) if reply.created => {
                        links.state_connect_req.push(StateRequest::read(session))?;
                        Connect::Open { session, tuple }
                    },
                    session => {
                        let status = if session.is_none() {
                            links.port_release.push(tuple.local_port)?;
                            ConnectStatus::NoFreeSession
                        } else {
                            // The port belongs to the existing session.
                            ConnectStatus::Refused
                        };
                        links.app_rsp.push(AppResponse::Connect {
                            session: None,
                            remote: tuple.remote,
                            port: tuple.remote_port,
                            status,
                        })?;
                        Connect::Idle
                    },
                },
            },
            Connect::Open { session, tuple } if !self.can_decide(links) => Connect::Open { session, tuple },
            Connect::Open { session, tuple } => match links.state_connect_rsp.pop() {
                None => Connect::Open { session, tuple },
                Some(TcpState::Closed) => {
                    links.state_connect_req.push(StateRequest::write(session, TcpState::SynSent))?;
                    links.app_events.push(Event::Syn { session, retry: false })?;
                    self.opening.insert(session, (tuple.remote, tuple.remote_port));
                    net_debug!("session {}: opening {}", session, tuple);
                    Connect::Idle
                },
                Some(state) => {
                    links.state_connect_req.push(StateRequest::write(session, state))?;
                    links.app_rsp.push(AppResponse::Connect {
                        session: Some(session),
                        remote: tuple.remote,
                        port: tuple.remote_port,
                        status: ConnectStatus::Refused,
                    })?;
                    Connect::Idle
                },
            },
            Connect::Close { session } if !self.can_decide(links) => Connect::Close { session },
            Connect::Close { session } => match links.state_connect_rsp.pop() {
                None => Connect::Close { session },
                Some(state) => {
                    let next = match state {
                        TcpState::Established => TcpState::FinWait1,
                        TcpState::CloseWait => TcpState::LastAck,
                        other => {
                            net_debug!("session {}: close ignored in {:?}", session, other);
                            other
                        },
                    };
                    links.state_connect_req.push(StateRequest::write(session, next))?;
                    if next != state {
                        links.app_events.push(Event::Fin { session })?;
                    }
                    Connect::Idle
                },
            },
        };

        self.connect = next;
        Ok(())
    }

    /// Room for the state write and the event that follow a state reply.
    fn can_decide(&self, links: &Links) -> bool {
        links.state_connect_req.has_room(1) && links.app_events.has_room(1)
    }

    fn poll_stream<M: BufferMemory + ?Sized>(&mut self, links: &Links, memory: &mut M) -> Result<()> {
        let request = match core::mem::replace(&mut self.stream, Stream::Idle) {
            Stream::Idle => {
                if !links.state_stream_req.has_room(1) {
                    return Ok(());
                }
                if let Some(request) = links.app_send_req.pop() {
                    links.state_stream_req.push(StateRequest::read(request.session))?;
                    self.stream = Stream::State(request);
                }
                return Ok(());
            },
            Stream::State(request) => request,
        };

        if !(links.tx_sar_app_push.has_room(1) && links.app_events.has_room(1)) {
            self.stream = Stream::State(request);
            return Ok(());
        }

        let state = match links.state_stream_rsp.pop() {
            Some(state) => state,
            None => {
                self.stream = Stream::State(request);
                return Ok(());
            },
        };

        let session = request.session;
        let pointers = *self.pointers.get(session)?;
        let free = pointers.free(self.buffer_size);
        let len = request.data.len();

        let (accepted, status) = if !state.may_send() {
            (0, SendStatus::NoConnection)
        } else if len > free {
            (0, SendStatus::NoSpace)
        } else {
            (len, SendStatus::Ok)
        };

        if status == SendStatus::Ok && len > 0 {
            write_circular(memory, Direction::Tx, session, pointers.appw, self.buffer_size, &request.data)?;
            let appw = pointers.appw + len;
            self.pointers.get_mut(session)?.appw = appw;
            links.tx_sar_app_push.push(AppPush { session, appw })?;
            links.app_events.push(Event::Tx { session })?;
        }

        links.app_rsp.push(AppResponse::Send {
            session,
            accepted,
            max_writable: free - accepted,
            status,
        })?;
        Ok(())
    }
}
