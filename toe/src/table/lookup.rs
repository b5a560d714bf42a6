//! The session lookup controller.
//!
//! Maps four-tuples to session ids, owns the pool of free ids and the reverse table used by the
//! transmit engine to address outbound segments.
use std::collections::{HashMap, VecDeque};

use crate::error::Result;
use crate::link::Links;
use crate::stats::bump;
use super::{FourTuple, PerSession, SessionId, FIRST_EPHEMERAL_PORT};

/// Who asked for a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSource {
    /// Active open by the application.
    TxApp,
    /// An inbound segment.
    Rx,
}

/// Find the session of a four-tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupRequest {
    pub tuple: FourTuple,
    /// Reserve a new id on a miss.
    pub allow_create: bool,
}

/// The outcome of a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupReply {
    /// The session, absent on a miss that did not create one.
    pub session: Option<SessionId>,
    /// The session was reserved by this lookup.
    pub created: bool,
}

/// The four-tuple table with its free-id pool.
#[derive(Debug)]
pub struct SessionLookup {
    cam: HashMap<FourTuple, SessionId>,
    reverse: PerSession<Option<FourTuple>>,
    free: VecDeque<SessionId>,
}

impl SessionLookup {
    /// A table where every id is free.
    pub fn new(max_sessions: usize) -> Self {
        SessionLookup {
            cam: HashMap::with_capacity(max_sessions),
            reverse: PerSession::new(max_sessions, None),
            free: SessionId::all(max_sessions).collect(),
        }
    }

    /// Look up a tuple, reserving a free id on a miss when allowed.
    pub fn lookup(&mut self, request: LookupRequest) -> Result<LookupReply> {
        if let Some(&session) = self.cam.get(&request.tuple) {
            return Ok(LookupReply { session: Some(session), created: false });
        }

        if !request.allow_create {
            return Ok(LookupReply { session: None, created: false });
        }

        let session = match self.free.pop_front() {
            Some(session) => session,
            None => {
                net_debug!("no free session for {}", request.tuple);
                return Ok(LookupReply { session: None, created: false });
            },
        };

        *self.reverse.get_mut(session)? = Some(request.tuple);
        self.cam.insert(request.tuple, session);
        net_trace!("session {} registered for {}", session, request.tuple);
        Ok(LookupReply { session: Some(session), created: true })
    }

    /// The tuple of a registered session.
    pub fn reverse(&self, session: SessionId) -> Result<Option<FourTuple>> {
        Ok(*self.reverse.get(session)?)
    }

    /// Invalidate a session and recycle its id.
    ///
    /// Returns the tuple that was registered. Releasing an id twice has no effect.
    pub fn release(&mut self, session: SessionId) -> Result<Option<FourTuple>> {
        let tuple = match self.reverse.get_mut(session)?.take() {
            Some(tuple) => tuple,
            None => {
                net_warn!("release of unregistered session {}", session);
                return Ok(None);
            },
        };
        self.cam.remove(&tuple);
        self.free.push_back(session);
        net_trace!("session {} released from {}", session, tuple);
        Ok(Some(tuple))
    }

    /// The number of ids in the free pool.
    pub fn free_ids(&self) -> usize {
        self.free.len()
    }

    /// One round: a single lookup with application requests taking precedence, a reverse lookup
    /// and a release.
    pub(crate) fn poll(&mut self, links: &Links) -> Result<()> {
        let app_turn = !links.app_lookup_req.is_empty() && !links.app_lookup_rsp.is_full();
        let rx_turn = !links.rx_lookup_req.is_empty() && !links.rx_lookup_rsp.is_full();

        let (source, request) = if app_turn {
            (LookupSource::TxApp, links.app_lookup_req.pop())
        } else if rx_turn {
            (LookupSource::Rx, links.rx_lookup_req.pop())
        } else {
            (LookupSource::Rx, None)
        };

        if let Some(request) = request {
            let reply = self.lookup(request)?;
            if reply.created {
                bump(&links.counters.sessions_registered);
            }
            match source {
                LookupSource::TxApp => links.app_lookup_rsp.push(reply)?,
                LookupSource::Rx => links.rx_lookup_rsp.push(reply)?,
            }
        }

        if !links.reverse_rsp.is_full() {
            if let Some(session) = links.reverse_req.pop() {
                links.reverse_rsp.push(self.reverse(session)?)?;
            }
        }

        if !links.port_release.is_full() {
            if let Some(session) = links.session_release.pop() {
                if let Some(tuple) = self.release(session)? {
                    bump(&links.counters.sessions_released);
                    if tuple.local_port >= FIRST_EPHEMERAL_PORT {
                        links.port_release.push(tuple.local_port)?;
                    }
                }
            }
        }

        Ok(())
    }
}
