//! The receive side sequence bookkeeping.
//!
//! `rcvd` is the next expected sequence number, `appd` the next byte the application reads. At
//! most one out-of-order block `ooo_head..ooo_tail` beyond `rcvd` is tracked. Once the peer's FIN
//! is taken, `rcvd` includes its sequence slot but the stream does not.
use crate::error::{InternalError, Result};
use crate::link::Links;
use crate::wire::TcpSeqNumber;
use super::{PerSession, SessionId};

/// The receive state of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxSarEntry {
    pub rcvd: TcpSeqNumber,
    pub appd: TcpSeqNumber,
    pub ooo: bool,
    pub ooo_head: TcpSeqNumber,
    pub ooo_tail: TcpSeqNumber,
    pub fin: bool,
}

impl RxSarEntry {
    /// Bytes received in order but not yet read by the application.
    pub fn available(&self) -> usize {
        (self.rcvd - self.appd).saturating_sub(usize::from(self.fin))
    }

    /// The free space that may be advertised, in a buffer of `buffer_size` bytes.
    pub fn window(&self, buffer_size: usize) -> u16 {
        (buffer_size - 1).saturating_sub(self.available()) as u16
    }
}

/// An update of the receive engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxSarWrite {
    pub rcvd: TcpSeqNumber,
    /// Initialize the session, the application pointer follows `rcvd`.
    pub init: bool,
    /// A block of out-of-order data is held, otherwise the block collapses onto `rcvd`.
    pub ooo: bool,
    pub ooo_head: TcpSeqNumber,
    pub ooo_tail: TcpSeqNumber,
    /// The peer's FIN is in sequence, `rcvd` counts it.
    pub fin: bool,
}

/// A request of the receive engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxSarRequest {
    Read(SessionId),
    Write(SessionId, RxSarWrite),
}

/// A request of the receive application interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxSarApp {
    Read(SessionId),
    /// The application consumed everything before `appd`.
    Consume(SessionId, TcpSeqNumber),
}

/// Receive sequence state of all sessions.
#[derive(Debug)]
pub struct RxSarTable {
    entries: PerSession<RxSarEntry>,
    held_app: Option<RxSarApp>,
    held_rx: Option<RxSarRequest>,
}

impl RxSarTable {
    pub fn new(max_sessions: usize) -> Self {
        RxSarTable {
            entries: PerSession::new(max_sessions, RxSarEntry::default()),
            held_app: None,
            held_rx: None,
        }
    }

    pub fn read(&self, session: SessionId) -> Result<RxSarEntry> {
        Ok(*self.entries.get(session)?)
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.held_app.is_none() && self.held_rx.is_none()
    }

    /// Apply an update of the receive engine.
    pub fn write(&mut self, session: SessionId, write: RxSarWrite) -> Result<()> {
        let entry = self.entries.get_mut(session)?;
        entry.rcvd = write.rcvd;
        entry.fin = write.fin;
        if write.init {
            entry.appd = write.rcvd;
        }
        entry.ooo = write.ooo;
        if write.ooo {
            entry.ooo_head = write.ooo_head;
            entry.ooo_tail = write.ooo_tail;
        } else {
            entry.ooo_head = write.rcvd;
            entry.ooo_tail = write.rcvd;
        }
        Ok(())
    }

    /// Advance the application pointer, which must not pass the received data.
    pub fn consume(&mut self, session: SessionId, appd: TcpSeqNumber) -> Result<()> {
        let entry = self.entries.get_mut(session)?;
        let end = entry.appd + entry.available();
        if appd < entry.appd || end < appd {
            net_error!("session {}: app pointer {} outside {}..={}", session, appd, entry.appd, end);
            return Err(InternalError::AppPointerOverrun(session.raw()).into());
        }
        entry.appd = appd;
        Ok(())
    }

    /// One round: the transmit engine's query, then one mutation per session with the
    /// application ahead of the receive engine.
    pub(crate) fn poll(&mut self, links: &Links) -> Result<()> {
        if !links.rx_sar_tx_rsp.is_full() {
            if let Some(session) = links.rx_sar_tx_req.pop() {
                links.rx_sar_tx_rsp.push(self.read(session)?)?;
            }
        }

        let mut mutated = None;

        if !links.rx_sar_app_rsp.is_full() {
            if let Some(request) = self.held_app.take().or_else(|| links.rx_sar_app_req.pop()) {
                match request {
                    RxSarApp::Read(session) => links.rx_sar_app_rsp.push(self.read(session)?)?,
                    RxSarApp::Consume(session, appd) => {
                        self.consume(session, appd)?;
                        mutated = Some(session);
                    },
                }
            }
        }

        if !links.rx_sar_rx_rsp.is_full() {
            if let Some(request) = self.held_rx.take().or_else(|| links.rx_sar_rx_req.pop()) {
                match request {
                    RxSarRequest::Read(session) => links.rx_sar_rx_rsp.push(self.read(session)?)?,
                    RxSarRequest::Write(session, _) if mutated == Some(session) => {
                        self.held_rx = Some(request);
                    },
                    RxSarRequest::Write(session, write) => self.write(session, write)?,
                }
            }
        }

        Ok(())
    }
}
