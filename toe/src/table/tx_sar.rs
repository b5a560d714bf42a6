//! The transmit side sequence bookkeeping.
//!
//! `ackd` is the oldest unacknowledged byte, `unak` the next byte to send and `appw` the end of
//! the data written by the application. `unak` exceeds `appw` by one once a FIN was sent.
use crate::error::Result;
use crate::link::Links;
use crate::wire::TcpSeqNumber;
use super::{PerSession, SessionId};

/// The transmit state of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxSarEntry {
    pub ackd: TcpSeqNumber,
    pub unak: TcpSeqNumber,
    pub appw: TcpSeqNumber,
    pub cong_window: u32,
    pub slowstart_threshold: u32,
    pub recv_window: u16,
    /// Segment size, the smaller of ours and the peer's announcement.
    pub send_mss: u16,
    pub dup_acks: u8,
    pub fast_retransmitted: bool,
    pub fin_ready: bool,
    pub fin_sent: bool,
}

impl TxSarEntry {
    /// Sequence space sent but not acknowledged.
    pub fn in_flight(&self) -> usize {
        if self.ackd < self.unak { self.unak - self.ackd } else { 0 }
    }

    /// Data written by the application but not yet sent.
    pub fn pending(&self) -> usize {
        if self.unak < self.appw { self.appw - self.unak } else { 0 }
    }

    /// Data written by the application and not acknowledged.
    pub fn unacknowledged_data(&self) -> usize {
        if self.ackd < self.appw { self.appw - self.ackd } else { 0 }
    }

    /// How much more may be sent, never negative.
    pub fn usable_window(&self) -> usize {
        let window = self.cong_window.min(u32::from(self.recv_window)) as usize;
        window.saturating_sub(self.in_flight())
    }

    /// Whether only the peer's window keeps pending data from being sent.
    pub fn peer_window_closed(&self) -> bool {
        usize::from(self.recv_window) <= self.in_flight()
    }
}

/// Congestion reaction accompanying a retransmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// The retransmission timer expired, restart from one segment.
    Timeout,
    /// Three duplicate acknowledgements, enter fast recovery.
    Fast,
}

/// An update of the transmit engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxWrite {
    /// The new next byte to send.
    pub unak: Option<TcpSeqNumber>,
    /// The application closed while data was still pending.
    pub fin_ready: bool,
    pub fin_sent: bool,
    pub retry: Option<Retry>,
}

/// A request of the transmit engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxSarTx {
    Read(SessionId),
    /// Start a session at an initial sequence number, replies with the new entry.
    ///
    /// A passive open keeps the peer window learned from the SYN.
    Init { session: SessionId, isn: TcpSeqNumber, passive: bool },
    Write(SessionId, TxWrite),
}

/// An update of the receive engine after an acceptable acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxAck {
    pub ackd: TcpSeqNumber,
    pub recv_window: u16,
    pub cong_window: u32,
    pub slowstart_threshold: u32,
    pub dup_acks: u8,
    pub fast_retransmitted: bool,
    pub peer_mss: Option<u16>,
}

/// A request of the receive engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxSarRx {
    Read(SessionId),
    /// The peer's window from its SYN, before the session is initialized.
    Window { session: SessionId, recv_window: u16, peer_mss: Option<u16> },
    Ack(SessionId, TxAck),
}

/// New data written by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppPush {
    pub session: SessionId,
    pub appw: TcpSeqNumber,
}

/// Acknowledgement progress pushed to the application interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPush {
    pub session: SessionId,
    pub ackd: TcpSeqNumber,
    /// Set when the session was initialized, the application pointer starts here.
    pub init: Option<TcpSeqNumber>,
}

/// Parameters of fresh sessions.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TxDefaults {
    pub mss: u16,
    pub initial_window: u16,
    pub initial_ssthresh: u32,
}

/// Transmit sequence state of all sessions.
#[derive(Debug)]
pub struct TxSarTable {
    entries: PerSession<TxSarEntry>,
    defaults: TxDefaults,
    held_app: Option<AppPush>,
    held_rx: Option<TxSarRx>,
}

impl TxSarTable {
    pub(crate) fn new(max_sessions: usize, defaults: TxDefaults) -> Self {
        TxSarTable {
            entries: PerSession::new(max_sessions, TxSarEntry::default()),
            defaults,
            held_app: None,
            held_rx: None,
        }
    }

    pub fn read(&self, session: SessionId) -> Result<TxSarEntry> {
        Ok(*self.entries.get(session)?)
    }

    /// Reset a session to its initial sequence number. The SYN occupies `isn`.
    pub fn init(&mut self, session: SessionId, isn: TcpSeqNumber, passive: bool) -> Result<TxSarEntry> {
        let defaults = self.defaults;
        let entry = self.entries.get_mut(session)?;
        let (recv_window, send_mss) = if passive {
            (entry.recv_window, entry.send_mss)
        } else {
            (defaults.mss, defaults.mss)
        };
        *entry = TxSarEntry {
            ackd: isn,
            unak: isn + 1,
            appw: isn + 1,
            cong_window: u32::from(defaults.initial_window) * u32::from(send_mss),
            slowstart_threshold: defaults.initial_ssthresh,
            recv_window,
            send_mss,
            dup_acks: 0,
            fast_retransmitted: false,
            fin_ready: false,
            fin_sent: false,
        };
        Ok(*entry)
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.held_app.is_none() && self.held_rx.is_none()
    }

    /// Apply an update of the transmit engine.
    pub fn write(&mut self, session: SessionId, write: TxWrite) -> Result<()> {
        let entry = self.entries.get_mut(session)?;
        let mss = u32::from(entry.send_mss);
        match write.retry {
            Some(Retry::Timeout) => {
                entry.slowstart_threshold = (entry.in_flight() as u32 / 2).max(2 * mss);
                entry.cong_window = mss;
                entry.dup_acks = 0;
                entry.fast_retransmitted = false;
            },
            Some(Retry::Fast) => {
                entry.slowstart_threshold = (entry.in_flight() as u32 / 2).max(2 * mss);
                entry.cong_window = entry.slowstart_threshold + 3 * mss;
                entry.fast_retransmitted = true;
            },
            None => (),
        }
        if let Some(unak) = write.unak {
            entry.unak = unak;
        }
        entry.fin_ready |= write.fin_ready;
        entry.fin_sent |= write.fin_sent;
        Ok(())
    }

    /// Record the peer window of a SYN.
    pub fn window(&mut self, session: SessionId, recv_window: u16, peer_mss: Option<u16>) -> Result<()> {
        let mss = self.defaults.mss;
        let entry = self.entries.get_mut(session)?;
        entry.recv_window = recv_window;
        entry.send_mss = peer_mss.map_or(mss, |peer| peer.min(mss).max(1));
        Ok(())
    }

    /// Apply an acknowledgement.
    pub fn ack(&mut self, session: SessionId, ack: TxAck) -> Result<()> {
        let mss = self.defaults.mss;
        let entry = self.entries.get_mut(session)?;
        entry.ackd = ack.ackd;
        // A go-back retransmission may have rewound `unak` behind the peer's acknowledgement.
        entry.unak = entry.unak.max(ack.ackd);
        entry.recv_window = ack.recv_window;
        entry.cong_window = ack.cong_window;
        entry.slowstart_threshold = ack.slowstart_threshold;
        entry.dup_acks = ack.dup_acks;
        entry.fast_retransmitted = ack.fast_retransmitted;
        if let Some(peer) = ack.peer_mss {
            entry.send_mss = peer.min(mss).max(1);
        }
        Ok(())
    }

    /// Record data written by the application.
    pub fn push(&mut self, push: AppPush) -> Result<()> {
        self.entries.get_mut(push.session)?.appw = push.appw;
        Ok(())
    }

    /// One round: the transmit engine, the application and the receive engine in this order, each
    /// mutating a session at most once.
    pub(crate) fn poll(&mut self, links: &Links) -> Result<()> {
        let mut mutated = None;

        if !links.tx_sar_tx_rsp.is_full() && !links.ack_push.is_full() {
            if let Some(request) = links.tx_sar_tx_req.pop() {
                match request {
                    TxSarTx::Read(session) => links.tx_sar_tx_rsp.push(self.read(session)?)?,
                    TxSarTx::Init { session, isn, passive } => {
                        let entry = self.init(session, isn, passive)?;
                        links.tx_sar_tx_rsp.push(entry)?;
                        links.ack_push.push(AckPush { session, ackd: entry.ackd, init: Some(entry.appw) })?;
                        mutated = Some(session);
                    },
                    TxSarTx::Write(session, write) => {
                        self.write(session, write)?;
                        mutated = Some(session);
                    },
                }
            }
        }

        let app_mutated = match self.held_app.take().or_else(|| links.tx_sar_app_push.pop()) {
            Some(push) if mutated == Some(push.session) => {
                self.held_app = Some(push);
                None
            },
            Some(push) => {
                self.push(push)?;
                Some(push.session)
            },
            None => None,
        };

        if !links.tx_sar_rx_rsp.is_full() && !links.ack_push.is_full() {
            if let Some(request) = self.held_rx.take().or_else(|| links.tx_sar_rx_req.pop()) {
                let session = match request {
                    TxSarRx::Read(session) => session,
                    TxSarRx::Window { session, .. } => session,
                    TxSarRx::Ack(session, _) => session,
                };
                let conflict = mutated == Some(session) || app_mutated == Some(session);
                match request {
                    TxSarRx::Read(session) => links.tx_sar_rx_rsp.push(self.read(session)?)?,
                    _ if conflict => self.held_rx = Some(request),
                    TxSarRx::Window { session, recv_window, peer_mss } => {
                        self.window(session, recv_window, peer_mss)?;
                    },
                    TxSarRx::Ack(session, ack) => {
                        self.ack(session, ack)?;
                        links.ack_push.push(AckPush { session, ackd: ack.ackd, init: None })?;
                    },
                }
            }
        }

        Ok(())
    }
}
