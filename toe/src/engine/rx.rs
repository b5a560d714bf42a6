use core::ops::Range;

use crate::app::{ConnectStatus, Notification, OpenStatus};
use crate::config::Config;
use crate::error::Result;
use crate::event::{Event, Reset};
use crate::link::Links;
use crate::stats::bump;
use crate::storage::{write_circular, BufferMemory, Direction};
use crate::table::{
    FourTuple, LookupRequest, PortState, RxSarEntry, RxSarRequest, RxSarWrite, SessionId,
    StateRequest, TcpState, TxAck, TxSarEntry, TxSarRx,
};
use crate::timer::RetransmitClear;
use crate::wire::{IpProtocol, Ipv4Address, Ipv4Repr, TcpRepr, TcpSeqNumber};

/// Congestion window growth stops here.
const MAX_CONG_WINDOW: u32 = 1 << 30;

/// A parsed segment addressed to this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Segment {
    pub tuple: FourTuple,
    pub repr: TcpRepr,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
struct Replies {
    segment: Segment,
    session: SessionId,
    state: Option<TcpState>,
    rx: Option<RxSarEntry>,
    tx: Option<TxSarEntry>,
}

#[derive(Debug)]
enum Stage {
    Idle,
    Port(Segment),
    Lookup(Segment),
    Session(Replies),
}

/// Everything a segment changes, computed before anything is changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Outcome {
    /// Written back to the state table in any case, which unlocks the session.
    pub state: TcpState,
    pub rx_write: Option<RxSarWrite>,
    pub tx_update: Option<TxSarRx>,
    /// Store part of the payload, starting at this sequence number.
    pub store: Option<(TcpSeqNumber, Range<usize>)>,
    /// Clear the retransmit timer, stopping it when set.
    pub retransmit: Option<bool>,
    pub probe_clear: bool,
    pub close_timer: bool,
    pub ack_cancel: bool,
    pub events: Vec<Event>,
    pub notifications: Vec<Notification>,
    pub open: Option<ConnectStatus>,
}

impl Outcome {
    fn keep(state: TcpState) -> Self {
        Outcome {
            state,
            rx_write: None,
            tx_update: None,
            store: None,
            retransmit: None,
            probe_clear: false,
            close_timer: false,
            ack_cancel: false,
            events: Vec::new(),
            notifications: Vec::new(),
            open: None,
        }
    }
}

/// The receive engine.
///
/// Takes one frame at a time through validation, the port table and the session lookup, reads
/// the session's state and sequence entries and then applies the TCP rules to all of them at
/// once. A segment is fully handled before the next frame is taken.
#[derive(Debug)]
pub struct RxEngine {
    local_addr: Ipv4Address,
    buffer_size: usize,
    half_close: bool,
    stage: Stage,
}

impl RxEngine {
    pub fn new(config: &Config) -> Self {
        RxEngine {
            local_addr: config.local_addr,
            buffer_size: config.buffer_size,
            half_close: config.half_close,
            stage: Stage::Idle,
        }
    }

    /// Whether no segment is in flight through the stages.
    pub(crate) fn is_idle(&self) -> bool {
        match self.stage {
            Stage::Idle => true,
            _ => false,
        }
    }

    pub(crate) fn poll<M: BufferMemory + ?Sized>(&mut self, links: &Links, memory: &mut M) -> Result<()> {
        self.stage = match core::mem::replace(&mut self.stage, Stage::Idle) {
            Stage::Idle => self.accept(links)?,
            Stage::Port(segment) => {
                if links.rx_lookup_req.is_full() || links.rx_events.is_full() {
                    self.stage = Stage::Port(segment);
                    return Ok(());
                }
                match links.port_query_rsp.pop() {
                    Some(port) => self.on_port(links, segment, port)?,
                    None => Stage::Port(segment),
                }
            },
            Stage::Lookup(segment) => {
                let room = links.state_rx_req.has_room(1)
                    && links.rx_sar_rx_req.has_room(1)
                    && links.tx_sar_rx_req.has_room(1)
                    && !links.rx_events.is_full();
                if !room {
                    self.stage = Stage::Lookup(segment);
                    return Ok(());
                }
                match links.rx_lookup_rsp.pop() {
                    Some(reply) => self.on_lookup(links, segment, reply.session)?,
                    None => Stage::Lookup(segment),
                }
            },
            Stage::Session(mut replies) => {
                if replies.state.is_none() {
                    replies.state = links.state_rx_rsp.pop();
                }
                if replies.rx.is_none() {
                    replies.rx = links.rx_sar_rx_rsp.pop();
                }
                if replies.tx.is_none() {
                    replies.tx = links.tx_sar_rx_rsp.pop();
                }
                self.on_session(links, memory, replies)?
            },
        };
        Ok(())
    }

    fn accept(&self, links: &Links) -> Result<Stage> {
        if links.port_query_req.is_full() {
            return Ok(Stage::Idle);
        }
        let frame = match links.net_rx.pop() {
            Some(frame) => frame,
            None => return Ok(Stage::Idle),
        };

        match self.parse(&frame) {
            Ok(Some(segment)) => {
                bump(&links.counters.segments_received);
                net_trace!("rx {} {}", segment.tuple, segment.repr);
                links.port_query_req.push(segment.repr.dst_port)?;
                Ok(Stage::Port(segment))
            },
            Ok(None) => {
                bump(&links.counters.segments_dropped);
                Ok(Stage::Idle)
            },
            Err(err) => {
                net_debug!("rx frame dropped: {}", err);
                bump(&links.counters.segments_dropped);
                Ok(Stage::Idle)
            },
        }
    }

    /// Validate a frame, `None` when it is well-formed but not for us.
    fn parse(&self, frame: &[u8]) -> crate::wire::Result<Option<Segment>> {
        let (ip, ip_payload) = Ipv4Repr::parse(frame)?;
        if ip.protocol != IpProtocol::Tcp {
            net_debug!("rx dropped protocol {:?}", ip.protocol);
            return Ok(None);
        }
        if ip.dst_addr != self.local_addr {
            net_debug!("rx dropped, addressed to {}", ip.dst_addr);
            return Ok(None);
        }
        let (repr, payload) = TcpRepr::parse(ip_payload, ip.src_addr, ip.dst_addr)?;
        let tuple = FourTuple {
            local: ip.dst_addr,
            local_port: repr.dst_port,
            remote: ip.src_addr,
            remote_port: repr.src_port,
        };
        Ok(Some(Segment { tuple, repr, payload: payload.to_vec() }))
    }

    fn on_port(&self, links: &Links, segment: Segment, port: PortState) -> Result<Stage> {
        if port == PortState::Closed {
            return self.refuse(links, segment);
        }
        let flags = segment.repr.flags;
        let allow_create = port == PortState::Listening && flags.syn() && !flags.ack() && !flags.rst();
        links.rx_lookup_req.push(LookupRequest { tuple: segment.tuple, allow_create })?;
        Ok(Stage::Lookup(segment))
    }

    fn on_lookup(&self, links: &Links, segment: Segment, session: Option<SessionId>) -> Result<Stage> {
        let session = match session {
            Some(session) => session,
            None => return self.refuse(links, segment),
        };
        links.state_rx_req.push(StateRequest::read(session))?;
        links.rx_sar_rx_req.push(RxSarRequest::Read(session))?;
        links.tx_sar_rx_req.push(TxSarRx::Read(session))?;
        Ok(Stage::Session(Replies { segment, session, state: None, rx: None, tx: None }))
    }

    /// Answer a segment without session with a reset.
    fn refuse(&self, links: &Links, segment: Segment) -> Result<Stage> {
        if let Some(event) = stray_reset(&segment) {
            net_debug!("rx {}: no session, refused", segment.tuple);
            links.rx_events.push(event)?;
        }
        bump(&links.counters.segments_dropped);
        Ok(Stage::Idle)
    }

    fn on_session<M: BufferMemory + ?Sized>(&self, links: &Links, memory: &mut M, replies: Replies) -> Result<Stage> {
        let (state, rx, tx) = match (replies.state, replies.rx, replies.tx) {
            (Some(state), Some(rx), Some(tx)) => (state, rx, tx),
            _ => return Ok(Stage::Session(replies)),
        };

        let outcome = self.transition(replies.session, &replies.segment, state, &rx, &tx);
        if !fits(links, &outcome) {
            return Ok(Stage::Session(replies));
        }
        if outcome.state != state {
            net_debug!("session {}: {:?} -> {:?}", replies.session, state, outcome.state);
        }
        self.apply(links, memory, replies.session, &replies.segment, outcome)?;
        Ok(Stage::Idle)
    }

    fn apply<M: BufferMemory + ?Sized>(
        &self,
        links: &Links,
        memory: &mut M,
        session: SessionId,
        segment: &Segment,
        outcome: Outcome,
    ) -> Result<()> {
        if let Some((start, range)) = outcome.store {
            write_circular(memory, Direction::Rx, session, start, self.buffer_size, &segment.payload[range])?;
        }
        if let Some(write) = outcome.rx_write {
            links.rx_sar_rx_req.push(RxSarRequest::Write(session, write))?;
        }
        if let Some(update) = outcome.tx_update {
            links.tx_sar_rx_req.push(update)?;
        }
        links.state_rx_req.push(StateRequest::write(session, outcome.state))?;
        if let Some(stop) = outcome.retransmit {
            links.rt_clear.push(RetransmitClear { session, stop })?;
        }
        if outcome.probe_clear {
            links.probe_clear.push(session)?;
        }
        if outcome.close_timer {
            links.close_set.push(session)?;
        }
        if outcome.ack_cancel {
            links.ack_cancel.push(session)?;
        }
        for event in outcome.events {
            links.rx_events.push(event)?;
        }
        for notification in outcome.notifications {
            links.rx_notify.push(notification)?;
        }
        if let Some(status) = outcome.open {
            links.open_status.push(OpenStatus { session, status })?;
        }
        Ok(())
    }

    /// The effect of a segment on a session.
    pub(crate) fn transition(
        &self,
        session: SessionId,
        segment: &Segment,
        state: TcpState,
        rx: &RxSarEntry,
        tx: &TxSarEntry,
    ) -> Outcome {
        let repr = &segment.repr;
        let mut out = Outcome::keep(state);

        if repr.flags.rst() {
            self.on_reset(session, repr, rx, tx, &mut out);
        } else if repr.flags.syn() {
            on_syn(session, repr, rx, tx, &mut out);
        } else if let Some(ack) = repr.ack_number {
            if self.on_ack(session, segment, ack, tx, &mut out) {
                self.on_data(session, repr, rx, &mut out);
            }
        } else {
            net_debug!("session {}: segment without ACK dropped", session);
        }

        out
    }

    fn on_reset(&self, session: SessionId, repr: &TcpRepr, rx: &RxSarEntry, tx: &TxSarEntry, out: &mut Outcome) {
        match out.state {
            TcpState::Closed => (),
            TcpState::SynSent => {
                if repr.ack_number == Some(tx.unak) {
                    out.state = TcpState::Closed;
                    out.retransmit = Some(true);
                    out.open = Some(ConnectStatus::Refused);
                }
            },
            state => {
                let seq = repr.seq_number;
                if seq == rx.rcvd {
                    out.state = TcpState::Closed;
                    out.retransmit = Some(true);
                    out.probe_clear = true;
                    out.ack_cancel = true;
                    if state != TcpState::SynReceived {
                        out.notifications.push(Notification::Reset { session });
                    }
                } else if rx.rcvd < seq && seq - rx.rcvd < usize::from(rx.window(self.buffer_size)) {
                    // Inexact but in the window, the peer must prove it knows the sequence.
                    out.events.push(Event::AckNoDelay { session });
                }
            },
        }
    }

    /// Process the acknowledgement, returning whether the payload should be looked at.
    fn on_ack(&self, session: SessionId, segment: &Segment, ack: TcpSeqNumber, tx: &TxSarEntry, out: &mut Outcome) -> bool {
        let repr = &segment.repr;
        match out.state {
            TcpState::Closed => {
                out.events.push(Event::Rst(Reset::Session { session, seq: ack, ack: None }));
                return false;
            },
            TcpState::SynSent => {
                if ack != tx.unak {
                    out.events.push(Event::Rst(Reset::Session { session, seq: ack, ack: None }));
                }
                return false;
            },
            _ => (),
        }

        let sent = if tx.fin_sent { tx.appw + 1 } else { tx.appw };
        let sent = sent.max(tx.unak);
        if sent < ack {
            out.events.push(Event::AckNoDelay { session });
            return false;
        }

        if out.state == TcpState::SynReceived {
            if tx.ackd < ack {
                out.state = TcpState::Established;
                out.notifications.push(Notification::Accepted { session, tuple: segment.tuple });
            } else {
                out.events.push(Event::Rst(Reset::Session { session, seq: ack, ack: None }));
                return false;
            }
        }

        if tx.ackd < ack {
            on_new_ack(session, repr, ack, tx, out);
        } else if ack == tx.ackd {
            on_same_ack(session, repr, ack, tx, out);
        }
        true
    }

    fn on_data(&self, session: SessionId, repr: &TcpRepr, rx: &RxSarEntry, out: &mut Outcome) {
        let accepts = match out.state {
            TcpState::Established | TcpState::FinWait1 | TcpState::FinWait2 => true,
            _ => false,
        };
        let seq = repr.seq_number;
        let len = repr.payload_len;
        let window = usize::from(rx.window(self.buffer_size));

        let mut rcvd = rx.rcvd;
        let (mut ooo, mut head, mut tail) = (rx.ooo, rx.ooo_head, rx.ooo_tail);
        let mut changed = false;
        let mut ack_now = false;
        let mut ack_later = false;

        if len > 0 && accepts {
            if seq <= rx.rcvd {
                let skip = rx.rcvd - seq;
                if skip < len {
                    let take = (len - skip).min(window);
                    if take > 0 {
                        out.store = Some((rx.rcvd, skip..skip + take));
                        rcvd = rx.rcvd + take;
                        if ooo && rcvd >= head {
                            rcvd = rcvd.max(tail);
                            ooo = false;
                            ack_now = true;
                        }
                        out.notifications.push(Notification::Data { session, len: rcvd - rx.rcvd });
                        changed = true;
                        ack_later = true;
                    }
                    if take < len - skip {
                        ack_now = true;
                    }
                } else {
                    // Entirely old, the acknowledgement was lost.
                    ack_now = true;
                }
            } else {
                let end = seq + len;
                if (seq - rx.rcvd) + len <= window {
                    if !ooo {
                        out.store = Some((seq, 0..len));
                        ooo = true;
                        head = seq;
                        tail = end;
                        changed = true;
                    } else if seq <= tail && head <= end {
                        out.store = Some((seq, 0..len));
                        head = head.min(seq);
                        tail = tail.max(end);
                        changed = true;
                    } else {
                        net_debug!("session {}: second out-of-order block dropped", session);
                    }
                }
                ack_now = true;
            }
        }

        let mut fin = false;
        if repr.flags.fin() {
            if accepts && seq + len == rcvd {
                rcvd = rcvd + 1;
                fin = true;
                changed = true;
            } else {
                ack_now = true;
                if out.state == TcpState::TimeWait {
                    out.close_timer = true;
                }
            }
        }

        if changed {
            out.rx_write = Some(RxSarWrite { rcvd, init: false, ooo, ooo_head: head, ooo_tail: tail, fin: rx.fin || fin });
        }

        let mut fin_sent = false;
        if fin {
            out.notifications.push(Notification::PeerClosed { session });
            match out.state {
                TcpState::Established if self.half_close => {
                    out.state = TcpState::CloseWait;
                },
                TcpState::Established => {
                    out.state = TcpState::LastAck;
                    out.events.push(Event::Fin { session });
                    fin_sent = true;
                },
                TcpState::FinWait1 => out.state = TcpState::Closing,
                TcpState::FinWait2 => {
                    out.state = TcpState::TimeWait;
                    out.close_timer = true;
                },
                _ => (),
            }
            ack_now = true;
        }

        // A FIN of ours carries the acknowledgement.
        if fin_sent {
            return;
        }
        if ack_now {
            out.events.push(Event::AckNoDelay { session });
        } else if ack_later {
            out.events.push(Event::Ack { session });
        }
    }
}

fn on_syn(session: SessionId, repr: &TcpRepr, rx: &RxSarEntry, tx: &TxSarEntry, out: &mut Outcome) {
    let peer_mss = repr.max_seg_size;
    let peer_next = repr.seq_number + 1;
    let init = RxSarWrite { rcvd: peer_next, init: true, ooo: false, ooo_head: peer_next, ooo_tail: peer_next, fin: false };

    match (repr.ack_number, out.state) {
        (Some(ack), TcpState::SynSent) if ack == tx.unak => {
            out.state = TcpState::Established;
            out.rx_write = Some(init);
            out.tx_update = Some(TxSarRx::Ack(session, TxAck {
                ackd: ack,
                recv_window: repr.window_len,
                cong_window: tx.cong_window,
                slowstart_threshold: tx.slowstart_threshold,
                dup_acks: 0,
                fast_retransmitted: false,
                peer_mss,
            }));
            out.retransmit = Some(true);
            out.open = Some(ConnectStatus::Established);
            out.events.push(Event::AckNoDelay { session });
        },
        (Some(ack), TcpState::SynSent) | (Some(ack), TcpState::Closed) => {
            out.events.push(Event::Rst(Reset::Session { session, seq: ack, ack: None }));
        },
        (None, TcpState::Closed) => {
            out.state = TcpState::SynReceived;
            out.rx_write = Some(init);
            out.tx_update = Some(TxSarRx::Window { session, recv_window: repr.window_len, peer_mss });
            out.events.push(Event::SynAck { session, retry: false });
        },
        (None, TcpState::SynReceived) if peer_next == rx.rcvd => {
            out.events.push(Event::SynAck { session, retry: true });
        },
        (None, TcpState::SynSent) => {
            net_debug!("session {}: simultaneous open is not supported", session);
        },
        _ => out.events.push(Event::AckNoDelay { session }),
    }
}

fn on_new_ack(session: SessionId, repr: &TcpRepr, ack: TcpSeqNumber, tx: &TxSarEntry, out: &mut Outcome) {
    let acked = ack - tx.ackd;
    let mss = u32::from(tx.send_mss.max(1));
    let cong_window = if tx.fast_retransmitted {
        tx.slowstart_threshold
    } else if tx.cong_window < tx.slowstart_threshold {
        tx.cong_window.saturating_add((acked as u32).min(mss))
    } else {
        tx.cong_window.saturating_add((mss * mss / tx.cong_window.max(1)).max(1))
    }.min(MAX_CONG_WINDOW);

    out.tx_update = Some(TxSarRx::Ack(session, TxAck {
        ackd: ack,
        recv_window: repr.window_len,
        cong_window,
        slowstart_threshold: tx.slowstart_threshold,
        dup_acks: 0,
        fast_retransmitted: false,
        peer_mss: None,
    }));
    out.retransmit = Some(tx.unak <= ack);
    out.probe_clear = true;

    let after = TxSarEntry {
        ackd: ack,
        unak: tx.unak.max(ack),
        recv_window: repr.window_len,
        cong_window,
        ..*tx
    };
    if after.pending() > 0 || (after.fin_ready && after.unak == after.appw) {
        out.events.push(Event::Tx { session });
    }

    if tx.fin_sent && ack == tx.appw + 1 {
        match out.state {
            TcpState::FinWait1 => out.state = TcpState::FinWait2,
            TcpState::Closing => {
                out.state = TcpState::TimeWait;
                out.close_timer = true;
            },
            TcpState::LastAck => out.state = TcpState::Closed,
            _ => (),
        }
    }
}

fn on_same_ack(session: SessionId, repr: &TcpRepr, ack: TcpSeqNumber, tx: &TxSarEntry, out: &mut Outcome) {
    let window_changed = repr.window_len != tx.recv_window;
    let update = TxAck {
        ackd: ack,
        recv_window: repr.window_len,
        cong_window: tx.cong_window,
        slowstart_threshold: tx.slowstart_threshold,
        dup_acks: tx.dup_acks,
        fast_retransmitted: tx.fast_retransmitted,
        peer_mss: None,
    };

    if repr.payload_len == 0 && !repr.flags.fin() && !window_changed && tx.in_flight() > 0 {
        let dup_acks = tx.dup_acks.saturating_add(1);
        out.tx_update = Some(TxSarRx::Ack(session, TxAck { dup_acks, ..update }));
        if dup_acks == 3 {
            net_debug!("session {}: third duplicate ack of {}", session, ack);
            out.events.push(Event::Retransmit { session, fast: true });
        }
    } else if window_changed {
        out.tx_update = Some(TxSarRx::Ack(session, update));
        let after = TxSarEntry { recv_window: repr.window_len, ..*tx };
        if after.pending() > 0 && after.usable_window() > 0 {
            out.events.push(Event::Tx { session });
            out.probe_clear = true;
        }
    }
}

/// The reset answering a segment that reached no session, never one for a reset.
fn stray_reset(segment: &Segment) -> Option<Event> {
    let repr = &segment.repr;
    if repr.flags.rst() {
        return None;
    }
    let reset = match repr.ack_number {
        Some(ack) => Reset::Stray { tuple: segment.tuple, seq: ack, ack: None },
        None => Reset::Stray {
            tuple: segment.tuple,
            seq: TcpSeqNumber(0),
            ack: Some(repr.seq_number + repr.sequence_len()),
        },
    };
    Some(Event::Rst(reset))
}

/// Whether every queue has room for what the outcome pushes.
fn fits(links: &Links, outcome: &Outcome) -> bool {
    let one = |present: bool| if present { 1 } else { 0 };
    links.state_rx_req.has_room(1)
        && links.rx_sar_rx_req.has_room(one(outcome.rx_write.is_some()))
        && links.tx_sar_rx_req.has_room(one(outcome.tx_update.is_some()))
        && links.rt_clear.has_room(one(outcome.retransmit.is_some()))
        && links.probe_clear.has_room(one(outcome.probe_clear))
        && links.close_set.has_room(one(outcome.close_timer))
        && links.ack_cancel.has_room(one(outcome.ack_cancel))
        && links.rx_events.has_room(outcome.events.len())
        && links.rx_notify.has_room(outcome.notifications.len())
        && links.open_status.has_room(one(outcome.open.is_some()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::TcpFlags;

    fn config() -> Config {
        Config { max_sessions: 4, buffer_size: 1024, mss: 100, ..Config::default() }
    }

    fn id() -> SessionId {
        SessionId::new(1, 4).unwrap()
    }

    fn tuple() -> FourTuple {
        FourTuple {
            local: Ipv4Address::new(10, 0, 0, 1),
            local_port: 80,
            remote: Ipv4Address::new(10, 0, 0, 2),
            remote_port: 40000,
        }
    }

    fn segment(flags: &[&str], seq: i32, ack: Option<i32>, payload: &[u8]) -> Segment {
        let mut bits = TcpFlags::default();
        for flag in flags {
            match *flag {
                "syn" => bits.set_syn(true),
                "fin" => bits.set_fin(true),
                "rst" => bits.set_rst(true),
                other => panic!("unknown flag {}", other),
            }
        }
        bits.set_ack(ack.is_some());
        Segment {
            tuple: tuple(),
            repr: TcpRepr {
                src_port: 40000,
                dst_port: 80,
                flags: bits,
                seq_number: TcpSeqNumber(seq),
                ack_number: ack.map(TcpSeqNumber),
                window_len: 1000,
                max_seg_size: None,
                payload_len: payload.len(),
            },
            payload: payload.to_vec(),
        }
    }

    fn rx(rcvd: i32) -> RxSarEntry {
        let rcvd = TcpSeqNumber(rcvd);
        RxSarEntry { rcvd, appd: rcvd, ooo: false, ooo_head: rcvd, ooo_tail: rcvd, fin: false }
    }

    fn tx(ackd: i32, unak: i32, appw: i32) -> TxSarEntry {
        TxSarEntry {
            ackd: TcpSeqNumber(ackd),
            unak: TcpSeqNumber(unak),
            appw: TcpSeqNumber(appw),
            cong_window: 200,
            slowstart_threshold: 0xffff,
            recv_window: 1000,
            send_mss: 100,
            ..TxSarEntry::default()
        }
    }

    #[test]
    fn passive_open() {
        let engine = RxEngine::new(&config());
        let out = engine.transition(id(), &segment(&["syn"], 999, None, &[]), TcpState::Closed, &rx(0), &tx(0, 0, 0));
        assert_eq!(out.state, TcpState::SynReceived);
        assert_eq!(out.rx_write.map(|write| (write.rcvd, write.init)), Some((TcpSeqNumber(1000), true)));
        assert_eq!(out.events, vec![Event::SynAck { session: id(), retry: false }]);

        // The handshake completes with the acknowledgement of our SYN.
        let out = engine.transition(id(), &segment(&[], 1000, Some(501), &[]), TcpState::SynReceived, &rx(1000), &tx(500, 501, 501));
        assert_eq!(out.state, TcpState::Established);
        assert_eq!(out.notifications, vec![Notification::Accepted { session: id(), tuple: tuple() }]);
        assert_eq!(out.retransmit, Some(true));
        assert!(out.events.is_empty());
    }

    #[test]
    fn active_open() {
        let engine = RxEngine::new(&config());
        let out = engine.transition(id(), &segment(&["syn"], 7000, Some(101), &[]), TcpState::SynSent, &rx(0), &tx(100, 101, 101));
        assert_eq!(out.state, TcpState::Established);
        assert_eq!(out.open, Some(ConnectStatus::Established));
        assert_eq!(out.events, vec![Event::AckNoDelay { session: id() }]);

        let out = engine.transition(id(), &segment(&["syn"], 7000, Some(555), &[]), TcpState::SynSent, &rx(0), &tx(100, 101, 101));
        assert_eq!(out.state, TcpState::SynSent);
        assert_eq!(out.events, vec![Event::Rst(Reset::Session { session: id(), seq: TcpSeqNumber(555), ack: None })]);
    }

    #[test]
    fn in_order_data_is_stored_and_delayed_ack() {
        let engine = RxEngine::new(&config());
        let out = engine.transition(id(), &segment(&[], 1000, Some(501), b"hello"), TcpState::Established, &rx(1000), &tx(501, 501, 501));
        assert_eq!(out.store, Some((TcpSeqNumber(1000), 0..5)));
        assert_eq!(out.rx_write.map(|write| write.rcvd), Some(TcpSeqNumber(1005)));
        assert_eq!(out.notifications, vec![Notification::Data { session: id(), len: 5 }]);
        assert_eq!(out.events, vec![Event::Ack { session: id() }]);
    }

    #[test]
    fn out_of_order_block_merges() {
        let engine = RxEngine::new(&config());
        let ahead = engine.transition(id(), &segment(&[], 1010, Some(501), b"world"), TcpState::Established, &rx(1000), &tx(501, 501, 501));
        let write = ahead.rx_write.unwrap();
        assert!(write.ooo);
        assert_eq!((write.rcvd, write.ooo_head, write.ooo_tail), (TcpSeqNumber(1000), TcpSeqNumber(1010), TcpSeqNumber(1015)));
        assert_eq!(ahead.events, vec![Event::AckNoDelay { session: id() }]);
        assert!(ahead.notifications.is_empty());

        let entry = RxSarEntry { ooo: true, ooo_head: TcpSeqNumber(1010), ooo_tail: TcpSeqNumber(1015), ..rx(1000) };
        let fill = engine.transition(id(), &segment(&[], 1000, Some(501), b"0123456789"), TcpState::Established, &entry, &tx(501, 501, 501));
        let write = fill.rx_write.unwrap();
        assert!(!write.ooo);
        assert_eq!(write.rcvd, TcpSeqNumber(1015));
        assert_eq!(fill.notifications, vec![Notification::Data { session: id(), len: 15 }]);
        assert_eq!(fill.events, vec![Event::AckNoDelay { session: id() }]);
    }

    #[test]
    fn peer_fin_closes_by_default() {
        let engine = RxEngine::new(&config());
        let out = engine.transition(id(), &segment(&["fin"], 1000, Some(501), &[]), TcpState::Established, &rx(1000), &tx(501, 501, 501));
        assert_eq!(out.state, TcpState::LastAck);
        assert_eq!(out.rx_write.map(|write| (write.rcvd, write.fin)), Some((TcpSeqNumber(1001), true)));
        assert_eq!(out.events, vec![Event::Fin { session: id() }]);
        assert_eq!(out.notifications, vec![Notification::PeerClosed { session: id() }]);

        let engine = RxEngine::new(&Config { half_close: true, ..config() });
        let out = engine.transition(id(), &segment(&["fin"], 1000, Some(501), &[]), TcpState::Established, &rx(1000), &tx(501, 501, 501));
        assert_eq!(out.state, TcpState::CloseWait);
        assert_eq!(out.events, vec![Event::AckNoDelay { session: id() }]);
    }

    #[test]
    fn last_ack_closes() {
        let engine = RxEngine::new(&config());
        let mut entry = tx(501, 502, 501);
        entry.fin_sent = true;
        let out = engine.transition(id(), &segment(&[], 1001, Some(502), &[]), TcpState::LastAck, &rx(1001), &entry);
        assert_eq!(out.state, TcpState::Closed);
        assert_eq!(out.retransmit, Some(true));
    }

    #[test]
    fn third_duplicate_ack_retransmits() {
        let engine = RxEngine::new(&config());
        let mut entry = tx(501, 801, 801);
        let mut fast = vec![];
        for _ in 0..4 {
            let out = engine.transition(id(), &segment(&[], 1000, Some(501), &[]), TcpState::Established, &rx(1000), &entry);
            if let Some(TxSarRx::Ack(_, update)) = out.tx_update {
                entry.dup_acks = update.dup_acks;
            }
            fast.push(out.events.contains(&Event::Retransmit { session: id(), fast: true }));
        }
        assert_eq!(fast, vec![false, false, true, false]);
    }

    #[test]
    fn new_ack_grows_window_and_sends() {
        let engine = RxEngine::new(&config());
        let out = engine.transition(id(), &segment(&[], 1000, Some(601), &[]), TcpState::Established, &rx(1000), &tx(501, 701, 901));
        match out.tx_update {
            Some(TxSarRx::Ack(_, update)) => {
                assert_eq!(update.cong_window, 300);
                assert_eq!(update.ackd, TcpSeqNumber(601));
            },
            other => panic!("unexpected {:?}", other),
        }
        // Data remains in flight, the timer restarts.
        assert_eq!(out.retransmit, Some(false));
        assert_eq!(out.events, vec![Event::Tx { session: id() }]);
    }

    #[test]
    fn resets() {
        let engine = RxEngine::new(&config());
        let exact = engine.transition(id(), &segment(&["rst"], 1000, None, &[]), TcpState::Established, &rx(1000), &tx(501, 501, 501));
        assert_eq!(exact.state, TcpState::Closed);
        assert_eq!(exact.notifications, vec![Notification::Reset { session: id() }]);

        let inexact = engine.transition(id(), &segment(&["rst"], 1200, None, &[]), TcpState::Established, &rx(1000), &tx(501, 501, 501));
        assert_eq!(inexact.state, TcpState::Established);
        assert_eq!(inexact.events, vec![Event::AckNoDelay { session: id() }]);

        let outside = engine.transition(id(), &segment(&["rst"], 9000, None, &[]), TcpState::Established, &rx(1000), &tx(501, 501, 501));
        assert_eq!(outside, Outcome::keep(TcpState::Established));
    }

    #[test]
    fn stray_segments() {
        let syn = segment(&["syn"], 41, None, &[]);
        assert_eq!(stray_reset(&syn), Some(Event::Rst(Reset::Stray {
            tuple: tuple(),
            seq: TcpSeqNumber(0),
            ack: Some(TcpSeqNumber(42)),
        })));
        let ack = segment(&[], 41, Some(77), b"x");
        assert_eq!(stray_reset(&ack), Some(Event::Rst(Reset::Stray { tuple: tuple(), seq: TcpSeqNumber(77), ack: None })));
        assert_eq!(stray_reset(&segment(&["rst"], 41, None, &[])), None);
    }
}
