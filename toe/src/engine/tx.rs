use crate::config::Config;
use crate::error::Result;
use crate::event::{Event, Reset};
use crate::link::Links;
use crate::stats::bump;
use crate::storage::{read_circular, BufferMemory, Direction};
use crate::table::{FourTuple, Retry, RxSarEntry, SessionId, TxSarEntry, TxSarTx, TxWrite};
use crate::time::Instant;
use crate::timer::{RetransmitKind, RetransmitSet};
use crate::wire::{IpProtocol, Ipv4Repr, TcpFlags, TcpRepr, TcpSeqNumber};
use super::IsnGenerator;

const HOP_LIMIT: u8 = 64;

#[derive(Debug)]
enum Stage {
    Idle,
    Lookup(Event),
    Meta {
        event: Event,
        tuple: FourTuple,
        need_rx: bool,
        rx: Option<RxSarEntry>,
        tx: Option<TxSarEntry>,
    },
    /// More segments of one session may be sent.
    Stream {
        session: SessionId,
        tuple: FourTuple,
        rx: RxSarEntry,
        tx: TxSarEntry,
    },
}

/// The transmit engine.
///
/// Turns one event at a time into segments. The connection is recovered with a reverse lookup
/// and the sequence state read from both tables. Data is fetched from the transmit buffer directly
/// into the outgoing frame, at most one segment per round.
#[derive(Debug)]
pub struct TxEngine {
    buffer_size: usize,
    max_window: u16,
    mss: u16,
    isn: IsnGenerator,
    stage: Stage,
}

impl TxEngine {
    pub fn new(config: &Config) -> Self {
        let isn = match config.isn_key {
            Some(key) => IsnGenerator::from_secret_key_bytes(key),
            None => IsnGenerator::from_std_hash(),
        };
        TxEngine {
            buffer_size: config.buffer_size,
            max_window: config.max_window(),
            mss: config.mss,
            isn,
            stage: Stage::Idle,
        }
    }

    /// Whether no event is being worked on.
    pub(crate) fn is_idle(&self) -> bool {
        match self.stage {
            Stage::Idle => true,
            _ => false,
        }
    }

    pub(crate) fn poll<M: BufferMemory + ?Sized>(&mut self, links: &Links, memory: &M, now: Instant) -> Result<()> {
        let room = links.net_tx.has_room(1)
            && links.tx_sar_tx_req.has_room(2)
            && links.rx_sar_tx_req.has_room(1)
            && links.reverse_req.has_room(1)
            && links.rt_set.has_room(1)
            && links.probe_set.has_room(1);
        if !room {
            return Ok(());
        }

        self.stage = match core::mem::replace(&mut self.stage, Stage::Idle) {
            Stage::Idle => match links.tx_events.pop() {
                Some(event) => {
                    bump(&links.credits.acks_read);
                    self.start(links, memory, event)?
                },
                None => Stage::Idle,
            },
            Stage::Lookup(event) => match links.reverse_rsp.pop() {
                Some(Some(tuple)) => self.read_meta(links, memory, event, tuple, now)?,
                Some(None) => {
                    net_debug!("{:?} for a released session dropped", event);
                    Stage::Idle
                },
                None => Stage::Lookup(event),
            },
            Stage::Meta { event, tuple, need_rx, mut rx, mut tx } => {
                if need_rx && rx.is_none() {
                    rx = links.rx_sar_tx_rsp.pop();
                }
                if tx.is_none() {
                    tx = links.tx_sar_tx_rsp.pop();
                }
                match (rx.or_else(|| if need_rx { None } else { Some(RxSarEntry::default()) }), tx) {
                    (Some(rx), Some(tx)) => self.dispatch(links, memory, event, tuple, rx, tx)?,
                    _ => Stage::Meta { event, tuple, need_rx, rx, tx },
                }
            },
            Stage::Stream { session, tuple, rx, tx } => self.transmit(links, memory, session, tuple, rx, tx)?,
        };

        Ok(())
    }

    fn start<M: BufferMemory + ?Sized>(&self, links: &Links, memory: &M, event: Event) -> Result<Stage> {
        match (event, event.session()) {
            (Event::Rst(Reset::Stray { tuple, seq, ack }), _) => {
                self.reset(links, memory, tuple, seq, ack)?;
                Ok(Stage::Idle)
            },
            (_, Some(session)) => {
                links.reverse_req.push(session)?;
                Ok(Stage::Lookup(event))
            },
            (_, None) => Ok(Stage::Idle),
        }
    }

    fn read_meta<M: BufferMemory + ?Sized>(
        &self,
        links: &Links,
        memory: &M,
        event: Event,
        tuple: FourTuple,
        now: Instant,
    ) -> Result<Stage> {
        let (session, tx_request, need_rx) = match event {
            Event::Rst(Reset::Session { seq, ack, .. }) => {
                self.reset(links, memory, tuple, seq, ack)?;
                return Ok(Stage::Idle);
            },
            Event::Rst(Reset::Stray { .. }) => return Ok(Stage::Idle),
            Event::Syn { session, retry: false } => {
                let isn = self.isn.get_isn(tuple, now);
                (session, TxSarTx::Init { session, isn, passive: false }, false)
            },
            Event::Syn { session, retry: true } => (session, TxSarTx::Read(session), false),
            Event::SynAck { session, retry: false } => {
                let isn = self.isn.get_isn(tuple, now);
                (session, TxSarTx::Init { session, isn, passive: true }, true)
            },
            Event::SynAck { session, retry: true }
            | Event::Tx { session }
            | Event::Retransmit { session, .. }
            | Event::Ack { session }
            | Event::AckNoDelay { session }
            | Event::Fin { session } => (session, TxSarTx::Read(session), true),
        };

        links.tx_sar_tx_req.push(tx_request)?;
        if need_rx {
            links.rx_sar_tx_req.push(session)?;
        }
        Ok(Stage::Meta { event, tuple, need_rx, rx: None, tx: None })
    }

    fn dispatch<M: BufferMemory + ?Sized>(
        &self,
        links: &Links,
        memory: &M,
        event: Event,
        tuple: FourTuple,
        rx: RxSarEntry,
        mut tx: TxSarEntry,
    ) -> Result<Stage> {
        match event {
            Event::Ack { .. } | Event::AckNoDelay { .. } => {
                let repr = self.repr(tuple, TcpFlags::default(), tx.unak, Some(rx.rcvd), rx.window(self.buffer_size), 0);
                self.emit(links, memory, tuple, repr, None)?;
                Ok(Stage::Idle)
            },
            Event::Syn { session, .. } => {
                let mut flags = TcpFlags::default();
                flags.set_syn(true);
                let mut repr = self.repr(tuple, flags, tx.ackd, None, self.max_window, 0);
                repr.max_seg_size = Some(self.mss);
                self.emit(links, memory, tuple, repr, None)?;
                links.rt_set.push(RetransmitSet { session, kind: RetransmitKind::Syn })?;
                Ok(Stage::Idle)
            },
            Event::SynAck { session, .. } => {
                let mut flags = TcpFlags::default();
                flags.set_syn(true);
                let mut repr = self.repr(tuple, flags, tx.ackd, Some(rx.rcvd), rx.window(self.buffer_size), 0);
                repr.max_seg_size = Some(self.mss);
                self.emit(links, memory, tuple, repr, None)?;
                links.rt_set.push(RetransmitSet { session, kind: RetransmitKind::SynAck })?;
                Ok(Stage::Idle)
            },
            Event::Fin { session } => {
                tx.fin_ready = true;
                if tx.pending() > 0 {
                    links.tx_sar_tx_req.push(TxSarTx::Write(session, TxWrite { fin_ready: true, ..TxWrite::default() }))?;
                }
                self.transmit(links, memory, session, tuple, rx, tx)
            },
            Event::Tx { session } => self.transmit(links, memory, session, tuple, rx, tx),
            Event::Retransmit { session, fast } => {
                self.retransmit(links, memory, session, tuple, rx, tx, fast)?;
                Ok(Stage::Idle)
            },
            Event::Rst(_) => Ok(Stage::Idle),
        }
    }

    /// Send the next segment of pending data, or the FIN once all data was sent.
    fn transmit<M: BufferMemory + ?Sized>(
        &self,
        links: &Links,
        memory: &M,
        session: SessionId,
        tuple: FourTuple,
        rx: RxSarEntry,
        mut tx: TxSarEntry,
    ) -> Result<Stage> {
        let pending = tx.pending();
        let window = rx.window(self.buffer_size);

        if pending == 0 {
            if tx.fin_ready && tx.unak == tx.appw {
                let mut flags = TcpFlags::default();
                flags.set_fin(true);
                let repr = self.repr(tuple, flags, tx.unak, Some(rx.rcvd), window, 0);
                self.emit(links, memory, tuple, repr, None)?;
                links.tx_sar_tx_req.push(TxSarTx::Write(session, TxWrite {
                    unak: Some(tx.unak + 1),
                    fin_ready: true,
                    fin_sent: true,
                    retry: None,
                }))?;
                links.rt_set.push(RetransmitSet { session, kind: RetransmitKind::Fin })?;
            }
            return Ok(Stage::Idle);
        }

        let usable = tx.usable_window();
        if usable == 0 {
            if tx.peer_window_closed() {
                net_trace!("session {}: peer window closed, probing", session);
                links.probe_set.push(session)?;
            }
            return Ok(Stage::Idle);
        }

        let len = pending.min(usable).min(usize::from(tx.send_mss.max(1)));
        let fin = tx.fin_ready && len == pending;
        let mut flags = TcpFlags::default();
        flags.set_psh(len == pending);
        flags.set_fin(fin);
        let repr = self.repr(tuple, flags, tx.unak, Some(rx.rcvd), window, len);
        self.emit(links, memory, tuple, repr, Some((session, tx.unak)))?;

        tx.unak = tx.unak + repr.sequence_len();
        tx.fin_sent |= fin;
        links.tx_sar_tx_req.push(TxSarTx::Write(session, TxWrite {
            unak: Some(tx.unak),
            fin_ready: tx.fin_ready,
            fin_sent: fin,
            retry: None,
        }))?;
        let kind = if fin { RetransmitKind::Fin } else { RetransmitKind::Data };
        links.rt_set.push(RetransmitSet { session, kind })?;

        if tx.pending() > 0 && tx.usable_window() > 0 {
            Ok(Stage::Stream { session, tuple, rx, tx })
        } else {
            Ok(Stage::Idle)
        }
    }

    /// Send again from the oldest unacknowledged byte.
    ///
    /// After a timeout everything behind the resent segment counts as unsent again. Against a
    /// closed peer window a single byte is sent.
    fn retransmit<M: BufferMemory + ?Sized>(
        &self,
        links: &Links,
        memory: &M,
        session: SessionId,
        tuple: FourTuple,
        rx: RxSarEntry,
        tx: TxSarEntry,
        fast: bool,
    ) -> Result<()> {
        if fast && tx.in_flight() == 0 {
            return Ok(());
        }

        let data = tx.unacknowledged_data();
        let len = if !fast && tx.recv_window == 0 {
            data.min(1)
        } else {
            data.min(usize::from(tx.send_mss.max(1)))
        };
        let fin = tx.fin_sent && tx.ackd <= tx.appw && len == data;
        if len == 0 && !fin {
            return Ok(());
        }

        let mut flags = TcpFlags::default();
        flags.set_psh(len > 0 && len == data);
        flags.set_fin(fin);
        let repr = self.repr(tuple, flags, tx.ackd, Some(rx.rcvd), rx.window(self.buffer_size), len);
        net_debug!("session {}: {} retransmission from {}", session, if fast { "fast" } else { "timeout" }, tx.ackd);
        self.emit(links, memory, tuple, repr, Some((session, tx.ackd)))?;
        if fast {
            bump(&links.counters.retransmissions);
        }

        let write = if fast {
            TxWrite { retry: Some(Retry::Fast), ..TxWrite::default() }
        } else {
            TxWrite {
                unak: Some(tx.ackd + repr.sequence_len()),
                retry: Some(Retry::Timeout),
                ..TxWrite::default()
            }
        };
        links.tx_sar_tx_req.push(TxSarTx::Write(session, write))?;
        let kind = if fin { RetransmitKind::Fin } else { RetransmitKind::Data };
        links.rt_set.push(RetransmitSet { session, kind })?;
        Ok(())
    }

    fn reset<M: BufferMemory + ?Sized>(
        &self,
        links: &Links,
        memory: &M,
        tuple: FourTuple,
        seq: TcpSeqNumber,
        ack: Option<TcpSeqNumber>,
    ) -> Result<()> {
        let mut flags = TcpFlags::default();
        flags.set_rst(true);
        let repr = self.repr(tuple, flags, seq, ack, 0, 0);
        self.emit(links, memory, tuple, repr, None)
    }

    fn repr(
        &self,
        tuple: FourTuple,
        flags: TcpFlags,
        seq_number: TcpSeqNumber,
        ack_number: Option<TcpSeqNumber>,
        window_len: u16,
        payload_len: usize,
    ) -> TcpRepr {
        TcpRepr {
            src_port: tuple.local_port,
            dst_port: tuple.remote_port,
            flags,
            seq_number,
            ack_number,
            window_len,
            max_seg_size: None,
            payload_len,
        }
    }

    /// Build the frame, fetching `repr.payload_len` bytes of the transmit buffer from `data`.
    fn emit<M: BufferMemory + ?Sized>(
        &self,
        links: &Links,
        memory: &M,
        tuple: FourTuple,
        repr: TcpRepr,
        data: Option<(SessionId, TcpSeqNumber)>,
    ) -> Result<()> {
        let header_len = repr.header_len();
        let ip = Ipv4Repr {
            src_addr: tuple.local,
            dst_addr: tuple.remote,
            protocol: IpProtocol::Tcp,
            payload_len: header_len + repr.payload_len,
            hop_limit: HOP_LIMIT,
        };

        let mut frame = vec![0; ip.buffer_len() + ip.payload_len];
        let (ip_header, segment) = frame.split_at_mut(ip.buffer_len());
        if let Some((session, start)) = data {
            if repr.payload_len > 0 {
                read_circular(memory, Direction::Tx, session, start, self.buffer_size, &mut segment[header_len..])?;
            }
        }
        repr.emit(segment, tuple.local, tuple.remote);
        ip.emit(ip_header);

        net_trace!("tx {} {}", tuple, repr);
        links.net_tx.push(frame)?;
        bump(&links.counters.segments_sent);
        Ok(())
    }
}
