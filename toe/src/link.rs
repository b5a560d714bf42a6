//! The queues connecting all processes.
//!
//! Every process reaches the others only through these queues. A request queue is paired with a
//! reply queue whenever the requester expects an answer, replies arrive in request order.
use crate::app::{ConnectRequest, Notification, OpenStatus, Received, AppResponse, RxRequest, SendRequest};
use crate::config::Config;
use crate::event::{Credits, Event};
use crate::fifo::Fifo;
use crate::stats::Counters;
use crate::table::{
    AckPush, AppPush, FourTuple, LookupReply, LookupRequest, PortState, RxSarApp, RxSarEntry,
    RxSarRequest, SessionId, StateRequest, TcpState, TxSarEntry, TxSarRx, TxSarTx,
};
use crate::timer::{RetransmitClear, RetransmitSet};

/// All queues of one engine, plus the shared counters.
pub struct Links {
    // Network.
    pub(crate) net_rx: Fifo<Vec<u8>>,
    pub(crate) net_tx: Fifo<Vec<u8>>,

    // Session lookup controller.
    pub(crate) rx_lookup_req: Fifo<LookupRequest>,
    pub(crate) rx_lookup_rsp: Fifo<LookupReply>,
    pub(crate) app_lookup_req: Fifo<LookupRequest>,
    pub(crate) app_lookup_rsp: Fifo<LookupReply>,
    pub(crate) reverse_req: Fifo<SessionId>,
    pub(crate) reverse_rsp: Fifo<Option<FourTuple>>,
    pub(crate) session_release: Fifo<SessionId>,

    // Port table.
    pub(crate) port_query_req: Fifo<u16>,
    pub(crate) port_query_rsp: Fifo<PortState>,
    pub(crate) listen_req: Fifo<u16>,
    pub(crate) listen_rsp: Fifo<bool>,
    pub(crate) free_port_req: Fifo<()>,
    pub(crate) free_port_rsp: Fifo<Option<u16>>,
    pub(crate) port_release: Fifo<u16>,

    // State table.
    pub(crate) state_connect_req: Fifo<StateRequest>,
    pub(crate) state_connect_rsp: Fifo<TcpState>,
    pub(crate) state_stream_req: Fifo<StateRequest>,
    pub(crate) state_stream_rsp: Fifo<TcpState>,
    pub(crate) state_rx_req: Fifo<StateRequest>,
    pub(crate) state_rx_rsp: Fifo<TcpState>,
    pub(crate) timer_close: Fifo<StateRequest>,

    // Receive sequence table.
    pub(crate) rx_sar_rx_req: Fifo<RxSarRequest>,
    pub(crate) rx_sar_rx_rsp: Fifo<RxSarEntry>,
    pub(crate) rx_sar_tx_req: Fifo<SessionId>,
    pub(crate) rx_sar_tx_rsp: Fifo<RxSarEntry>,
    pub(crate) rx_sar_app_req: Fifo<RxSarApp>,
    pub(crate) rx_sar_app_rsp: Fifo<RxSarEntry>,

    // Transmit sequence table.
    pub(crate) tx_sar_tx_req: Fifo<TxSarTx>,
    pub(crate) tx_sar_tx_rsp: Fifo<TxSarEntry>,
    pub(crate) tx_sar_rx_req: Fifo<TxSarRx>,
    pub(crate) tx_sar_rx_rsp: Fifo<TxSarEntry>,
    pub(crate) tx_sar_app_push: Fifo<AppPush>,
    pub(crate) ack_push: Fifo<AckPush>,

    // Timers.
    pub(crate) rt_clear: Fifo<RetransmitClear>,
    pub(crate) rt_set: Fifo<RetransmitSet>,
    pub(crate) probe_set: Fifo<SessionId>,
    pub(crate) probe_clear: Fifo<SessionId>,
    pub(crate) close_set: Fifo<SessionId>,
    pub(crate) timer_events: Fifo<Event>,
    pub(crate) connect_failed: Fifo<SessionId>,
    pub(crate) timer_notify: Fifo<Notification>,

    // Events.
    pub(crate) rx_events: Fifo<Event>,
    pub(crate) app_events: Fifo<Event>,
    pub(crate) events: Fifo<Event>,
    pub(crate) tx_events: Fifo<Event>,
    pub(crate) ack_cancel: Fifo<SessionId>,
    pub(crate) credits: Credits,

    // Application interfaces.
    pub(crate) open_status: Fifo<OpenStatus>,
    pub(crate) rx_notify: Fifo<Notification>,
    pub(crate) app_connect_req: Fifo<ConnectRequest>,
    pub(crate) app_send_req: Fifo<SendRequest>,
    pub(crate) app_rx_req: Fifo<RxRequest>,
    pub(crate) app_rsp: Fifo<AppResponse>,
    pub(crate) app_notify: Fifo<Notification>,
    pub(crate) app_data: Fifo<Received>,

    pub(crate) counters: Counters,
}

impl Links {
    pub fn new(config: &Config) -> Self {
        let depth = config.queue_depth;
        Links {
            net_rx: Fifo::stall("net_rx", depth),
            net_tx: Fifo::stall("net_tx", depth),

            rx_lookup_req: Fifo::stall("rx_lookup_req", depth),
            rx_lookup_rsp: Fifo::stall("rx_lookup_rsp", depth),
            app_lookup_req: Fifo::stall("app_lookup_req", depth),
            app_lookup_rsp: Fifo::stall("app_lookup_rsp", depth),
            reverse_req: Fifo::stall("reverse_req", depth),
            reverse_rsp: Fifo::stall("reverse_rsp", depth),
            session_release: Fifo::stall("session_release", depth),

            port_query_req: Fifo::stall("port_query_req", depth),
            port_query_rsp: Fifo::stall("port_query_rsp", depth),
            listen_req: Fifo::stall("listen_req", depth),
            listen_rsp: Fifo::stall("listen_rsp", depth),
            free_port_req: Fifo::stall("free_port_req", depth),
            free_port_rsp: Fifo::stall("free_port_rsp", depth),
            port_release: Fifo::stall("port_release", depth),

            state_connect_req: Fifo::stall("state_connect_req", depth),
            state_connect_rsp: Fifo::stall("state_connect_rsp", depth),
            state_stream_req: Fifo::stall("state_stream_req", depth),
            state_stream_rsp: Fifo::stall("state_stream_rsp", depth),
            state_rx_req: Fifo::stall("state_rx_req", depth),
            state_rx_rsp: Fifo::stall("state_rx_rsp", depth),
            timer_close: Fifo::stall("timer_close", depth),

            rx_sar_rx_req: Fifo::stall("rx_sar_rx_req", depth),
            rx_sar_rx_rsp: Fifo::stall("rx_sar_rx_rsp", depth),
            rx_sar_tx_req: Fifo::stall("rx_sar_tx_req", depth),
            rx_sar_tx_rsp: Fifo::stall("rx_sar_tx_rsp", depth),
            rx_sar_app_req: Fifo::stall("rx_sar_app_req", depth),
            rx_sar_app_rsp: Fifo::stall("rx_sar_app_rsp", depth),

            tx_sar_tx_req: Fifo::stall("tx_sar_tx_req", depth),
            tx_sar_tx_rsp: Fifo::stall("tx_sar_tx_rsp", depth),
            tx_sar_rx_req: Fifo::stall("tx_sar_rx_req", depth),
            tx_sar_rx_rsp: Fifo::stall("tx_sar_rx_rsp", depth),
            tx_sar_app_push: Fifo::stall("tx_sar_app_push", depth),
            ack_push: Fifo::stall("ack_push", depth),

            rt_clear: Fifo::stall("rt_clear", depth),
            rt_set: Fifo::stall("rt_set", depth),
            probe_set: Fifo::stall("probe_set", depth),
            probe_clear: Fifo::stall("probe_clear", depth),
            close_set: Fifo::stall("close_set", depth),
            timer_events: Fifo::stall("timer_events", depth),
            connect_failed: Fifo::stall("connect_failed", depth),
            timer_notify: Fifo::stall("timer_notify", depth),

            rx_events: Fifo::stall("rx_events", depth),
            app_events: Fifo::stall("app_events", depth),
            events: Fifo::stall("events", depth),
            tx_events: Fifo::stall("tx_events", depth),
            ack_cancel: Fifo::stall("ack_cancel", depth),
            credits: Credits::default(),

            open_status: Fifo::stall("open_status", depth),
            rx_notify: Fifo::stall("rx_notify", depth),
            app_connect_req: Fifo::stall("app_connect_req", depth),
            app_send_req: Fifo::stall("app_send_req", depth),
            app_rx_req: Fifo::stall("app_rx_req", depth),
            app_rsp: Fifo::lossy("app_rsp", depth),
            app_notify: Fifo::lossy("app_notify", depth),
            app_data: Fifo::lossy("app_data", depth),

            counters: Counters::default(),
        }
    }

    /// Whether no queue holds anything.
    pub(crate) fn is_idle(&self) -> bool {
        self.net_rx.is_empty()
            && self.rx_lookup_req.is_empty()
            && self.rx_lookup_rsp.is_empty()
            && self.app_lookup_req.is_empty()
            && self.app_lookup_rsp.is_empty()
            && self.reverse_req.is_empty()
            && self.reverse_rsp.is_empty()
            && self.session_release.is_empty()
            && self.port_query_req.is_empty()
            && self.port_query_rsp.is_empty()
            && self.listen_req.is_empty()
            && self.listen_rsp.is_empty()
            && self.free_port_req.is_empty()
            && self.free_port_rsp.is_empty()
            && self.port_release.is_empty()
            && self.state_connect_req.is_empty()
            && self.state_connect_rsp.is_empty()
            && self.state_stream_req.is_empty()
            && self.state_stream_rsp.is_empty()
            && self.state_rx_req.is_empty()
            && self.state_rx_rsp.is_empty()
            && self.timer_close.is_empty()
            && self.rx_sar_rx_req.is_empty()
            && self.rx_sar_rx_rsp.is_empty()
            && self.rx_sar_tx_req.is_empty()
            && self.rx_sar_tx_rsp.is_empty()
            && self.rx_sar_app_req.is_empty()
            && self.rx_sar_app_rsp.is_empty()
            && self.tx_sar_tx_req.is_empty()
            && self.tx_sar_tx_rsp.is_empty()
            && self.tx_sar_rx_req.is_empty()
            && self.tx_sar_rx_rsp.is_empty()
            && self.tx_sar_app_push.is_empty()
            && self.ack_push.is_empty()
            && self.rt_clear.is_empty()
            && self.rt_set.is_empty()
            && self.probe_set.is_empty()
            && self.probe_clear.is_empty()
            && self.close_set.is_empty()
            && self.timer_events.is_empty()
            && self.connect_failed.is_empty()
            && self.timer_notify.is_empty()
            && self.rx_events.is_empty()
            && self.app_events.is_empty()
            && self.events.is_empty()
            && self.tx_events.is_empty()
            && self.ack_cancel.is_empty()
            && self.open_status.is_empty()
            && self.rx_notify.is_empty()
            && self.app_connect_req.is_empty()
            && self.app_send_req.is_empty()
            && self.app_rx_req.is_empty()
    }
}
