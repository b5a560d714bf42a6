//! The engine as a whole.
use crate::app::{
    AppRequest, AppResponse, ConnectRequest, Notification, Received, RxAppInterface, RxRequest,
    SendRequest, TxAppInterface,
};
use crate::config::Config;
use crate::engine::{RxEngine, TxEngine};
use crate::error::{Error, InternalError, Result};
use crate::event::{AckDelayer, EventEngine};
use crate::fifo::Fifo;
use crate::link::Links;
use crate::stats::Statistics;
use crate::storage::{BufferMemory, RingMemory};
use crate::table::{
    PortTable, RxSarTable, SessionId, SessionLookup, StateTable, TcpState, TxDefaults, TxSarTable,
};
use crate::time::{Expiration, Instant};
use crate::timer::{CloseTimer, ProbeTimer, RetransmitTimer};

/// A TCP offload engine.
///
/// All processes and the queues between them, driven by [`poll`]. Each call gives every process
/// one turn in a fixed order, so two engines fed the same frames and times behave identically.
///
/// Frames enter through [`receive_frame`] and leave through [`transmit_frame`]. The application
/// side goes through [`submit`] and the `next_*` accessors.
///
/// [`poll`]: #method.poll
/// [`receive_frame`]: #method.receive_frame
/// [`transmit_frame`]: #method.transmit_frame
/// [`submit`]: #method.submit
pub struct Toe<M: BufferMemory = RingMemory> {
    config: Config,
    memory: M,
    links: Links,

    lookup: SessionLookup,
    ports: PortTable,
    states: StateTable,
    rx_sar: RxSarTable,
    tx_sar: TxSarTable,

    retransmit: RetransmitTimer,
    probe: ProbeTimer,
    close: CloseTimer,

    events: EventEngine,
    ack_delay: AckDelayer,

    rx_engine: RxEngine,
    tx_engine: TxEngine,
    rx_app: RxAppInterface,
    tx_app: TxAppInterface,
}

impl Toe<RingMemory> {
    /// An engine with buffers in host memory.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let memory = RingMemory::new(config.max_sessions, config.buffer_size);
        Toe::with_memory(config, memory)
    }
}

impl<M: BufferMemory> Toe<M> {
    /// An engine on a provided buffer memory.
    ///
    /// The memory must hold `buffer_size` bytes per session and direction.
    pub fn with_memory(config: Config, memory: M) -> Result<Self> {
        config.validate()?;
        let defaults = TxDefaults {
            mss: config.mss,
            initial_window: config.initial_window,
            initial_ssthresh: config.initial_ssthresh,
        };

        Ok(Toe {
            memory,
            links: Links::new(&config),

            lookup: SessionLookup::new(config.max_sessions),
            ports: PortTable::new(config.ephemeral_ports, config.port_sweep_step),
            states: StateTable::new(config.max_sessions),
            rx_sar: RxSarTable::new(config.max_sessions),
            tx_sar: TxSarTable::new(config.max_sessions, defaults),

            retransmit: RetransmitTimer::new(&config),
            probe: ProbeTimer::new(&config),
            close: CloseTimer::new(&config),

            events: EventEngine::new(),
            ack_delay: AckDelayer::new(&config),

            rx_engine: RxEngine::new(&config),
            tx_engine: TxEngine::new(&config),
            rx_app: RxAppInterface::new(&config),
            tx_app: TxAppInterface::new(&config),

            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one scheduling quantum at time `now`.
    ///
    /// An error is an internal inconsistency. The engine should not be polled any further.
    pub fn poll(&mut self, now: Instant) -> Result<()> {
        let links = &self.links;

        self.rx_engine.poll(links, &mut self.memory)?;
        self.tx_app.poll(links, &mut self.memory)?;
        self.rx_app.poll(links, &self.memory)?;
        self.tx_engine.poll(links, &self.memory, now)?;

        self.retransmit.poll(links, now)?;
        self.probe.poll(links, now)?;
        self.close.poll(links, now)?;

        self.events.poll(links)?;
        self.ack_delay.poll(links, now)?;

        self.ports.poll(links)?;
        self.lookup.poll(links)?;
        self.states.poll(links)?;
        self.rx_sar.poll(links)?;
        self.tx_sar.poll(links)?;

        Ok(())
    }

    /// Poll until nothing is left to do at `now`, at most `max_rounds` times.
    ///
    /// Returns the number of rounds taken.
    pub fn settle(&mut self, now: Instant, max_rounds: usize) -> Result<usize> {
        for round in 0..max_rounds {
            if self.is_settled(now) {
                return Ok(round);
            }
            self.poll(now)?;
        }

        if self.is_settled(now) {
            Ok(max_rounds)
        } else {
            Err(InternalError::NoProgress(max_rounds).into())
        }
    }

    /// Whether all queues and processes are empty.
    pub fn is_idle(&self) -> bool {
        self.ports.is_ready()
            && self.links.is_idle()
            && self.rx_engine.is_idle()
            && self.tx_engine.is_idle()
            && self.rx_app.is_idle()
            && self.tx_app.is_idle()
            && self.states.is_idle()
            && self.rx_sar.is_idle()
            && self.tx_sar.is_idle()
    }

    /// Whether polling at `now` would change nothing.
    ///
    /// Timers that are armed but expire later do not count as work.
    pub fn is_settled(&mut self, now: Instant) -> bool {
        self.is_idle() && self.next_deadline() > Expiration::When(now)
    }

    /// The earliest time at which a timer has work.
    pub fn next_deadline(&mut self) -> Expiration {
        self.retransmit.next_deadline()
            .min(self.probe.next_deadline())
            .min(self.close.next_deadline())
            .min(self.ack_delay.next_deadline())
    }

    /// Queue an application request.
    ///
    /// Fails with `Backpressure` while the queue of the request kind is full, the request is
    /// then not queued.
    pub fn submit(&mut self, request: AppRequest) -> Result<()> {
        let links = &self.links;
        match request {
            AppRequest::Listen { port } => offer(&links.app_rx_req, RxRequest::Listen(port)),
            AppRequest::Receive { session, max_len } => {
                offer(&links.app_rx_req, RxRequest::Receive { session, max_len })
            },
            AppRequest::Connect { remote, port } => {
                offer(&links.app_connect_req, ConnectRequest::Open { remote, port })
            },
            AppRequest::Close { session } => {
                offer(&links.app_connect_req, ConnectRequest::Close(session))
            },
            AppRequest::Send { session, data } => {
                offer(&links.app_send_req, SendRequest { session, data })
            },
        }
    }

    /// Hand an inbound IPv4 frame to the receive engine.
    pub fn receive_frame(&mut self, frame: Vec<u8>) -> Result<()> {
        offer(&self.links.net_rx, frame)
    }

    /// Take the next outbound IPv4 frame.
    pub fn transmit_frame(&mut self) -> Option<Vec<u8>> {
        self.links.net_tx.pop()
    }

    pub fn next_response(&mut self) -> Option<AppResponse> {
        self.links.app_rsp.pop()
    }

    pub fn next_notification(&mut self) -> Option<Notification> {
        self.links.app_notify.pop()
    }

    pub fn next_data(&mut self) -> Option<Received> {
        self.links.app_data.pop()
    }

    pub fn statistics(&self) -> Statistics {
        let counters = &self.links.counters;
        Statistics {
            sessions_registered: counters.sessions_registered.get(),
            sessions_released: counters.sessions_released.get(),
            segments_received: counters.segments_received.get(),
            segments_sent: counters.segments_sent.get(),
            segments_dropped: counters.segments_dropped.get(),
            retransmissions: counters.retransmissions.get(),
            aborted: counters.aborted.get(),
            notifications_dropped: self.links.app_notify.dropped(),
            responses_dropped: self.links.app_rsp.dropped(),
            data_dropped: self.links.app_data.dropped(),
        }
    }

    /// The current state of a session.
    pub fn session_state(&self, session: SessionId) -> Result<TcpState> {
        self.states.peek(session)
    }

    /// The buffer memory, for inspection.
    pub fn memory(&self) -> &M {
        &self.memory
    }
}

/// Push into an inbound queue unless it is full.
fn offer<T>(fifo: &Fifo<T>, value: T) -> Result<()> {
    if fifo.is_full() {
        net_debug!("rejecting submission, queue {} is full", fifo.name());
        return Err(Error::Backpressure);
    }
    fifo.push(value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Duration;

    fn config() -> Config {
        Config { max_sessions: 4, buffer_size: 1 << 12, queue_depth: 4, ..Config::default() }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = Config { max_sessions: 0, ..config() };
        match Toe::new(config) {
            Err(Error::Config(_)) => (),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn port_sweep_settles() {
        let mut toe = Toe::new(config()).unwrap();
        assert!(!toe.is_idle());
        let rounds = toe.settle(Instant::ZERO, 10_000).unwrap();
        assert!(rounds > 0);
        assert!(toe.is_idle());
        assert_eq!(toe.next_deadline(), Expiration::Never);
    }

    #[test]
    fn full_queue_pushes_back() {
        let mut toe = Toe::new(config()).unwrap();
        for _ in 0..4 {
            toe.receive_frame(vec![0; 20]).unwrap();
        }
        match toe.receive_frame(vec![0; 20]) {
            Err(Error::Backpressure) => (),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn garbage_is_counted() {
        let mut toe = Toe::new(config()).unwrap();
        toe.settle(Instant::ZERO, 10_000).unwrap();
        toe.receive_frame(vec![0x45; 40]).unwrap();
        toe.settle(Instant::ZERO, 10).unwrap();
        assert_eq!(toe.statistics().segments_dropped, 1);
        assert_eq!(toe.transmit_frame(), None);
    }

    #[test]
    fn listen_is_acknowledged() {
        let mut toe = Toe::new(config()).unwrap();
        let now = Instant::ZERO + Duration::from_millis(5);
        toe.settle(now, 10_000).unwrap();
        toe.submit(AppRequest::Listen { port: 80 }).unwrap();
        toe.submit(AppRequest::Listen { port: 0x9000 }).unwrap();
        toe.settle(now, 20).unwrap();
        assert_eq!(toe.next_response(), Some(AppResponse::Listen { port: 80, ok: true }));
        assert_eq!(toe.next_response(), Some(AppResponse::Listen { port: 0x9000, ok: false }));
    }
}
