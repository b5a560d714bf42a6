//! End-to-end exchanges between two engines.
//!
//! A client at `10.0.0.1` and a server at `10.0.0.2` share a [`Loopback`] and a virtual clock.
//! Time only moves when a test asks for it, usually to the next timer deadline of either side.
use crate::nic::Loopback;
use crate::time::{Duration, Expiration, Instant};
use crate::wire::{Ipv4Address, Ipv4Repr, TcpRepr};
use crate::{AppRequest, AppResponse, Config, ConnectStatus, Notification, SessionId, Toe};

mod connection;
mod recovery;
mod refusal;

const ROUNDS: usize = 10_000;

fn client_addr() -> Ipv4Address {
    Ipv4Address::new(10, 0, 0, 1)
}

fn server_addr() -> Ipv4Address {
    Ipv4Address::new(10, 0, 0, 2)
}

fn config(local_addr: Ipv4Address) -> Config {
    Config {
        local_addr,
        max_sessions: 4,
        buffer_size: 1 << 14,
        queue_depth: 16,
        ..Config::default()
    }
}

struct Pair {
    client: Toe,
    server: Toe,
    link: Loopback,
    now: Instant,
}

impl Pair {
    fn new() -> Self {
        Pair::with_configs(config(client_addr()), config(server_addr()))
    }

    fn with_configs(client: Config, server: Config) -> Self {
        let mut pair = Pair {
            client: Toe::new(client).unwrap(),
            server: Toe::new(server).unwrap(),
            link: Loopback::new(),
            now: Instant::ZERO,
        };
        pair.settle();
        pair
    }

    /// Run both engines until nothing is left to do at the current time.
    fn settle(&mut self) {
        let settled = self.link.settle(&mut self.client, &mut self.server, self.now, ROUNDS).unwrap();
        assert!(settled, "no quiescence at {}", self.now);
    }

    fn next_deadline(&mut self) -> Expiration {
        self.client.next_deadline().min(self.server.next_deadline())
    }

    /// Jump to the next timer of either side, false if none is armed.
    fn advance(&mut self) -> bool {
        match self.next_deadline() {
            Expiration::When(at) => {
                self.now = at.max(self.now);
                self.settle();
                true
            },
            Expiration::Never => false,
        }
    }

    /// Let `duration` pass, handling every timer on the way.
    fn wait(&mut self, duration: Duration) {
        let until = self.now + duration;
        loop {
            match self.next_deadline() {
                Expiration::When(at) if at <= until => {
                    self.now = at.max(self.now);
                    self.settle();
                },
                _ => break,
            }
        }
        self.now = until;
        self.settle();
    }

    fn listen(&mut self, port: u16) {
        self.server.submit(AppRequest::Listen { port }).unwrap();
        self.settle();
        assert_eq!(self.server.next_response(), Some(AppResponse::Listen { port, ok: true }));
    }

    /// Open a connection to the server, returning the session ids of client and server.
    fn connect(&mut self, port: u16) -> (SessionId, SessionId) {
        self.client.submit(AppRequest::Connect { remote: server_addr(), port }).unwrap();
        self.settle();

        let client = match self.client.next_response() {
            Some(AppResponse::Connect { session: Some(session), status: ConnectStatus::Established, .. }) => session,
            other => panic!("connect answered with {:?}", other),
        };
        let server = &mut self.server;
        let (server, tuple) = std::iter::from_fn(|| server.next_notification())
            .find_map(|notification| match notification {
                Notification::Accepted { session, tuple } => Some((session, tuple)),
                _ => None,
            })
            .expect("no accepted notification");
        assert_eq!(tuple.remote, client_addr());
        assert_eq!(tuple.local_port, port);
        (client, server)
    }

    fn send(&mut self, session: SessionId, data: &[u8]) {
        self.client.submit(AppRequest::Send { session, data: data.to_vec() }).unwrap();
        self.settle();
        match self.client.next_response() {
            Some(AppResponse::Send { accepted, .. }) => assert_eq!(accepted, data.len()),
            other => panic!("send answered with {:?}", other),
        }
    }

    /// Read everything the server has for `session`.
    fn receive(&mut self, session: SessionId) -> Vec<u8> {
        self.server.submit(AppRequest::Receive { session, max_len: 1 << 16 }).unwrap();
        self.settle();
        match self.server.next_data() {
            Some(received) => {
                assert_eq!(received.session, session);
                received.data
            },
            None => panic!("no answer to receive"),
        }
    }
}

/// The TCP headers and payload lengths of captured frames.
fn segments(frames: &[Vec<u8>]) -> Vec<TcpRepr> {
    frames.iter()
        .map(|frame| {
            let (ip, payload) = Ipv4Repr::parse(frame).unwrap();
            TcpRepr::parse(payload, ip.src_addr, ip.dst_addr).unwrap().0
        })
        .collect()
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
