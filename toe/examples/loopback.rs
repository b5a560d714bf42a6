//! Two engines on a lossy software link.
//!
//! Opens a connection, pushes a number of bytes through it, closes it and prints the statistics
//! of both sides. Run with `RUST_LOG=toe=debug` to follow the segments.
use structopt::StructOpt;

use toe::nic::{Loopback, PrngLoss};
use toe::time::{Expiration, Instant};
use toe::wire::Ipv4Address;
use toe::{AppRequest, AppResponse, Config, ConnectStatus, Notification, SendStatus, TcpState, Toe};

const ROUNDS: usize = 100_000;

fn main() {
    env_logger::init();
    let Options { bytes, port, loss_every, seed } = Options::from_args();

    let client_addr = Ipv4Address::new(10, 0, 0, 1);
    let server_addr = Ipv4Address::new(10, 0, 0, 2);
    let mut client = Toe::new(Config { local_addr: client_addr, ..Config::default() })
        .expect("invalid client configuration");
    let mut server = Toe::new(Config { local_addr: server_addr, ..Config::default() })
        .expect("invalid server configuration");

    let loss = |seed| match loss_every {
        0 => PrngLoss::none(),
        n => PrngLoss { lossrate: Some(u32::max_value() / n), ..PrngLoss::uniform(None, seed) },
    };
    let mut demo = Demo {
        link: Loopback::lossy(loss(seed), loss(seed.wrapping_add(1))),
        client: &mut client,
        server: &mut server,
        now: Instant::ZERO,
    };

    demo.settle();
    demo.server.submit(AppRequest::Listen { port }).unwrap();
    demo.client.submit(AppRequest::Connect { remote: server_addr, port }).unwrap();
    let session = demo.until(|demo| match demo.client.next_response() {
        Some(AppResponse::Connect { session, status: ConnectStatus::Established, .. }) => session,
        Some(AppResponse::Connect { status, .. }) => panic!("connect failed: {:?}", status),
        _ => None,
    });
    println!("{}: connected, client session {}", demo.now, session);

    let payload: Vec<u8> = (0..bytes).map(|i| i as u8).collect();
    let mut sent = 0;
    let mut received = 0;
    let mut peer = None;
    while received < bytes {
        if sent < bytes {
            let chunk = (bytes - sent).min(8192);
            let data = payload[sent..sent + chunk].to_vec();
            if demo.client.submit(AppRequest::Send { session, data }).is_ok() {
                demo.settle();
                if let Some(AppResponse::Send { accepted, status, .. }) = demo.client.next_response() {
                    if status == SendStatus::Ok {
                        sent += accepted;
                    }
                }
            }
        }

        while let Some(notification) = demo.server.next_notification() {
            match notification {
                Notification::Accepted { session, .. } => peer = Some(session),
                Notification::Data { session, .. } => {
                    demo.server.submit(AppRequest::Receive { session, max_len: 1 << 16 }).unwrap();
                },
                _ => (),
            }
        }
        demo.settle();
        while let Some(data) = demo.server.next_data() {
            assert_eq!(&payload[received..received + data.data.len()], &data.data[..]);
            received += data.data.len();
        }

        if !demo.advance() && sent == bytes && received < bytes {
            panic!("stalled after {} of {} bytes", received, bytes);
        }
    }
    println!("{}: {} bytes delivered", demo.now, received);

    demo.client.submit(AppRequest::Close { session }).unwrap();
    demo.until(|demo| match peer {
        Some(peer) if demo.server.session_state(peer).ok() == Some(TcpState::Closed) => Some(()),
        _ => None,
    });
    println!("{}: closed", demo.now);

    println!("client {:#?}", demo.client.statistics());
    println!("server {:#?}", demo.server.statistics());
    println!("link lost {} frames", demo.link.to_right().lost() + demo.link.to_left().lost());
}

struct Demo<'a> {
    link: Loopback,
    client: &'a mut Toe,
    server: &'a mut Toe,
    now: Instant,
}

impl Demo<'_> {
    fn settle(&mut self) {
        let settled = self.link.settle(self.client, self.server, self.now, ROUNDS)
            .expect("engine failure");
        assert!(settled, "engines did not settle");
    }

    fn advance(&mut self) -> bool {
        match self.client.next_deadline().min(self.server.next_deadline()) {
            Expiration::When(at) => {
                self.now = at.max(self.now);
                self.settle();
                true
            },
            Expiration::Never => false,
        }
    }

    fn until<T>(&mut self, mut done: impl FnMut(&mut Self) -> Option<T>) -> T {
        loop {
            self.settle();
            if let Some(value) = done(self) {
                return value;
            }
            if !self.advance() {
                panic!("nothing left to wait for");
            }
        }
    }
}

#[derive(StructOpt)]
struct Options {
    /// Number of bytes to transfer.
    #[structopt(long = "bytes", default_value = "100000")]
    bytes: usize,
    /// Server port.
    #[structopt(long = "port", default_value = "80")]
    port: u16,
    /// Lose about one frame in this many, 0 for a perfect link.
    #[structopt(long = "loss-every", default_value = "0")]
    loss_every: u32,
    /// Seed of the loss simulation.
    #[structopt(long = "seed", default_value = "1")]
    seed: u64,
}
