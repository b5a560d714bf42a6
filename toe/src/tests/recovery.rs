use super::*;
use crate::nic::{PrngLoss, Xoroshiro256};
use crate::TcpState;

/// Lose only the next frame.
fn lose_one() -> PrngLoss {
    PrngLoss {
        threshold: 1,
        count: 0,
        reset: u32::max_value(),
        lossrate: Some(u32::max_value()),
        prng: Xoroshiro256::new(0),
    }
}

#[test]
fn unanswered_syn_is_aborted() {
    let mut toe = Toe::new(config(client_addr())).unwrap();
    let mut now = Instant::ZERO;
    toe.settle(now, ROUNDS).unwrap();
    toe.submit(AppRequest::Connect { remote: server_addr(), port: 80 }).unwrap();

    let mut syns = vec![];
    loop {
        toe.settle(now, ROUNDS).unwrap();
        while let Some(frame) = toe.transmit_frame() {
            let repr = segments(&[frame])[0];
            assert!(repr.flags.syn());
            syns.push(now);
        }
        match toe.next_deadline() {
            Expiration::When(at) => now = at,
            Expiration::Never => break,
        }
    }

    let intervals: Vec<u64> = syns.windows(2)
        .map(|pair| (pair[1] - pair[0]).as_secs())
        .collect();
    assert_eq!(intervals, vec![1, 3, 6, 12]);

    match toe.next_response() {
        Some(AppResponse::Connect { status: ConnectStatus::TimedOut, port: 80, .. }) => (),
        other => panic!("connect answered with {:?}", other),
    }
    assert_eq!(toe.next_response(), None);
    assert_eq!(toe.next_notification(), None);

    let stats = toe.statistics();
    assert_eq!(stats.retransmissions, 4);
    assert_eq!(stats.aborted, 1);
    assert_eq!(stats.sessions_released, 1);
}

#[test]
fn unanswered_data_aborts_session() {
    let mut pair = Pair::new();
    pair.listen(80);
    let (client, _) = pair.connect(80);

    pair.link.to_right().set_loss(PrngLoss::pulsed(1, 1));
    pair.send(client, &pattern(100));
    for _ in 0..50 {
        if !pair.advance() {
            break;
        }
    }

    let notifications: Vec<Notification> = std::iter::from_fn(|| pair.client.next_notification()).collect();
    assert_eq!(notifications, vec![Notification::TimedOut { session: client }]);
    assert_eq!(pair.client.session_state(client).unwrap(), TcpState::Closed);
    assert_eq!(pair.client.next_deadline(), Expiration::Never);

    let stats = pair.client.statistics();
    assert_eq!(stats.retransmissions, 4);
    assert_eq!(stats.aborted, 1);
    assert_eq!(stats.sessions_released, 1);
}

#[test]
fn closed_window_is_probed_until_it_opens() {
    let mut pair = Pair::new();
    pair.listen(80);
    let (client, server) = pair.connect(80);

    // Fill the server's receive buffer without reading it.
    let size = pair.server.config().buffer_size;
    let head = pattern(size - 1);
    pair.send(client, &head);
    for _ in 0..100 {
        if !pair.advance() {
            break;
        }
    }

    pair.send(client, &[9; 100]);
    pair.link.to_right().capture();
    pair.link.to_left().capture();
    assert!(pair.advance());
    let probes: Vec<usize> = segments(&pair.link.to_right().take_captured())
        .iter()
        .map(|repr| repr.payload_len)
        .collect();
    assert_eq!(probes, vec![1]);
    let answers = segments(&pair.link.to_left().take_captured());
    assert!(!answers.is_empty());
    assert!(answers.iter().all(|repr| repr.window_len == 0));

    assert_eq!(pair.receive(server), head);
    for _ in 0..50 {
        if !pair.advance() {
            break;
        }
    }
    assert_eq!(pair.receive(server), vec![9; 100]);
    assert_eq!(pair.client.session_state(client).unwrap(), TcpState::Established);
    assert_eq!(pair.client.next_deadline(), Expiration::Never);
}

#[test]
fn lost_segments_are_resent_on_timeout() {
    let mut pair = Pair::new();
    pair.listen(80);
    let (client, server) = pair.connect(80);

    let data = pattern(3000);
    pair.link.to_right().set_loss(PrngLoss::pulsed(1, 1));
    pair.send(client, &data);
    assert!(pair.link.to_right().lost() >= 2);
    pair.link.to_right().set_loss(PrngLoss::none());

    for _ in 0..50 {
        if !pair.advance() {
            break;
        }
    }

    assert_eq!(pair.receive(server), data);
    assert!(pair.client.statistics().retransmissions >= 1);
    assert_eq!(pair.client.next_deadline(), Expiration::Never);
}

#[test]
fn third_duplicate_ack_resends_at_once() {
    let client = Config { initial_window: 8, ..config(client_addr()) };
    let mut pair = Pair::with_configs(client, config(server_addr()));
    pair.listen(80);
    let (client, server) = pair.connect(80);

    let data = pattern(6 * 1460);
    pair.link.to_right().set_loss(lose_one());
    pair.send(client, &data);

    // Recovered without any timer firing.
    assert_eq!(pair.link.to_right().lost(), 1);
    assert_eq!(pair.client.statistics().retransmissions, 1);
    assert_eq!(pair.receive(server), data);
}

#[test]
fn lossy_link_delivers_in_order() {
    let mut pair = Pair::new();
    pair.link = Loopback::lossy(PrngLoss::pulsed(1, 5), PrngLoss::pulsed(1, 7));
    pair.listen(80);
    // The handshake may need a retry on this link.
    pair.client.submit(AppRequest::Connect { remote: server_addr(), port: 80 }).unwrap();
    let mut client = None;
    for _ in 0..50 {
        pair.settle();
        if let Some(AppResponse::Connect { session, status, .. }) = pair.client.next_response() {
            assert_eq!(status, ConnectStatus::Established);
            client = session;
            break;
        }
        pair.advance();
    }
    let client = client.expect("connection never established");

    let data = pattern(5000);
    pair.send(client, &data);
    for _ in 0..200 {
        if !pair.advance() {
            break;
        }
    }

    let server = std::iter::from_fn(|| pair.server.next_notification())
        .find_map(|notification| match notification {
            Notification::Accepted { session, .. } => Some(session),
            _ => None,
        })
        .expect("server never accepted");
    assert_eq!(pair.receive(server), data);
}
