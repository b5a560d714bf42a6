use super::*;
use crate::{Error, SendStatus, TcpState};

#[test]
fn handshake_data_and_close() {
    let mut pair = Pair::new();
    pair.listen(80);
    let (client, server) = pair.connect(80);
    assert_eq!(pair.client.session_state(client).unwrap(), TcpState::Established);
    assert_eq!(pair.server.session_state(server).unwrap(), TcpState::Established);
    assert_eq!(pair.client.statistics().sessions_registered, 1);
    assert_eq!(pair.server.statistics().sessions_registered, 1);

    // One byte more than a segment holds.
    let data = pattern(1461);
    pair.link.to_right().capture();
    pair.send(client, &data);
    let lens: Vec<usize> = segments(&pair.link.to_right().take_captured())
        .iter()
        .map(|repr| repr.payload_len)
        .filter(|&len| len > 0)
        .collect();
    assert_eq!(lens, vec![1460, 1]);

    let announced: usize = std::iter::from_fn(|| pair.server.next_notification())
        .filter_map(|notification| match notification {
            Notification::Data { session, len } if session == server => Some(len),
            _ => None,
        })
        .sum();
    assert_eq!(announced, data.len());
    assert_eq!(pair.receive(server), data);

    // Let the delayed acknowledgement go out.
    pair.wait(Duration::from_millis(200));

    pair.client.submit(AppRequest::Close { session: client }).unwrap();
    pair.settle();
    assert_eq!(pair.client.session_state(client).unwrap(), TcpState::TimeWait);
    assert_eq!(pair.server.session_state(server).unwrap(), TcpState::Closed);
    assert_eq!(pair.server.statistics().sessions_released, 1);
    assert_eq!(pair.client.statistics().sessions_released, 0);
    assert!(std::iter::from_fn(|| pair.server.next_notification())
        .any(|notification| notification == Notification::PeerClosed { session: server }));

    pair.wait(Duration::from_secs(61));
    assert_eq!(pair.client.session_state(client).unwrap(), TcpState::Closed);
    assert_eq!(pair.client.statistics().sessions_released, 1);
    assert_eq!(pair.server.statistics().sessions_released, 1);
    assert_eq!(pair.client.next_deadline(), Expiration::Never);
}

#[test]
fn peer_fin_is_not_read_as_data() {
    let mut pair = Pair::new();
    pair.listen(80);
    let (client, server) = pair.connect(80);

    pair.send(client, b"hello");
    pair.client.submit(AppRequest::Close { session: client }).unwrap();
    pair.settle();
    assert_eq!(pair.client.session_state(client).unwrap(), TcpState::TimeWait);

    assert_eq!(pair.receive(server), b"hello".to_vec());
    // Nothing is left behind the stream.
    assert_eq!(pair.receive(server), Vec::<u8>::new());
}

#[test]
fn session_id_is_reused() {
    let client = Config { max_sessions: 1, ..config(client_addr()) };
    let mut pair = Pair::with_configs(client, config(server_addr()));
    pair.listen(80);

    let (first, _) = pair.connect(80);
    pair.client.submit(AppRequest::Close { session: first }).unwrap();
    pair.settle();
    pair.wait(Duration::from_secs(61));
    assert_eq!(pair.client.session_state(first).unwrap(), TcpState::Closed);

    let (second, _) = pair.connect(80);
    assert_eq!(second, first);
    assert_eq!(pair.client.statistics().sessions_registered, 2);
}

#[test]
fn half_close_waits_for_application() {
    let server = Config { half_close: true, ..config(server_addr()) };
    let mut pair = Pair::with_configs(config(client_addr()), server);
    pair.listen(80);
    let (client, server) = pair.connect(80);

    pair.client.submit(AppRequest::Close { session: client }).unwrap();
    pair.settle();
    assert_eq!(pair.server.session_state(server).unwrap(), TcpState::CloseWait);
    assert_eq!(pair.client.session_state(client).unwrap(), TcpState::FinWait2);

    // The closed side refuses data, the half open one accepts more.
    pair.client.submit(AppRequest::Send { session: client, data: vec![1; 8] }).unwrap();
    pair.server.submit(AppRequest::Send { session: server, data: vec![2; 8] }).unwrap();
    pair.settle();
    match pair.client.next_response() {
        Some(AppResponse::Send { status, accepted, .. }) => {
            assert_eq!(status, SendStatus::NoConnection);
            assert_eq!(accepted, 0);
        },
        other => panic!("send answered with {:?}", other),
    }
    match pair.server.next_response() {
        Some(AppResponse::Send { status, accepted, .. }) => {
            assert_eq!(status, SendStatus::Ok);
            assert_eq!(accepted, 8);
        },
        other => panic!("send answered with {:?}", other),
    }

    pair.server.submit(AppRequest::Close { session: server }).unwrap();
    pair.settle();
    assert_eq!(pair.client.session_state(client).unwrap(), TcpState::TimeWait);
    assert_eq!(pair.server.session_state(server).unwrap(), TcpState::Closed);

    pair.client.submit(AppRequest::Receive { session: client, max_len: 64 }).unwrap();
    pair.settle();
    assert_eq!(pair.client.next_data().map(|received| received.data), Some(vec![2; 8]));
}

#[test]
fn send_beyond_buffer_is_refused() {
    let mut pair = Pair::new();
    pair.listen(80);
    let (client, _) = pair.connect(80);

    let size = pair.client.config().buffer_size;
    pair.client.submit(AppRequest::Send { session: client, data: vec![0; size + 1] }).unwrap();
    pair.settle();
    match pair.client.next_response() {
        Some(AppResponse::Send { status, accepted, max_writable, .. }) => {
            assert_eq!(status, SendStatus::NoSpace);
            assert_eq!(accepted, 0);
            assert_eq!(max_writable, size);
        },
        other => panic!("send answered with {:?}", other),
    }
}

#[test]
fn stalled_host_pushes_back() {
    let mut pair = Pair::new();
    pair.listen(80);
    let (client, server) = pair.connect(80);

    // The host stops collecting frames while the application keeps sending.
    let mut accepted = 0;
    let mut refused = 0;
    for _ in 0..500 {
        match pair.client.submit(AppRequest::Send { session: client, data: vec![7] }) {
            Ok(()) => accepted += 1,
            Err(Error::Backpressure) => refused += 1,
            Err(err) => panic!("submit failed: {}", err),
        }
        pair.client.poll(pair.now).unwrap();
    }
    assert!(refused > 0);
    assert!(!pair.client.is_idle());

    pair.settle();
    for _ in 0..50 {
        if !pair.advance() {
            break;
        }
    }
    assert_eq!(pair.receive(server), vec![7; accepted]);
}
