use super::*;
use crate::wire::{IpProtocol, TcpFlags, TcpSeqNumber};

/// A segment from `10.0.0.1:40000` to the server.
fn frame(dst_port: u16, flags: TcpFlags, seq: i32, ack: Option<i32>, payload: &[u8]) -> Vec<u8> {
    let repr = TcpRepr {
        src_port: 40000,
        dst_port,
        flags,
        seq_number: TcpSeqNumber(seq),
        ack_number: ack.map(TcpSeqNumber),
        window_len: 1024,
        max_seg_size: None,
        payload_len: payload.len(),
    };
    let ip = Ipv4Repr {
        src_addr: client_addr(),
        dst_addr: server_addr(),
        protocol: IpProtocol::Tcp,
        payload_len: repr.header_len() + payload.len(),
        hop_limit: 64,
    };

    let mut frame = vec![0; ip.buffer_len() + ip.payload_len];
    let (header, segment) = frame.split_at_mut(ip.buffer_len());
    segment[repr.header_len()..].copy_from_slice(payload);
    repr.emit(segment, client_addr(), server_addr());
    ip.emit(header);
    frame
}

fn server() -> Toe {
    let mut server = Toe::new(config(server_addr())).unwrap();
    server.settle(Instant::ZERO, ROUNDS).unwrap();
    server.submit(AppRequest::Listen { port: 80 }).unwrap();
    server.settle(Instant::ZERO, ROUNDS).unwrap();
    assert_eq!(server.next_response(), Some(AppResponse::Listen { port: 80, ok: true }));
    server
}

#[test]
fn syn_opens_passive_session() {
    let mut server = server();
    let mut syn = TcpFlags::default();
    syn.set_syn(true);
    server.receive_frame(frame(80, syn, 1000, None, &[])).unwrap();
    server.settle(Instant::ZERO, ROUNDS).unwrap();

    let reply = server.transmit_frame().expect("no reply");
    let reply = segments(&[reply])[0];
    assert!(reply.flags.syn());
    assert_eq!(reply.ack_number, Some(TcpSeqNumber(1001)));
    assert_eq!(reply.max_seg_size, Some(1460));
    assert_eq!(server.statistics().sessions_registered, 1);

    let session = SessionId::new(0, 4).unwrap();
    assert_eq!(server.session_state(session).unwrap(), crate::TcpState::SynReceived);
    // The application only hears of it once the handshake completes.
    assert_eq!(server.next_notification(), None);
}

#[test]
fn segment_without_session_is_reset() {
    let mut server = server();
    let mut flags = TcpFlags::default();
    flags.set_ack(true);
    flags.set_psh(true);
    server.receive_frame(frame(80, flags, 5000, Some(7777), b"hello")).unwrap();
    server.settle(Instant::ZERO, ROUNDS).unwrap();

    let reply = server.transmit_frame().expect("no reset");
    let reply = segments(&[reply])[0];
    assert!(reply.flags.rst());
    assert_eq!(reply.seq_number, TcpSeqNumber(7777));
    assert_eq!(reply.dst_port, 40000);
    assert_eq!(server.transmit_frame(), None);

    let stats = server.statistics();
    assert_eq!(stats.sessions_registered, 0);
    assert_eq!(stats.segments_received, 1);
    assert_eq!(stats.segments_dropped, 1);
    assert_eq!(server.next_notification(), None);
}

#[test]
fn reset_is_never_answered() {
    let mut server = server();
    let mut flags = TcpFlags::default();
    flags.set_rst(true);
    server.receive_frame(frame(81, flags, 5000, None, &[])).unwrap();
    server.settle(Instant::ZERO, ROUNDS).unwrap();
    assert_eq!(server.transmit_frame(), None);
}

#[test]
fn corrupted_frame_is_dropped() {
    let mut server = server();
    let mut syn = TcpFlags::default();
    syn.set_syn(true);
    let mut corrupted = frame(80, syn, 1000, None, &[]);
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0x40;
    server.receive_frame(corrupted).unwrap();
    server.settle(Instant::ZERO, ROUNDS).unwrap();

    assert_eq!(server.transmit_frame(), None);
    assert_eq!(server.statistics().segments_dropped, 1);
    assert_eq!(server.statistics().sessions_registered, 0);
}

#[test]
fn closed_port_refuses_connect() {
    let mut pair = Pair::new();
    pair.client.submit(AppRequest::Connect { remote: server_addr(), port: 81 }).unwrap();
    pair.settle();

    match pair.client.next_response() {
        Some(AppResponse::Connect { status: ConnectStatus::Refused, port: 81, .. }) => (),
        other => panic!("connect answered with {:?}", other),
    }
    assert_eq!(pair.client.statistics().sessions_released, 1);
    assert_eq!(pair.server.statistics().sessions_registered, 0);
    assert_eq!(pair.client.next_deadline(), Expiration::Never);
}

#[test]
fn connect_without_free_port() {
    let client = Config { ephemeral_ports: 1, ..config(client_addr()) };
    let mut pair = Pair::with_configs(client, config(server_addr()));
    pair.listen(80);
    pair.connect(80);

    pair.client.submit(AppRequest::Connect { remote: server_addr(), port: 80 }).unwrap();
    pair.settle();
    match pair.client.next_response() {
        Some(AppResponse::Connect { session: None, status: ConnectStatus::NoFreePort, .. }) => (),
        other => panic!("connect answered with {:?}", other),
    }
    assert_eq!(pair.client.statistics().sessions_registered, 1);
}

#[test]
fn exhausted_server_refuses() {
    let server = Config { max_sessions: 1, ..config(server_addr()) };
    let mut pair = Pair::with_configs(config(client_addr()), server);
    pair.listen(80);
    pair.connect(80);

    pair.client.submit(AppRequest::Connect { remote: server_addr(), port: 80 }).unwrap();
    pair.settle();
    match pair.client.next_response() {
        Some(AppResponse::Connect { session: Some(_), status: ConnectStatus::Refused, .. }) => (),
        other => panic!("connect answered with {:?}", other),
    }
    assert_eq!(pair.server.statistics().sessions_registered, 1);
}
