//! The tables talking to each other over their queues.
use crate::config::Config;
use crate::link::Links;
use crate::wire::Ipv4Address;
use super::*;

fn config() -> Config {
    Config { max_sessions: 2, ..Config::default() }
}

fn tuple(local_port: u16) -> FourTuple {
    FourTuple {
        local: Ipv4Address::new(10, 0, 0, 1),
        local_port,
        remote: Ipv4Address::new(10, 0, 0, 2),
        remote_port: 80,
    }
}

fn ready_ports() -> PortTable {
    let mut ports = PortTable::new(4, 1 << 12);
    assert!(ports.sweep());
    ports
}

#[test]
fn close_releases_session_and_port() {
    let links = Links::new(&config());
    let mut ports = ready_ports();
    let mut lookup = SessionLookup::new(2);
    let mut states = StateTable::new(2);

    links.free_port_req.push(()).unwrap();
    ports.poll(&links).unwrap();
    let port = links.free_port_rsp.pop().unwrap().unwrap();
    assert_eq!(ports.query(port), PortState::Active);

    links.app_lookup_req.push(LookupRequest { tuple: tuple(port), allow_create: true }).unwrap();
    lookup.poll(&links).unwrap();
    let session = links.app_lookup_rsp.pop().unwrap().session.unwrap();

    links.state_connect_req.push(StateRequest::write(session, TcpState::TimeWait)).unwrap();
    states.poll(&links).unwrap();
    assert!(links.session_release.is_empty());

    links.timer_close.push(StateRequest::write(session, TcpState::Closed)).unwrap();
    states.poll(&links).unwrap();
    assert_eq!(links.session_release.len(), 1);

    lookup.poll(&links).unwrap();
    ports.poll(&links).unwrap();
    assert_eq!(ports.query(port), PortState::Closed);
    assert_eq!(lookup.free_ids(), 2);
    assert_eq!(links.counters.sessions_registered.get(), 1);
    assert_eq!(links.counters.sessions_released.get(), 1);

    // A second close of the same session releases nothing.
    links.timer_close.push(StateRequest::write(session, TcpState::Closed)).unwrap();
    states.poll(&links).unwrap();
    assert!(links.session_release.is_empty());
}

#[test]
fn passive_session_keeps_listening_port() {
    let links = Links::new(&config());
    let mut ports = ready_ports();
    let mut lookup = SessionLookup::new(2);

    links.listen_req.push(80).unwrap();
    ports.poll(&links).unwrap();
    assert_eq!(links.listen_rsp.pop(), Some(true));

    links.rx_lookup_req.push(LookupRequest { tuple: tuple(80), allow_create: true }).unwrap();
    lookup.poll(&links).unwrap();
    let session = links.rx_lookup_rsp.pop().unwrap().session.unwrap();

    links.session_release.push(session).unwrap();
    lookup.poll(&links).unwrap();
    assert!(links.port_release.is_empty());
    assert_eq!(ports.query(80), PortState::Listening);
}

#[test]
fn receive_engine_waits_for_connect_lock() {
    let links = Links::new(&config());
    let mut states = StateTable::new(2);
    let session = SessionId::new(1, 2).unwrap();

    links.state_connect_req.push(StateRequest::read(session)).unwrap();
    links.state_rx_req.push(StateRequest::read(session)).unwrap();
    states.poll(&links).unwrap();
    assert_eq!(links.state_connect_rsp.pop(), Some(TcpState::Closed));
    assert!(links.state_rx_rsp.is_empty());
    assert!(!states.is_idle());

    links.state_connect_req.push(StateRequest::write(session, TcpState::SynSent)).unwrap();
    states.poll(&links).unwrap();
    assert_eq!(links.state_rx_rsp.pop(), Some(TcpState::SynSent));
    assert!(states.is_idle());
}

#[test]
fn application_lookup_goes_first() {
    let links = Links::new(&config());
    let mut lookup = SessionLookup::new(1);

    links.rx_lookup_req.push(LookupRequest { tuple: tuple(80), allow_create: true }).unwrap();
    links.app_lookup_req.push(LookupRequest { tuple: tuple(0x8000), allow_create: true }).unwrap();
    lookup.poll(&links).unwrap();
    assert!(links.app_lookup_rsp.pop().unwrap().created);
    assert!(links.rx_lookup_rsp.is_empty());

    // The pool is empty now, the inbound segment misses.
    lookup.poll(&links).unwrap();
    assert_eq!(links.rx_lookup_rsp.pop(), Some(LookupReply { session: None, created: false }));
}
