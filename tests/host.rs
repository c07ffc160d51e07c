use bytes::Bytes;
use std::{
    net::{Ipv4Addr, SocketAddrV4},
    time::Duration,
};
use unitcp::{
    tcp_parsing::TcpHeaderBuilder, Config, ConnectionId, Disconnect, Event, Segment, State, Tcp,
    TcpError,
};

fn socket_a() -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 0xcafe)
}

fn socket_b() -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 80)
}

/// Pass segments back and forth until both hosts go quiet
fn exchange(host_a: &mut Tcp, host_b: &mut Tcp) {
    loop {
        let from_a = host_a.segments();
        let from_b = host_b.segments();
        if from_a.is_empty() && from_b.is_empty() {
            break;
        }
        for (id, segment) in from_a {
            host_b.segment_arrives(id.reverse(), segment);
        }
        for (id, segment) in from_b {
            host_a.segment_arrives(id.reverse(), segment);
        }
    }
}

fn connected_pair(config: Config) -> (Tcp, Tcp, ConnectionId) {
    let mut host_a = Tcp::new(config);
    let mut host_b = Tcp::new(config);
    host_b
        .listen(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 80))
        .unwrap();
    let id = host_a.connect(socket_a(), socket_b()).unwrap();
    exchange(&mut host_a, &mut host_b);
    (host_a, host_b, id)
}

#[test]
fn listener_accepts_and_transfers() {
    let (mut host_a, mut host_b, id) = connected_pair(Config::default());
    assert_eq!(host_a.state(id), Some(State::Established));
    assert_eq!(host_b.state(id.reverse()), Some(State::Established));
    assert_eq!(host_a.events(), vec![(id, Event::Connected)]);
    assert_eq!(host_b.events(), vec![(id.reverse(), Event::Connected)]);

    assert_eq!(host_a.send(id, "over the wire"), Ok(13));
    exchange(&mut host_a, &mut host_b);
    assert_eq!(
        host_b.receive(id.reverse()),
        Ok(Bytes::from_static(b"over the wire"))
    );

    let big = vec![0x5a; 10_000];
    host_b.send(id.reverse(), big.clone()).unwrap();
    exchange(&mut host_a, &mut host_b);
    assert_eq!(host_a.receive(id).unwrap(), Bytes::from(big));
}

#[test]
fn unknown_connection_is_refused() {
    let mut host_a = Tcp::new(Config::default());
    let mut host_b = Tcp::new(Config::default());
    let id = host_a.connect(socket_a(), socket_b()).unwrap();
    exchange(&mut host_a, &mut host_b);

    assert_eq!(
        host_a.events(),
        vec![(id, Event::Disconnected(Disconnect::Refused))]
    );
    assert_eq!(host_a.state(id), None);
    assert_eq!(host_a.connection_count(), 0);
    assert_eq!(host_b.connection_count(), 0);
}

#[test]
fn listener_survives_old_duplicate_syn() {
    let mut host_a = Tcp::new(Config::default()).with_iss(100);
    let mut host_b = Tcp::new(Config::default()).with_iss(300);
    host_b.listen(socket_b()).unwrap();
    let id = host_a.connect(socket_a(), socket_b()).unwrap();
    let delayed = host_a.segments();

    let old = TcpHeaderBuilder::new(socket_a().port(), socket_b().port(), 90)
        .syn()
        .wnd(1024)
        .build();
    host_b.segment_arrives(id.reverse(), Segment::new(old, Bytes::new()));
    let syn_ack = host_b.segments();
    assert_eq!(syn_ack[0].1.header.ack, 91);

    // A answers with a reset and B's half-open connection goes away
    for (id, segment) in syn_ack {
        host_a.segment_arrives(id.reverse(), segment);
    }
    for (id, segment) in host_a.segments() {
        assert!(segment.header.ctl.rst());
        host_b.segment_arrives(id.reverse(), segment);
    }
    assert_eq!(host_b.state(id.reverse()), None);

    for (id, segment) in delayed {
        host_b.segment_arrives(id.reverse(), segment);
    }
    assert_eq!(host_b.state(id.reverse()), Some(State::SynReceived));
    exchange(&mut host_a, &mut host_b);
    assert_eq!(host_a.state(id), Some(State::Established));
    assert_eq!(host_b.state(id.reverse()), Some(State::Established));
}

#[test]
fn closed_connections_are_reclaimed() {
    let config = Config::default();
    let (mut host_a, mut host_b, id) = connected_pair(config);

    host_a.close(id).unwrap();
    exchange(&mut host_a, &mut host_b);
    assert_eq!(host_b.state(id.reverse()), Some(State::CloseWait));
    assert_eq!(host_a.state(id), Some(State::FinWait2));

    host_b.close(id.reverse()).unwrap();
    exchange(&mut host_a, &mut host_b);
    assert_eq!(host_b.state(id.reverse()), None);
    assert_eq!(host_a.state(id), Some(State::TimeWait));

    host_a.advance_time(config.time_wait() + Duration::from_secs(1));
    assert_eq!(host_a.state(id), None);
    assert_eq!(host_a.connection_count(), 0);
}

#[test]
fn host_reports_misuse() {
    let mut host = Tcp::new(Config::default());
    host.listen(socket_b()).unwrap();
    assert_eq!(host.listen(socket_b()), Err(TcpError::AddressInUse));
    assert!(host.unlisten(socket_b()));
    assert!(!host.unlisten(socket_b()));

    let id = host.connect(socket_a(), socket_b()).unwrap();
    assert_eq!(
        host.connect(socket_a(), socket_b()),
        Err(TcpError::ConnectionExists)
    );

    let unknown = ConnectionId::new(socket_a(), SocketAddrV4::new(Ipv4Addr::LOCALHOST, 1));
    assert_eq!(host.send(unknown, "x"), Err(TcpError::UnknownConnection));
    assert_eq!(host.close(unknown), Err(TcpError::UnknownConnection));

    host.abort(id).unwrap();
    assert_eq!(host.state(id), None);
}
