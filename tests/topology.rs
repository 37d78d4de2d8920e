//! Exercises the join/pairing handshake, directory registration, and
//! safety-node recovery over real loopback TCP (and, for the directory, UDP)
//! sockets, the way each scenario is meant to play out: no mocked sockets,
//! just `Node`s, listeners, and a stand-in directory responder.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use codec::registration::Reply;
use codec::{framing::LineBuffer, Message};
use forwarder::{InterfaceId, Role};
use ndn_node::config::NodeConfig;
use ndn_node::node::Node;
use ndn_node::registration_client::RegistrationClient;
use ndn_node::topology;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;

fn config(port: u16) -> NodeConfig {
    NodeConfig {
        self_addr: SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), port),
        cache_capacity: 16,
        directory_addr: SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 9999),
        log_level: Default::default(),
    }
}

async fn read_one_message(read_half: &mut OwnedReadHalf) -> Message {
    let mut buffer = LineBuffer::new();
    let mut chunk = [0u8; 256];
    loop {
        if let Some(line) = buffer.next_line() {
            return Message::parse(&line).expect("valid wire message");
        }
        let n = read_half.read(&mut chunk).await.expect("read from peer");
        assert!(n > 0, "peer closed before sending a message");
        buffer.feed(&chunk[..n]);
    }
}

/// Binds a fresh UDP socket standing in for the registration directory.
async fn bind_fake_directory() -> (SocketAddrV4, UdpSocket) {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = match socket.local_addr().unwrap() {
        std::net::SocketAddr::V4(v4) => v4,
        _ => unreachable!("bound an IPv4 socket"),
    };
    (addr, socket)
}

/// Answers each request received on `socket`, in order, with the
/// corresponding pre-built reply in `replies`. The request bytes themselves
/// aren't inspected; each test already knows the order `RegistrationClient`
/// sends requests in.
async fn run_fake_directory(socket: UdpSocket, replies: Vec<String>) {
    let mut buf = [0u8; 512];
    for reply in replies {
        let (_n, peer) = socket.recv_from(&mut buf).await.unwrap();
        socket.send_to(reply.as_bytes(), peer).await.unwrap();
    }
}

/// Installs a neighbor backed by a real loopback TCP pair: one half is
/// handed to `node` as if it were an accepted or dialed connection, the
/// other half is returned so the test can observe what `node` writes to it.
async fn fake_neighbor_pair(node: &mut Node, role: Role) -> (InterfaceId, OwnedReadHalf, SocketAddrV4) {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = match listener.local_addr().unwrap() {
        std::net::SocketAddr::V4(v4) => v4,
        _ => unreachable!("bound an IPv4 socket"),
    };

    let connect_task = tokio::spawn(TcpStream::connect(addr));
    let (server_stream, _peer) = listener.accept().await.unwrap();
    let client_stream = connect_task.await.unwrap().unwrap();

    let (_server_read, server_write) = server_stream.into_split();
    let (client_read, _client_write) = client_stream.into_split();

    let interface = node.accept_neighbor(addr, server_write).expect("room for a neighbor");
    node.forwarder.neighbors_mut().get_mut(interface).unwrap().role = role;

    (interface, client_read, addr)
}

#[tokio::test]
async fn direct_join_with_no_peer_becomes_standalone() {
    let mut node = Node::new(config(5001));
    let joined = topology::direct_join(&mut node, Ipv4Addr::UNSPECIFIED, 0).await.unwrap();

    assert!(joined.is_none());
    assert!(node.joined);
    assert!(node.external.is_none());
    assert_eq!(node.network_id.unwrap().to_string(), "076");
}

#[tokio::test]
async fn two_node_pairing_exchanges_exactly_three_messages() {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let a_port = listener.local_addr().unwrap().port();

    let mut node_a = Node::new(config(a_port));
    let mut node_b = Node::new(config(5002));

    let mut joined_b = topology::direct_join(&mut node_b, Ipv4Addr::LOCALHOST, a_port)
        .await
        .unwrap()
        .expect("connecting to a live listener yields a neighbor");

    let (stream_a, peer_addr) = listener.accept().await.unwrap();
    let peer_addr = match peer_addr {
        std::net::SocketAddr::V4(v4) => v4,
        _ => panic!("expected IPv4 peer"),
    };
    let (mut read_half_a, write_half_a) = stream_a.into_split();
    let interface_a = node_a.accept_neighbor(peer_addr, write_half_a).unwrap();

    // B -> A: ENTRY
    let entry_from_b = match read_one_message(&mut read_half_a).await {
        Message::Entry(addr) => addr,
        other => panic!("expected ENTRY, got {other:?}"),
    };
    assert_eq!(entry_from_b, node_b.self_addr());

    topology::on_entry(&mut node_a, interface_a, entry_from_b).await;
    assert_eq!(node_a.external, Some(node_b.self_addr()));

    // A -> B: ENTRY reply, then SAFE.
    let entry_from_a = match read_one_message(&mut joined_b.read_half).await {
        Message::Entry(addr) => addr,
        other => panic!("expected ENTRY reply, got {other:?}"),
    };
    assert_eq!(entry_from_a, node_a.self_addr());

    let safe_from_a = match read_one_message(&mut joined_b.read_half).await {
        Message::Safe(addr) => addr,
        other => panic!("expected SAFE, got {other:?}"),
    };
    assert_eq!(safe_from_a, node_a.self_addr());

    topology::on_entry(&mut node_b, joined_b.interface, entry_from_a).await;
    topology::on_safe(&mut node_b, safe_from_a);

    assert_eq!(node_b.external, Some(node_a.self_addr()));
    assert_eq!(node_b.safety, Some(node_a.self_addr()));

    // The connecting side's own ENTRY reply is a no-op confirmation: no
    // fourth message follows.
    let mut trailing = [0u8; 16];
    let result = timeout(Duration::from_millis(100), read_half_a.read(&mut trailing)).await;
    assert!(result.is_err(), "node_a should not have received a fourth message");
}

#[tokio::test]
async fn join_registers_standalone_when_directory_reports_no_peers() {
    let (directory_addr, socket) = bind_fake_directory().await;
    tokio::spawn(run_fake_directory(
        socket,
        vec![
            Reply::NodesList {
                net: "076".parse().unwrap(),
                entries: vec![],
            }
            .encode(),
            Reply::OkReg.encode(),
        ],
    ));

    let mut node = Node::new(NodeConfig {
        directory_addr,
        ..config(5101)
    });
    let registration = RegistrationClient::new(directory_addr);

    let joined = topology::join(&mut node, &registration, "076".parse().unwrap()).await.unwrap();

    assert!(joined.is_none());
    assert!(node.joined);
    assert!(node.external.is_none());
    assert_eq!(node.network_id.unwrap().to_string(), "076");
}

#[tokio::test]
async fn join_connects_to_the_directory_supplied_peer() {
    let peer_listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let peer_port = peer_listener.local_addr().unwrap().port();
    let accept_task = tokio::spawn(async move { peer_listener.accept().await.unwrap() });

    let (directory_addr, socket) = bind_fake_directory().await;
    tokio::spawn(run_fake_directory(
        socket,
        vec![
            Reply::NodesList {
                net: "076".parse().unwrap(),
                entries: vec![(Ipv4Addr::LOCALHOST, peer_port)],
            }
            .encode(),
            Reply::OkReg.encode(),
        ],
    ));

    let mut node = Node::new(NodeConfig {
        directory_addr,
        ..config(5102)
    });
    let registration = RegistrationClient::new(directory_addr);

    let joined = topology::join(&mut node, &registration, "076".parse().unwrap())
        .await
        .unwrap()
        .expect("a directory-supplied peer yields a neighbor to connect to");

    assert!(node.joined);
    assert_eq!(node.external, Some(SocketAddrV4::new(Ipv4Addr::LOCALHOST, peer_port)));

    let (mut peer_stream, _) = accept_task.await.unwrap();
    let mut buf = [0u8; 256];
    let n = peer_stream.read(&mut buf).await.unwrap();
    assert!(n > 0);
    drop(joined);
}

#[tokio::test]
async fn join_rolls_back_the_neighbor_when_registration_fails_after_connect() {
    let peer_listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let peer_port = peer_listener.local_addr().unwrap().port();
    let accept_task = tokio::spawn(async move { peer_listener.accept().await.unwrap() });

    let (directory_addr, socket) = bind_fake_directory().await;
    tokio::spawn(run_fake_directory(
        socket,
        vec![
            Reply::NodesList {
                net: "076".parse().unwrap(),
                entries: vec![(Ipv4Addr::LOCALHOST, peer_port)],
            }
            .encode(),
            // Anything other than OKREG is an unexpected reply, and fails
            // the request immediately rather than waiting out the 5s
            // receive deadline.
            Reply::OkUnreg.encode(),
        ],
    ));

    let mut node = Node::new(NodeConfig {
        directory_addr,
        ..config(5103)
    });
    let registration = RegistrationClient::new(directory_addr);

    let result = topology::join(&mut node, &registration, "076".parse().unwrap()).await;
    assert!(result.is_err(), "a REG failure must surface as an error");

    assert!(!node.joined);
    assert!(node.external.is_none());
    assert!(
        node.forwarder.neighbors().is_empty(),
        "the just-installed neighbor must be rolled back, not left orphaned"
    );

    // The peer observes the rolled-back connection close, after whatever
    // ENTRY bytes were already in flight before the rollback.
    let (mut peer_stream, _) = accept_task.await.unwrap();
    let drained = timeout(Duration::from_millis(500), async {
        let mut buf = [0u8; 256];
        loop {
            if peer_stream.read(&mut buf).await.unwrap() == 0 {
                return;
            }
        }
    })
    .await;
    assert!(drained.is_ok(), "the rolled-back neighbor's write half must be shut down");
}

#[tokio::test]
async fn external_disconnect_recovers_via_safety_node() {
    // X is the safety node Z should reconnect to once Y disappears.
    let x_listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let x_port = x_listener.local_addr().unwrap().port();
    let x_addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, x_port);

    let mut node_x = Node::new(config(x_port));
    let mut node_z = Node::new(config(5201));

    // Z believes Y (never actually connected here) was its external, with
    // X cached as the safety node.
    let y_addr = SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 1);
    let y_interface = node_z.forwarder.neighbors_mut().insert(y_addr, Role::External).unwrap();
    node_z.external = Some(y_addr);
    node_z.safety = Some(x_addr);

    let recovered = topology::on_neighbor_gone(&mut node_z, y_interface).await.unwrap();
    let mut recovered = recovered.expect("the safety node is reachable, recovery should reconnect");

    assert_eq!(node_z.external, Some(x_addr));
    assert_eq!(node_z.forwarder.neighbors().len(), 1);

    // X treats this as a fresh pairing (it had no external of its own) and
    // completes the handshake exactly like a first-time connect would.
    let (x_stream, peer_addr) = x_listener.accept().await.unwrap();
    let peer_addr = match peer_addr {
        std::net::SocketAddr::V4(v4) => v4,
        _ => panic!("expected IPv4 peer"),
    };
    let (mut x_read, x_write) = x_stream.into_split();
    let x_interface = node_x.accept_neighbor(peer_addr, x_write).unwrap();

    let entry_from_z = match read_one_message(&mut x_read).await {
        Message::Entry(addr) => addr,
        other => panic!("expected ENTRY, got {other:?}"),
    };
    assert_eq!(entry_from_z, node_z.self_addr());

    topology::on_entry(&mut node_x, x_interface, entry_from_z).await;
    assert_eq!(node_x.external, Some(node_z.self_addr()));

    let entry_from_x = match read_one_message(&mut recovered.read_half).await {
        Message::Entry(addr) => addr,
        other => panic!("expected ENTRY reply, got {other:?}"),
    };
    assert_eq!(entry_from_x, node_x.self_addr());

    let safe_from_x = match read_one_message(&mut recovered.read_half).await {
        Message::Safe(addr) => addr,
        other => panic!("expected SAFE, got {other:?}"),
    };
    assert_eq!(safe_from_x, node_x.self_addr());

    topology::on_entry(&mut node_z, recovered.interface, entry_from_x).await;
    topology::on_safe(&mut node_z, safe_from_x);

    assert_eq!(node_z.safety, Some(node_x.self_addr()));
}

#[tokio::test]
async fn external_disconnect_promotes_an_internal_neighbor_when_safety_is_unusable() {
    let mut node = Node::new(config(5301));

    let y_addr = SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 1);
    let y_interface = node.forwarder.neighbors_mut().insert(y_addr, Role::External).unwrap();
    node.external = Some(y_addr);
    node.safety = Some(node.self_addr()); // unusable: equals self

    let (w1_interface, mut w1_read, w1_addr) = fake_neighbor_pair(&mut node, Role::Internal).await;
    let (_w2_interface, mut w2_read, _w2_addr) = fake_neighbor_pair(&mut node, Role::Internal).await;

    let recovered = topology::on_neighbor_gone(&mut node, y_interface).await.unwrap();
    assert!(recovered.is_none(), "promotion reuses an existing connection, it opens no new one");

    assert_eq!(node.external, Some(w1_addr));
    assert_eq!(node.safety, Some(node.self_addr()));
    assert_eq!(node.forwarder.neighbors().get(w1_interface).unwrap().role, Role::External);

    let entry_to_w1 = match read_one_message(&mut w1_read).await {
        Message::Entry(addr) => addr,
        other => panic!("expected ENTRY, got {other:?}"),
    };
    assert_eq!(entry_to_w1, node.self_addr());

    let safe_to_w2 = match read_one_message(&mut w2_read).await {
        Message::Safe(addr) => addr,
        other => panic!("expected SAFE, got {other:?}"),
    };
    assert_eq!(safe_to_w2, w1_addr);

    // The promoted neighbor is no longer internal, so it must not also
    // receive the safety broadcast meant for the remaining internals.
    let mut trailing = [0u8; 16];
    let result = timeout(Duration::from_millis(100), w1_read.read(&mut trailing)).await;
    assert!(result.is_err(), "the promoted neighbor should not get a trailing SAFE");
}

#[tokio::test]
async fn external_disconnect_falls_back_to_standalone_with_no_internal_neighbors() {
    let mut node = Node::new(config(5401));
    let y_addr = SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 1);
    let y_interface = node.forwarder.neighbors_mut().insert(y_addr, Role::External).unwrap();
    node.external = Some(y_addr);
    node.safety = Some(y_addr); // unusable: safety equals the departed peer itself

    let recovered = topology::on_neighbor_gone(&mut node, y_interface).await.unwrap();

    assert!(recovered.is_none());
    assert!(node.external.is_none());
    assert!(node.safety.is_none());
    assert!(node.forwarder.neighbors().is_empty());
}

#[tokio::test]
async fn external_disconnect_clears_state_when_the_safety_node_is_unreachable() {
    let mut node = Node::new(config(5501));
    let y_addr = SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 1);
    let y_interface = node.forwarder.neighbors_mut().insert(y_addr, Role::External).unwrap();
    node.external = Some(y_addr);
    // Nothing listens here, so reconnecting to the cached safety node fails.
    node.safety = Some(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 2));

    let recovered = topology::on_neighbor_gone(&mut node, y_interface).await.unwrap();

    assert!(recovered.is_none());
    assert!(node.external.is_none());
    assert!(node.safety.is_none());
}
