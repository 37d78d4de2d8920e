//! The single-threaded cooperative event loop: a `tokio::select!` over
//! stdin, the listening socket's accept stream, every neighbor's line
//! stream, and a periodic PIT-timeout tick, `biased` so dispatch always
//! checks operator input first, then new connections, then neighbor
//! traffic, then timeouts. Each arm runs one handler to completion before
//! the loop re-polls, so no two handlers ever run concurrently and `Node`
//! needs no locking.
//!
//! Per-neighbor reads happen on lightweight reader tasks that only touch
//! their own socket and `LineBuffer`, never `Node`; they forward decoded
//! lines back to this loop over an unbounded channel, which is the single
//! place all state mutation happens.

use std::net::{SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant};

use anyhow::Result;
use codec::Message;
use forwarder::InterfaceId;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::commands::{self, Command};
use crate::config::NodeConfig;
use crate::node::Node;
use crate::registration_client::RegistrationClient;
use crate::render;
use crate::topology;

/// How often the PIT is swept for entries older than `INTEREST_TIMEOUT`.
/// Finer than the timeout itself so expiry is detected promptly without
/// busy-waiting.
const TIMEOUT_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// Largest single read off a neighbor socket before handing bytes to its
/// `LineBuffer`; unrelated to `MAX_WIRE`, which bounds the buffered line.
const READ_CHUNK: usize = 4096;

enum NeighborEvent {
    Line(InterfaceId, String),
    Closed(InterfaceId),
}

pub async fn run(config: NodeConfig) -> Result<()> {
    let listener = TcpListener::bind(std::net::SocketAddr::V4(config.self_addr)).await?;
    log::info!("listening on {}", config.self_addr);

    let registration = RegistrationClient::new(config.directory_addr);
    let mut node = Node::new(config);

    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<String>();
    let (accept_tx, mut accept_rx) = mpsc::unbounded_channel::<(TcpStream, SocketAddr)>();
    let (neighbor_tx, mut neighbor_rx) = mpsc::unbounded_channel::<NeighborEvent>();

    tokio::spawn(stdin_reader(command_tx));
    tokio::spawn(accept_loop(listener, accept_tx));

    let mut timeouts = tokio::time::interval(TIMEOUT_SWEEP_INTERVAL);
    let mut sigint = Box::pin(tokio::signal::ctrl_c());

    loop {
        tokio::select! {
            biased;

            line = command_rx.recv() => {
                match line {
                    Some(line) => {
                        if handle_command(&mut node, &registration, &neighbor_tx, &line).await {
                            break;
                        }
                    }
                    None => break,
                }
            }

            accepted = accept_rx.recv() => {
                match accepted {
                    Some((stream, addr)) => handle_accept(&mut node, stream, addr, &neighbor_tx),
                    None => break,
                }
            }

            event = neighbor_rx.recv() => {
                match event {
                    Some(event) => handle_neighbor_event(&mut node, &neighbor_tx, event).await,
                    None => break,
                }
            }

            _ = timeouts.tick() => {
                let actions = node.forwarder.scan_timeouts(Instant::now(), forwarder::INTEREST_TIMEOUT);
                node.apply_outbound(actions).await;
            }

            _ = &mut sigint => {
                log::info!("interrupt received, shutting down");
                break;
            }
        }
    }

    if node.joined {
        if let Err(err) = topology::leave(&mut node, &registration).await {
            log::warn!("leave during shutdown failed: {err}");
        }
    }

    Ok(())
}

async fn stdin_reader(tx: UnboundedSender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(line).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(err) => {
                log::warn!("stdin read error: {err}");
                return;
            }
        }
    }
}

async fn accept_loop(listener: TcpListener, tx: UnboundedSender<(TcpStream, SocketAddr)>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                if tx.send((stream, addr)).is_err() {
                    return;
                }
            }
            Err(err) => log::warn!("accept failed: {err}"),
        }
    }
}

fn spawn_neighbor_reader(
    interface: InterfaceId,
    read_half: OwnedReadHalf,
    tx: UnboundedSender<NeighborEvent>,
) {
    tokio::spawn(async move {
        let mut read_half = read_half;
        let mut buffer = codec::framing::LineBuffer::new();
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            match read_half.read(&mut chunk).await {
                Ok(0) => {
                    let _ = tx.send(NeighborEvent::Closed(interface));
                    return;
                }
                Ok(n) => {
                    buffer.feed(&chunk[..n]);
                    while let Some(line) = buffer.next_line() {
                        if tx.send(NeighborEvent::Line(interface, line)).is_err() {
                            return;
                        }
                    }
                }
                Err(err) => {
                    log::debug!("read error on interface {interface}: {err}");
                    let _ = tx.send(NeighborEvent::Closed(interface));
                    return;
                }
            }
        }
    });
}

fn handle_accept(
    node: &mut Node,
    stream: TcpStream,
    addr: SocketAddr,
    neighbor_tx: &UnboundedSender<NeighborEvent>,
) {
    let SocketAddr::V4(v4) = addr else {
        log::warn!("rejecting non-IPv4 inbound connection from {addr}");
        return;
    };

    let (read_half, write_half) = stream.into_split();
    let Some(interface) = node.accept_neighbor(v4, write_half) else {
        log::warn!("neighbor table is full, rejecting connection from {v4}");
        return;
    };
    log::info!("accepted connection from {v4} on interface {interface}");
    spawn_neighbor_reader(interface, read_half, neighbor_tx.clone());
}

async fn handle_neighbor_event(
    node: &mut Node,
    neighbor_tx: &UnboundedSender<NeighborEvent>,
    event: NeighborEvent,
) {
    match event {
        NeighborEvent::Line(interface, line) => {
            dispatch_wire_message(node, interface, &line).await;
        }
        NeighborEvent::Closed(interface) => match topology::on_neighbor_gone(node, interface).await {
            Ok(Some(joined)) => {
                spawn_neighbor_reader(joined.interface, joined.read_half, neighbor_tx.clone());
            }
            Ok(None) => {}
            Err(err) => log::warn!("safety recovery failed: {err}"),
        },
    }
}

async fn dispatch_wire_message(node: &mut Node, interface: InterfaceId, line: &str) {
    let message = match Message::parse(line) {
        Ok(message) => message,
        Err(err) => {
            log::info!("ignoring malformed message on interface {interface}: {err}");
            return;
        }
    };

    match message {
        Message::Entry(addr) => topology::on_entry(node, interface, addr).await,
        Message::Safe(addr) => topology::on_safe(node, addr),
        Message::Interest(name) => {
            let actions = node.forwarder.on_interest(interface, name, Instant::now());
            node.apply_outbound(actions).await;
        }
        Message::Object(name) => {
            let actions = node.forwarder.on_object(name);
            node.apply_outbound(actions).await;
        }
        Message::NoObject(name) => {
            let actions = node.forwarder.on_noobject(interface, name);
            node.apply_outbound(actions).await;
        }
    }
}

/// Executes one parsed operator command. Returns `true` if the event loop
/// should shut down afterward.
async fn handle_command(
    node: &mut Node,
    registration: &RegistrationClient,
    neighbor_tx: &UnboundedSender<NeighborEvent>,
    line: &str,
) -> bool {
    let command = match commands::parse(line) {
        Ok(Some(command)) => command,
        Ok(None) => return false,
        Err(err) => {
            println!("error: {err}");
            return false;
        }
    };

    match command {
        Command::Join { net } => match net.parse::<codec::NetworkId>() {
            Ok(net) => match topology::join(node, registration, net).await {
                Ok(Some(joined)) => {
                    spawn_neighbor_reader(joined.interface, joined.read_half, neighbor_tx.clone());
                    println!("joined network {net}");
                }
                Ok(None) => println!("joined network {net} as a standalone node"),
                Err(err) => println!("error: {err}"),
            },
            Err(err) => println!("error: {err}"),
        },
        Command::DirectJoin { ip, port } => match topology::direct_join(node, ip, port).await {
            Ok(Some(joined)) => {
                spawn_neighbor_reader(joined.interface, joined.read_half, neighbor_tx.clone());
                println!("joined via {ip}:{port}");
            }
            Ok(None) => println!("standalone"),
            Err(err) => println!("error: {err}"),
        },
        Command::Create { name } => match node.forwarder.create(&name) {
            Ok(()) => println!("created {name}"),
            Err(err) => println!("error: {err}"),
        },
        Command::Delete { name } => match node.forwarder.delete(&name) {
            Ok(()) => println!("deleted {name}"),
            Err(err) => println!("error: {err}"),
        },
        Command::Retrieve { name } => match name.parse::<codec::Name>() {
            Ok(name) => match node.forwarder.retrieve(name.clone(), Instant::now(), node.joined) {
                Ok(forwarder::RetrieveOutcome::Hit) => println!("FOUND {name}"),
                Ok(forwarder::RetrieveOutcome::Sent(actions)) => node.apply_outbound(actions).await,
                Err(err) => println!("error: {err}"),
            },
            Err(err) => println!("error: {err}"),
        },
        Command::ShowTopology => print!("{}", render::topology(node)),
        Command::ShowNames => print!("{}", render::names(node)),
        Command::ShowInterestTable => print!("{}", render::interest_table(node)),
        Command::Leave => {
            if let Err(err) = topology::leave(node, registration).await {
                println!("error: {err}");
            }
        }
        Command::Exit => return true,
        Command::Help => println!("{}", commands::HELP_TEXT),
    }

    false
}
