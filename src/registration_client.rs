//! Datagram exchange with the registration directory: one fresh ephemeral
//! UDP socket per request, sent once, raced against a fixed receive
//! deadline. The directory's unreliability is treated like any other
//! transient I/O failure: there is no retransmission.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use codec::registration::{Reply, Request};
use codec::NetworkId;
use tokio::net::UdpSocket;
use tokio::time::timeout;

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_DATAGRAM: usize = 4096;

pub struct RegistrationClient {
    directory_addr: SocketAddrV4,
}

impl RegistrationClient {
    pub fn new(directory_addr: SocketAddrV4) -> Self {
        Self { directory_addr }
    }

    async fn exchange(&self, request: &Request) -> Result<Reply> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .context("failed to bind registration socket")?;

        let wire = request.encode();
        socket
            .send_to(wire.as_bytes(), std::net::SocketAddr::V4(self.directory_addr))
            .await
            .with_context(|| format!("failed to send {request} to directory"))?;

        let mut buf = [0u8; MAX_DATAGRAM];
        let len = timeout(RECEIVE_TIMEOUT, socket.recv(&mut buf))
            .await
            .context("registration request timed out")?
            .context("failed to receive registration reply")?;

        let text = String::from_utf8_lossy(&buf[..len]);
        Reply::parse(&text).context("malformed registration reply")
    }

    pub async fn register(&self, net: NetworkId, self_addr: SocketAddrV4) -> Result<()> {
        let request = Request::Reg {
            net,
            ip: *self_addr.ip(),
            port: self_addr.port(),
        };
        match self.exchange(&request).await? {
            Reply::OkReg => Ok(()),
            other => bail!("unexpected reply to REG: {other:?}"),
        }
    }

    pub async fn unregister(&self, net: NetworkId, self_addr: SocketAddrV4) -> Result<()> {
        let request = Request::Unreg {
            net,
            ip: *self_addr.ip(),
            port: self_addr.port(),
        };
        match self.exchange(&request).await? {
            Reply::OkUnreg => Ok(()),
            other => bail!("unexpected reply to UNREG: {other:?}"),
        }
    }

    /// Fetches peers in `net`, already filtered of `0.0.0.0`/port-`0`
    /// placeholders and of `self_addr`.
    pub async fn nodes(&self, net: NetworkId, self_addr: SocketAddrV4) -> Result<Vec<SocketAddrV4>> {
        let request = Request::Nodes { net };
        match self.exchange(&request).await? {
            Reply::NodesList { entries, .. } => Ok(entries
                .into_iter()
                .map(|(ip, port)| SocketAddrV4::new(ip, port))
                .filter(|addr| *addr.ip() != Ipv4Addr::UNSPECIFIED && addr.port() != 0)
                .filter(|addr| *addr != self_addr)
                .collect()),
            other => bail!("unexpected reply to NODES: {other:?}"),
        }
    }
}
