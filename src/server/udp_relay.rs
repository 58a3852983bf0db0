//! SOCKS5 UDP ASSOCIATE: binds a listener on the control connection's
//! local IP, demultiplexes client datagrams into per-endpoint sessions
//! via [`crate::server::udp_fabric`], and forwards their payloads
//! through a shared IPv4/IPv6 egress socket pair.

use crate::protocol::socks5::udp::UdpHeader;
use crate::protocol::types::Address;
use crate::server::resolver::resolve_address;
use crate::server::udp_fabric::{UdpSession, UdpSessionFabric};
use crate::utils::error::{Result, SocksError};
use dashmap::DashMap;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A lightweight, cloneable capability to send datagrams back to one
/// client endpoint through the shared client-facing listener.
#[derive(Clone)]
struct ClientSender {
    peer: SocketAddr,
    socket: Arc<UdpSocket>,
}

impl ClientSender {
    async fn send(&self, data: &[u8]) {
        if let Err(err) = self.socket.send_to(data, self.peer).await {
            warn!(peer = %self.peer, error = %err, "failed to send udp reply to client");
        }
    }
}

/// Runs for the lifetime of one SOCKS5 UDP ASSOCIATE: owns the
/// client-facing fabric and the dual-stack egress sockets, and tears
/// everything down together.
pub struct UdpAssociateServer {
    fabric: UdpSessionFabric,
    egress_v4_reader: JoinHandle<()>,
    egress_v6_reader: JoinHandle<()>,
}

impl UdpAssociateServer {
    /// Bind the client-facing listener on `bind_ip` (the control
    /// connection's local address) with an ephemeral port, and start
    /// relaying. `client_ip` is the address every client UDP endpoint
    /// must match; datagrams from any other source are dropped before a
    /// session is ever created.
    pub async fn start(bind_ip: IpAddr, client_ip: IpAddr) -> std::io::Result<Self> {
        let egress_v4 = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
        let egress_v6 = Arc::new(UdpSocket::bind("[::]:0").await?);
        let origin_to_client: Arc<DashMap<SocketAddr, ClientSender>> = Arc::new(DashMap::new());

        let egress_v4_reader = spawn_egress_reader(egress_v4.clone(), origin_to_client.clone());
        let egress_v6_reader = spawn_egress_reader(egress_v6.clone(), origin_to_client.clone());

        let fabric = UdpSessionFabric::bind(
            SocketAddr::new(bind_ip, 0),
            Arc::new(move |session| {
                if session.peer().ip() != client_ip {
                    info!(
                        peer = %session.peer(),
                        "udp packets dropped: client ip address not allowed"
                    );
                    return;
                }
                debug!(peer = %session.peer(), "udp session opened");
                tokio::spawn(run_session(
                    session,
                    egress_v4.clone(),
                    egress_v6.clone(),
                    origin_to_client.clone(),
                ));
            }),
        )
        .await?;

        Ok(Self {
            fabric,
            egress_v4_reader,
            egress_v6_reader,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.fabric.local_addr()
    }

    /// Bound address as a SOCKS Address, typed IPv6 if the bound IP is
    /// an IPv6 literal, IPv4 otherwise.
    pub fn bound_address(&self) -> std::io::Result<(Address, u16)> {
        let local = self.local_addr()?;
        Ok(match local.ip() {
            IpAddr::V6(v6) => (Address::IPv6(v6.octets()), local.port()),
            IpAddr::V4(v4) => (Address::IPv4(v4.octets()), local.port()),
        })
    }

    /// Tear down the client-facing fabric and both egress readers
    /// together, releasing both egress sockets.
    pub fn close(&self) {
        self.fabric.close();
        self.egress_v4_reader.abort();
        self.egress_v6_reader.abort();
    }
}

impl Drop for UdpAssociateServer {
    fn drop(&mut self) {
        self.close();
    }
}

fn spawn_egress_reader(
    socket: Arc<UdpSocket>,
    origin_to_client: Arc<DashMap<SocketAddr, ClientSender>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let (n, origin) = match socket.recv_from(&mut buf).await {
                Ok(pair) => pair,
                Err(err) => {
                    debug!(error = %err, "udp egress socket closed");
                    break;
                }
            };
            let Some(client) = origin_to_client.get(&origin).map(|entry| entry.value().clone())
            else {
                continue;
            };
            // `origin.ip()` already carries the real address family as
            // reported by the OS, so an IPv4-mapped IPv6 sender (as seen
            // on a dual-stack socket) naturally comes through as the V6
            // variant here and is emitted with ATYP_IPV6 below, matching
            // the source behavior of preferring an IPv6 parse.
            let address = match origin.ip() {
                IpAddr::V6(v6) => Address::IPv6(v6.octets()),
                IpAddr::V4(v4) => Address::IPv4(v4.octets()),
            };
            let header = UdpHeader::new(address, origin.port());
            let Ok(mut reply) = header.pack() else {
                continue;
            };
            reply.extend_from_slice(&buf[..n]);
            client.send(&reply).await;
        }
    });
}

async fn run_session(
    mut session: UdpSession,
    egress_v4: Arc<UdpSocket>,
    egress_v6: Arc<UdpSocket>,
    origin_to_client: Arc<DashMap<SocketAddr, ClientSender>>,
) {
    let peer = session.peer();
    let sender = ClientSender {
        peer,
        socket: session.socket_handle(),
    };
    let mut resolve_cache: HashMap<(String, u16), SocketAddr> = HashMap::new();

    while let Some(datagram) = session.recv().await {
        if let Err(err) = forward_datagram(
            &datagram,
            &egress_v4,
            &egress_v6,
            &mut resolve_cache,
            &origin_to_client,
            &sender,
        )
        .await
        {
            warn!(%peer, error = %err, "udp session error, closing session");
            break;
        }
    }
    debug!(%peer, "udp session closed");
}

async fn forward_datagram(
    datagram: &[u8],
    egress_v4: &Arc<UdpSocket>,
    egress_v6: &Arc<UdpSocket>,
    resolve_cache: &mut HashMap<(String, u16), SocketAddr>,
    origin_to_client: &Arc<DashMap<SocketAddr, ClientSender>>,
    sender: &ClientSender,
) -> Result<()> {
    let (header, payload) = UdpHeader::parse(datagram)?;
    let key = (header.address.to_string(), header.port);

    let target = if let Some(cached) = resolve_cache.get(&key) {
        *cached
    } else {
        let resolved = resolve_address(&header.address, header.port).await?;
        let target = *resolved.first().ok_or(SocksError::InvalidDomainName)?;
        resolve_cache.insert(key, target);
        target
    };

    origin_to_client.insert(target, sender.clone());
    let egress = match target {
        SocketAddr::V4(_) => egress_v4,
        SocketAddr::V6(_) => egress_v6,
    };
    egress.send_to(payload, target).await.map_err(SocksError::Io)?;
    Ok(())
}
