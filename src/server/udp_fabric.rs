//! A connection-oriented abstraction over one connectionless `UdpSocket`:
//! a single reader task demultiplexes datagrams by source endpoint into
//! per-endpoint bounded queues, handing each new endpoint's queue to a
//! caller-supplied callback the first time it's seen.

use bytes::Bytes;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

const SESSION_QUEUE_CAPACITY: usize = 128;
const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// A per-client-endpoint handle into the fabric: receives datagrams
/// addressed to this endpoint, and sends datagrams back to it through
/// the shared listener socket.
pub struct UdpSession {
    peer: SocketAddr,
    inbound: mpsc::Receiver<Bytes>,
    socket: Arc<UdpSocket>,
}

impl UdpSession {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// A clone of the fabric's shared socket, for callers that need to
    /// reply to this endpoint without going through `send`.
    pub fn socket_handle(&self) -> Arc<UdpSocket> {
        self.socket.clone()
    }

    /// Await the next datagram from this endpoint, or `None` once the
    /// fabric has closed and the queue has drained.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.inbound.recv().await
    }

    pub async fn send(&self, data: &[u8]) -> std::io::Result<usize> {
        self.socket.send_to(data, self.peer).await
    }
}

/// Invoked once per newly observed client endpoint, with the session
/// handle that delivers its subsequent datagrams.
pub type ClientConnectedFn = Arc<dyn Fn(UdpSession) + Send + Sync>;

/// Owns one bound `UdpSocket` and the set of live per-endpoint sessions.
/// The reader task never blocks on a full session queue: it drops the
/// newest datagram instead, so one slow consumer can't stall ingress.
pub struct UdpSessionFabric {
    socket: Arc<UdpSocket>,
    sessions: Arc<DashMap<SocketAddr, mpsc::Sender<Bytes>>>,
    shutdown: CancellationToken,
    reader: tokio::task::JoinHandle<()>,
}

impl UdpSessionFabric {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Bind a UDP socket and start the demultiplexing reader task.
    /// `client_connected` is called (synchronously, from the reader task)
    /// each time a datagram arrives from an endpoint with no existing
    /// session.
    pub async fn bind(
        bind_addr: SocketAddr,
        client_connected: ClientConnectedFn,
    ) -> std::io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let sessions: Arc<DashMap<SocketAddr, mpsc::Sender<Bytes>>> = Arc::new(DashMap::new());
        let shutdown = CancellationToken::new();

        let reader = tokio::spawn(read_loop(
            socket.clone(),
            sessions.clone(),
            client_connected,
            shutdown.clone(),
        ));

        Ok(Self {
            socket,
            sessions,
            shutdown,
            reader,
        })
    }

    pub fn socket(&self) -> Arc<UdpSocket> {
        self.socket.clone()
    }

    /// Signal the reader task to stop and drop every session's sender,
    /// which causes each session's `recv()` to resolve to `None`.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.reader.abort();
        self.sessions.clear();
    }
}

impl Drop for UdpSessionFabric {
    fn drop(&mut self) {
        self.close();
    }
}

async fn read_loop(
    socket: Arc<UdpSocket>,
    sessions: Arc<DashMap<SocketAddr, mpsc::Sender<Bytes>>>,
    client_connected: ClientConnectedFn,
    shutdown: CancellationToken,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        let (n, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = socket.recv_from(&mut buf) => match result {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(error = %err, "udp fabric reader stopped");
                    break;
                }
            },
        };
        let data = Bytes::copy_from_slice(&buf[..n]);

        let existing = sessions.get(&peer).map(|entry| entry.value().clone());
        if let Some(sender) = existing {
            if sender.try_send(data).is_err() {
                trace!(%peer, "udp session queue full, dropping datagram");
            }
            continue;
        }

        let (tx, rx) = mpsc::channel(SESSION_QUEUE_CAPACITY);
        if tx.try_send(data).is_err() {
            // Can't happen on a fresh channel, but don't let it panic the loop.
            continue;
        }
        sessions.insert(peer, tx);
        debug!(%peer, "new udp session");

        let session = UdpSession {
            peer,
            inbound: rx,
            socket: socket.clone(),
        };
        client_connected(session);
    }
}
