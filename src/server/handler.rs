//! Per-connection dispatcher: reads the version byte and routes to the
//! SOCKS4 or SOCKS5 handler.

use crate::protocol::types::{SOCKS4_VERSION, SOCKS5_VERSION};
use crate::server::{socks4, socks5};
use crate::utils::error::{Result, SocksError};
use std::net::SocketAddr;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::warn;

pub async fn handle_client(mut stream: TcpStream, client_addr: SocketAddr) -> Result<()> {
    stream.set_nodelay(true)?;
    let version = stream.read_u8().await?;

    match version {
        SOCKS4_VERSION => socks4::handle(stream).await,
        SOCKS5_VERSION => socks5::handle(stream, client_addr).await,
        other => {
            warn!(version = other, %client_addr, "unsupported proxy version");
            Err(SocksError::VersionMismatch)
        }
    }
}
