//! The accept loop: binds a `TcpListener` and spawns `handle_client` per
//! connection, logging and continuing on per-connection failure.

use crate::server::handler::handle_client;
use crate::utils::error::{Result, SocksError};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub struct SocksServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl SocksServer {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(SocksError::Io)?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "listening");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections forever, spawning one task per connection.
    /// Never returns except on signal from the caller via `shutdown`.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, client_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(error = %err, "accept failed, continuing");
                    continue;
                }
            };

            tokio::spawn(async move {
                if let Err(err) = handle_client(stream, client_addr).await {
                    error!(%client_addr, error = %err, "connection handler failed");
                }
            });
        }
    }
}
