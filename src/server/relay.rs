//! Full-duplex byte-stream relay between a client and an origin socket.

use crate::utils::error::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, instrument};

const BUFFER_SIZE: usize = 16 * 1024;

/// Copy bytes in both directions between `client` and `upstream` until
/// both halves have reached EOF or errored. TCP_NODELAY is set on both
/// sockets first. An error in one direction closes that direction's
/// write half but does not affect the other (half-close).
#[instrument(level = "debug", skip(client, upstream))]
pub async fn copy_bidirectional(client: TcpStream, upstream: TcpStream) -> Result<()> {
    client.set_nodelay(true)?;
    upstream.set_nodelay(true)?;

    let (mut client_read, mut client_write) = client.into_split();
    let (mut upstream_read, mut upstream_write) = upstream.into_split();

    let upload = async move {
        let mut buf = vec![0u8; BUFFER_SIZE];
        loop {
            let n = match client_read.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            if upstream_write.write_all(&buf[..n]).await.is_err() {
                break;
            }
        }
        let _ = upstream_write.shutdown().await;
    };

    let download = async move {
        let mut buf = vec![0u8; BUFFER_SIZE];
        loop {
            let n = match upstream_read.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            if client_write.write_all(&buf[..n]).await.is_err() {
                break;
            }
        }
        let _ = client_write.shutdown().await;
    };

    tokio::join!(upload, download);
    debug!("relay finished");
    Ok(())
}
