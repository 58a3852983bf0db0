//! SOCKS5 TCP handler: method negotiation, request parsing, and dispatch
//! to CONNECT relay or UDP ASSOCIATE setup. BIND is acknowledged only to
//! be rejected.

use crate::protocol::socks5::{negotiate, read_request, write_reply};
use crate::protocol::types::{format_addr, Address, Command, ReplyCode};
use crate::server::relay::copy_bidirectional;
use crate::server::resolver::resolve_address;
use crate::server::udp_relay::UdpAssociateServer;
use crate::utils::error::{Result, SocksError};
use std::net::SocketAddr;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::{info, warn};

const DISCARD_BUFFER_SIZE: usize = 16 * 1024;

pub async fn handle(mut stream: TcpStream, client_addr: SocketAddr) -> Result<()> {
    negotiate(&mut stream).await?;

    let request = read_request(&mut stream).await?;

    match request.command {
        Command::Connect => handle_connect(stream, request.address, request.port).await,
        Command::Bind => {
            write_reply(
                &mut stream,
                ReplyCode::CommandNotSupported,
                &Address::unspecified(),
                0,
            )
            .await?;
            Ok(())
        }
        Command::UdpAssociate => handle_udp_associate(stream, client_addr).await,
    }
}

async fn handle_connect(mut client: TcpStream, address: Address, port: u16) -> Result<()> {
    let upstream = match resolve_address(&address, port).await {
        Ok(targets) => connect_first(&targets).await,
        Err(_) => None,
    };

    let upstream = match upstream {
        Some(upstream) => upstream,
        None => {
            let _ = write_reply(
                &mut client,
                ReplyCode::GeneralFailure,
                &Address::unspecified(),
                0,
            )
            .await;
            return Err(SocksError::Protocol(format!(
                "failed to connect to {}:{}",
                address, port
            )));
        }
    };

    upstream.set_nodelay(true)?;
    write_reply(&mut client, ReplyCode::Succeeded, &Address::unspecified(), 0).await?;
    info!(remote = %format_addr(&address.to_string(), port), "socks5 connect established");
    copy_bidirectional(client, upstream).await
}

async fn connect_first(targets: &[SocketAddr]) -> Option<TcpStream> {
    for target in targets {
        match TcpStream::connect(target).await {
            Ok(stream) => return Some(stream),
            Err(err) => warn!(%target, error = %err, "socks5 connect attempt failed"),
        }
    }
    None
}

async fn handle_udp_associate(mut stream: TcpStream, client_addr: SocketAddr) -> Result<()> {
    let bind_ip = stream.local_addr()?.ip();

    let server = match UdpAssociateServer::start(bind_ip, client_addr.ip()).await {
        Ok(server) => server,
        Err(err) => {
            let _ = write_reply(
                &mut stream,
                ReplyCode::GeneralFailure,
                &Address::unspecified(),
                0,
            )
            .await;
            return Err(SocksError::Io(err));
        }
    };

    let (bound_address, bound_port) = server.bound_address()?;
    write_reply(&mut stream, ReplyCode::Succeeded, &bound_address, bound_port).await?;
    info!(
        bound = %format_addr(&bound_address.to_string(), bound_port),
        "socks5 udp associate established"
    );

    let mut discard = vec![0u8; DISCARD_BUFFER_SIZE];
    loop {
        match stream.read(&mut discard).await {
            Ok(0) | Err(_) => break,
            Ok(_) => continue,
        }
    }

    server.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connect_relays_after_handshake() {
        let upstream_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_addr = upstream_listener.local_addr().unwrap();

        let client_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client_listen_addr = client_listener.local_addr().unwrap();

        let server_task = tokio::spawn(async move {
            let (stream, peer) = client_listener.accept().await.unwrap();
            handle(stream, peer).await
        });

        let upstream_task = tokio::spawn(async move {
            let (mut stream, _) = upstream_listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(b"pong").await.unwrap();
        });

        let mut client = TcpStream::connect(client_listen_addr).await.unwrap();
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut method_reply = [0u8; 2];
        client.read_exact(&mut method_reply).await.unwrap();
        assert_eq!(method_reply, [0x05, 0x00]);

        let mut request = vec![0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1];
        request.extend_from_slice(&upstream_addr.port().to_be_bytes());
        client.write_all(&request).await.unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[0], 0x05);
        assert_eq!(reply[1], ReplyCode::Succeeded as u8);

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        drop(client);
        upstream_task.await.unwrap();
        server_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bind_is_rejected() {
        let client_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client_listen_addr = client_listener.local_addr().unwrap();

        let server_task = tokio::spawn(async move {
            let (stream, peer) = client_listener.accept().await.unwrap();
            handle(stream, peer).await
        });

        let mut client = TcpStream::connect(client_listen_addr).await.unwrap();
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut method_reply = [0u8; 2];
        client.read_exact(&mut method_reply).await.unwrap();

        client
            .write_all(&[0x05, 0x02, 0x00, 0x01, 1, 2, 3, 4, 0, 80])
            .await
            .unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], ReplyCode::CommandNotSupported as u8);

        drop(client);
        server_task.await.unwrap().unwrap();
    }
}
