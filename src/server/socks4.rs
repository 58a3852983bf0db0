//! SOCKS4 / SOCKS4a CONNECT handling. BIND is acknowledged only to be
//! rejected; every other command is rejected without being parsed.

use crate::protocol::socks4::{read_request, write_reply, Command, ReplyCode};
use crate::protocol::types::format_addr;
use crate::server::relay::copy_bidirectional;
use crate::server::resolver::resolve_address;
use crate::utils::error::{Result, SocksError};
use tokio::net::TcpStream;
use tracing::{info, warn};

pub async fn handle(mut stream: TcpStream) -> Result<()> {
    let request = match read_request(&mut stream).await {
        Ok(request) => request,
        Err(SocksError::CommandNotSupported(code)) => {
            let _ = write_reply(&mut stream, ReplyCode::RequestRejectedOrFailed).await;
            return Err(SocksError::CommandNotSupported(code));
        }
        Err(err) => return Err(err),
    };

    match request.command {
        Command::Connect => handle_connect(stream, request.address, request.port).await,
        Command::Bind => {
            write_reply(&mut stream, ReplyCode::RequestRejectedOrFailed).await?;
            Ok(())
        }
    }
}

async fn handle_connect(
    mut client: TcpStream,
    address: crate::protocol::types::Address,
    port: u16,
) -> Result<()> {
    let targets = resolve_address(&address, port).await;
    let upstream = match targets {
        Ok(targets) => connect_first(&targets).await,
        Err(_) => None,
    };

    let upstream = match upstream {
        Some(upstream) => upstream,
        None => {
            let _ = write_reply(&mut client, ReplyCode::RequestRejectedOrFailed).await;
            return Err(SocksError::Protocol(format!(
                "failed to connect to {}:{}",
                address, port
            )));
        }
    };

    upstream.set_nodelay(true)?;
    write_reply(&mut client, ReplyCode::RequestGranted).await?;
    info!(remote = %format_addr(&address.to_string(), port), "socks4 connect established");
    copy_bidirectional(client, upstream).await
}

async fn connect_first(targets: &[std::net::SocketAddr]) -> Option<TcpStream> {
    for target in targets {
        match TcpStream::connect(target).await {
            Ok(stream) => return Some(stream),
            Err(err) => warn!(%target, error = %err, "socks4 connect attempt failed"),
        }
    }
    None
}
