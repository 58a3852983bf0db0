use crate::protocol::types::{Address, Command, ReplyCode, SOCKS5_VERSION};
use crate::protocol::{read_address, write_address};
use crate::utils::error::{Result, SocksError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug)]
pub struct Request {
    pub command: Command,
    pub address: Address,
    pub port: u16,
}

/// Read a SOCKS5 request: VER(1), CMD(1), RSV(1), then an address triple.
/// Unlike the outer dispatcher's first byte, this handler reads its own
/// fresh version byte as the first field of the request.
///
/// On a command the server doesn't recognize, sends
/// `COMMAND_NOT_SUPPORTED` before failing. On an address type the codec
/// doesn't recognize, sends `ADDRESS_TYPE_NOT_SUPPORTED` before failing.
/// Other address failures (e.g. an invalid domain) propagate with no
/// reply sent — the caller tears the connection down.
pub async fn read_request<S>(stream: &mut S) -> Result<Request>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let version = stream.read_u8().await?;
    if version != SOCKS5_VERSION {
        return Err(SocksError::VersionMismatch);
    }

    let command_byte = stream.read_u8().await?;
    let command = match Command::try_from(command_byte) {
        Ok(cmd) => cmd,
        Err(_) => {
            write_reply(stream, ReplyCode::CommandNotSupported, &Address::unspecified(), 0).await?;
            return Err(SocksError::CommandNotSupported(command_byte));
        }
    };

    let _reserved = stream.read_u8().await?;

    let (address, port) = match read_address(stream).await {
        Ok(pair) => pair,
        Err(SocksError::AddressTypeNotSupported(atyp)) => {
            write_reply(
                stream,
                ReplyCode::AddressTypeNotSupported,
                &Address::unspecified(),
                0,
            )
            .await?;
            return Err(SocksError::AddressTypeNotSupported(atyp));
        }
        Err(other) => return Err(other),
    };

    Ok(Request {
        command,
        address,
        port,
    })
}

/// Write a SOCKS5 reply: VER=5, REP, RSV=0, then the bound address.
pub async fn write_reply<S>(
    stream: &mut S,
    reply: ReplyCode,
    bind_addr: &Address,
    bind_port: u16,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(&[SOCKS5_VERSION, reply as u8, 0x00])
        .await?;
    write_address(stream, bind_addr, bind_port).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    #[tokio::test]
    async fn parses_connect_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_request(&mut stream).await
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(&[0x05, 0x01, 0x00, 0x01, 8, 8, 8, 8, 0x00, 0x35])
            .await
            .unwrap();

        let request = server.await.unwrap().unwrap();
        assert_eq!(request.command, Command::Connect);
        assert_eq!(request.address, Address::IPv4([8, 8, 8, 8]));
        assert_eq!(request.port, 53);
    }

    #[tokio::test]
    async fn unsupported_command_sends_reply_then_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_request(&mut stream).await
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(&[0x05, 0x09, 0x00, 0x01, 1, 2, 3, 4, 0, 80])
            .await
            .unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[0], 0x05);
        assert_eq!(reply[1], ReplyCode::CommandNotSupported as u8);

        assert!(matches!(
            server.await.unwrap(),
            Err(SocksError::CommandNotSupported(0x09))
        ));
    }

    #[tokio::test]
    async fn reply_framing_matches_spec() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            write_reply(&mut stream, ReplyCode::Succeeded, &Address::unspecified(), 0)
                .await
                .unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        server.await.unwrap();
        let mut reply = vec![0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[0], 5);
        assert_eq!(reply[2], 0);
        assert!(reply.len() >= 10);
    }
}
