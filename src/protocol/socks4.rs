//! SOCKS4 / SOCKS4a request parsing and reply framing.
//!
//! The caller is expected to have already consumed the version byte (it's
//! how the dispatcher tells SOCKS4 apart from SOCKS5).

use super::types::Address;
use crate::utils::error::{Result, SocksError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Connect = 0x01,
    Bind = 0x02,
}

impl TryFrom<u8> for Command {
    type Error = SocksError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Command::Connect),
            0x02 => Ok(Command::Bind),
            other => Err(SocksError::CommandNotSupported(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    RequestGranted = 0x5A,
    RequestRejectedOrFailed = 0x5B,
}

#[derive(Debug)]
pub struct Request {
    pub command: Command,
    pub address: Address,
    pub port: u16,
}

/// Parse a SOCKS4/SOCKS4a request. Consumes: command(1), port(2),
/// ipv4(4), userid(NUL-terminated, discarded), and — if the SOCKS4a
/// null-trick fires (first 3 octets zero, 4th non-zero) — a second
/// NUL-terminated hostname string.
pub async fn read_request<S>(stream: &mut S) -> Result<Request>
where
    S: AsyncRead + Unpin,
{
    let command_byte = stream.read_u8().await?;
    let command = Command::try_from(command_byte).map_err(|_| {
        // Caller sends the rejection reply; we just report the error kind.
        SocksError::CommandNotSupported(command_byte)
    })?;

    let port = stream.read_u16().await?;

    let mut ip_octets = [0u8; 4];
    stream.read_exact(&mut ip_octets).await?;

    let _user_id = read_null_terminated(stream).await?;

    let address = if ip_octets[0] == 0 && ip_octets[1] == 0 && ip_octets[2] == 0 && ip_octets[3] != 0
    {
        let raw = read_null_terminated_bytes(stream).await?;
        if !(1..=255).contains(&raw.len()) {
            return Err(SocksError::InvalidDomainName);
        }
        let host = String::from_utf8(raw).map_err(|_| SocksError::InvalidDomainName)?;
        Address::Domain(host)
    } else {
        Address::IPv4(ip_octets)
    };

    Ok(Request {
        command,
        address,
        port,
    })
}

async fn read_null_terminated_bytes<S>(stream: &mut S) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut bytes = Vec::new();
    loop {
        let byte = stream.read_u8().await?;
        if byte == 0 {
            break;
        }
        bytes.push(byte);
    }
    Ok(bytes)
}

async fn read_null_terminated<S>(stream: &mut S) -> Result<String>
where
    S: AsyncRead + Unpin,
{
    let raw = read_null_terminated_bytes(stream).await?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Every SOCKS4 reply is exactly 8 bytes: version=0, reply code, 2 bytes
/// port (unused, zero), 4 bytes IPv4 (unused, zero).
pub async fn write_reply<S>(stream: &mut S, reply: ReplyCode) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let buf = [0u8, reply as u8, 0, 0, 0, 0, 0, 0];
    stream.write_all(&buf).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    #[tokio::test]
    async fn parses_connect_request_with_ipv4() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_request(&mut stream).await.unwrap()
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        // CONNECT, port 80, 1.2.3.4, empty userid
        client
            .write_all(&[0x01, 0x00, 0x50, 1, 2, 3, 4, 0x00])
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert_eq!(request.command, Command::Connect);
        assert_eq!(request.port, 80);
        assert_eq!(request.address, Address::IPv4([1, 2, 3, 4]));
    }

    #[tokio::test]
    async fn parses_socks4a_domain_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_request(&mut stream).await.unwrap()
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut payload = vec![0x01, 0x00, 0x50, 0, 0, 0, 1, 0x00];
        payload.extend_from_slice(b"example.com\0");
        client.write_all(&payload).await.unwrap();

        let request = server.await.unwrap();
        assert_eq!(request.address, Address::Domain("example.com".to_string()));
        assert_eq!(request.port, 80);
    }

    #[tokio::test]
    async fn reply_bytes_match_spec() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            write_reply(&mut stream, ReplyCode::RequestGranted)
                .await
                .unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        server.await.unwrap();
        let mut buf = [0u8; 8];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x00, 0x5A, 0, 0, 0, 0, 0, 0]);
    }
}
