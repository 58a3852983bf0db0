//! The SOCKS5 address triple codec: one wire format, four entry points —
//! stream read/write (used by the TCP handshake) and buffer parse/pack
//! (used by the UDP datagram header). All four share the same byte-level
//! rules so that `parse(pack(a)) == a` and `read(write(a)) == a` hold for
//! every legal `Address`.

use super::types::Address;
use crate::utils::error::{Result, SocksError};
use bytes::{BufMut, BytesMut};
use smallvec::SmallVec;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// Read an `(Address, port)` pair from an async stream.
pub async fn read_address<S>(stream: &mut S) -> Result<(Address, u16)>
where
    S: AsyncRead + Unpin,
{
    let atyp = stream.read_u8().await?;
    let address = match atyp {
        ATYP_IPV4 => {
            let mut octets = [0u8; 4];
            stream.read_exact(&mut octets).await?;
            Address::IPv4(octets)
        }
        ATYP_DOMAIN => {
            let len = stream.read_u8().await?;
            if len < 1 {
                return Err(SocksError::InvalidDomainName);
            }
            let mut buf = vec![0u8; len as usize];
            stream.read_exact(&mut buf).await?;
            let domain = String::from_utf8(buf).map_err(|_| SocksError::InvalidDomainName)?;
            Address::Domain(domain)
        }
        ATYP_IPV6 => {
            let mut octets = [0u8; 16];
            stream.read_exact(&mut octets).await?;
            Address::IPv6(octets)
        }
        other => return Err(SocksError::AddressTypeNotSupported(other)),
    };
    let port = stream.read_u16().await?;
    Ok((address, port))
}

/// Write an `(Address, port)` pair to an async stream. Does not flush.
pub async fn write_address<S>(stream: &mut S, address: &Address, port: u16) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(260);
    pack_address_into(&mut buf, address, port)?;
    stream.write_all(&buf).await?;
    Ok(())
}

/// Parse an `(Address, port)` pair out of a byte buffer, returning the
/// number of bytes consumed so the caller can slice off the remainder
/// (e.g. the UDP payload that follows the header).
pub fn parse_address(buf: &[u8]) -> Result<(Address, u16, usize)> {
    if buf.is_empty() {
        return Err(SocksError::InvalidUdpPacketReceived);
    }
    let atyp = buf[0];
    let mut pos = 1usize;
    let address = match atyp {
        ATYP_IPV4 => {
            if buf.len() < pos + 4 {
                return Err(SocksError::InvalidUdpPacketReceived);
            }
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&buf[pos..pos + 4]);
            pos += 4;
            Address::IPv4(octets)
        }
        ATYP_DOMAIN => {
            if buf.len() < pos + 1 {
                return Err(SocksError::InvalidUdpPacketReceived);
            }
            let len = buf[pos] as usize;
            pos += 1;
            if len < 1 {
                return Err(SocksError::InvalidDomainName);
            }
            if buf.len() < pos + len {
                return Err(SocksError::InvalidUdpPacketReceived);
            }
            let domain = std::str::from_utf8(&buf[pos..pos + len])
                .map_err(|_| SocksError::InvalidDomainName)?
                .to_string();
            pos += len;
            Address::Domain(domain)
        }
        ATYP_IPV6 => {
            if buf.len() < pos + 16 {
                return Err(SocksError::InvalidUdpPacketReceived);
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[pos..pos + 16]);
            pos += 16;
            Address::IPv6(octets)
        }
        other => return Err(SocksError::AddressTypeNotSupported(other)),
    };
    if buf.len() < pos + 2 {
        return Err(SocksError::InvalidUdpPacketReceived);
    }
    let port = u16::from_be_bytes([buf[pos], buf[pos + 1]]);
    pos += 2;
    Ok((address, port, pos))
}

/// Pack an `(Address, port)` pair into a freshly allocated buffer.
///
/// IPv4 and IPv6 addresses (the common case for UDP relay traffic) fit
/// entirely on the stack; only domain names spill the `SmallVec` to the
/// heap.
pub fn pack_address(address: &Address, port: u16) -> Result<Vec<u8>> {
    let mut buf: SmallVec<[u8; 22]> = SmallVec::new();
    match address {
        Address::IPv4(octets) => {
            buf.push(ATYP_IPV4);
            buf.extend_from_slice(octets);
        }
        Address::IPv6(octets) => {
            buf.push(ATYP_IPV6);
            buf.extend_from_slice(octets);
        }
        Address::Domain(domain) => {
            let bytes = domain.as_bytes();
            if bytes.is_empty() || bytes.len() > 255 {
                return Err(SocksError::InvalidDomainName);
            }
            buf.push(ATYP_DOMAIN);
            buf.push(bytes.len() as u8);
            buf.extend_from_slice(bytes);
        }
    }
    buf.extend_from_slice(&port.to_be_bytes());
    Ok(buf.into_vec())
}

fn pack_address_into(buf: &mut BytesMut, address: &Address, port: u16) -> Result<()> {
    match address {
        Address::IPv4(octets) => {
            buf.put_u8(ATYP_IPV4);
            buf.put_slice(octets);
        }
        Address::IPv6(octets) => {
            buf.put_u8(ATYP_IPV6);
            buf.put_slice(octets);
        }
        Address::Domain(domain) => {
            let bytes = domain.as_bytes();
            if bytes.is_empty() || bytes.len() > 255 {
                return Err(SocksError::InvalidDomainName);
            }
            buf.put_u8(ATYP_DOMAIN);
            buf.put_u8(bytes.len() as u8);
            buf.put_slice(bytes);
        }
    }
    buf.put_u16(port);
    Ok(())
}
