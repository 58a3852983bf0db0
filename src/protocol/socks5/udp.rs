//! The SOCKS5 UDP relay header: `RSV(2) FRAG(1) ADDR PORT DATA`, prepended
//! by the client to every outbound datagram and by the server to every
//! inbound one (RFC 1928 §7).

use crate::protocol::address::{pack_address, parse_address};
use crate::protocol::types::Address;
use crate::utils::error::{Result, SocksError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpHeader {
    pub frag: u8,
    pub address: Address,
    pub port: u16,
}

impl UdpHeader {
    pub fn new(address: Address, port: u16) -> Self {
        Self {
            frag: 0,
            address,
            port,
        }
    }

    /// Parse a header off the front of a datagram, returning the header
    /// and the remaining payload slice. Non-zero FRAG fails with
    /// `FragmentationNotSupported`; anything else malformed fails with
    /// `InvalidUdpPacketReceived`.
    pub fn parse(buf: &[u8]) -> Result<(Self, &[u8])> {
        if buf.len() < 3 {
            return Err(SocksError::InvalidUdpPacketReceived);
        }
        let frag = buf[2];
        if frag != 0 {
            return Err(SocksError::FragmentationNotSupported);
        }
        let (address, port, consumed) = match parse_address(&buf[3..]) {
            Ok(result) => result,
            Err(SocksError::FragmentationNotSupported) => {
                return Err(SocksError::FragmentationNotSupported)
            }
            Err(SocksError::AddressTypeNotSupported(_))
            | Err(SocksError::InvalidDomainName)
            | Err(SocksError::InvalidUdpPacketReceived) => {
                return Err(SocksError::InvalidUdpPacketReceived)
            }
            Err(other) => return Err(other),
        };
        let payload = &buf[3 + consumed..];
        Ok((
            UdpHeader {
                frag,
                address,
                port,
            },
            payload,
        ))
    }

    /// Serialize `{0, 0, frag}` followed by the packed address, as the
    /// prefix of an outbound datagram. The caller appends the payload.
    pub fn pack(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(3 + 20);
        buf.extend_from_slice(&[0, 0, self.frag]);
        buf.extend_from_slice(&pack_address(&self.address, self.port)?);
        Ok(buf)
    }
}
