use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// SOCKS4 version byte.
pub const SOCKS4_VERSION: u8 = 0x04;
/// SOCKS5 version byte.
pub const SOCKS5_VERSION: u8 = 0x05;

/// A destination or bound address, auto-typed the way the original SOCKS5
/// `Address` class is, but as a plain sum type rather than a mutable object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    IPv4([u8; 4]),
    IPv6([u8; 16]),
    Domain(String),
}

impl Address {
    pub const fn unspecified() -> Self {
        Address::IPv4([0, 0, 0, 0])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::IPv4(octets) => write!(f, "{}", Ipv4Addr::from(*octets)),
            Address::IPv6(octets) => write!(f, "{}", Ipv6Addr::from(*octets)),
            Address::Domain(domain) => write!(f, "{}", domain),
        }
    }
}

/// Format `(host, port)` the way the original `format_addr` helper does:
/// bracketed for IPv6 literals, plain otherwise.
pub fn format_addr(host: &str, port: u16) -> String {
    if host.parse::<Ipv6Addr>().is_ok() {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// SOCKS5 authentication method identifiers (RFC 1928 §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthMethod {
    NoAuth = 0x00,
    NoAcceptable = 0xFF,
}

/// SOCKS5 commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Connect = 0x01,
    Bind = 0x02,
    UdpAssociate = 0x03,
}

impl TryFrom<u8> for Command {
    type Error = crate::utils::error::SocksError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Command::Connect),
            0x02 => Ok(Command::Bind),
            0x03 => Ok(Command::UdpAssociate),
            _ => Err(crate::utils::error::SocksError::CommandNotSupported(value)),
        }
    }
}

/// SOCKS5 reply codes (RFC 1928 §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    Succeeded = 0x00,
    GeneralFailure = 0x01,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}
