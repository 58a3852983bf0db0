use thiserror::Error;

#[derive(Debug, Error)]
pub enum SocksError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("version mismatch")]
    VersionMismatch,

    #[error("command not supported: {0}")]
    CommandNotSupported(u8),

    #[error("address type not supported: {0}")]
    AddressTypeNotSupported(u8),

    #[error("invalid domain name")]
    InvalidDomainName,

    #[error("fragmentation not supported")]
    FragmentationNotSupported,

    #[error("no acceptable authentication methods")]
    NoAcceptableAuthMethods,

    #[error("invalid udp packet received")]
    InvalidUdpPacketReceived,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SocksError>;
