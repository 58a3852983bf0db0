//! Wire-level SOCKS4/SOCKS4a/SOCKS5 framing: address codec, per-version
//! request/reply types, and the SOCKS5 UDP datagram header.

pub mod address;
pub mod socks4;
pub mod socks5;
pub mod types;

pub use address::{pack_address, parse_address, read_address, write_address};
pub use types::*;
