pub mod auth;
pub mod request;
pub mod udp;

pub use auth::negotiate;
pub use request::{read_request, write_reply, Request};
pub use udp::UdpHeader;
