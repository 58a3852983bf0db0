//! SOCKS5 method negotiation (RFC 1928 §3). Only NO_AUTH is supported —
//! GSSAPI and username/password are out of scope for this server.

use crate::protocol::types::AuthMethod;
use crate::utils::error::{Result, SocksError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Read the client's method list and reply. Succeeds only if NO_AUTH is
/// among the offered methods; otherwise replies NO_ACCEPTABLE_METHODS and
/// fails the connection.
pub async fn negotiate<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let nmethods = stream.read_u8().await?;
    let mut methods = vec![0u8; nmethods as usize];
    stream.read_exact(&mut methods).await?;

    if methods.contains(&(AuthMethod::NoAuth as u8)) {
        stream
            .write_all(&[crate::protocol::types::SOCKS5_VERSION, AuthMethod::NoAuth as u8])
            .await?;
        stream.flush().await?;
        Ok(())
    } else {
        stream
            .write_all(&[
                crate::protocol::types::SOCKS5_VERSION,
                AuthMethod::NoAcceptable as u8,
            ])
            .await?;
        stream.flush().await?;
        Err(SocksError::NoAcceptableAuthMethods)
    }
}
