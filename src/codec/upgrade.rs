use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::{HandshakeRequest, HandshakeResponse};

const HEADER_END: &[u8] = b"\r\n\r\n";

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_END.len())
        .position(|window| window == HEADER_END)
        .map(|pos| pos + HEADER_END.len())
}

/// Send `request` and wait for the server's `101 Switching Protocols`.
///
/// `decorate` runs on the request right before it is serialized. On success,
/// returns whatever bytes followed the response headers; they belong to the
/// first frames.
///
/// # Errors
///
/// - `Error::InvalidHeaderValue` if a header would break the request
/// - `Error::HandshakeTooLarge` if the response exceeds the handshake limit
/// - `Error::ProtocolHandshakeFailure` on EOF or a non-accepting response
/// - `Error::Io` on transport failure
pub async fn client_handshake<S, F>(
    io: &mut S,
    mut request: HandshakeRequest,
    decorate: F,
    limits: &Limits,
) -> Result<BytesMut>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FnOnce(&mut HandshakeRequest),
{
    decorate(&mut request);

    let mut out = Vec::with_capacity(256);
    request.write(&mut out)?;
    io.write_all(&out).await?;
    io.flush().await?;

    let mut buf = BytesMut::with_capacity(1024);
    let header_len = loop {
        if let Some(end) = find_header_end(&buf) {
            limits.check_handshake_size(end)?;
            break end;
        }
        limits.check_handshake_size(buf.len())?;

        let n = io.read_buf(&mut buf).await?;
        if n == 0 {
            return Err(Error::ProtocolHandshakeFailure(
                "Connection closed during handshake".into(),
            ));
        }
    };

    let leftover = buf.split_off(header_len);
    let response = HandshakeResponse::parse(&buf)?;
    response.verify(&request.key)?;
    Ok(leftover)
}
