//! Native messaging frames: a 4-byte native-endian length prefix followed by that many
//! bytes of UTF-8 JSON.
//!
//! The client writes to the host's stdin and reads the host's stdout, so the browser's
//! limits apply in mirror image: up to 64 MiB toward the host, 1 MiB back.

use serde::Serialize;
use std::io;

#[cfg(feature = "process")]
use serde_json::Value;
#[cfg(feature = "process")]
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest message the host may send us.
pub const MAX_FROM_HOST: usize = 1_048_576;
/// Largest message we may send the host.
pub const MAX_TO_HOST: usize = 64 * 1_048_576;

/// Encode any serde-serializable value into a frame.
pub fn encode_message<T: Serialize>(msg: &T) -> io::Result<Vec<u8>> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_TO_HOST {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "outgoing message exceeds 64MB",
        ));
    }
    let mut out = Vec::with_capacity(4 + json.len());
    out.extend_from_slice(&(json.len() as u32).to_ne_bytes());
    out.extend_from_slice(&json);
    Ok(out)
}

/// Read one frame and parse it as JSON.
///
/// Returns `Ok(None)` when the stream ends before a new frame starts; that is how a
/// host going away looks from our side. A stream that ends inside a frame, length
/// prefix included, is `UnexpectedEof`.
#[cfg(feature = "process")]
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_size: usize,
) -> io::Result<Option<Value>> {
    let mut len_buf = [0u8; 4];
    if reader.read(&mut len_buf[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut len_buf[1..]).await?;
    let len = u32::from_ne_bytes(len_buf) as usize;
    if len > max_size.min(MAX_FROM_HOST) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("incoming message too large ({len} bytes)"),
        ));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    let text = String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let value = serde_json::from_str(&text)?;
    Ok(Some(value))
}

/// Encode and write one frame, flushing so the host sees it immediately.
#[cfg(feature = "process")]
pub async fn write_message<W, T>(writer: &mut W, msg: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_message(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await
}
