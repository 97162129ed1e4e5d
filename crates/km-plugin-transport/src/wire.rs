//! Length-prefixed JSON-RPC 2.0 frame codec: a 4-byte big-endian length
//! prefix followed by a UTF-8 JSON body, per §4.4.

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{TransportError, TransportResult};

/// Frames larger than this are rejected rather than allocated; a plugin
/// has no legitimate reason to send a single RPC frame this large.
pub const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// Serialize `value` to JSON and write it as one length-prefixed frame.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> TransportResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(value)?;
    let len = u32::try_from(body.len()).unwrap_or(u32::MAX);
    writer.write_all(&len.to_be_bytes()).await.map_err(|_| TransportError::TransportClosed)?;
    writer.write_all(&body).await.map_err(|_| TransportError::TransportClosed)?;
    writer.flush().await.map_err(|_| TransportError::TransportClosed)?;
    Ok(())
}

/// Read one length-prefixed frame and deserialize it as `T`.
pub async fn read_frame<R, T>(reader: &mut R) -> TransportResult<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|_| TransportError::TransportClosed)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(TransportError::MalformedHandshake(format!(
            "frame of {len} bytes exceeds cap"
        )));
    }

    let mut body = vec![0u8; len as usize];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|_| TransportError::TransportClosed)?;

    Ok(serde_json::from_slice(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Ping {
        n: u32,
    }

    #[tokio::test]
    async fn round_trips_a_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Ping { n: 7 }).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let decoded: Ping = read_frame(&mut cursor).await.unwrap();
        assert_eq!(decoded, Ping { n: 7 });
    }

    #[tokio::test]
    async fn rejects_oversized_frame_length() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_BYTES + 1).to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let result: TransportResult<Ping> = read_frame(&mut cursor).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn eof_before_length_is_transport_closed() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let result: TransportResult<Ping> = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(TransportError::TransportClosed)));
    }
}
