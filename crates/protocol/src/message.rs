//! Length-prefixed JSON message framing.
//!
//! Every frame is a 4-byte big-endian length prefix followed by that many
//! bytes of UTF-8 JSON. A zero-length prefix carries no payload and is used
//! as an explicit end-of-stream sentinel, letting either side signal "no
//! more messages" without closing the connection itself.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size in bytes of the big-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Errors raised while sending or receiving a framed message.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    /// The message payload could not be serialized or deserialized as JSON.
    #[error("JSON framing error: {0}")]
    Json(#[from] serde_json::Error),
    /// The payload was too large to fit in a `u32` length prefix.
    #[error("message payload of {0} bytes exceeds the u32 length prefix")]
    PayloadTooLarge(usize),
}

/// Sends `message` as a length-prefixed JSON frame, or the zero-length
/// end-of-stream sentinel if `message` is `None`.
///
/// # Errors
///
/// Returns [`FramingError::Json`] if `message` cannot be serialized,
/// [`FramingError::PayloadTooLarge`] if the serialized payload exceeds
/// `u32::MAX` bytes, and [`FramingError::Io`] if the write fails.
pub async fn send_message<W, T>(writer: &mut W, message: Option<&T>) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let Some(message) = message else {
        writer.write_all(&[0u8; LENGTH_PREFIX_SIZE]).await?;
        writer.flush().await?;
        return Ok(());
    };

    let payload = serde_json::to_vec(message)?;
    let len = u32::try_from(payload.len()).map_err(|_| FramingError::PayloadTooLarge(payload.len()))?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Receives one frame, returning `Ok(None)` if it was the end-of-stream sentinel.
///
/// # Errors
///
/// Returns [`FramingError::Io`] if the connection closes or errors mid-read,
/// and [`FramingError::Json`] if the payload is not valid JSON for `T`.
pub async fn recv_message<R, T>(reader: &mut R) -> Result<Option<T>, FramingError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
    reader.read_exact(&mut len_buf).await?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Ok(None);
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    let value = serde_json::from_slice(&payload)?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Cursor;

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct Ping {
        id: String,
    }

    #[tokio::test]
    async fn round_trips_a_message() {
        let mut buffer = Vec::new();
        let msg = Ping { id: "abc".into() };
        send_message(&mut buffer, Some(&msg)).await.unwrap();

        let mut cursor = Cursor::new(buffer);
        let decoded: Ping = recv_message(&mut cursor).await.unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn none_message_sends_zero_length_sentinel() {
        let mut buffer = Vec::new();
        send_message::<_, Ping>(&mut buffer, None).await.unwrap();
        assert_eq!(buffer, vec![0u8; LENGTH_PREFIX_SIZE]);

        let mut cursor = Cursor::new(buffer);
        let decoded: Option<Ping> = recv_message(&mut cursor).await.unwrap();
        assert_eq!(decoded, None);
    }

    #[tokio::test]
    async fn sequential_frames_decode_independently() {
        let mut buffer = Vec::new();
        send_message(&mut buffer, Some(&Ping { id: "a".into() })).await.unwrap();
        send_message(&mut buffer, Some(&Ping { id: "b".into() })).await.unwrap();
        send_message::<_, Ping>(&mut buffer, None).await.unwrap();

        let mut cursor = Cursor::new(buffer);
        assert_eq!(recv_message::<_, Ping>(&mut cursor).await.unwrap().unwrap().id, "a");
        assert_eq!(recv_message::<_, Ping>(&mut cursor).await.unwrap().unwrap().id, "b");
        assert_eq!(recv_message::<_, Ping>(&mut cursor).await.unwrap(), None);
    }

    #[tokio::test]
    async fn truncated_stream_is_an_io_error() {
        let mut cursor = Cursor::new(vec![0u8, 0, 0, 5, b'{', b'"']);
        let err = recv_message::<_, Ping>(&mut cursor).await.unwrap_err();
        assert!(matches!(err, FramingError::Io(_)));
    }
}
