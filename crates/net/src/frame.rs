//! Wire framing
//!
//! Every frame is a big-endian `u32` length followed by that many bytes of
//! JSON. Requests carry the client's TTL; a node answers either with a
//! message frame or with an error frame that ends the stream.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use ocli_core::error::{RemoteCode, TransportError};
pub use ocli_core::transport::MAX_FRAME_SIZE;
use ocli_core::transport::Message;

/// Size of the length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// One unit on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum Frame {
    Message { ttl: u32, message: Message },
    Error { code: RemoteCode, message: String },
}

impl Frame {
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        serde_json::to_vec(self).map_err(|e| TransportError::Codec(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        serde_json::from_slice(bytes).map_err(|e| TransportError::Codec(e.to_string()))
    }
}

/// Read one frame; `Ok(None)` on a clean end of stream between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, TransportError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
        let n = reader.read(&mut len_buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(TransportError::Codec("stream ended inside length prefix".into()));
        }
        filled += n;
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(TransportError::Codec(format!(
            "frame of {len} bytes exceeds limit of {MAX_FRAME_SIZE}"
        )));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Frame::decode(&buf).map(Some)
}

/// Write one frame and flush it
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let data = frame.encode()?;
    let len: u32 = data
        .len()
        .try_into()
        .ok()
        .filter(|len| *len as usize <= MAX_FRAME_SIZE)
        .ok_or_else(|| {
            TransportError::Codec(format!(
                "frame of {} bytes exceeds limit of {MAX_FRAME_SIZE}",
                data.len()
            ))
        })?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}
