//! Framed channel over any byte stream

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use ocli_core::error::TransportError;
use ocli_core::transport::{Channel, Message};

use crate::frame::{self, Frame};

/// [`Channel`] speaking length-prefixed frames over a duplex byte stream
#[derive(Debug)]
pub struct FramedChannel<S> {
    reader: ReadHalf<S>,
    writer: Option<WriteHalf<S>>,
    ttl: u32,
    /// Set once the peer sent an error frame
    failed: bool,
}

impl<S: AsyncRead + AsyncWrite> FramedChannel<S> {
    pub fn new(stream: S, ttl: u32) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader,
            writer: Some(writer),
            ttl,
            failed: false,
        }
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }
}

#[async_trait]
impl<S> Channel for FramedChannel<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    async fn send(&mut self, message: Message) -> Result<(), TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::Closed)?;
        tracing::trace!(kind = message.kind(), "Sending frame");
        frame::write_frame(
            writer,
            &Frame::Message {
                ttl: self.ttl,
                message,
            },
        )
        .await
    }

    async fn recv(&mut self) -> Result<Option<Message>, TransportError> {
        if self.failed {
            return Ok(None);
        }
        match frame::read_frame(&mut self.reader).await? {
            Some(Frame::Message { message, .. }) => {
                tracing::trace!(kind = message.kind(), "Received frame");
                Ok(Some(message))
            }
            Some(Frame::Error { code, message }) => {
                self.failed = true;
                Err(TransportError::Remote { code, message })
            }
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown().await?;
        }
        Ok(())
    }
}
