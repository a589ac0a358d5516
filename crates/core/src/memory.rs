//! In-process channels
//!
//! Both ends of a [`pair`] implement [`Channel`]; the serving end can also
//! answer with a remote failure via [`MemoryChannel::reject`]. A
//! [`MemoryConnector`] hands the serving end of every new channel to a
//! [`MemoryListener`], which lets tests run a fake storage peer in a task.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{RemoteCode, TransportError};
use crate::transport::{Channel, Connector, Message};

const CHANNEL_CAPACITY: usize = 64;

type Item = Result<Message, TransportError>;

/// One end of an in-memory channel
#[derive(Debug)]
pub struct MemoryChannel {
    tx: Option<mpsc::Sender<Item>>,
    rx: mpsc::Receiver<Item>,
}

/// Create two connected channel ends
pub fn pair() -> (MemoryChannel, MemoryChannel) {
    let (a_tx, a_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (b_tx, b_rx) = mpsc::channel(CHANNEL_CAPACITY);
    (
        MemoryChannel {
            tx: Some(a_tx),
            rx: b_rx,
        },
        MemoryChannel {
            tx: Some(b_tx),
            rx: a_rx,
        },
    )
}

impl MemoryChannel {
    /// Deliver a remote failure to the other end and close this side
    pub async fn reject(&mut self, code: RemoteCode, message: impl Into<String>) {
        if let Some(tx) = self.tx.take() {
            let _ = tx
                .send(Err(TransportError::Remote {
                    code,
                    message: message.into(),
                }))
                .await;
        }
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send(&mut self, message: Message) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(Ok(message))
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Result<Option<Message>, TransportError> {
        match self.rx.recv().await {
            Some(item) => item.map(Some),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

/// Connector producing in-memory channels
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    incoming: mpsc::UnboundedSender<MemoryChannel>,
}

/// Serving side of a [`MemoryConnector`]
#[derive(Debug)]
pub struct MemoryListener {
    incoming: mpsc::UnboundedReceiver<MemoryChannel>,
}

/// Create a connector and the listener that receives its channels
pub fn listener() -> (MemoryConnector, MemoryListener) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MemoryConnector { incoming: tx },
        MemoryListener { incoming: rx },
    )
}

impl MemoryListener {
    /// Wait for the next opened channel; `None` once every connector is gone
    pub async fn accept(&mut self) -> Option<MemoryChannel> {
        self.incoming.recv().await
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Channel = MemoryChannel;

    async fn connect(&self) -> Result<MemoryChannel, TransportError> {
        let (client, server) = pair();
        self.incoming
            .send(server)
            .map_err(|_| TransportError::Connect {
                endpoint: self.endpoint(),
                reason: "listener dropped".into(),
            })?;
        Ok(client)
    }

    fn endpoint(&self) -> String {
        "memory".to_string()
    }
}
