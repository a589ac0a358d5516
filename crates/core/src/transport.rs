//! Transport channel abstraction
//!
//! Engines talk to the storage service through an ordered, bidirectional
//! stream of typed [`Message`]s. The concrete wire encoding lives in the
//! network adapter crate; tests use [`crate::memory`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::hash::Hash;
use crate::ids::{Address, ContainerId, OwnerId};
use crate::object::{Object, ObjectHeader, Range, SearchQuery};
use crate::token::{Token, TokenBody};

/// Largest message body a channel carries, in bytes
pub const MAX_FRAME_SIZE: usize = 32 * 1024 * 1024;

/// Protocol message exchanged over a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Unsigned token candidate opening a session handshake
    SessionInit { token: TokenBody },
    /// Peer's view of the unsigned token
    SessionEcho { token: TokenBody },
    /// Echoed body signed by the client
    SessionConfirm { token: Token },
    /// Countersigned token closing the handshake
    SessionResult { token: Token },

    PutHeader { header: ObjectHeader, token: Token },
    PutChunk {
        #[serde(with = "crate::token::hex_bytes")]
        data: Vec<u8>,
        token: Token,
    },
    PutResult { address: Address },

    GetRequest { address: Address, token: Token },
    /// First reply of a get stream: full header plus initial payload slice
    GetOrigin { object: Object },
    GetChunk {
        #[serde(with = "crate::token::hex_bytes")]
        data: Vec<u8>,
    },

    DeleteRequest {
        address: Address,
        owner: OwnerId,
        token: Token,
    },
    DeleteResult,

    HeadRequest { address: Address, full_headers: bool },
    HeadResult { header: ObjectHeader },

    SearchRequest {
        container: ContainerId,
        query: SearchQuery,
    },
    SearchResult { addresses: Vec<Address> },

    RangeRequest { address: Address, ranges: Vec<Range> },
    RangeResult { fragments: Vec<Vec<u8>> },

    RangeHashRequest {
        address: Address,
        ranges: Vec<Range>,
        #[serde(with = "crate::token::hex_bytes")]
        salt: Vec<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<Token>,
    },
    RangeHashResult { hashes: Vec<Hash> },
}

impl Message {
    /// Short message name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Message::SessionInit { .. } => "session_init",
            Message::SessionEcho { .. } => "session_echo",
            Message::SessionConfirm { .. } => "session_confirm",
            Message::SessionResult { .. } => "session_result",
            Message::PutHeader { .. } => "put_header",
            Message::PutChunk { .. } => "put_chunk",
            Message::PutResult { .. } => "put_result",
            Message::GetRequest { .. } => "get_request",
            Message::GetOrigin { .. } => "get_origin",
            Message::GetChunk { .. } => "get_chunk",
            Message::DeleteRequest { .. } => "delete_request",
            Message::DeleteResult => "delete_result",
            Message::HeadRequest { .. } => "head_request",
            Message::HeadResult { .. } => "head_result",
            Message::SearchRequest { .. } => "search_request",
            Message::SearchResult { .. } => "search_result",
            Message::RangeRequest { .. } => "range_request",
            Message::RangeResult { .. } => "range_result",
            Message::RangeHashRequest { .. } => "range_hash_request",
            Message::RangeHashResult { .. } => "range_hash_result",
        }
    }
}

/// Ordered bidirectional message stream to one endpoint
#[async_trait]
pub trait Channel: Send {
    /// Send one message
    async fn send(&mut self, message: Message) -> Result<(), TransportError>;

    /// Receive the next message; `Ok(None)` signals end of stream
    async fn recv(&mut self) -> Result<Option<Message>, TransportError>;

    /// Close the sending half. Further sends fail, receiving continues.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Factory opening channels to a fixed endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    type Channel: Channel;

    /// Open a fresh channel
    async fn connect(&self) -> Result<Self::Channel, TransportError>;

    /// Endpoint description for diagnostics
    fn endpoint(&self) -> String;
}

/// Why a suspended send/recv did not complete
#[derive(Debug)]
pub enum Interrupt {
    Canceled,
    Transport(TransportError),
}

/// Send `message`, giving up as soon as `cancel` fires
pub async fn send<C: Channel + ?Sized>(
    channel: &mut C,
    message: Message,
    cancel: &CancellationToken,
) -> Result<(), Interrupt> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupt::Canceled),
        result = channel.send(message) => result.map_err(Interrupt::Transport),
    }
}

/// Receive the next message, giving up as soon as `cancel` fires
pub async fn recv<C: Channel + ?Sized>(
    channel: &mut C,
    cancel: &CancellationToken,
) -> Result<Option<Message>, Interrupt> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupt::Canceled),
        result = channel.recv() => result.map_err(Interrupt::Transport),
    }
}

/// Open a channel, giving up as soon as `cancel` fires
pub async fn connect<K: Connector + ?Sized>(
    connector: &K,
    cancel: &CancellationToken,
) -> Result<K::Channel, Interrupt> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupt::Canceled),
        result = connector.connect() => result.map_err(Interrupt::Transport),
    }
}
