//! Error types for ocli-core
//!
//! Component errors (handshake, transfer, transport) are separate enums so
//! callers can tell which protocol step failed; [`Error`] unifies them and
//! maps each to a CLI exit code.

use std::fmt;

use thiserror::Error;

use crate::ids::ObjectId;
use crate::token::Verb;

/// Result type alias for ocli-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Status codes a remote peer may attach to a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteCode {
    NotFound,
    PermissionDenied,
    InvalidArgument,
    AlreadyExists,
    Unavailable,
    Internal,
}

impl fmt::Display for RemoteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteCode::NotFound => "NotFound",
            RemoteCode::PermissionDenied => "PermissionDenied",
            RemoteCode::InvalidArgument => "InvalidArgument",
            RemoteCode::AlreadyExists => "AlreadyExists",
            RemoteCode::Unavailable => "Unavailable",
            RemoteCode::Internal => "Internal",
        };
        f.write_str(name)
    }
}

/// Failures of the underlying message stream
#[derive(Error, Debug)]
pub enum TransportError {
    /// Peer closed the stream while a message was still expected
    #[error("stream closed by peer")]
    Closed,

    /// Could not reach the endpoint
    #[error("can't connect to '{endpoint}': {reason}")]
    Connect { endpoint: String, reason: String },

    /// Connection attempt exceeded its deadline
    #[error("timed out after {0} ms")]
    Timeout(u64),

    /// Socket level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(String),

    /// The peer rejected the request
    #[error("{code}: {message}")]
    Remote { code: RemoteCode, message: String },
}

impl TransportError {
    /// Remote status code, if the peer answered with one
    pub fn remote_code(&self) -> Option<RemoteCode> {
        match self {
            TransportError::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Handshake step at which negotiation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStage {
    SendInit,
    AwaitEcho,
    SendConfirm,
    AwaitResult,
}

impl fmt::Display for HandshakeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeStage::SendInit => "sending init",
            HandshakeStage::AwaitEcho => "awaiting echo",
            HandshakeStage::SendConfirm => "sending confirm",
            HandshakeStage::AwaitResult => "awaiting result",
        };
        f.write_str(name)
    }
}

/// Session negotiation errors. None of them are retried internally.
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// Echoed token differs from the requested one beyond allowed narrowing
    #[error("received token differs: {0}")]
    TokenEchoMismatch(String),

    /// First reply was not an echoed unsigned token
    #[error("expected unsigned token echo")]
    NoEchoToken,

    /// Reply to confirm was not a well-formed result token
    #[error("expected result token")]
    NoResultToken,

    /// Stream failure while exchanging handshake messages
    #[error("session stream failed while {stage}: {source}")]
    Transport {
        stage: HandshakeStage,
        #[source]
        source: TransportError,
    },

    /// Caller canceled the negotiation
    #[error("session negotiation canceled")]
    Canceled,
}

/// Transfer step at which a stream failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Connect,
    SendHeader,
    SendChunk,
    Close,
    AwaitResult,
    SendRequest,
    Receive,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferStage::Connect => "connecting",
            TransferStage::SendHeader => "sending header",
            TransferStage::SendChunk => "sending chunk",
            TransferStage::Close => "closing stream",
            TransferStage::AwaitResult => "awaiting result",
            TransferStage::SendRequest => "sending request",
            TransferStage::Receive => "receiving",
        };
        f.write_str(name)
    }
}

/// Upload, download and range request errors
#[derive(Error, Debug)]
pub enum TransferError {
    /// Origin message was an authenticated tombstone
    #[error("object {0} was removed")]
    ObjectRemoved(ObjectId),

    /// Origin carried a tombstone whose integrity could not be proven
    #[error("object corrupted: {0}")]
    TombstoneUnverified(String),

    /// Stream ended before the object origin arrived
    #[error("stream ended before object origin was received")]
    MissingOrigin,

    /// Token does not cover the requested verb or object
    #[error("session token does not authorize {verb} on object {object}")]
    OutOfScope { verb: Verb, object: ObjectId },

    /// Chunk size cannot be carried in one message
    #[error("chunk size {0} is outside 1..={max}", max = crate::transfer::MAX_CHUNK_SIZE)]
    ChunkSize(usize),

    /// Streamed byte count differs from the declared payload length
    #[error("payload length mismatch: declared {declared}, streamed {streamed}")]
    LengthMismatch { declared: u64, streamed: u64 },

    /// Peer sent a message that does not belong at this point of the stream
    #[error("unexpected message while {stage}: {got}")]
    UnexpectedMessage { stage: TransferStage, got: String },

    /// Transport failure, fatal to the in-flight transfer
    #[error("stream failed while {stage}: {source}")]
    Stream {
        stage: TransferStage,
        #[source]
        source: TransportError,
    },

    /// Reading the payload source or writing the sink failed
    #[error("local I/O error: {0}")]
    Local(#[from] std::io::Error),

    /// Caller canceled the transfer
    #[error("transfer canceled")]
    Canceled,
}

impl TransferError {
    pub(crate) fn stream(stage: TransferStage) -> impl FnOnce(TransportError) -> Self {
        move |source| TransferError::Stream { stage, source }
    }

    pub(crate) fn interrupted(
        stage: TransferStage,
    ) -> impl FnOnce(crate::transport::Interrupt) -> Self {
        move |interrupt| match interrupt {
            crate::transport::Interrupt::Canceled => TransferError::Canceled,
            crate::transport::Interrupt::Transport(source) => {
                TransferError::Stream { stage, source }
            }
        }
    }
}

/// Error types for ocli-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed user input (identifiers, ranges, salts, headers)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Private key could not be loaded
    #[error("Key error: {0}")]
    Key(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session establishment failed
    #[error("can't establish session: {0}")]
    Handshake(#[from] HandshakeError),

    /// Object transfer failed
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Stream failure outside a transfer
    #[error("Network error: {0}")]
    Transport(#[from] TransportError),

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Whether the error originates from caller cancellation
    pub fn is_canceled(&self) -> bool {
        matches!(
            self,
            Error::Handshake(HandshakeError::Canceled) | Error::Transfer(TransferError::Canceled)
        )
    }

    /// Get the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_canceled() {
            return 130; // Interrupted
        }

        let transport = match self {
            Error::Transport(e) => Some(e),
            Error::Handshake(HandshakeError::Transport { source, .. }) => Some(source),
            Error::Transfer(TransferError::Stream { source, .. }) => Some(source),
            _ => None,
        };
        if let Some(e) = transport {
            return match e.remote_code() {
                Some(RemoteCode::NotFound) => 5,
                Some(RemoteCode::PermissionDenied) => 4,
                Some(RemoteCode::AlreadyExists) => 6,
                Some(RemoteCode::InvalidArgument) => 2,
                _ => 3,
            };
        }

        match self {
            Error::InvalidInput(_) | Error::Config(_) | Error::Key(_) => 2, // UsageError
            Error::Handshake(_) => 4,                                       // AuthError
            Error::Transfer(TransferError::ChunkSize(_)) => 2,
            Error::Transfer(TransferError::OutOfScope { .. }) => 4,
            Error::Transfer(TransferError::ObjectRemoved(_)) => 5, // NotFound
            Error::Transfer(TransferError::LengthMismatch { .. }) => 6, // Conflict
            _ => 1,                                                 // GeneralError
        }
    }
}
