//! ocli-core: Core library for the ocli object storage client
//!
//! This crate provides the protocol engines behind the ocli CLI:
//! - Session token negotiation (`session`)
//! - Chunked object upload and download (`transfer`)
//! - Homomorphic hash verification of stored payloads (`hash`, `verify`)
//! - Configuration and connection settings
//!
//! Engines talk to a storage node only through the [`Channel`] and
//! [`Connector`] traits; the wire encoding lives in `ocli-net` and an
//! in-memory implementation in [`memory`] serves tests.

pub mod client;
pub mod config;
pub mod error;
pub mod hash;
pub mod identity;
pub mod ids;
pub mod memory;
pub mod object;
pub mod session;
pub mod settings;
pub mod token;
pub mod transfer;
pub mod transport;
pub mod verify;

pub use client::{ObjectClient, UploadReport};
pub use config::{Config, ConfigManager};
pub use error::{Error, HandshakeError, RemoteCode, Result, TransferError, TransportError};
pub use hash::Hash;
pub use identity::{Identity, KeyIdentity};
pub use ids::{Address, ContainerId, ObjectId, OwnerId};
pub use object::{Header, Object, ObjectHeader, Range, SearchQuery};
pub use session::{SessionRequest, negotiate};
pub use settings::{Overrides, Settings, SettingsManager};
pub use token::{Token, ValidityWindow, Verb};
pub use transfer::{
    DownloadOutcome, MAX_CHUNK_SIZE, TransferObserver, UploadOptions, UploadOutcome,
};
pub use transport::{Channel, Connector, Message};
pub use verify::Verification;
