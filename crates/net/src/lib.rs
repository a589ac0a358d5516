//! ocli-net: TCP transport for ocli
//!
//! This crate implements the `Channel` and `Connector` traits from ocli-core
//! over TCP using length-prefixed JSON frames. Keeping the wire format here
//! lets the protocol engines in ocli-core stay independent of any socket
//! type.

pub mod channel;
pub mod frame;
pub mod tcp;

pub use channel::FramedChannel;
pub use frame::{Frame, read_frame, write_frame};
pub use tcp::TcpConnector;
