//! Display-control bus
//!
//! The bus transport itself is an external collaborator: anything that can
//! send a payload to a logical address and hand back every frame it observes
//! through a receive callback. `client` implements it on top of libcec's
//! `cec-client`; `dispatch` turns raw frames into decoded `BusMessage`s on a
//! crossbeam channel.

pub mod client;
pub mod dispatch;
pub mod proto;

pub use proto::{BusMessage, Direction, LogicalAddress, Opcode};

use std::io;

/// A frame as reported by the transport: header byte plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub bytes: Vec<u8>,
    pub direction: Direction,
}

/// Possible errors when sending on the bus
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The payload could not be encoded.
    #[error("invalid payload: {0}")]
    Encode(#[from] proto::Error),
    /// The transport is gone.
    #[error("bus transport disconnected")]
    Disconnected,
    /// Issue with the underlying IO operation.
    #[error("bus I/O error: {0}")]
    IO(#[from] io::Error),
}

/// Possible errors reported to a receive callback
#[derive(Debug, thiserror::Error)]
pub enum RecvError {
    /// The transport stopped delivering messages.
    #[error("bus transport disconnected")]
    Disconnected,
    /// Low level IO error.
    #[error("bus I/O error: {0}")]
    IO(#[from] io::Error),
}

/// Outbound half of a bus transport.
pub trait Bus {
    /// Sends `payload` (opcode plus operands) to `target`.
    fn send_message(&self, target: LogicalAddress, payload: &[u8]) -> Result<(), SendError>;
}
