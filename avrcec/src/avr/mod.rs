//! AV receiver remote-control protocol
//!
//! The receiver speaks CR-terminated ASCII over a TCP connection: commands
//! like `SI?` or `PWON` go out, status lines like `SIDVD` or `PWSTANDBY`
//! come back, both in reply to queries and whenever the state changes on
//! the receiver itself.

mod iobuf;
pub mod link;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use iobuf::{LineReader, IOBUF_SIZE};
pub use link::{Connector, Link, LinkEvent, LinkState, TcpConnector};
pub use source::{Source, SourceEvent, SourcePolicy, SourceTracker};

use std::io;

/// Reasons a live receiver link stops delivering lines. All of them are
/// transient: the link is torn down and established again.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("no data within the read timeout")]
    TimedOut,
    #[error("connection closed by the receiver")]
    Closed,
    #[error("I/O error: {0}")]
    IO(io::Error),
}

impl From<io::Error> for ReadError {
    fn from(err: io::Error) -> ReadError {
        match err.kind() {
            // Socket receive timeouts surface as either, depending on the platform.
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ReadError::TimedOut,
            _ => ReadError::IO(err),
        }
    }
}

/// Failures that leave the process without a receiver link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("cannot resolve receiver address '{0}': {1}")]
    Resolve(String, io::Error),
    #[error("cannot connect to receiver: {0}")]
    Connect(io::Error),
    #[error("cannot reconnect to receiver: {0}")]
    Reconnect(io::Error),
    #[error("cannot send status query: {0}")]
    Query(io::Error),
}
