//! Bus event dispatch
//!
//! Receive callbacks run on the transport's own thread. The callbacks built
//! here decode every frame and forward the result to a channel, so the bus
//! stream can be consumed by the same loop that handles receiver lines.
//! Frames that fail to decode are logged and dropped.

use super::{proto, BusMessage, RawMessage, RecvError};
use crossbeam::channel::{self, TrySendError};
use std::io;
use tracing::{debug, warn};

/// Default size of the channel carrying decoded bus messages.
static DEFAULT_RX_CHANNEL_SIZE: usize = 64;

/// Creates a sender/receiver pair to be used with `dispatch_to_channel`.
pub fn rx_channel() -> (channel::Sender<BusMessage>, channel::Receiver<BusMessage>) {
    channel::bounded::<BusMessage>(DEFAULT_RX_CHANNEL_SIZE)
}

/// Decodes a raw frame, logging and discarding it if it is malformed.
pub fn decode(raw: &RawMessage) -> Option<BusMessage> {
    match proto::decode(&raw.bytes, raw.direction) {
        Ok(msg) => {
            debug!(direction = ?raw.direction, "bus: {}", msg);
            Some(msg)
        }
        Err(err) => {
            debug!(frame = ?raw.bytes, "bus: dropping frame: {}", err);
            None
        }
    }
}

/// Returns a receive callback which decodes each frame and sends the result
/// to `tx`. Messages are dropped with a warning when the channel is full.
/// The callback fails once the transport disconnects or nobody is listening
/// anymore, which tells the transport to stop.
pub fn dispatch_to_channel(
    tx: channel::Sender<BusMessage>,
) -> impl Fn(Result<RawMessage, RecvError>) -> io::Result<()> {
    move |rxdata| -> io::Result<()> {
        let raw = match rxdata {
            Ok(raw) => raw,
            Err(RecvError::Disconnected) => {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            Err(RecvError::IO(err)) => {
                warn!("bus: receive error: {}", err);
                return Ok(());
            }
        };
        let msg = match decode(&raw) {
            Some(msg) => msg,
            None => return Ok(()),
        };
        match tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(msg)) => {
                warn!("bus: event queue full, dropping {}", msg);
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(io::Error::from(io::ErrorKind::BrokenPipe))
            }
        }
    }
}
