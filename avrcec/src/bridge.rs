//! Bridge
//!
//! Ties the receiver link and the bus together. Both streams are delivered
//! over crossbeam channels and consumed by a single loop, so the source
//! tracker and the power coordinator are only ever touched from one thread.
//!
//! Note: the receiver link runs in a dedicated thread.

use crate::avr::{Connector, Link, LinkError, LinkEvent, SourceEvent, SourceTracker};
use crate::cec::{Bus, BusMessage};
use crate::power::{Coordinator, Waiter};
use crossbeam::channel;
use std::io;
use std::thread;
use tracing::{debug, info};

/// Default size of the channel carrying receiver link events.
static DEFAULT_LINK_CHANNEL_SIZE: usize = 64;

/// Why the bridge stopped.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("receiver link thread exited")]
    LinkGone,
    #[error("bus transport disconnected")]
    BusGone,
}

/// Moves `link` to its own thread, which polls it forever and forwards what
/// it gets. A fatal link error is forwarded as well, then the thread exits.
pub fn spawn_link<C>(
    mut link: Link<C>,
) -> io::Result<channel::Receiver<Result<LinkEvent, LinkError>>>
where
    C: Connector + Send + 'static,
    C::Stream: Send,
{
    let (tx, rx) = channel::bounded(DEFAULT_LINK_CHANNEL_SIZE);
    thread::Builder::new()
        .name("avr-link".to_string())
        .spawn(move || loop {
            match link.poll_line() {
                Ok(event) => {
                    if tx.send(Ok(event)).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    let _ = tx.send(Err(err));
                    break;
                }
            }
        })?;
    Ok(rx)
}

pub struct Bridge<B: Bus, W: Waiter> {
    tracker: SourceTracker,
    coordinator: Coordinator<B, W>,
}

impl<B: Bus, W: Waiter> Bridge<B, W> {
    pub fn new(coordinator: Coordinator<B, W>) -> Bridge<B, W> {
        Bridge {
            tracker: SourceTracker::new(),
            coordinator,
        }
    }

    pub fn tracker(&self) -> &SourceTracker {
        &self.tracker
    }

    pub fn coordinator(&self) -> &Coordinator<B, W> {
        &self.coordinator
    }

    fn power_on(&mut self) {
        let outcome = self.coordinator.on_source_power_on_intent(self.tracker.current());
        debug!("power on: {:?}", outcome);
    }

    fn power_off(&mut self) {
        let outcome = self.coordinator.on_power_off_intent();
        debug!("power off: {:?}", outcome);
    }

    pub fn handle_link_event(&mut self, event: LinkEvent) {
        let line = match event {
            LinkEvent::Line(line) => line,
            LinkEvent::Reconnected => {
                info!("receiver link re-established, waiting for source report");
                self.tracker.reset();
                return;
            }
        };
        match self.tracker.interpret(&line) {
            SourceEvent::Initial(source) => {
                info!("receiver source is {:?}", source);
            }
            SourceEvent::Changed(source) => {
                info!("receiver source changed to {:?}", source);
                self.power_on();
            }
            SourceEvent::PowerOn => {
                info!("receiver powered on");
                self.power_on();
            }
            SourceEvent::Standby => {
                info!("receiver went to standby");
                self.power_off();
            }
            SourceEvent::NoOp => {
                debug!("ignoring '{}'", line);
            }
        }
    }

    pub fn handle_bus_message(&mut self, msg: BusMessage) {
        self.coordinator.on_bus_message(&msg);
    }

    /// Consumes both streams in arrival order until one of them fails.
    pub fn run(
        &mut self,
        link: channel::Receiver<Result<LinkEvent, LinkError>>,
        bus: channel::Receiver<BusMessage>,
    ) -> Result<(), BridgeError> {
        use crossbeam::select;
        loop {
            select! {
                recv(link) -> res => match res {
                    Ok(Ok(event)) => self.handle_link_event(event),
                    Ok(Err(err)) => return Err(err.into()),
                    Err(_) => return Err(BridgeError::LinkGone),
                },
                recv(bus) -> res => match res {
                    Ok(msg) => self.handle_bus_message(msg),
                    Err(_) => return Err(BridgeError::BusGone),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avr::testing::{ScriptedConnector, ScriptedStream};
    use crate::avr::{Source, SourcePolicy, IOBUF_SIZE};
    use crate::cec::proto::decode;
    use crate::cec::{Direction, LogicalAddress, SendError};
    use crate::power::{DisplayPowerState, RetryPolicy};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default, Clone)]
    struct SharedBus {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl Bus for SharedBus {
        fn send_message(&self, _target: LogicalAddress, payload: &[u8]) -> Result<(), SendError> {
            self.sent.lock().unwrap().push(payload.to_vec());
            Ok(())
        }
    }

    /// Confirms standby on the first wait.
    struct ConfirmingWaiter;

    impl Waiter for ConfirmingWaiter {
        fn wait(&mut self, _interval: Duration) -> Vec<BusMessage> {
            vec![decode(&[0x0F, 0x36], Direction::Received).unwrap()]
        }
    }

    fn bridge(bus: SharedBus) -> Bridge<SharedBus, ConfirmingWaiter> {
        Bridge::new(Coordinator::new(
            bus,
            ConfirmingWaiter,
            LogicalAddress::Tv,
            SourcePolicy::default(),
            RetryPolicy::default(),
        ))
    }

    fn line(text: &str) -> LinkEvent {
        LinkEvent::Line(text.to_string())
    }

    #[test]
    fn status_reply_does_not_power_on() {
        let bus = SharedBus::default();
        let mut b = bridge(bus.clone());
        b.handle_link_event(line("SIDVD"));
        assert_eq!(b.tracker().current(), Source::Dvd);
        assert!(bus.sent.lock().unwrap().is_empty());

        b.handle_link_event(line("SIBD"));
        assert_eq!(*bus.sent.lock().unwrap(), vec![vec![0x04]]);
        assert_eq!(b.coordinator().state(), DisplayPowerState::On);
    }

    #[test]
    fn receiver_power_follows() {
        let bus = SharedBus::default();
        let mut b = bridge(bus.clone());
        b.handle_link_event(line("SIGAME"));
        b.handle_link_event(line("PWON"));
        b.handle_link_event(line("PWSTANDBY"));
        assert_eq!(*bus.sent.lock().unwrap(), vec![vec![0x04], vec![0x36]]);
        assert_eq!(b.coordinator().state(), DisplayPowerState::Off);
    }

    #[test]
    fn replayed_status_reply_after_reconnect_is_not_a_change() {
        let bus = SharedBus::default();
        let mut b = bridge(bus.clone());
        b.handle_link_event(line("SIDVD"));
        b.handle_link_event(LinkEvent::Reconnected);
        b.handle_link_event(line("SIDVD"));
        assert!(bus.sent.lock().unwrap().is_empty());
        assert_eq!(b.tracker().current(), Source::Dvd);
    }

    #[test]
    fn malformed_bus_traffic_changes_nothing() {
        use crate::cec::dispatch::{dispatch_to_channel, rx_channel};
        use crate::cec::RawMessage;

        let bus = SharedBus::default();
        let mut b = bridge(bus.clone());
        let (tx, rx) = rx_channel();
        let cb = dispatch_to_channel(tx);
        // Standby broadcast from the display with a stray operand.
        cb(Ok(RawMessage {
            bytes: vec![0x0F, 0x36, 0x00],
            direction: Direction::Received,
        }))
        .unwrap();
        for msg in rx.try_iter() {
            b.handle_bus_message(msg);
        }
        assert_eq!(b.coordinator().state(), DisplayPowerState::Unknown);
        assert!(bus.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn runs_until_link_fails() {
        let stream = ScriptedStream::new(vec![
            Ok(b"SIDVD\r".to_vec()),
            Ok(b"SIBD\r".to_vec()),
        ]);
        // No second connection: the reconnect after the end of the stream fails.
        let connector = ScriptedConnector::new(vec![Ok(stream)]);
        let link = Link::open(connector, "SI?", IOBUF_SIZE).unwrap();
        let link_rx = spawn_link(link).unwrap();
        let (_bus_tx, bus_rx) = channel::bounded::<BusMessage>(1);

        let bus = SharedBus::default();
        let mut b = bridge(bus.clone());
        assert!(matches!(
            b.run(link_rx, bus_rx),
            Err(BridgeError::Link(LinkError::Reconnect(_)))
        ));
        assert_eq!(*bus.sent.lock().unwrap(), vec![vec![0x04]]);
    }

    #[test]
    fn stops_when_bus_goes_away() {
        let (_link_tx, link_rx) = channel::bounded::<Result<LinkEvent, LinkError>>(1);
        let (bus_tx, bus_rx) = channel::bounded::<BusMessage>(1);
        bus_tx
            .send(decode(&[0x0F, 0x36], Direction::Received).unwrap())
            .unwrap();
        drop(bus_tx);
        let mut b = bridge(SharedBus::default());
        assert!(matches!(b.run(link_rx, bus_rx), Err(BridgeError::BusGone)));
        assert_eq!(b.coordinator().state(), DisplayPowerState::Off);
    }
}
