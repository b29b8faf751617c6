//! Display power coordination
//!
//! Decides when to send power commands to the display, and keeps track of
//! what we believe its power state is. Turning the display on is a single
//! `ImageViewOn`, after which it is assumed to be on. Turning it off is
//! harder: the display may ignore `Standby`, so the command is repeated at a
//! fixed interval until the display broadcasts its own `Standby`, which is
//! the only reliable sign that it is off. If that never happens within the
//! attempt budget, the belief is reset to `Unknown`.

use crate::avr::{Source, SourcePolicy};
use crate::cec::proto::{self, Opcode, PowerStatus};
use crate::cec::{Bus, BusMessage, Direction, LogicalAddress, SendError};
use crossbeam::channel::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPowerState {
    Unknown,
    On,
    Off,
}

/// What a power-on request ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOnOutcome {
    Sent,
    AlreadyOn,
    Suppressed(Source),
    /// The command could not be sent; the state is unchanged.
    SendFailed,
}

/// How a power-off request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOffOutcome {
    /// The display broadcast its standby after `attempts` commands.
    Confirmed { attempts: u32 },
    /// No confirmation within the budget; the state is now `Unknown`.
    GaveUp { attempts: u32 },
}

/// Bounds of the power-off loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy {
            attempts: 60,
            interval: Duration::from_millis(500),
        }
    }
}

/// Waits between power-off attempts, returning the bus messages that came
/// in meanwhile.
pub trait Waiter {
    fn wait(&mut self, interval: Duration) -> Vec<BusMessage>;
}

/// Waits on the channel carrying decoded bus messages.
pub struct ChannelWaiter {
    rx: channel::Receiver<BusMessage>,
}

impl ChannelWaiter {
    pub fn new(rx: channel::Receiver<BusMessage>) -> ChannelWaiter {
        ChannelWaiter { rx }
    }
}

impl Waiter for ChannelWaiter {
    fn wait(&mut self, interval: Duration) -> Vec<BusMessage> {
        let deadline = Instant::now() + interval;
        let mut msgs = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(msg) => msgs.push(msg),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                    break;
                }
            }
        }
        msgs
    }
}

pub struct Coordinator<B: Bus, W: Waiter> {
    bus: B,
    waiter: W,
    /// Logical address of the display.
    display: LogicalAddress,
    policy: SourcePolicy,
    retry: RetryPolicy,
    state: DisplayPowerState,
}

impl<B: Bus, W: Waiter> Coordinator<B, W> {
    pub fn new(
        bus: B,
        waiter: W,
        display: LogicalAddress,
        policy: SourcePolicy,
        retry: RetryPolicy,
    ) -> Coordinator<B, W> {
        Coordinator {
            bus,
            waiter,
            display,
            policy,
            retry,
            state: DisplayPowerState::Unknown,
        }
    }

    pub fn state(&self) -> DisplayPowerState {
        self.state
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Turns the display on for `source`, unless it is believed to be on
    /// already or `source` has no picture.
    pub fn on_source_power_on_intent(&mut self, source: Source) -> PowerOnOutcome {
        if self.state == DisplayPowerState::On {
            info!("display already on, skipping power on");
            return PowerOnOutcome::AlreadyOn;
        }
        if self.policy.suppresses_auto_power_on(source) {
            info!("source {:?} has no video, skipping power on", source);
            return PowerOnOutcome::Suppressed(source);
        }
        info!("powering on display for source {:?}", source);
        let sent = proto::encode(Opcode::ImageViewOn, &[])
            .map_err(SendError::from)
            .and_then(|payload| self.bus.send_message(self.display, &payload));
        if let Err(err) = sent {
            warn!("failed to send power on: {}", err);
            return PowerOnOutcome::SendFailed;
        }
        info!("display power state -> on");
        self.state = DisplayPowerState::On;
        PowerOnOutcome::Sent
    }

    /// Sends `Standby` until the display confirms. Blocks for up to the
    /// whole retry budget.
    ///
    /// A display already believed to be off gets a single `Standby` and no
    /// wait for a new confirmation, since it has nothing left to announce.
    pub fn on_power_off_intent(&mut self) -> PowerOffOutcome {
        let payload = [u8::from(Opcode::Standby)];
        let mut attempts = 0;
        while attempts < self.retry.attempts {
            attempts += 1;
            info!("turning off display: attempt {}", attempts);
            if let Err(err) = self.bus.send_message(self.display, &payload) {
                warn!("failed to send standby: {}", err);
            }
            if self.state == DisplayPowerState::Off {
                info!("display already off");
                return PowerOffOutcome::Confirmed { attempts };
            }
            for msg in self.waiter.wait(self.retry.interval) {
                self.on_bus_message(&msg);
            }
            if self.state == DisplayPowerState::Off {
                info!("display is off after {} attempts", attempts);
                return PowerOffOutcome::Confirmed { attempts };
            }
        }
        warn!(
            "display did not confirm standby after {} attempts, power state -> unknown",
            attempts
        );
        self.state = DisplayPowerState::Unknown;
        PowerOffOutcome::GaveUp { attempts }
    }

    /// Applies a message observed on the bus.
    pub fn on_bus_message(&mut self, msg: &BusMessage) {
        if msg.direction == Direction::TransmitComplete {
            debug!("transmit complete: {}", msg);
            return;
        }
        if msg.is_standby_broadcast_from(self.display) {
            info!("display broadcast standby, display power state -> off");
            self.state = DisplayPowerState::Off;
            return;
        }
        match msg.opcode() {
            Opcode::ReportPowerStatus if msg.initiator == LogicalAddress::AudioSystem => {
                info!(
                    "receiver reports power status {:?}",
                    PowerStatus::from(msg.operands()[0])
                );
            }
            Opcode::SetSystemAudioMode => {
                info!(
                    "{:?} sets system audio mode {}",
                    msg.initiator,
                    if msg.operands()[0] == 1 { "on" } else { "off" }
                );
            }
            Opcode::ImageViewOn => {
                debug!("{:?} requested image view on", msg.initiator);
            }
            _ => {}
        }
    }
}
