//! CEC frame codec
//!
//! A CEC frame starts with a header byte carrying the initiator (high nibble)
//! and destination (low nibble) logical addresses, followed by the payload:
//! one opcode byte and its operands. Only the small fixed-size messages this
//! crate cares about are accepted; anything else fails to decode and should
//! be ignored by the caller.

use num_enum::{FromPrimitive, IntoPrimitive};
use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::ops::RangeInclusive;

/// Maximum size of a payload (opcode plus operands) accepted by the codec.
pub const MAX_PAYLOAD_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
#[derive(FromPrimitive, IntoPrimitive)]
pub enum LogicalAddress {
    Tv = 0,
    Recording1 = 1,
    Recording2 = 2,
    Tuner1 = 3,
    Playback1 = 4,
    AudioSystem = 5,
    Tuner2 = 6,
    Tuner3 = 7,
    Playback2 = 8,
    Recording3 = 9,
    Tuner4 = 10,
    Playback3 = 11,
    Reserved1 = 12,
    Reserved2 = 13,
    FreeUse = 14,
    /// As an initiator this is an unregistered device, as a destination
    /// it addresses every device on the bus.
    #[num_enum(default)]
    Unregistered = 15,
}

impl LogicalAddress {
    /// Destination nibble used for broadcast messages.
    pub const BROADCAST: LogicalAddress = LogicalAddress::Unregistered;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[derive(FromPrimitive, IntoPrimitive)]
pub enum Opcode {
    FeatureAbort = 0x00,
    ImageViewOn = 0x04,
    TextViewOn = 0x0D,
    Standby = 0x36,
    UserControlPressed = 0x44,
    UserControlReleased = 0x45,
    GiveOsdName = 0x46,
    SetOsdName = 0x47,
    SystemAudioModeRequest = 0x70,
    GiveAudioStatus = 0x71,
    SetSystemAudioMode = 0x72,
    ReportAudioStatus = 0x7A,
    GiveSystemAudioModeStatus = 0x7D,
    SystemAudioModeStatus = 0x7E,
    ActiveSource = 0x82,
    GivePhysicalAddress = 0x83,
    ReportPhysicalAddress = 0x84,
    RequestActiveSource = 0x85,
    SetStreamPath = 0x86,
    DeviceVendorId = 0x87,
    GiveDeviceVendorId = 0x8C,
    MenuRequest = 0x8D,
    MenuStatus = 0x8E,
    GiveDevicePowerStatus = 0x8F,
    ReportPowerStatus = 0x90,
    GetMenuLanguage = 0x91,
    InactiveSource = 0x9D,
    CecVersion = 0x9E,
    GetCecVersion = 0x9F,
    #[num_enum(catch_all)]
    Unknown(u8),
}

impl Opcode {
    /// Number of operand bytes this opcode may carry, or `None` for
    /// opcodes the codec does not recognize.
    pub fn operand_count(self) -> Option<RangeInclusive<usize>> {
        use Opcode::*;
        let range = match self {
            ImageViewOn | TextViewOn | Standby | UserControlReleased | GiveOsdName
            | GiveAudioStatus | GiveSystemAudioModeStatus | GivePhysicalAddress
            | RequestActiveSource | GiveDeviceVendorId | GiveDevicePowerStatus
            | GetMenuLanguage | GetCecVersion => 0..=0,
            UserControlPressed | SetSystemAudioMode | ReportAudioStatus
            | SystemAudioModeStatus | MenuRequest | MenuStatus | ReportPowerStatus
            | CecVersion => 1..=1,
            FeatureAbort | ActiveSource | SetStreamPath | InactiveSource => 2..=2,
            ReportPhysicalAddress | DeviceVendorId => 3..=3,
            // Optional physical address operand
            SystemAudioModeRequest => 0..=2,
            // Names longer than the payload limit do not decode.
            SetOsdName => 1..=(MAX_PAYLOAD_SIZE - 1),
            Unknown(_) => return None,
        };
        Some(range)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[derive(FromPrimitive, IntoPrimitive)]
pub enum PowerStatus {
    On = 0,
    Standby = 1,
    StandbyToOn = 2,
    OnToStandby = 3,
    #[num_enum(catch_all)]
    Unknown(u8),
}

/// How a message was observed on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sent by another device and overheard or addressed to us.
    Received,
    /// Sent by us.
    Sent,
    /// Notification that one of our transmissions completed.
    TransmitComplete,
}

/// A decoded bus message. `follower` is `None` for broadcasts. Only
/// `decode` builds these, so the payload always starts with an opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub initiator: LogicalAddress,
    pub follower: Option<LogicalAddress>,
    payload: Vec<u8>,
    pub direction: Direction,
}

impl BusMessage {
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn opcode(&self) -> Opcode {
        Opcode::from(self.payload[0])
    }

    pub fn operands(&self) -> &[u8] {
        &self.payload[1..]
    }

    pub fn is_broadcast(&self) -> bool {
        self.follower.is_none()
    }

    /// True for a broadcast `Standby` originated by `device`, which is how a
    /// display announces that it is going off.
    pub fn is_standby_broadcast_from(&self, device: LogicalAddress) -> bool {
        self.initiator == device && self.is_broadcast() && self.opcode() == Opcode::Standby
    }
}

impl Display for BusMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}->", self.initiator)?;
        match self.follower {
            Some(addr) => write!(f, "{:?}", addr)?,
            None => write!(f, "Broadcast")?,
        }
        write!(f, " {:?}", self.opcode())?;
        for b in self.operands() {
            write!(f, " {:02x}", b)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("empty frame")]
    Empty,
    #[error("polling message from {0:?} carries no opcode")]
    NoPayload(LogicalAddress),
    #[error("payload of {0} bytes exceeds the {} byte limit", MAX_PAYLOAD_SIZE)]
    PayloadTooBig(usize),
    #[error("unrecognized opcode 0x{0:02x}")]
    UnknownOpcode(u8),
    #[error("{opcode:?} with {got} operands")]
    WrongOperandCount { opcode: Opcode, got: usize },
}

fn check_operands(opcode: Opcode, got: usize) -> Result<(), Error> {
    match opcode.operand_count() {
        None => Err(Error::UnknownOpcode(opcode.into())),
        Some(range) if !range.contains(&got) => Err(Error::WrongOperandCount { opcode, got }),
        Some(_) => Ok(()),
    }
}

/// Builds the payload for an outbound command.
pub fn encode(opcode: Opcode, operands: &[u8]) -> Result<Vec<u8>, Error> {
    if operands.len() + 1 > MAX_PAYLOAD_SIZE {
        return Err(Error::PayloadTooBig(operands.len() + 1));
    }
    check_operands(opcode, operands.len())?;
    let mut payload = Vec::with_capacity(operands.len() + 1);
    payload.push(opcode.into());
    payload.extend_from_slice(operands);
    Ok(payload)
}

/// Prepends the header byte to a payload.
pub fn frame(initiator: LogicalAddress, destination: LogicalAddress, payload: &[u8]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(payload.len() + 1);
    raw.push((u8::from(initiator) << 4) | (u8::from(destination) & 0x0F));
    raw.extend_from_slice(payload);
    raw
}

/// Decodes a raw frame (header plus payload).
pub fn decode(raw: &[u8], direction: Direction) -> Result<BusMessage, Error> {
    let (header, payload) = match raw.split_first() {
        Some(split) => split,
        None => return Err(Error::Empty),
    };
    let initiator = LogicalAddress::from(header >> 4);
    let destination = LogicalAddress::from(header & 0x0F);
    if payload.is_empty() {
        return Err(Error::NoPayload(initiator));
    }
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::PayloadTooBig(payload.len()));
    }
    check_operands(Opcode::from(payload[0]), payload.len() - 1)?;
    Ok(BusMessage {
        initiator,
        follower: if destination == LogicalAddress::BROADCAST {
            None
        } else {
            Some(destination)
        },
        payload: payload.to_vec(),
        direction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_display_standby_broadcast() {
        let msg = decode(&[0x0F, 0x36], Direction::Received).unwrap();
        assert_eq!(msg.initiator, LogicalAddress::Tv);
        assert_eq!(msg.follower, None);
        assert_eq!(msg.opcode(), Opcode::Standby);
        assert!(msg.is_standby_broadcast_from(LogicalAddress::Tv));
        assert!(!msg.is_standby_broadcast_from(LogicalAddress::AudioSystem));
    }

    #[test]
    fn directed_standby_is_not_a_broadcast() {
        let msg = decode(&[0x20, 0x36], Direction::Sent).unwrap();
        assert_eq!(msg.initiator, LogicalAddress::Recording2);
        assert_eq!(msg.follower, Some(LogicalAddress::Tv));
        assert!(!msg.is_standby_broadcast_from(LogicalAddress::Recording2));
    }

    #[test]
    fn decodes_power_status_report() {
        let msg = decode(&[0x52, 0x90, 0x01], Direction::Received).unwrap();
        assert_eq!(msg.opcode(), Opcode::ReportPowerStatus);
        assert_eq!(PowerStatus::from(msg.operands()[0]), PowerStatus::Standby);
    }

    #[test]
    fn rejects_operand_count_mismatch() {
        assert_eq!(
            decode(&[0x0F, 0x36, 0x01], Direction::Received),
            Err(Error::WrongOperandCount {
                opcode: Opcode::Standby,
                got: 1
            })
        );
        assert_eq!(
            decode(&[0x5F, 0x72], Direction::Received),
            Err(Error::WrongOperandCount {
                opcode: Opcode::SetSystemAudioMode,
                got: 0
            })
        );
    }

    #[test]
    fn rejects_malformed_frames() {
        assert_eq!(decode(&[], Direction::Received), Err(Error::Empty));
        assert_eq!(
            decode(&[0x40], Direction::Received),
            Err(Error::NoPayload(LogicalAddress::Playback1))
        );
        assert_eq!(
            decode(&[0x40, 0x47, b'B', b'l', b'u', b'r'], Direction::Received),
            Err(Error::PayloadTooBig(5))
        );
        assert_eq!(
            decode(&[0x40, 0xA0, 0x00], Direction::Received),
            Err(Error::UnknownOpcode(0xA0))
        );
    }

    #[test]
    fn abort_is_not_recognized() {
        assert_eq!(Opcode::from(0xFF), Opcode::Unknown(0xFF));
        assert_eq!(Opcode::from(0x00), Opcode::FeatureAbort);
        assert_eq!(u8::from(Opcode::Unknown(0xFF)), 0xFF);
        assert_eq!(
            decode(&[0x40, 0xFF], Direction::Received),
            Err(Error::UnknownOpcode(0xFF))
        );
    }

    #[test]
    fn encodes_power_commands() {
        assert_eq!(encode(Opcode::ImageViewOn, &[]), Ok(vec![0x04]));
        assert_eq!(encode(Opcode::Standby, &[]), Ok(vec![0x36]));
        assert!(encode(Opcode::Standby, &[0x00]).is_err());
        assert_eq!(
            frame(LogicalAddress::Recording2, LogicalAddress::Tv, &[0x36]),
            vec![0x20, 0x36]
        );
    }

    #[test]
    fn formats_messages() {
        let msg = decode(&[0x5F, 0x72, 0x01], Direction::Received).unwrap();
        assert_eq!(msg.to_string(), "AudioSystem->Broadcast SetSystemAudioMode 01");
    }
}
