use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{BeaconId, Reading};

/// Downlink message type, carried in the high nibble of the first byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    LoraConfig,
    GatewayConfig,
    CommandRequest,
    AlarmConfig,
}

impl MessageType {
    /// Wire nibble of the message type
    pub fn nibble(&self) -> u8 {
        match self {
            MessageType::LoraConfig => 0x8,
            MessageType::GatewayConfig => 0x9,
            MessageType::CommandRequest => 0xA,
            MessageType::AlarmConfig => 0xB,
        }
    }

    /// Looks up a message type from its wire nibble
    pub fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0x8 => Some(MessageType::LoraConfig),
            0x9 => Some(MessageType::GatewayConfig),
            0xA => Some(MessageType::CommandRequest),
            0xB => Some(MessageType::AlarmConfig),
            _ => None,
        }
    }
}

/// LoRa radio settings (type 0x8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoraConfig {
    /// Adaptive data rate
    pub adr: bool,
    /// Data rate index, 0-3
    pub data_rate: u8,
    /// Band mode, 0-7
    pub band_mode: u8,
    /// Transmit power, 0-20
    pub power: u8,
}

/// Gateway reporting settings (type 0x9)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Beacon switch enable
    pub switch_enabled: bool,
    /// Position report interval in 5 s units
    pub position_interval: u16,
    /// Heartbeat period in 30 s units
    pub heartbeat_period: u8,
}

impl GatewayConfig {
    /// Position report interval as a duration
    pub fn position_interval_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.position_interval) * 5)
    }

    /// Heartbeat period as a duration
    pub fn heartbeat_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.heartbeat_period) * 30)
    }
}

/// Default raw max-beacon quantity (0xFE, i.e. 508 beacons)
pub const DEFAULT_MAX_BEACON_QUANTITY: u8 = 0xFE;

/// Sub-commands of a Command Request (type 0xA)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestCommand {
    Register,
    Reboot,
    StopContinuousReceive,
    StartContinuousReceive,
    /// Shift of the receive window start, in seconds
    AdjustStartOffset(i16),
    /// Receive window length, in seconds
    AdjustDuration(u16),
    /// Raw quantity; the device accepts twice this many beacons
    SetMaxBeaconQuantity(u8),
    RequestPosition,
    RequestHeartbeat,
    /// Asset RSSI threshold in dBm
    SetAssetRssiThreshold(i16),
    /// Sounds the 60 s audible/light alarm for a beacon
    BeaconSearch(BeaconId),
}

impl RequestCommand {
    /// Sub-command code (low nibble of byte 1)
    pub fn code(&self) -> u8 {
        match self {
            RequestCommand::Register => 0x1,
            RequestCommand::Reboot => 0x2,
            RequestCommand::StopContinuousReceive => 0x3,
            RequestCommand::StartContinuousReceive => 0x4,
            RequestCommand::AdjustStartOffset(_) => 0x5,
            RequestCommand::AdjustDuration(_) => 0x6,
            RequestCommand::SetMaxBeaconQuantity(_) => 0x7,
            RequestCommand::RequestPosition => 0x8,
            RequestCommand::RequestHeartbeat => 0x9,
            RequestCommand::SetAssetRssiThreshold(_) => 0xB,
            RequestCommand::BeaconSearch(_) => 0xC,
        }
    }

    /// Number of argument bytes following the sequence id
    pub fn argument_len(code: u8) -> Option<usize> {
        match code {
            0x1 | 0x2 | 0x3 | 0x4 | 0x8 | 0x9 => Some(0),
            0x5 | 0x7 | 0xB => Some(1),
            0x6 | 0xC => Some(2),
            _ => None,
        }
    }
}

/// Alarm parameters (type 0xB)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmParameter {
    /// Alarm RSSI threshold in dBm
    RssiThreshold(i16),
    /// Buzzer volume, 0-4
    BuzzerVolume(u8),
    /// Buzzer duration in 10 s units, 0 mutes
    BuzzerDuration(u8),
    /// Beacons required to raise an alarm
    BeaconQuantity(u8),
    /// Alarm receiving delay in seconds
    ReceivingDelay(u8),
    /// Report interval in 5 s units
    ReportInterval(u16),
    /// Silent button enable
    SilentButton(bool),
}

impl AlarmParameter {
    /// Parameter selector (byte 3)
    pub fn selector(&self) -> u8 {
        match self {
            AlarmParameter::RssiThreshold(_) => 0x00,
            AlarmParameter::BuzzerVolume(_) => 0x01,
            AlarmParameter::BuzzerDuration(_) => 0x02,
            AlarmParameter::BeaconQuantity(_) => 0x03,
            AlarmParameter::ReceivingDelay(_) => 0x04,
            AlarmParameter::ReportInterval(_) => 0x05,
            AlarmParameter::SilentButton(_) => 0x06,
        }
    }

    /// Number of value bytes following the selector
    pub fn value_len(selector: u8) -> Option<usize> {
        match selector {
            0x00..=0x04 | 0x06 => Some(1),
            0x05 => Some(2),
            _ => None,
        }
    }
}

/// A command sent to the alarm device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownlinkCommand {
    LoraConfig(LoraConfig),
    GatewayConfig(GatewayConfig),
    CommandRequest {
        /// Sequence id echoed by the acknowledgment
        seq: u8,
        command: RequestCommand,
    },
    AlarmConfig {
        /// Sequence id echoed by the acknowledgment
        seq: u8,
        parameter: AlarmParameter,
    },
}

impl DownlinkCommand {
    /// Builds a command request; the dispatcher assigns the sequence id
    pub fn request(command: RequestCommand) -> Self {
        DownlinkCommand::CommandRequest { seq: 0, command }
    }

    /// Builds an alarm configuration; the dispatcher assigns the sequence id
    pub fn alarm(parameter: AlarmParameter) -> Self {
        DownlinkCommand::AlarmConfig { seq: 0, parameter }
    }

    /// Returns the message type
    pub fn message_type(&self) -> MessageType {
        match self {
            DownlinkCommand::LoraConfig(_) => MessageType::LoraConfig,
            DownlinkCommand::GatewayConfig(_) => MessageType::GatewayConfig,
            DownlinkCommand::CommandRequest { .. } => MessageType::CommandRequest,
            DownlinkCommand::AlarmConfig { .. } => MessageType::AlarmConfig,
        }
    }

    /// Sequence id, for message types that are acknowledged
    pub fn sequence(&self) -> Option<u8> {
        match self {
            DownlinkCommand::CommandRequest { seq, .. }
            | DownlinkCommand::AlarmConfig { seq, .. } => Some(*seq),
            _ => None,
        }
    }

    /// Returns whether the device acknowledges this command
    pub fn expects_ack(&self) -> bool {
        self.sequence().is_some()
    }

    /// Returns a copy carrying `seq`; unacknowledged types are unchanged
    pub fn with_sequence(self, seq: u8) -> Self {
        match self {
            DownlinkCommand::CommandRequest { command, .. } => {
                DownlinkCommand::CommandRequest { seq, command }
            }
            DownlinkCommand::AlarmConfig { parameter, .. } => {
                DownlinkCommand::AlarmConfig { seq, parameter }
            }
            other => other,
        }
    }
}

impl fmt::Display for DownlinkCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownlinkCommand::LoraConfig(c) => write!(
                f,
                "LoRa config (adr={}, dr={}, band={}, power={})",
                c.adr, c.data_rate, c.band_mode, c.power
            ),
            DownlinkCommand::GatewayConfig(c) => write!(
                f,
                "gateway config (switch={}, position={:?}, heartbeat={:?})",
                c.switch_enabled,
                c.position_interval_duration(),
                c.heartbeat_duration()
            ),
            DownlinkCommand::CommandRequest { seq, command } => {
                write!(f, "command request #{} {:?}", seq, command)
            }
            DownlinkCommand::AlarmConfig { seq, parameter } => {
                write!(f, "alarm config #{} {:?}", seq, parameter)
            }
        }
    }
}

/// Uplink type nibbles
pub const UPLINK_BEACON_REPORT: u8 = 0x2;
pub const UPLINK_SINGLE_REPORT: u8 = 0x3;
pub const UPLINK_ACK: u8 = 0xF;

/// One beacon entry of an uplink report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconObservation {
    /// iBeacon major
    pub major: u16,
    /// Beacon short id (iBeacon minor)
    pub beacon: BeaconId,
    /// Signal strength in dBm
    pub rssi: i16,
}

impl From<BeaconObservation> for Reading {
    fn from(obs: BeaconObservation) -> Self {
        Reading::new(obs.beacon, obs.rssi)
    }
}

/// A message received from the field device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UplinkFrame {
    /// Batched report of 1-15 beacons
    BeaconReport(Vec<BeaconObservation>),
    /// Legacy single-beacon report
    SingleReport(BeaconObservation),
    /// Acknowledgment of a sequenced downlink
    Acknowledgment { seq: u8 },
}

impl UplinkFrame {
    /// Readings carried by this frame
    pub fn readings(&self) -> Vec<Reading> {
        match self {
            UplinkFrame::BeaconReport(entries) => entries.iter().map(|&o| o.into()).collect(),
            UplinkFrame::SingleReport(obs) => vec![(*obs).into()],
            UplinkFrame::Acknowledgment { .. } => Vec::new(),
        }
    }
}
