use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{AlarmState, BeaconId};

/// What raised an alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerCause {
    /// Weak signal persisted through the debounce interval
    Signal,
    /// No readings for longer than the silence limit
    Silence,
    /// Seen by a gateway on a floor other than its home floor
    WrongFloor,
    /// Operator override
    Manual,
}

/// Kind of an alarm event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmEventKind {
    /// First reading of the beacon since startup
    Sighted,
    /// The beacon moved between states
    StateChanged { from: AlarmState, to: AlarmState },
    /// The alarm became active
    Triggered(TriggerCause),
    /// An active alarm was cleared
    Cleared,
    /// A downlink for this beacon ran out of retries without acknowledgment
    DeliveryFailed { seq: u8, attempts: u32 },
}

/// Notification emitted by the alarm state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub beacon: BeaconId,
    pub label: String,
    pub kind: AlarmEventKind,
    /// Last known RSSI at the time of the event
    pub rssi: Option<i16>,
    /// Buzzer the downlinks go to; `None` means the default device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub at: DateTime<Utc>,
}

impl AlarmEvent {
    pub(crate) fn new(beacon: BeaconId, label: &str, kind: AlarmEventKind, rssi: Option<i16>) -> Self {
        AlarmEvent {
            beacon,
            label: label.to_string(),
            kind,
            rssi,
            target: None,
            at: Utc::now(),
        }
    }

    pub(crate) fn with_target(mut self, target: Option<String>) -> Self {
        self.target = target;
        self
    }

    /// Returns whether this event requires a downlink to the device
    pub fn needs_dispatch(&self) -> bool {
        matches!(
            self.kind,
            AlarmEventKind::Triggered(_) | AlarmEventKind::Cleared | AlarmEventKind::Sighted
        )
    }
}
