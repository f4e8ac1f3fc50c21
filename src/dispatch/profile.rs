use crate::core::{BeaconId, Config};
use crate::protocol::{AlarmParameter, DownlinkCommand, RequestCommand};

/// Commands sent to the device when an alarm fires or clears
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmProfile {
    /// Buzzer volume while alarming (0-4)
    pub buzzer_volume: u8,
    /// Buzzer duration in 10 s units
    pub buzzer_duration: u8,
}

impl Default for AlarmProfile {
    fn default() -> Self {
        AlarmProfile {
            buzzer_volume: 4,
            buzzer_duration: 6,
        }
    }
}

impl From<&Config> for AlarmProfile {
    fn from(config: &Config) -> Self {
        AlarmProfile {
            buzzer_volume: config.buzzer_volume,
            buzzer_duration: config.buzzer_duration,
        }
    }
}

impl AlarmProfile {
    /// Volume, duration, then a search for the offending beacon
    pub fn trigger_commands(&self, beacon: BeaconId) -> Vec<DownlinkCommand> {
        vec![
            DownlinkCommand::alarm(AlarmParameter::BuzzerVolume(self.buzzer_volume)),
            DownlinkCommand::alarm(AlarmParameter::BuzzerDuration(self.buzzer_duration)),
            DownlinkCommand::request(RequestCommand::BeaconSearch(beacon)),
        ]
    }

    /// Mutes the buzzer
    pub fn clear_commands(&self) -> Vec<DownlinkCommand> {
        vec![DownlinkCommand::alarm(AlarmParameter::BuzzerVolume(0))]
    }
}
