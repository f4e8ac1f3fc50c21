use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// Short identifier of a tracked beacon (its 16-bit iBeacon minor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BeaconId(pub u16);

impl BeaconId {
    /// Creates a beacon id from its minor value
    pub fn new(minor: u16) -> Self {
        BeaconId(minor)
    }

    /// Returns the minor value
    pub fn minor(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// Parses either a bare minor (`64B0`) or a full major+minor string
/// (`001064B0`); the minor is always the last four hex digits.
impl FromStr for BeaconId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::malformed(format!("invalid beacon id {:?}", s)));
        }
        let minor = &trimmed[trimmed.len().saturating_sub(4)..];
        u16::from_str_radix(minor, 16)
            .map(BeaconId)
            .map_err(|e| Error::malformed(format!("invalid beacon id {:?}: {}", s, e)))
    }
}

impl TryFrom<String> for BeaconId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BeaconId> for String {
    fn from(id: BeaconId) -> Self {
        id.to_string()
    }
}

/// Proximity zone derived from a single RSSI reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    /// Beacon is near the reference device
    Safe,
    /// Hysteresis band between the two thresholds
    Buffer,
    /// Beacon is far away (alarm candidate)
    Alarm,
}

impl Zone {
    /// Distance from `Safe`; larger is stricter
    pub fn severity(&self) -> u8 {
        match self {
            Zone::Safe => 0,
            Zone::Buffer => 1,
            Zone::Alarm => 2,
        }
    }

    /// Returns whether this zone is stricter than `other`
    pub fn is_stricter_than(&self, other: Zone) -> bool {
        self.severity() > other.severity()
    }
}

/// Per-beacon alarm state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlarmState {
    Safe,
    Buffer,
    /// Alarm condition observed, waiting out the debounce interval
    AlarmPending,
    /// Alarm signalled to the device
    AlarmActive,
}

impl AlarmState {
    /// Zone projection of the state
    pub fn zone(&self) -> Zone {
        match self {
            AlarmState::Safe => Zone::Safe,
            AlarmState::Buffer => Zone::Buffer,
            AlarmState::AlarmPending | AlarmState::AlarmActive => Zone::Alarm,
        }
    }

    /// Returns whether an alarm has been signalled
    pub fn is_active(&self) -> bool {
        matches!(self, AlarmState::AlarmActive)
    }
}

/// A single RSSI observation of a beacon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// Observed beacon
    pub beacon: BeaconId,
    /// Signal strength in dBm
    pub rssi: i16,
    /// DevEUI of the gateway or sensor that heard the beacon, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}

impl Reading {
    /// Creates a new reading
    pub fn new(beacon: BeaconId, rssi: i16) -> Self {
        Reading {
            beacon,
            rssi,
            gateway: None,
        }
    }

    /// Attributes the reading to the device that reported it
    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = Some(gateway.into());
        self
    }
}

/// One level of the site and the devices installed on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Floor {
    /// Floor identifier referenced by `WatchlistEntry::home_floor`
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// DevEUI of the buzzer on this floor
    #[serde(default)]
    pub macro_sensor_eui: String,
    /// DevEUI of the Bluetooth gateway on this floor
    #[serde(default)]
    pub bluetooth_gateway_eui: String,
}

impl Floor {
    pub fn new(
        id: impl Into<String>,
        macro_sensor_eui: impl Into<String>,
        bluetooth_gateway_eui: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Floor {
            name: id.clone(),
            id,
            macro_sensor_eui: macro_sensor_eui.into(),
            bluetooth_gateway_eui: bluetooth_gateway_eui.into(),
        }
    }

    /// Returns whether `eui` names one of this floor's devices (case-insensitive)
    pub fn has_device(&self, eui: &str) -> bool {
        let eui = eui.trim();
        !eui.is_empty()
            && (self.macro_sensor_eui.eq_ignore_ascii_case(eui)
                || self.bluetooth_gateway_eui.eq_ignore_ascii_case(eui))
    }

    /// DevEUI of the floor's buzzer, if one is configured
    pub fn macro_sensor(&self) -> Option<&str> {
        let eui = self.macro_sensor_eui.trim();
        (!eui.is_empty()).then_some(eui)
    }
}

/// A beacon listed in the static watchlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    /// Beacon short identifier
    pub id: BeaconId,
    /// Display label
    #[serde(default)]
    pub label: String,
    /// Floor the beacon belongs to; a sighting elsewhere raises the alarm
    #[serde(default, alias = "home_floor_id", skip_serializing_if = "Option::is_none")]
    pub home_floor: Option<String>,
}

impl WatchlistEntry {
    /// Creates a watchlist entry, defaulting the label to `Beacon <id>`
    pub fn new(id: BeaconId, label: impl Into<String>) -> Self {
        let label = label.into();
        let label = if label.is_empty() {
            format!("Beacon {}", id)
        } else {
            label
        };
        WatchlistEntry {
            id,
            label,
            home_floor: None,
        }
    }

    /// Assigns the beacon to a floor
    pub fn with_home_floor(mut self, floor: impl Into<String>) -> Self {
        self.home_floor = Some(floor.into());
        self
    }
}

/// Runtime configuration of the alarm core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tracked beacons; readings for anything else are dropped
    pub watchlist: Vec<WatchlistEntry>,
    /// Site levels used for wrong-floor detection and per-floor alarm routing
    pub floors: Vec<Floor>,
    /// RSSI above this is `Safe` (dBm)
    pub safe_threshold: i16,
    /// RSSI below this is an alarm candidate (dBm); must be lower than `safe_threshold`
    pub alarm_threshold: i16,
    /// Time an alarm condition must persist before the alarm fires
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub debounce: Duration,
    /// Longest allowed gap between readings of a beacon
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub max_silence: Duration,
    /// DevEUI of the device that rings when no floor sensor applies
    pub target_device: String,
    /// Network server application that downlinks are published under
    pub application_id: String,
    /// LoRaWAN port for management commands
    pub fport: u8,
    /// Time to wait for an acknowledgment before resending
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub ack_timeout: Duration,
    /// Resends after the first transmission
    pub max_retries: u32,
    /// Period of the silence check
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub liveness_interval: Duration,
    /// Period of the acknowledgment timeout check
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub retry_check_interval: Duration,
    /// Delay between consecutive downlinks of one alarm sequence
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub command_spacing: Duration,
    /// Number of ingest partitions
    pub partitions: usize,
    /// Capacity of the inbound and partition channels
    pub channel_capacity: usize,
    /// Register unknown beacons on first sighting instead of dropping them
    pub auto_discover: bool,
    /// Send the clear sequence when a beacon is first seen
    pub silence_on_first_sighting: bool,
    /// Buzzer volume used when an alarm fires (0-4)
    pub buzzer_volume: u8,
    /// Buzzer duration used when an alarm fires, in 10 s units
    pub buzzer_duration: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            watchlist: ["64B0", "64AF", "64AE"]
                .iter()
                .filter_map(|id| id.parse().ok())
                .map(|id| WatchlistEntry::new(id, ""))
                .collect(),
            floors: Vec::new(),
            safe_threshold: -60,
            alarm_threshold: -70,
            debounce: Duration::from_secs(5),
            max_silence: Duration::from_secs(120),
            target_device: "70b3d5a4d31205ce".to_string(),
            application_id: "1".to_string(),
            fport: super::DEFAULT_FPORT,
            ack_timeout: Duration::from_secs(30),
            max_retries: super::DEFAULT_MAX_RETRIES,
            liveness_interval: Duration::from_secs(1),
            retry_check_interval: Duration::from_secs(1),
            command_spacing: Duration::from_secs(2),
            partitions: 4,
            channel_capacity: 256,
            auto_discover: false,
            silence_on_first_sighting: true,
            buzzer_volume: 4,
            buzzer_duration: 6,
        }
    }
}

impl Config {
    /// Parses and validates a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.alarm_threshold >= self.safe_threshold {
            return Err(Error::config(format!(
                "alarm threshold ({} dBm) must be lower than safe threshold ({} dBm)",
                self.alarm_threshold, self.safe_threshold
            )));
        }
        if self.target_device.trim().is_empty() {
            return Err(Error::config("target device must not be empty"));
        }
        if self.partitions == 0 || self.channel_capacity == 0 {
            return Err(Error::config("partitions and channel capacity must be positive"));
        }
        if self.liveness_interval.is_zero() || self.retry_check_interval.is_zero() {
            return Err(Error::config("tick intervals must be positive"));
        }
        let mut floor_ids = HashSet::new();
        for floor in &self.floors {
            if floor.id.trim().is_empty() {
                return Err(Error::config("floor id must not be empty"));
            }
            if !floor_ids.insert(floor.id.as_str()) {
                return Err(Error::config(format!("duplicate floor id {:?}", floor.id)));
            }
        }
        for entry in &self.watchlist {
            if let Some(home) = &entry.home_floor {
                if !floor_ids.contains(home.as_str()) {
                    return Err(Error::config(format!(
                        "beacon {} refers to unknown floor {:?}",
                        entry.id, home
                    )));
                }
            }
        }
        if self.buzzer_volume > 4 {
            return Err(Error::config(format!(
                "buzzer volume must be 0-4, got {}",
                self.buzzer_volume
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beacon_id_parsing() {
        let id: BeaconId = "64b0".parse().unwrap();
        assert_eq!(id, BeaconId(0x64B0));
        assert_eq!(id.to_string(), "64B0");

        // Major+minor strings keep the minor
        let id: BeaconId = "001064AF".parse().unwrap();
        assert_eq!(id.minor(), 0x64AF);

        assert!("".parse::<BeaconId>().is_err());
        assert!("64G0".parse::<BeaconId>().is_err());
    }

    #[test]
    fn test_zone_severity() {
        assert!(Zone::Alarm.is_stricter_than(Zone::Buffer));
        assert!(Zone::Buffer.is_stricter_than(Zone::Safe));
        assert!(!Zone::Safe.is_stricter_than(Zone::Safe));
        assert_eq!(AlarmState::AlarmPending.zone(), Zone::Alarm);
        assert!(AlarmState::AlarmActive.is_active());
    }

    #[test]
    fn test_watchlist_default_label() {
        let entry = WatchlistEntry::new(BeaconId(0x64AE), "");
        assert_eq!(entry.label, "Beacon 64AE");
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "watchlist": [
                {"id": "64B0", "label": "Forklift"},
                {"id": "001064AF"}
            ],
            "safe_threshold": -80,
            "alarm_threshold": -85,
            "debounce": 5,
            "max_silence": 60.5
        }"#;
        let config = Config::from_json_str(json).unwrap();
        assert_eq!(config.watchlist.len(), 2);
        assert_eq!(config.watchlist[0].label, "Forklift");
        assert_eq!(config.watchlist[1].id, BeaconId(0x64AF));
        assert_eq!(config.debounce, Duration::from_secs(5));
        assert_eq!(config.max_silence, Duration::from_millis(60_500));
        // Unspecified fields fall back to defaults
        assert_eq!(config.fport, 10);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_config_rejects_inverted_thresholds() {
        let json = r#"{"safe_threshold": -85, "alarm_threshold": -80}"#;
        let err = Config::from_json_str(json).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_config_rejects_oversized_duration() {
        let err = Config::from_json_str(r#"{"debounce": 1e300}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_config_floors() {
        let json = r#"{
            "floors": [
                {"id": "L1", "name": "Level 1", "macro_sensor_eui": "A84041000181C9C1", "bluetooth_gateway_eui": "ac233ffffe0a1b2c"},
                {"id": "L2", "macro_sensor_eui": "a84041000181c9c2"}
            ],
            "watchlist": [{"id": "64B0", "home_floor_id": "L1"}]
        }"#;
        let config = Config::from_json_str(json).unwrap();
        assert_eq!(config.watchlist[0].home_floor.as_deref(), Some("L1"));
        let level1 = &config.floors[0];
        assert!(level1.has_device("a84041000181c9c1"));
        assert!(level1.has_device("AC233FFFFE0A1B2C"));
        assert!(!level1.has_device(""));
        assert_eq!(config.floors[1].macro_sensor(), Some("a84041000181c9c2"));
        assert!(Floor::new("L3", " ", "").macro_sensor().is_none());

        let unknown = r#"{"floors": [{"id": "L1"}], "watchlist": [{"id": "64B0", "home_floor": "L9"}]}"#;
        assert!(matches!(Config::from_json_str(unknown), Err(Error::Config(_))));
        let duplicate = r#"{"floors": [{"id": "L1"}, {"id": "L1"}]}"#;
        assert!(matches!(Config::from_json_str(duplicate), Err(Error::Config(_))));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.watchlist.len(), 3);
    }
}
