//! Beacon alarm: proximity alarm core for LoRaWAN-relayed Bluetooth beacons
//!
//! This library classifies tracked beacons into safety zones from their signal
//! strength, debounces alarm conditions per beacon, and drives a remote alarm
//! device with byte-exact, acknowledged downlink commands.
pub mod core;

pub mod alarm;
pub mod dispatch;
pub mod network;
pub mod protocol;
pub mod service;
pub mod util;

// Re-export commonly used items
pub use crate::alarm::{classify, AlarmEvent, AlarmEventKind, AlarmMachine, BeaconSnapshot};
pub use crate::core::{BeaconId, Config, Error, Floor, Reading, Result};
pub use crate::dispatch::Dispatcher;
pub use crate::network::{BusHandle, Downlink, DownlinkEnvelope, Inbound, UplinkEnvelope};
pub use crate::service::AlarmService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
