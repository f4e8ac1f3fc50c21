//! Core types and traits for the beacon alarm
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{Error, Result};
pub use self::types::{
    AlarmState,
    BeaconId,
    Config,
    Floor,
    Reading,
    WatchlistEntry,
    Zone,
};

/// LoRaWAN port used for device management commands
pub const DEFAULT_FPORT: u8 = 10;

/// Default number of resends before a command is reported as undelivered
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Number of distinct downlink sequence numbers
pub const SEQUENCE_SPACE: usize = 256;

/// Maximum beacon slots in a pre-decoded gateway report
pub const MAX_GATEWAY_SLOTS: usize = 10;
