//! Zone classification and alarm state machine
//!
//! This module turns RSSI readings and liveness ticks into per-beacon state
//! transitions and alarm events.

pub mod classifier;
pub mod event;
pub mod floor;
pub mod machine;
pub mod registry;

pub use self::classifier::{classify, Thresholds};
pub use self::event::{AlarmEvent, AlarmEventKind, TriggerCause};
pub use self::floor::FloorPlan;
pub use self::machine::{AlarmConfig, AlarmMachine};
pub use self::registry::{Beacon, BeaconRegistry, BeaconSnapshot};
