//! Downlink command dispatch
//!
//! This module turns alarm decisions into sequenced downlink commands, tracks
//! their acknowledgment and resends them on timeout.

pub mod dispatcher;
pub mod profile;

pub use self::dispatcher::{DispatchConfig, DispatchReport, Dispatcher, PendingAck, SendOutcome};
pub use self::profile::AlarmProfile;
