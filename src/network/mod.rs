//! Message bus adapter
//!
//! This module models the publish/subscribe transport: inbound uplinks and
//! operator commands, outbound addressed downlinks, the network server's JSON
//! envelopes, and decoding of gateway reports pre-decoded to JSON.

mod bus;
mod envelope;
mod gateway;

pub use self::bus::{BusHandle, Downlink, Inbound};
pub use self::envelope::{DeviceInfo, DownlinkEnvelope, UplinkEnvelope};
pub use self::gateway::{decode_gateway_json, decode_gateway_object};
