//! Device protocol implementation module
//!
//! This module defines the downlink command and uplink report messages of the
//! alarm device, and their byte-exact encoding/decoding.

pub mod codec;
pub mod message;
pub mod rssi;

pub use self::codec::{
    decode_downlink, decode_reading, decode_uplink, encode_downlink, encode_uplink, LoraCodec,
};
pub use self::message::{
    AlarmParameter, BeaconObservation, DownlinkCommand, GatewayConfig, LoraConfig, MessageType,
    RequestCommand, UplinkFrame,
};
