use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{Error, Result};
use super::bus::{Downlink, Inbound};

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s).map(Bytes::from).map_err(serde::de::Error::custom)
    }
}

/// Downlink as queued on the network server:
/// `{"devEui": .., "confirmed": false, "fPort": 10, "data": "<base64>"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownlinkEnvelope {
    pub dev_eui: String,
    pub confirmed: bool,
    pub f_port: u8,
    #[serde(with = "base64_bytes")]
    pub data: Bytes,
}

impl DownlinkEnvelope {
    /// Topic the envelope is published on for `application_id`
    pub fn topic(&self, application_id: &str) -> String {
        format!("application/{}/device/{}/command/down", application_id, self.dev_eui)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::transport(format!("Failed to encode downlink envelope: {}", e)))
    }
}

impl From<&Downlink> for DownlinkEnvelope {
    fn from(downlink: &Downlink) -> Self {
        // Delivery is tracked with our own sequence acks, not LoRaWAN confirmation
        DownlinkEnvelope {
            dev_eui: downlink.target.clone(),
            confirmed: false,
            f_port: downlink.fport,
            data: downlink.payload.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub dev_eui: String,
}

/// Uplink event as published by the network server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UplinkEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
    /// Older servers put the DevEUI at the top level
    #[serde(default, rename = "devEUI", skip_serializing_if = "Option::is_none")]
    pub dev_eui: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f_port: Option<u8>,
    /// Raw frame, base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Report already decoded by the server's payload codec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
}

impl UplinkEnvelope {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::malformed(format!("invalid uplink envelope: {}", e)))
    }

    /// DevEUI of the reporting device
    pub fn device(&self) -> Option<&str> {
        self.device_info
            .as_ref()
            .map(|info| info.dev_eui.as_str())
            .or(self.dev_eui.as_deref())
    }

    /// Decoded `data` field, if present
    pub fn payload(&self) -> Result<Option<Bytes>> {
        self.data
            .as_deref()
            .map(|data| {
                STANDARD
                    .decode(data.trim())
                    .map(Bytes::from)
                    .map_err(|e| Error::malformed(format!("invalid base64 uplink data: {}", e)))
            })
            .transpose()
    }

    /// Converts to a bus message; a decoded `object` wins over raw `data`
    pub fn into_inbound(self) -> Result<Inbound> {
        let device = self.device().map(str::to_string);
        let decoded = self
            .object
            .as_ref()
            .filter(|object| object.as_object().is_some_and(|fields| !fields.is_empty()));
        if let Some(report) = decoded {
            return Ok(Inbound::Gateway {
                report: report.clone(),
                device,
            });
        }
        match self.payload()? {
            Some(payload) => Ok(Inbound::Uplink { payload, device }),
            None => Err(Error::malformed("uplink carries neither object nor data")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_downlink_envelope_layout() {
        let downlink = Downlink {
            target: "a84041000181c9c2".to_string(),
            fport: 10,
            payload: Bytes::from_static(&[0xB0, 0x00, 0x01, 0x04]),
            seq: Some(0),
        };
        let envelope = DownlinkEnvelope::from(&downlink);
        let value: Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "devEui": "a84041000181c9c2",
                "confirmed": false,
                "fPort": 10,
                "data": "sAABBA=="
            })
        );
        assert_eq!(
            envelope.topic("1"),
            "application/1/device/a84041000181c9c2/command/down"
        );

        let parsed: DownlinkEnvelope = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.data, downlink.payload);
    }

    #[test]
    fn test_uplink_object_preferred() {
        let envelope = UplinkEnvelope::from_json(
            r#"{
                "deviceInfo": {"devEui": "ac233ffffe0a0001", "deviceName": "gw-1"},
                "fPort": 1,
                "data": "AAAA",
                "object": {"beacon1": "001064B0", "rssi1": -60}
            }"#,
        )
        .unwrap();
        assert_eq!(envelope.device(), Some("ac233ffffe0a0001"));
        match envelope.into_inbound().unwrap() {
            Inbound::Gateway { report, device } => {
                assert_eq!(report["rssi1"], -60);
                assert_eq!(device.as_deref(), Some("ac233ffffe0a0001"));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_uplink_data_fallback() {
        // Empty object and a legacy top-level DevEUI
        let envelope =
            UplinkEnvelope::from_json(r#"{"devEUI": "70b3d5a4d31205ce", "object": {}, "data": "8Cs="}"#).unwrap();
        match envelope.into_inbound().unwrap() {
            Inbound::Uplink { payload, device } => {
                assert_eq!(payload[..], [0xF0, 0x2B]);
                assert_eq!(device.as_deref(), Some("70b3d5a4d31205ce"));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_uplink_bad_input() {
        let envelope = UplinkEnvelope::from_json(r#"{"data": "@@not base64"}"#).unwrap();
        assert!(matches!(envelope.payload(), Err(Error::MalformedPayload(_))));
        assert!(UplinkEnvelope::default().into_inbound().is_err());
        assert!(UplinkEnvelope::from_json("42").is_err());
    }
}
