use std::fmt;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::core::{BeaconId, Error, Result, WatchlistEntry};
use super::envelope::{DownlinkEnvelope, UplinkEnvelope};

/// Encoded command addressed to a field device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downlink {
    /// DevEUI of the receiving device
    pub target: String,
    /// LoRaWAN port
    pub fport: u8,
    /// Wire payload
    pub payload: Bytes,
    /// Sequence id awaiting acknowledgment, if any
    pub seq: Option<u8>,
}

impl Downlink {
    /// Network server JSON form of this downlink
    pub fn to_envelope(&self) -> DownlinkEnvelope {
        DownlinkEnvelope::from(self)
    }
}

impl fmt::Display for Downlink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {}", self.target, self.fport, hex::encode_upper(&self.payload))
    }
}

/// Messages delivered to the alarm service
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Raw uplink frame and the DevEUI of the device that sent it
    Uplink {
        payload: Bytes,
        device: Option<String>,
    },
    /// Gateway report pre-decoded by the network server
    Gateway {
        report: Value,
        device: Option<String>,
    },
    /// Acknowledgment received out of band
    Ack(u8),
    /// Operator forces an alarm on
    ManualOverride(BeaconId),
    /// Operator forces a beacon back to safe
    ManualClear(BeaconId),
    /// Adds a beacon to the watchlist
    AddBeacon(WatchlistEntry),
    /// Removes a beacon from the watchlist
    RemoveBeacon(BeaconId),
}

/// Handle for publishing to the alarm service
#[derive(Clone, Debug)]
pub struct BusHandle {
    inbound_tx: mpsc::Sender<Inbound>,
}

impl BusHandle {
    pub fn new(inbound_tx: mpsc::Sender<Inbound>) -> Self {
        BusHandle { inbound_tx }
    }

    /// Publishes one inbound message, waiting for channel capacity
    pub async fn publish(&self, message: Inbound) -> Result<()> {
        self.inbound_tx
            .send(message)
            .await
            .map_err(|e| Error::transport(format!("Failed to publish message: {}", e)))
    }

    /// Publishes a raw uplink payload from an unidentified device
    pub async fn publish_uplink(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.publish(Inbound::Uplink {
            payload: payload.into(),
            device: None,
        })
        .await
    }

    /// Publishes a gateway report given as JSON text
    pub async fn publish_gateway_json(&self, text: &str) -> Result<()> {
        let report = serde_json::from_str(text)
            .map_err(|e| Error::malformed(format!("invalid gateway JSON: {}", e)))?;
        self.publish(Inbound::Gateway { report, device: None }).await
    }

    /// Publishes a network server uplink event (`deviceInfo`, `data`, `object`)
    pub async fn publish_envelope_json(&self, text: &str) -> Result<()> {
        let message = UplinkEnvelope::from_json(text)?.into_inbound()?;
        self.publish(message).await
    }

    pub async fn acknowledge(&self, seq: u8) -> Result<()> {
        self.publish(Inbound::Ack(seq)).await
    }

    pub async fn manual_override(&self, id: BeaconId) -> Result<()> {
        self.publish(Inbound::ManualOverride(id)).await
    }

    pub async fn manual_clear(&self, id: BeaconId) -> Result<()> {
        self.publish(Inbound::ManualClear(id)).await
    }

    pub async fn add_beacon(&self, entry: WatchlistEntry) -> Result<()> {
        self.publish(Inbound::AddBeacon(entry)).await
    }

    pub async fn remove_beacon(&self, id: BeaconId) -> Result<()> {
        self.publish(Inbound::RemoveBeacon(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_forwards_messages() {
        let (tx, mut rx) = mpsc::channel(8);
        let bus = BusHandle::new(tx);

        bus.publish_uplink(vec![0xF0, 0x07]).await.unwrap();
        bus.manual_override(BeaconId(0x64B0)).await.unwrap();
        bus.publish_gateway_json(r#"{"beacon1":"001064AF","rssi1":-42}"#)
            .await
            .unwrap();

        assert!(matches!(
            rx.recv().await,
            Some(Inbound::Uplink { payload, device: None }) if payload[..] == [0xF0, 0x07]
        ));
        assert!(matches!(rx.recv().await, Some(Inbound::ManualOverride(BeaconId(0x64B0)))));
        assert!(matches!(rx.recv().await, Some(Inbound::Gateway { report, .. }) if report["rssi1"] == -42));
    }

    #[tokio::test]
    async fn test_publish_envelope_keeps_device() {
        let (tx, mut rx) = mpsc::channel(8);
        let bus = BusHandle::new(tx);

        bus.publish_envelope_json(r#"{"deviceInfo":{"devEui":"ac233ffffe0a0002"},"fPort":10,"data":"8Ac="}"#)
            .await
            .unwrap();
        match rx.recv().await {
            Some(Inbound::Uplink { payload, device }) => {
                assert_eq!(payload[..], [0xF0, 0x07]);
                assert_eq!(device.as_deref(), Some("ac233ffffe0a0002"));
            }
            other => panic!("unexpected message {:?}", other),
        }

        assert!(matches!(
            bus.publish_envelope_json(r#"{"fPort":10}"#).await,
            Err(Error::MalformedPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_after_close_fails() {
        let (tx, rx) = mpsc::channel(1);
        let bus = BusHandle::new(tx);
        drop(rx);
        assert!(matches!(bus.acknowledge(3).await, Err(Error::Transport(_))));
        assert!(matches!(
            bus.publish_gateway_json("nope").await,
            Err(Error::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_downlink_display() {
        let downlink = Downlink {
            target: "70b3d5a4d31205ce".to_string(),
            fport: 10,
            payload: Bytes::from_static(&[0xB0, 0x00, 0x01, 0x04]),
            seq: Some(0),
        };
        assert_eq!(downlink.to_string(), "70b3d5a4d31205ce:10 B0000104");
    }
}
