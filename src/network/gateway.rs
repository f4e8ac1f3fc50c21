use serde_json::Value;
use tracing::{debug, warn};

use crate::core::{BeaconId, Error, Reading, Result, MAX_GATEWAY_SLOTS};

/// Decodes a gateway report that the network server has already turned into JSON.
///
/// The object carries numbered slots, `beacon1`/`rssi1` through
/// `beacon10`/`rssi10`. The beacon string is the full major+minor id; only its
/// last four hex digits are kept. A slot with a bad id or a missing RSSI is
/// skipped; the rest of the report is still used.
///
/// Uplink envelopes that wrap the report in an `object` field are unwrapped.
pub fn decode_gateway_object(value: &Value) -> Result<Vec<Reading>> {
    let object = value
        .get("object")
        .filter(|inner| inner.is_object())
        .unwrap_or(value)
        .as_object()
        .ok_or_else(|| Error::malformed("gateway report is not a JSON object"))?;

    let mut readings = Vec::new();
    for slot in 1..=MAX_GATEWAY_SLOTS {
        let Some(raw_id) = object.get(&format!("beacon{}", slot)) else {
            continue;
        };
        let id = match slot_id(raw_id) {
            Ok(id) => id,
            Err(e) => {
                warn!(slot, "Skipping gateway slot: {}", e);
                continue;
            }
        };
        match object.get(&format!("rssi{}", slot)).and_then(slot_rssi) {
            Some(rssi) => readings.push(Reading::new(id, rssi)),
            None => debug!(slot, beacon = %id, "Gateway slot has no usable RSSI"),
        }
    }
    Ok(readings)
}

/// Parses a gateway report from its JSON text
pub fn decode_gateway_json(text: &str) -> Result<Vec<Reading>> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::malformed(format!("invalid gateway JSON: {}", e)))?;
    decode_gateway_object(&value)
}

fn slot_id(value: &Value) -> Result<BeaconId> {
    match value {
        Value::String(s) => s.parse(),
        other => Err(Error::malformed(format!("beacon id is not a string: {}", other))),
    }
}

fn slot_rssi(value: &Value) -> Option<i16> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|v| i16::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
