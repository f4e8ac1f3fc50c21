use serde::{Deserialize, Serialize};

use crate::core::{Error, Result, Zone};

/// Validated pair of zone thresholds in dBm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    safe: i16,
    alarm: i16,
}

impl Thresholds {
    /// Creates thresholds; `alarm` must be strictly below `safe`
    pub fn new(safe: i16, alarm: i16) -> Result<Self> {
        if alarm >= safe {
            return Err(Error::config(format!(
                "alarm threshold ({} dBm) must be lower than safe threshold ({} dBm)",
                alarm, safe
            )));
        }
        Ok(Thresholds { safe, alarm })
    }

    pub fn safe(&self) -> i16 {
        self.safe
    }

    pub fn alarm(&self) -> i16 {
        self.alarm
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds { safe: -60, alarm: -70 }
    }
}

/// Maps a reading to its zone
pub fn classify(rssi: i16, thresholds: &Thresholds) -> Zone {
    if rssi > thresholds.safe {
        Zone::Safe
    } else if rssi < thresholds.alarm {
        Zone::Alarm
    } else {
        Zone::Buffer
    }
}
