use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::core::{AlarmState, BeaconId, Error, Result, WatchlistEntry, Zone};
use super::event::TriggerCause;

/// Tracked state of one beacon
#[derive(Debug, Clone)]
pub struct Beacon {
    /// Beacon short identifier
    pub id: BeaconId,
    /// Display label
    pub label: String,
    /// Floor the beacon belongs to
    pub home_floor: Option<String>,
    /// Floor of the gateway that last heard the beacon
    pub floor: Option<String>,
    /// Whether the last reading came from another floor than `home_floor`
    pub wrong_floor: bool,
    /// Buzzer that alarm commands for this beacon go to; held while the alarm is active
    pub target: Option<String>,
    /// Last observed signal strength
    pub last_rssi: Option<i16>,
    /// Monotonic time of the last reading
    pub last_seen: Option<Instant>,
    /// Wall-clock time of the last reading
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Current alarm state
    pub state: AlarmState,
    /// Start of the current weak-signal debounce
    pub debounce_start: Option<Instant>,
    /// Start of the current silence debounce
    pub silence_since: Option<Instant>,
    /// When the alarm was last signalled
    pub last_alarm_sent: Option<Instant>,
}

impl Beacon {
    /// Creates a never-seen beacon in the `Safe` state
    pub fn new(entry: &WatchlistEntry) -> Self {
        let label = if entry.label.is_empty() {
            format!("Beacon {}", entry.id)
        } else {
            entry.label.clone()
        };
        Beacon {
            id: entry.id,
            label,
            home_floor: entry.home_floor.clone(),
            floor: None,
            wrong_floor: false,
            target: None,
            last_rssi: None,
            last_seen: None,
            last_seen_at: None,
            state: AlarmState::Safe,
            debounce_start: None,
            silence_since: None,
            last_alarm_sent: None,
        }
    }

    pub fn zone(&self) -> Zone {
        self.state.zone()
    }

    pub fn alarm_active(&self) -> bool {
        self.state.is_active()
    }

    /// Why an alarm is pending, if one is
    pub fn pending_cause(&self) -> Option<TriggerCause> {
        if self.state != AlarmState::AlarmPending {
            return None;
        }
        if self.debounce_start.is_some() && self.wrong_floor {
            Some(TriggerCause::WrongFloor)
        } else if self.debounce_start.is_some() {
            Some(TriggerCause::Signal)
        } else if self.silence_since.is_some() {
            Some(TriggerCause::Silence)
        } else {
            None
        }
    }
}

/// Presentation view of a beacon
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BeaconSnapshot {
    pub id: BeaconId,
    pub label: String,
    pub rssi: Option<i16>,
    /// Floor of the gateway that last heard the beacon
    pub floor: Option<String>,
    pub zone: Zone,
    pub state: AlarmState,
    pub last_seen: Option<DateTime<Utc>>,
    pub alarm_active: bool,
}

impl From<&Beacon> for BeaconSnapshot {
    fn from(beacon: &Beacon) -> Self {
        BeaconSnapshot {
            id: beacon.id,
            label: beacon.label.clone(),
            rssi: beacon.last_rssi,
            floor: beacon.floor.clone(),
            zone: beacon.zone(),
            state: beacon.state,
            last_seen: beacon.last_seen_at,
            alarm_active: beacon.alarm_active(),
        }
    }
}

type Entry = Arc<Mutex<Beacon>>;

/// Owner of all tracked beacon state.
///
/// Each entry has its own lock. The map lock is only held long enough to look
/// an entry up, so updates to different beacons never contend and at most one
/// beacon lock is held at a time.
#[derive(Debug, Default)]
pub struct BeaconRegistry {
    entries: RwLock<HashMap<BeaconId, Entry>>,
}

impl BeaconRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        BeaconRegistry::default()
    }

    /// Creates a registry holding every watchlist entry
    pub fn from_watchlist(watchlist: &[WatchlistEntry]) -> Self {
        let registry = BeaconRegistry::new();
        for entry in watchlist {
            registry.register(entry);
        }
        registry
    }

    /// Adds a beacon; returns false if it was already tracked
    pub fn register(&self, entry: &WatchlistEntry) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&entry.id) {
            return false;
        }
        entries.insert(entry.id, Arc::new(Mutex::new(Beacon::new(entry))));
        true
    }

    /// Stops tracking a beacon; returns false if it was not tracked
    pub fn remove(&self, id: BeaconId) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub fn contains(&self, id: BeaconId) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked ids in ascending order
    pub fn ids(&self) -> Vec<BeaconId> {
        let mut ids: Vec<BeaconId> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    fn entry(&self, id: BeaconId) -> Result<Entry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(Error::UnknownBeacon(id))
    }

    /// Runs `f` with exclusive access to one beacon
    pub fn with_beacon<R>(&self, id: BeaconId, f: impl FnOnce(&mut Beacon) -> R) -> Result<R> {
        let entry = self.entry(id)?;
        let mut beacon = entry.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&mut beacon))
    }

    /// Returns a copy of one beacon's state
    pub fn get(&self, id: BeaconId) -> Option<Beacon> {
        self.with_beacon(id, |beacon| beacon.clone()).ok()
    }

    /// Presentation view of every beacon, ordered by id
    pub fn snapshot(&self) -> Vec<BeaconSnapshot> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.with_beacon(id, |beacon| BeaconSnapshot::from(&*beacon)).ok())
            .collect()
    }
}
