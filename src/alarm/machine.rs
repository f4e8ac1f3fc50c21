use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::{AlarmState, BeaconId, Config, Error, Floor, Reading, Result, WatchlistEntry, Zone};
use super::classifier::{classify, Thresholds};
use super::event::{AlarmEvent, AlarmEventKind, TriggerCause};
use super::floor::FloorPlan;
use super::registry::{Beacon, BeaconRegistry};

/// Alarm state machine configuration
#[derive(Debug, Clone)]
pub struct AlarmConfig {
    /// Zone thresholds
    pub thresholds: Thresholds,
    /// Time an alarm condition must persist before the alarm fires
    pub debounce: Duration,
    /// Longest allowed gap between readings
    pub max_silence: Duration,
    /// Track unknown beacons instead of dropping their readings
    pub auto_discover: bool,
    /// Device-to-floor mapping for wrong-floor detection
    pub floors: FloorPlan,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        AlarmConfig {
            thresholds: Thresholds::default(),
            debounce: Duration::from_secs(5),
            max_silence: Duration::from_secs(120),
            auto_discover: false,
            floors: FloorPlan::default(),
        }
    }
}

impl TryFrom<&Config> for AlarmConfig {
    type Error = Error;

    fn try_from(config: &Config) -> Result<Self> {
        Ok(AlarmConfig {
            thresholds: Thresholds::new(config.safe_threshold, config.alarm_threshold)?,
            debounce: config.debounce,
            max_silence: config.max_silence,
            auto_discover: config.auto_discover,
            floors: FloorPlan::new(config.floors.clone()),
        })
    }
}

/// Per-beacon zone and alarm state machine.
///
/// Entering an alarm is debounced; leaving it on a safe reading is not. A
/// reading heard on a floor other than the beacon's home floor counts as an
/// alarm reading whatever its strength. Every transition is a pure function of
/// the stored state, the input and `now`.
pub struct AlarmMachine {
    registry: Arc<BeaconRegistry>,
    config: AlarmConfig,
}

impl AlarmMachine {
    /// Creates a state machine over an existing registry
    pub fn new(registry: Arc<BeaconRegistry>, config: AlarmConfig) -> Self {
        AlarmMachine { registry, config }
    }

    pub fn registry(&self) -> &Arc<BeaconRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &AlarmConfig {
        &self.config
    }

    /// Classifies a reading with the configured thresholds
    pub fn classify(&self, rssi: i16) -> Zone {
        classify(rssi, &self.config.thresholds)
    }

    /// Starts tracking a beacon
    pub fn add_beacon(&self, entry: &WatchlistEntry) -> bool {
        self.registry.register(entry)
    }

    /// Stops tracking a beacon; any pending debounce is dropped with it
    pub fn remove_beacon(&self, id: BeaconId) -> bool {
        let removed = self.registry.remove(id);
        if removed {
            info!(beacon = %id, "Beacon removed from watchlist");
        }
        removed
    }

    /// Applies one reading. Readings for untracked beacons are dropped.
    pub fn ingest_reading(&self, reading: Reading, now: Instant) -> Vec<AlarmEvent> {
        let zone = self.classify(reading.rssi);
        let detected = reading
            .gateway
            .as_deref()
            .and_then(|eui| self.config.floors.floor_of(eui));
        let apply = |beacon: &mut Beacon| self.apply_reading(beacon, &reading, zone, detected, now);

        match self.registry.with_beacon(reading.beacon, apply) {
            Ok(events) => events,
            Err(Error::UnknownBeacon(id)) if self.config.auto_discover => {
                let entry = WatchlistEntry::new(id, format!("Auto-Discovered {}", id));
                if self.registry.register(&entry) {
                    info!(beacon = %id, "Auto-discovered beacon");
                }
                self.registry
                    .with_beacon(id, |beacon| self.apply_reading(beacon, &reading, zone, detected, now))
                    .unwrap_or_default()
            }
            Err(e) => {
                warn!(beacon = %reading.beacon, rssi = reading.rssi, "Dropping reading: {}", e);
                Vec::new()
            }
        }
    }

    /// Liveness check: beacons silent for longer than the limit move toward alarm
    pub fn tick(&self, now: Instant) -> Vec<AlarmEvent> {
        self.tick_matching(now, |_| true)
    }

    /// Liveness check restricted to the beacons `owned` selects
    pub fn tick_matching(&self, now: Instant, owned: impl Fn(BeaconId) -> bool) -> Vec<AlarmEvent> {
        let mut events = Vec::new();
        for id in self.registry.ids().into_iter().filter(|id| owned(*id)) {
            let result = self.registry.with_beacon(id, |beacon| {
                let mut out = Vec::new();
                // Beacons never seen since startup have nothing to time out from
                let Some(last_seen) = beacon.last_seen else {
                    return out;
                };
                if now.saturating_duration_since(last_seen) > self.config.max_silence {
                    self.advance_toward_alarm(beacon, now, TriggerCause::Silence, &mut out);
                }
                out
            });
            // A beacon removed since `ids()` was taken is simply skipped
            if let Ok(out) = result {
                events.extend(out);
            }
        }
        events
    }

    /// Forces the alarm on, bypassing the debounce
    pub fn manual_override(&self, id: BeaconId, now: Instant) -> Result<Vec<AlarmEvent>> {
        self.registry.with_beacon(id, |beacon| {
            let mut events = Vec::new();
            if beacon.alarm_active() {
                debug!(beacon = %id, "Manual override ignored, alarm already active");
            } else {
                Self::activate(beacon, now, TriggerCause::Manual, &mut events);
            }
            events
        })
    }

    /// Forces the beacon back to `Safe`
    pub fn manual_clear(&self, id: BeaconId) -> Result<Vec<AlarmEvent>> {
        self.registry.with_beacon(id, |beacon| {
            let mut events = Vec::new();
            beacon.debounce_start = None;
            beacon.silence_since = None;
            Self::return_to_safe(beacon, &mut events);
            events
        })
    }

    /// Looks up a beacon's label and RSSI for a failed delivery report.
    /// Returns `None` once the beacon is no longer tracked.
    pub fn delivery_failed(&self, id: BeaconId, seq: u8, attempts: u32) -> Option<AlarmEvent> {
        self.registry
            .with_beacon(id, |beacon| {
                Self::event(beacon, AlarmEventKind::DeliveryFailed { seq, attempts })
            })
            .ok()
    }

    fn apply_reading(
        &self,
        beacon: &mut Beacon,
        reading: &Reading,
        zone: Zone,
        detected: Option<&Floor>,
        now: Instant,
    ) -> Vec<AlarmEvent> {
        let mut events = Vec::new();

        let first_sighting = beacon.last_seen.is_none();
        beacon.last_rssi = Some(reading.rssi);
        beacon.last_seen = Some(now);
        beacon.last_seen_at = Some(chrono::Utc::now());
        beacon.silence_since = None;
        if let Some(floor) = detected {
            beacon.floor = Some(floor.id.clone());
            // The buzzer that is ringing is the one that gets the clear
            if !beacon.alarm_active() {
                beacon.target = floor.macro_sensor().map(str::to_string);
            }
        }
        beacon.wrong_floor = FloorPlan::is_wrong_floor(detected, beacon.home_floor.as_deref());
        let zone = if beacon.wrong_floor {
            debug!(
                beacon = %beacon.id,
                floor = ?beacon.floor,
                home = ?beacon.home_floor,
                "Beacon seen away from its home floor"
            );
            Zone::Alarm
        } else {
            zone
        };
        if first_sighting {
            info!(beacon = %beacon.id, label = %beacon.label, rssi = reading.rssi, "Beacon sighted");
            events.push(Self::event(beacon, AlarmEventKind::Sighted));
        }

        match zone {
            Zone::Safe => {
                beacon.debounce_start = None;
                Self::return_to_safe(beacon, &mut events);
            }
            Zone::Buffer => {
                // An active alarm holds through the buffer band; only a safe reading clears it
                if !beacon.alarm_active() {
                    beacon.debounce_start = None;
                    Self::transition(beacon, AlarmState::Buffer, &mut events);
                }
            }
            Zone::Alarm => {
                let cause = if beacon.wrong_floor {
                    TriggerCause::WrongFloor
                } else {
                    TriggerCause::Signal
                };
                self.advance_toward_alarm(beacon, now, cause, &mut events);
            }
        }
        events
    }

    fn advance_toward_alarm(
        &self,
        beacon: &mut Beacon,
        now: Instant,
        cause: TriggerCause,
        events: &mut Vec<AlarmEvent>,
    ) {
        if beacon.alarm_active() {
            return;
        }
        let started = match cause {
            TriggerCause::Silence => *beacon.silence_since.get_or_insert(now),
            _ => *beacon.debounce_start.get_or_insert(now),
        };
        Self::transition(beacon, AlarmState::AlarmPending, events);

        let elapsed = now.saturating_duration_since(started);
        if elapsed >= self.config.debounce {
            Self::activate(beacon, now, cause, events);
        } else {
            debug!(
                beacon = %beacon.id,
                cause = ?cause,
                remaining = ?(self.config.debounce - elapsed),
                "Alarm pending debounce"
            );
        }
    }

    fn activate(beacon: &mut Beacon, now: Instant, cause: TriggerCause, events: &mut Vec<AlarmEvent>) {
        beacon.debounce_start = None;
        beacon.silence_since = None;
        beacon.last_alarm_sent = Some(now);
        Self::transition(beacon, AlarmState::AlarmActive, events);
        warn!(beacon = %beacon.id, label = %beacon.label, cause = ?cause, rssi = ?beacon.last_rssi, "Alarm triggered");
        events.push(Self::event(beacon, AlarmEventKind::Triggered(cause)));
    }

    fn return_to_safe(beacon: &mut Beacon, events: &mut Vec<AlarmEvent>) {
        let was_active = beacon.alarm_active();
        Self::transition(beacon, AlarmState::Safe, events);
        if was_active {
            info!(beacon = %beacon.id, label = %beacon.label, "Alarm cleared");
            events.push(Self::event(beacon, AlarmEventKind::Cleared));
        }
    }

    fn transition(beacon: &mut Beacon, to: AlarmState, events: &mut Vec<AlarmEvent>) {
        let from = beacon.state;
        if from == to {
            return;
        }
        beacon.state = to;
        debug!(beacon = %beacon.id, from = ?from, to = ?to, "Beacon state changed");
        events.push(Self::event(beacon, AlarmEventKind::StateChanged { from, to }));
    }

    fn event(beacon: &Beacon, kind: AlarmEventKind) -> AlarmEvent {
        AlarmEvent::new(beacon.id, &beacon.label, kind, beacon.last_rssi).with_target(beacon.target.clone())
    }
}
