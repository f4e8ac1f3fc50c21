//! Alarm service
//!
//! This module wires the inbound bus to partitioned ingest workers, the alarm
//! state machine, periodic liveness and retry checks, and the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::alarm::{AlarmConfig, AlarmEvent, AlarmEventKind, AlarmMachine, BeaconRegistry, BeaconSnapshot};
use crate::core::{BeaconId, Config, Reading, Result, WatchlistEntry};
use crate::dispatch::{DispatchConfig, DispatchReport, Dispatcher};
use crate::network::{decode_gateway_object, BusHandle, Downlink, Inbound};
use crate::protocol::{decode_uplink, UplinkFrame};

/// Configuration for the service loop
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Period of the silence check
    pub liveness_interval: Duration,
    /// Period of the acknowledgment timeout check
    pub retry_check_interval: Duration,
    /// Number of ingest partitions
    pub partitions: usize,
    /// Capacity of the inbound and partition channels
    pub channel_capacity: usize,
    /// Send the clear sequence when a beacon is first seen
    pub silence_on_first_sighting: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            liveness_interval: Duration::from_secs(1),
            retry_check_interval: Duration::from_secs(1),
            partitions: 4,
            channel_capacity: 256,
            silence_on_first_sighting: true,
        }
    }
}

impl From<&Config> for ServiceConfig {
    fn from(config: &Config) -> Self {
        ServiceConfig {
            liveness_interval: config.liveness_interval,
            retry_check_interval: config.retry_check_interval,
            partitions: config.partitions,
            channel_capacity: config.channel_capacity,
            silence_on_first_sighting: config.silence_on_first_sighting,
        }
    }
}

/// Fans alarm events out to subscribers and the dispatch task
#[derive(Clone)]
struct EventSink {
    events_tx: broadcast::Sender<AlarmEvent>,
    dispatch_tx: mpsc::Sender<AlarmEvent>,
}

impl EventSink {
    async fn publish(&self, events: Vec<AlarmEvent>) {
        for event in events {
            if event.needs_dispatch() && self.dispatch_tx.send(event.clone()).await.is_err() {
                warn!(beacon = %event.beacon, "Dispatch task stopped, event not dispatched");
            }
            // Having no subscribers is fine
            let _ = self.events_tx.send(event);
        }
    }
}

/// Runs the alarm core against a message bus
pub struct AlarmService {
    config: ServiceConfig,
    machine: Arc<AlarmMachine>,
    dispatcher: Arc<Dispatcher>,
    inbound_tx: mpsc::Sender<Inbound>,
    inbound_rx: mpsc::Receiver<Inbound>,
    events_tx: broadcast::Sender<AlarmEvent>,
}

impl AlarmService {
    /// Creates a service; downlinks are written to `downlink_tx`
    pub fn new(config: &Config, downlink_tx: mpsc::Sender<Downlink>) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(BeaconRegistry::from_watchlist(&config.watchlist));
        let machine = Arc::new(AlarmMachine::new(registry, AlarmConfig::try_from(config)?));
        let dispatcher = Arc::new(Dispatcher::new(DispatchConfig::from(config), downlink_tx));
        let service_config = ServiceConfig::from(config);

        let (inbound_tx, inbound_rx) = mpsc::channel(service_config.channel_capacity);
        let (events_tx, _) = broadcast::channel(service_config.channel_capacity);

        info!(
            beacons = config.watchlist.len(),
            floors = config.floors.len(),
            target = %config.target_device,
            partitions = service_config.partitions,
            "Alarm service configured"
        );

        Ok(AlarmService {
            config: service_config,
            machine,
            dispatcher,
            inbound_tx,
            inbound_rx,
            events_tx,
        })
    }

    /// Returns a handle for publishing inbound messages
    pub fn handle(&self) -> BusHandle {
        BusHandle::new(self.inbound_tx.clone())
    }

    /// Subscribes to alarm events
    pub fn subscribe(&self) -> broadcast::Receiver<AlarmEvent> {
        self.events_tx.subscribe()
    }

    pub fn machine(&self) -> Arc<AlarmMachine> {
        Arc::clone(&self.machine)
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Presentation view of every tracked beacon
    pub fn snapshot(&self) -> Vec<BeaconSnapshot> {
        self.machine.registry().snapshot()
    }

    /// Runs until every bus handle has been dropped
    pub async fn run(self) -> Result<()> {
        let AlarmService {
            config,
            machine,
            dispatcher,
            inbound_tx,
            mut inbound_rx,
            events_tx,
        } = self;
        // Only handles given out by `handle()` keep the loop alive
        drop(inbound_tx);

        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.channel_capacity);
        let dispatch_task = tokio::spawn(dispatch_events(
            Arc::clone(&dispatcher),
            dispatch_rx,
            config.silence_on_first_sighting,
        ));
        let sink = EventSink { events_tx, dispatch_tx };

        let mut partitions = Vec::with_capacity(config.partitions);
        let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(config.partitions);
        for index in 0..config.partitions {
            let (tx, rx) = mpsc::channel(config.channel_capacity);
            partitions.push(tx);
            workers.push(tokio::spawn(run_partition(
                index,
                config.partitions,
                Arc::clone(&machine),
                Arc::clone(&dispatcher),
                rx,
                sink.clone(),
            )));
        }

        let mut liveness = interval(config.liveness_interval);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut retry = interval(config.retry_check_interval);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Alarm service started");
        loop {
            tokio::select! {
                message = inbound_rx.recv() => {
                    let Some(message) = message else {
                        break;
                    };
                    handle_inbound(message, &dispatcher, &partitions).await;
                }

                _ = liveness.tick() => {
                    // Each partition checks the beacons it owns, in line with their readings
                    let now = Instant::now();
                    for (index, partition) in partitions.iter().enumerate() {
                        if partition.send(PartitionInput::Tick(now)).await.is_err() {
                            warn!(partition = index, "Partition worker stopped, tick dropped");
                        }
                    }
                }

                _ = retry.tick() => {
                    let reports = dispatcher.poll_timeouts(Instant::now()).await;
                    report_failures(&reports, &machine, &sink).await;
                }
            }
        }

        info!("Bus closed, shutting down alarm service");
        drop(partitions);
        for result in join_all(workers).await {
            if let Err(e) = result {
                error!("Partition worker failed: {}", e);
            }
        }
        drop(sink);
        if let Err(e) = dispatch_task.await {
            error!("Dispatch task failed: {}", e);
        }
        Ok(())
    }
}

/// Per-beacon work item. A beacon's inputs all go to one partition and are
/// applied there in arrival order.
#[derive(Debug)]
enum PartitionInput {
    Reading(Reading),
    Override(BeaconId),
    Clear(BeaconId),
    Add(WatchlistEntry),
    Remove(BeaconId),
    /// Liveness check for every beacon the partition owns
    Tick(Instant),
}

impl PartitionInput {
    fn beacon(&self) -> Option<BeaconId> {
        match self {
            PartitionInput::Reading(reading) => Some(reading.beacon),
            PartitionInput::Override(id) | PartitionInput::Clear(id) | PartitionInput::Remove(id) => {
                Some(*id)
            }
            PartitionInput::Add(entry) => Some(entry.id),
            PartitionInput::Tick(_) => None,
        }
    }
}

/// Partition that owns a beacon
fn partition_of(id: BeaconId, partitions: usize) -> usize {
    usize::from(id.minor()) % partitions.max(1)
}

async fn handle_inbound(
    message: Inbound,
    dispatcher: &Dispatcher,
    partitions: &[mpsc::Sender<PartitionInput>],
) {
    match message {
        Inbound::Uplink { payload, device } => match decode_uplink(&payload) {
            Ok(UplinkFrame::Acknowledgment { seq }) => {
                dispatcher.acknowledge(seq).await;
            }
            Ok(frame) => route_readings(frame.readings(), device, partitions).await,
            Err(e) => warn!(
                payload = %hex::encode_upper(&payload),
                device = ?device,
                "Dropping uplink: {}",
                e
            ),
        },
        Inbound::Gateway { report, device } => match decode_gateway_object(&report) {
            Ok(readings) => route_readings(readings, device, partitions).await,
            Err(e) => warn!(device = ?device, "Dropping gateway report: {}", e),
        },
        Inbound::Ack(seq) => {
            dispatcher.acknowledge(seq).await;
        }
        Inbound::ManualOverride(id) => route(PartitionInput::Override(id), partitions).await,
        Inbound::ManualClear(id) => route(PartitionInput::Clear(id), partitions).await,
        Inbound::AddBeacon(entry) => route(PartitionInput::Add(entry), partitions).await,
        Inbound::RemoveBeacon(id) => route(PartitionInput::Remove(id), partitions).await,
    }
}

async fn route_readings(
    readings: Vec<Reading>,
    device: Option<String>,
    partitions: &[mpsc::Sender<PartitionInput>],
) {
    for mut reading in readings {
        if reading.gateway.is_none() {
            reading.gateway = device.clone();
        }
        route(PartitionInput::Reading(reading), partitions).await;
    }
}

/// Sends a work item to the partition owning its beacon
async fn route(input: PartitionInput, partitions: &[mpsc::Sender<PartitionInput>]) {
    let Some(id) = input.beacon() else {
        return;
    };
    if partitions.is_empty() {
        return;
    }
    let index = partition_of(id, partitions.len());
    if partitions[index].send(input).await.is_err() {
        warn!(partition = index, beacon = %id, "Partition worker stopped, input dropped");
    }
}

async fn run_partition(
    index: usize,
    count: usize,
    machine: Arc<AlarmMachine>,
    dispatcher: Arc<Dispatcher>,
    mut inputs: mpsc::Receiver<PartitionInput>,
    sink: EventSink,
) {
    debug!(partition = index, "Partition worker started");
    while let Some(input) = inputs.recv().await {
        let events = match input {
            PartitionInput::Reading(reading) => machine.ingest_reading(reading, Instant::now()),
            PartitionInput::Tick(now) => machine.tick_matching(now, |id| partition_of(id, count) == index),
            PartitionInput::Override(id) => machine
                .manual_override(id, Instant::now())
                .unwrap_or_else(|e| {
                    warn!(beacon = %id, "Manual override rejected: {}", e);
                    Vec::new()
                }),
            PartitionInput::Clear(id) => machine.manual_clear(id).unwrap_or_else(|e| {
                warn!(beacon = %id, "Manual clear rejected: {}", e);
                Vec::new()
            }),
            PartitionInput::Add(entry) => {
                if machine.add_beacon(&entry) {
                    info!(beacon = %entry.id, label = %entry.label, "Beacon added to watchlist");
                }
                Vec::new()
            }
            PartitionInput::Remove(id) => {
                if machine.remove_beacon(id) {
                    dispatcher.cancel_beacon(id).await;
                }
                Vec::new()
            }
        };
        sink.publish(events).await;
    }
    debug!(partition = index, "Partition worker stopped");
}

/// Publishes a delivery failure for every exhausted command tied to a beacon
async fn report_failures(reports: &[DispatchReport], machine: &AlarmMachine, sink: &EventSink) {
    let mut failures = Vec::new();
    for report in reports {
        let DispatchReport::Exhausted { seq, beacon, attempts, .. } = report else {
            continue;
        };
        match beacon.and_then(|id| machine.delivery_failed(id, *seq, *attempts)) {
            Some(event) => failures.push(event),
            None => warn!(seq, attempts, "Undelivered command has no tracked beacon"),
        }
    }
    if !failures.is_empty() {
        warn!(undelivered = failures.len(), "Commands left unacknowledged");
        sink.publish(failures).await;
    }
}

async fn dispatch_events(
    dispatcher: Arc<Dispatcher>,
    mut events: mpsc::Receiver<AlarmEvent>,
    silence_on_first_sighting: bool,
) {
    while let Some(event) = events.recv().await {
        let target = event.target.as_deref();
        let result = match event.kind {
            AlarmEventKind::Triggered(_) => dispatcher.trigger_alarm(event.beacon, target).await,
            AlarmEventKind::Cleared => dispatcher.clear_alarm(event.beacon, target).await,
            // Resynchronise the buzzer with the freshly seen beacon
            AlarmEventKind::Sighted if silence_on_first_sighting => {
                dispatcher.clear_alarm(event.beacon, target).await
            }
            _ => continue,
        };
        if let Err(e) = result {
            error!(beacon = %event.beacon, "Failed to dispatch alarm commands: {}", e);
        }
    }
}
