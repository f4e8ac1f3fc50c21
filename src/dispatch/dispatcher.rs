use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::core::{BeaconId, Config, Error, Result, DEFAULT_FPORT, DEFAULT_MAX_RETRIES};
use crate::network::Downlink;
use crate::protocol::{encode_downlink, DownlinkCommand};
use super::profile::AlarmProfile;

/// Configuration for command dispatch
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// DevEUI of the device that receives alarm commands
    pub target: String,
    /// LoRaWAN port
    pub fport: u8,
    /// Time to wait for an acknowledgment before resending
    pub ack_timeout: Duration,
    /// Resends after the first transmission
    pub max_retries: u32,
    /// Delay between consecutive commands of one sequence
    pub command_spacing: Duration,
    /// Trigger and clear command sequences
    pub profile: AlarmProfile,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            target: "70b3d5a4d31205ce".to_string(),
            fport: DEFAULT_FPORT,
            ack_timeout: Duration::from_secs(30),
            max_retries: DEFAULT_MAX_RETRIES,
            command_spacing: Duration::from_secs(2),
            profile: AlarmProfile::default(),
        }
    }
}

impl From<&Config> for DispatchConfig {
    fn from(config: &Config) -> Self {
        DispatchConfig {
            target: config.target_device.clone(),
            fport: config.fport,
            ack_timeout: config.ack_timeout,
            max_retries: config.max_retries,
            command_spacing: config.command_spacing,
            profile: AlarmProfile::from(config),
        }
    }
}

/// A sent command awaiting acknowledgment
#[derive(Debug, Clone)]
pub struct PendingAck {
    pub command: DownlinkCommand,
    /// Encoded payload, resent verbatim
    pub payload: Bytes,
    /// Time of the latest transmission
    pub sent_at: Instant,
    /// Transmissions so far
    pub attempts: u32,
    /// Beacon whose alarm produced the command
    pub beacon: Option<BeaconId>,
    /// DevEUI the command is addressed to
    pub target: String,
}

#[derive(Debug)]
struct Deferred {
    command: DownlinkCommand,
    beacon: Option<BeaconId>,
    target: String,
}

#[derive(Debug, Default)]
struct PendingTable {
    next_seq: u8,
    pending: HashMap<u8, PendingAck>,
    deferred: VecDeque<Deferred>,
}

/// Result of a send request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the transport; `seq` is set for acknowledged types
    Sent { seq: Option<u8> },
    /// The next sequence number is still outstanding; the command is queued
    Deferred,
}

/// Outcome of an acknowledgment timeout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchReport {
    /// The command was transmitted again
    Resent { seq: u8, attempt: u32 },
    /// Retries ran out; the command was dropped from the pending table
    Exhausted {
        seq: u8,
        beacon: Option<BeaconId>,
        command: DownlinkCommand,
        attempts: u32,
    },
}

impl DispatchReport {
    /// The delivery failure, for exhausted commands
    pub fn error(&self) -> Option<Error> {
        match self {
            DispatchReport::Exhausted { seq, attempts, .. } => Some(Error::AckTimeout {
                seq: *seq,
                attempts: *attempts,
            }),
            DispatchReport::Resent { .. } => None,
        }
    }
}

/// Sends downlink commands and tracks their acknowledgment.
///
/// Sequence numbers are handed out in order and wrap at 256. A number still
/// awaiting acknowledgment is never reused: the send is queued until it frees
/// up. The pending table lock is never held across a transport send.
pub struct Dispatcher {
    config: DispatchConfig,
    table: Mutex<PendingTable>,
    downlink_tx: mpsc::Sender<Downlink>,
}

impl Dispatcher {
    /// Creates a dispatcher writing to `downlink_tx`
    pub fn new(config: DispatchConfig, downlink_tx: mpsc::Sender<Downlink>) -> Self {
        Dispatcher {
            config,
            table: Mutex::new(PendingTable::default()),
            downlink_tx,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Sends one command to the default target device
    pub async fn send(&self, command: DownlinkCommand, beacon: Option<BeaconId>) -> Result<SendOutcome> {
        self.send_to(command, beacon, None).await
    }

    /// Sends one command to `target`, or to the default device when `None`
    pub async fn send_to(
        &self,
        command: DownlinkCommand,
        beacon: Option<BeaconId>,
        target: Option<&str>,
    ) -> Result<SendOutcome> {
        // Validate before a sequence number is spent
        let payload = encode_downlink(&command)?;
        let target = self.resolve_target(target);

        if !command.expects_ack() {
            self.transmit(self.downlink(target, payload, None)).await?;
            return Ok(SendOutcome::Sent { seq: None });
        }

        let downlink = {
            let mut table = self.lock();
            if !table.deferred.is_empty() || table.pending.contains_key(&table.next_seq) {
                table.deferred.push_back(Deferred { command, beacon, target });
                warn!(
                    next_seq = table.next_seq,
                    queued = table.deferred.len(),
                    "Deferring {}: {}",
                    command,
                    Error::SequenceExhausted
                );
                return Ok(SendOutcome::Deferred);
            }
            self.register(&mut table, command, beacon, target, Instant::now())?
        };

        let seq = downlink.seq;
        if let Err(e) = self.transmit(downlink).await {
            if let Some(seq) = seq {
                self.lock().pending.remove(&seq);
            }
            return Err(e);
        }
        Ok(SendOutcome::Sent { seq })
    }

    /// Sends the alarm sequence for a beacon
    pub async fn trigger_alarm(&self, beacon: BeaconId, target: Option<&str>) -> Result<Vec<SendOutcome>> {
        info!(beacon = %beacon, target = ?target, "Sending alarm sequence");
        let commands = self.config.profile.trigger_commands(beacon);
        self.send_sequence(commands, beacon, target).await
    }

    /// Sends the mute sequence for a beacon
    pub async fn clear_alarm(&self, beacon: BeaconId, target: Option<&str>) -> Result<Vec<SendOutcome>> {
        info!(beacon = %beacon, target = ?target, "Sending clear sequence");
        let commands = self.config.profile.clear_commands();
        self.send_sequence(commands, beacon, target).await
    }

    async fn send_sequence(
        &self,
        commands: Vec<DownlinkCommand>,
        beacon: BeaconId,
        target: Option<&str>,
    ) -> Result<Vec<SendOutcome>> {
        let mut outcomes = Vec::with_capacity(commands.len());
        for (i, command) in commands.into_iter().enumerate() {
            // The device drops downlinks that arrive back to back
            if i > 0 && !self.config.command_spacing.is_zero() {
                sleep(self.config.command_spacing).await;
            }
            outcomes.push(self.send_to(command, Some(beacon), target).await?);
        }
        Ok(outcomes)
    }

    /// Resolves a pending command. Returns false for late or duplicate acks.
    pub async fn acknowledge(&self, seq: u8) -> bool {
        let entry = self.lock().pending.remove(&seq);
        match entry {
            Some(entry) => {
                info!(
                    seq,
                    attempts = entry.attempts,
                    beacon = ?entry.beacon,
                    "{} acknowledged",
                    entry.command
                );
                self.flush_deferred().await;
                true
            }
            None => {
                debug!(seq, "Ignoring late or duplicate acknowledgment");
                false
            }
        }
    }

    /// Resends or gives up on commands whose acknowledgment is overdue
    pub async fn poll_timeouts(&self, now: Instant) -> Vec<DispatchReport> {
        let mut reports = Vec::new();
        let mut resend = Vec::new();
        {
            let mut table = self.lock();
            let mut expired: Vec<u8> = table
                .pending
                .iter()
                .filter(|(_, p)| now.saturating_duration_since(p.sent_at) >= self.config.ack_timeout)
                .map(|(seq, _)| *seq)
                .collect();
            expired.sort_unstable();

            for seq in expired {
                let Some(entry) = table.pending.get_mut(&seq) else {
                    continue;
                };
                if entry.attempts > self.config.max_retries {
                    if let Some(entry) = table.pending.remove(&seq) {
                        let report = DispatchReport::Exhausted {
                            seq,
                            beacon: entry.beacon,
                            command: entry.command,
                            attempts: entry.attempts,
                        };
                        if let Some(e) = report.error() {
                            error!(seq, beacon = ?entry.beacon, "{} undelivered: {}", entry.command, e);
                        }
                        reports.push(report);
                    }
                } else {
                    entry.attempts += 1;
                    entry.sent_at = now;
                    warn!(seq, attempt = entry.attempts, "Acknowledgment timed out, resending");
                    reports.push(DispatchReport::Resent {
                        seq,
                        attempt: entry.attempts,
                    });
                    resend.push(self.downlink(entry.target.clone(), entry.payload.clone(), Some(seq)));
                }
            }
        }

        for downlink in resend {
            if let Err(e) = self.transmit(downlink).await {
                warn!("Resend failed: {}", e);
            }
        }
        self.flush_deferred().await;
        reports
    }

    /// Drops pending and queued commands that belong to a beacon, then
    /// sends whatever the freed sequence numbers unblock
    pub async fn cancel_beacon(&self, beacon: BeaconId) -> usize {
        let cancelled = {
            let mut table = self.lock();
            let before = table.pending.len() + table.deferred.len();
            table.pending.retain(|_, p| p.beacon != Some(beacon));
            table.deferred.retain(|d| d.beacon != Some(beacon));
            before - table.pending.len() - table.deferred.len()
        };
        if cancelled > 0 {
            info!(beacon = %beacon, cancelled, "Cancelled outstanding commands");
        }
        self.flush_deferred().await;
        cancelled
    }

    /// Sends queued commands while sequence numbers are free
    pub async fn flush_deferred(&self) -> usize {
        let ready = {
            let mut table = self.lock();
            let now = Instant::now();
            let mut ready = Vec::new();
            while !table.pending.contains_key(&table.next_seq) {
                let Some(next) = table.deferred.pop_front() else {
                    break;
                };
                match self.register(&mut table, next.command, next.beacon, next.target, now) {
                    Ok(downlink) => ready.push(downlink),
                    Err(e) => warn!("Dropping deferred {}: {}", next.command, e),
                }
            }
            ready
        };

        let count = ready.len();
        for downlink in ready {
            // Stays pending; the retry check resends it
            if let Err(e) = self.transmit(downlink).await {
                warn!("Deferred send failed: {}", e);
            }
        }
        count
    }

    /// Number of commands awaiting acknowledgment
    pub fn outstanding(&self) -> usize {
        self.lock().pending.len()
    }

    /// Number of commands waiting for a free sequence number
    pub fn deferred(&self) -> usize {
        self.lock().deferred.len()
    }

    pub fn pending(&self, seq: u8) -> Option<PendingAck> {
        self.lock().pending.get(&seq).cloned()
    }

    fn register(
        &self,
        table: &mut PendingTable,
        command: DownlinkCommand,
        beacon: Option<BeaconId>,
        target: String,
        now: Instant,
    ) -> Result<Downlink> {
        let seq = table.next_seq;
        let command = command.with_sequence(seq);
        let payload = encode_downlink(&command)?;
        table.next_seq = seq.wrapping_add(1);
        table.pending.insert(
            seq,
            PendingAck {
                command,
                payload: payload.clone(),
                sent_at: now,
                attempts: 1,
                beacon,
                target: target.clone(),
            },
        );
        Ok(self.downlink(target, payload, Some(seq)))
    }

    fn resolve_target(&self, target: Option<&str>) -> String {
        match target.map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => self.config.target.clone(),
        }
    }

    fn downlink(&self, target: String, payload: Bytes, seq: Option<u8>) -> Downlink {
        Downlink {
            target,
            fport: self.config.fport,
            payload,
            seq,
        }
    }

    async fn transmit(&self, downlink: Downlink) -> Result<()> {
        debug!(
            seq = ?downlink.seq,
            target = %downlink.target,
            payload = %hex::encode_upper(&downlink.payload),
            "Sending downlink"
        );
        self.downlink_tx
            .send(downlink)
            .await
            .map_err(|e| Error::transport(format!("Failed to send downlink: {}", e)))
    }

    fn lock(&self) -> MutexGuard<'_, PendingTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SEQUENCE_SPACE;
    use crate::protocol::{AlarmParameter, LoraConfig, RequestCommand};
    use tokio_test::assert_ok;

    fn config(max_retries: u32) -> DispatchConfig {
        DispatchConfig {
            max_retries,
            command_spacing: Duration::ZERO,
            ..DispatchConfig::default()
        }
    }

    fn dispatcher(max_retries: u32, capacity: usize) -> (Dispatcher, mpsc::Receiver<Downlink>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Dispatcher::new(config(max_retries), tx), rx)
    }

    fn volume(v: u8) -> DownlinkCommand {
        DownlinkCommand::alarm(AlarmParameter::BuzzerVolume(v))
    }

    #[tokio::test]
    async fn test_send_assigns_sequence() {
        let (dispatcher, mut rx) = dispatcher(3, 8);

        let first = assert_ok!(dispatcher.send(volume(4), None).await);
        let second = assert_ok!(dispatcher.send(volume(0), None).await);
        assert_eq!(first, SendOutcome::Sent { seq: Some(0) });
        assert_eq!(second, SendOutcome::Sent { seq: Some(1) });
        assert_eq!(dispatcher.outstanding(), 2);

        let downlink = rx.recv().await.unwrap();
        assert_eq!(downlink.target, "70b3d5a4d31205ce");
        assert_eq!(downlink.fport, 10);
        assert_eq!(downlink.payload[..], [0xB0, 0x00, 0x01, 0x04]);
        let downlink = rx.recv().await.unwrap();
        assert_eq!(downlink.payload[..], [0xB0, 0x01, 0x01, 0x00]);
    }

    #[tokio::test]
    async fn test_unacknowledged_types_are_not_tracked() {
        let (dispatcher, mut rx) = dispatcher(3, 8);
        let command = DownlinkCommand::LoraConfig(LoraConfig {
            adr: true,
            data_rate: 2,
            band_mode: 3,
            power: 17,
        });
        let outcome = dispatcher.send(command, None).await.unwrap();
        assert_eq!(outcome, SendOutcome::Sent { seq: None });
        assert_eq!(dispatcher.outstanding(), 0);
        assert_eq!(rx.recv().await.unwrap().seq, None);
    }

    #[tokio::test]
    async fn test_invalid_command_spends_no_sequence() {
        let (dispatcher, _rx) = dispatcher(3, 8);
        let result = dispatcher.send(volume(9), None).await;
        assert!(matches!(result, Err(Error::UnsupportedParameter(_))));
        assert_eq!(dispatcher.outstanding(), 0);
        assert_eq!(
            dispatcher.send(volume(1), None).await.unwrap(),
            SendOutcome::Sent { seq: Some(0) }
        );
    }

    #[tokio::test]
    async fn test_sequence_space_exhaustion_defers() {
        let (dispatcher, mut rx) = dispatcher(3, 512);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..SEQUENCE_SPACE {
            match dispatcher.send(volume(4), None).await.unwrap() {
                SendOutcome::Sent { seq: Some(seq) } => assert!(seen.insert(seq)),
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        assert_eq!(seen.len(), SEQUENCE_SPACE);

        let outcome = dispatcher.send(volume(0), Some(BeaconId(0x64B0))).await.unwrap();
        assert_eq!(outcome, SendOutcome::Deferred);
        assert_eq!(dispatcher.outstanding(), 256);
        assert_eq!(dispatcher.deferred(), 1);

        for _ in 0..SEQUENCE_SPACE {
            rx.recv().await.unwrap();
        }

        // Freeing sequence 0 lets the queued command through with that number
        assert!(dispatcher.acknowledge(0).await);
        assert_eq!(dispatcher.deferred(), 0);
        let downlink = rx.recv().await.unwrap();
        assert_eq!(downlink.seq, Some(0));
        assert_eq!(downlink.payload[..], [0xB0, 0x00, 0x01, 0x00]);
        assert_eq!(dispatcher.pending(0).unwrap().beacon, Some(BeaconId(0x64B0)));
    }

    #[tokio::test]
    async fn test_ack_then_timeout() {
        let (dispatcher, _rx) = dispatcher(0, 8);
        dispatcher.send(volume(4), None).await.unwrap();
        let later = Instant::now() + Duration::from_secs(31);

        assert!(dispatcher.acknowledge(0).await);
        assert!(dispatcher.poll_timeouts(later).await.is_empty());
        assert!(!dispatcher.acknowledge(0).await, "duplicate ack is a no-op");
    }

    #[tokio::test]
    async fn test_timeout_then_late_ack() {
        let (dispatcher, _rx) = dispatcher(0, 8);
        dispatcher.send(volume(4), None).await.unwrap();
        let later = Instant::now() + Duration::from_secs(31);

        let reports = dispatcher.poll_timeouts(later).await;
        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0], DispatchReport::Exhausted { seq: 0, attempts: 1, .. }));
        assert!(!dispatcher.acknowledge(0).await);
        assert_eq!(dispatcher.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_retry_until_exhausted() {
        let (dispatcher, mut rx) = dispatcher(2, 8);
        let search = DownlinkCommand::request(RequestCommand::BeaconSearch(BeaconId(0x64B0)));
        dispatcher.send(search, Some(BeaconId(0x64B0))).await.unwrap();
        let original = rx.recv().await.unwrap();
        let base = Instant::now();
        let timeout = Duration::from_secs(30);

        // Not overdue yet
        assert!(dispatcher.poll_timeouts(base + Duration::from_secs(10)).await.is_empty());

        let reports = dispatcher.poll_timeouts(base + timeout).await;
        assert_eq!(reports, vec![DispatchReport::Resent { seq: 0, attempt: 2 }]);
        assert_eq!(rx.recv().await.unwrap(), original);

        let reports = dispatcher.poll_timeouts(base + timeout * 2).await;
        assert_eq!(reports, vec![DispatchReport::Resent { seq: 0, attempt: 3 }]);
        assert_eq!(rx.recv().await.unwrap().payload, original.payload);

        let reports = dispatcher.poll_timeouts(base + timeout * 3).await;
        assert_eq!(reports.len(), 1);
        assert!(matches!(
            reports[0].error(),
            Some(Error::AckTimeout { seq: 0, attempts: 3 })
        ));
        assert!(matches!(
            reports[0],
            DispatchReport::Exhausted { beacon: Some(BeaconId(0x64B0)), .. }
        ));
        assert_eq!(dispatcher.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_trigger_and_clear_sequences() {
        let (dispatcher, mut rx) = dispatcher(3, 8);
        let outcomes = dispatcher.trigger_alarm(BeaconId(0x64B0), None).await.unwrap();
        assert_eq!(outcomes.len(), 3);
        dispatcher.clear_alarm(BeaconId(0x64B0), None).await.unwrap();

        let mut payloads = Vec::new();
        for _ in 0..4 {
            payloads.push(rx.recv().await.unwrap().payload.to_vec());
        }
        assert_eq!(
            payloads,
            vec![
                vec![0xB0, 0x00, 0x01, 0x04],
                vec![0xB0, 0x01, 0x02, 0x06],
                vec![0xAC, 0x02, 0x64, 0xB0],
                vec![0xB0, 0x03, 0x01, 0x00],
            ]
        );
    }

    #[tokio::test]
    async fn test_cancel_beacon() {
        let (dispatcher, _rx) = dispatcher(3, 8);
        dispatcher.trigger_alarm(BeaconId(0x64B0), None).await.unwrap();
        dispatcher.send(volume(1), Some(BeaconId(0x64AF))).await.unwrap();

        assert_eq!(dispatcher.cancel_beacon(BeaconId(0x64B0)).await, 3);
        assert_eq!(dispatcher.outstanding(), 1);
        assert_eq!(dispatcher.cancel_beacon(BeaconId(0x64B0)).await, 0);
        assert!(!dispatcher.acknowledge(0).await);
        assert!(dispatcher.acknowledge(3).await);
    }

    #[tokio::test]
    async fn test_cancel_beacon_releases_deferred_sends() {
        let (dispatcher, mut rx) = dispatcher(3, 512);
        for _ in 0..SEQUENCE_SPACE {
            dispatcher.send(volume(4), Some(BeaconId(0x64B0))).await.unwrap();
        }
        for _ in 0..SEQUENCE_SPACE {
            rx.recv().await.unwrap();
        }
        let outcome = dispatcher.send(volume(2), Some(BeaconId(0x64AF))).await.unwrap();
        assert_eq!(outcome, SendOutcome::Deferred);

        // Removing the blocking beacon frees sequence 0 for the queued send
        assert_eq!(dispatcher.cancel_beacon(BeaconId(0x64B0)).await, SEQUENCE_SPACE);
        assert_eq!(dispatcher.deferred(), 0);
        let downlink = rx.recv().await.unwrap();
        assert_eq!(downlink.seq, Some(0));
        assert_eq!(downlink.payload[..], [0xB0, 0x00, 0x01, 0x02]);
        assert_eq!(dispatcher.pending(0).unwrap().beacon, Some(BeaconId(0x64AF)));
    }

    #[tokio::test]
    async fn test_per_floor_target_survives_resend() {
        let (dispatcher, mut rx) = dispatcher(3, 8);
        dispatcher
            .trigger_alarm(BeaconId(0x64B0), Some("a84041000181c9c1"))
            .await
            .unwrap();
        for _ in 0..3 {
            assert_eq!(rx.recv().await.unwrap().target, "a84041000181c9c1");
        }

        let later = Instant::now() + Duration::from_secs(31);
        let reports = dispatcher.poll_timeouts(later).await;
        assert_eq!(reports.len(), 3);
        for _ in 0..3 {
            assert_eq!(rx.recv().await.unwrap().target, "a84041000181c9c1");
        }

        // A blank target falls back to the default device
        dispatcher.send_to(volume(0), None, Some("  ")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().target, "70b3d5a4d31205ce");
    }

    #[tokio::test]
    async fn test_transport_failure_releases_sequence() {
        let (dispatcher, rx) = dispatcher(3, 8);
        drop(rx);
        let result = dispatcher.send(volume(4), None).await;
        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(dispatcher.outstanding(), 0);
    }
}
