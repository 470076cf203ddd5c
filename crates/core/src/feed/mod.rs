use std::{sync::Arc, time::Duration};

use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{Record, Result, Snapshot, VibrationMonitor};

/// Default cadence of the aggregation path.
pub const DEFAULT_PUBLISH_PERIOD: Duration = Duration::from_millis(10);
const CHANNEL_CAPACITY: usize = 64;

/// Message delivered to feed subscribers.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Snapshot(Arc<Snapshot>),
    /// Status line forwarded from the device.
    Status(String),
}

/// Periodically turns the monitor's buffer into snapshots for subscribers.
///
/// A tick does nothing when nobody is subscribed or when the monitor does
/// not have enough history yet; skipped ticks are neither queued nor
/// retried.
#[derive(Debug, Clone)]
pub struct SnapshotFeed {
    monitor: VibrationMonitor,
    sender: broadcast::Sender<FeedEvent>,
    period: Duration,
}

impl SnapshotFeed {
    pub fn new(monitor: VibrationMonitor) -> Self {
        Self::with_period(monitor, DEFAULT_PUBLISH_PERIOD)
    }

    pub fn with_period(monitor: VibrationMonitor, period: Duration) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            monitor,
            sender,
            period: period.max(Duration::from_millis(1)),
        }
    }

    pub fn monitor(&self) -> &VibrationMonitor {
        &self.monitor
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Routes a record from the transport layer: samples go to the monitor,
    /// status messages to subscribers.
    pub fn dispatch(&self, record: Record) -> Result<()> {
        match record {
            Record::Sample(sample) => self.monitor.ingest(sample),
            Record::Status { message } => {
                info!(status = message.as_str(), "device status");
                // No subscribers is not an error.
                let _ = self.sender.send(FeedEvent::Status(message));
                Ok(())
            }
        }
    }

    /// Runs one aggregation cycle. Returns whether a snapshot was published.
    pub fn publish_once(&self) -> Result<bool> {
        if self.sender.receiver_count() == 0 {
            return Ok(false);
        }

        match self.monitor.produce_snapshot() {
            Ok(snapshot) => {
                let delivered = self
                    .sender
                    .send(FeedEvent::Snapshot(Arc::new(snapshot)))
                    .is_ok();
                Ok(delivered)
            }
            Err(err) if err.is_not_ready() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Spawns the aggregation loop onto the current runtime. It runs until
    /// `cancel` fires.
    pub fn spawn(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let feed = self.clone();
        tokio::spawn(async move { feed.run(cancel).await })
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_ms = self.period.as_millis() as u64, "snapshot feed started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    match self.publish_once() {
                        Ok(true) => {}
                        Ok(false) => debug!("aggregation cycle skipped"),
                        Err(err) => warn!(%err, "aggregation cycle failed"),
                    }
                }
            }
        }

        info!("snapshot feed stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, Sample, TriAxial};

    fn sample(index: usize) -> Sample {
        let value = (index as f64 * 0.7).sin() * 40.0;
        Sample::new(
            index as i64 * 5,
            TriAxial::new(value, 1.0, 2.0),
            TriAxial::new(value * 0.5, 1.0, 2.0),
        )
    }

    fn filled_feed(samples: usize) -> SnapshotFeed {
        let monitor = VibrationMonitor::new(Config::default()).unwrap();
        let feed = SnapshotFeed::with_period(monitor, Duration::from_millis(5));
        for i in 0..samples {
            feed.dispatch(Record::Sample(sample(i))).unwrap();
        }
        feed
    }

    #[test]
    fn skips_cycles_without_subscribers() {
        let feed = filled_feed(200);
        assert_eq!(feed.subscriber_count(), 0);
        assert!(!feed.publish_once().unwrap());
    }

    #[test]
    fn skips_cycles_until_ready() {
        let feed = filled_feed(50);
        let mut receiver = feed.subscribe();

        assert!(!feed.publish_once().unwrap());
        assert!(receiver.try_recv().is_err());

        for i in 50..100 {
            feed.dispatch(Record::Sample(sample(i))).unwrap();
        }
        assert!(feed.publish_once().unwrap());
        match receiver.try_recv().unwrap() {
            FeedEvent::Snapshot(snapshot) => assert_eq!(snapshot.total_samples, 100),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn forwards_status_messages() {
        let feed = filled_feed(0);
        let mut receiver = feed.subscribe();

        feed.dispatch(Record::Status {
            message: "sensors recalibrated".to_string(),
        })
        .unwrap();

        match receiver.try_recv().unwrap() {
            FeedEvent::Status(message) => assert_eq!(message, "sensors recalibrated"),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(feed.monitor().buffered_len().unwrap(), 0);
    }

    #[tokio::test]
    async fn loop_publishes_until_cancelled() {
        let feed = filled_feed(300);
        let mut receiver = feed.subscribe();
        let cancel = CancellationToken::new();
        let handle = feed.spawn(cancel.clone());

        let event = time::timeout(Duration::from_secs(2), receiver.recv())
            .await
            .expect("snapshot within timeout")
            .unwrap();
        assert!(matches!(event, FeedEvent::Snapshot(_)));

        cancel.cancel();
        time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop stops after cancellation")
            .unwrap();
    }
}
