// Zenoh publish/subscribe for angle snapshots
//
// Delivery is best-effort in both directions: a failed put is logged and the
// caller carries on, and subscribers only ever act on the newest sample.

use tracing::{debug, info, warn};
use zenoh::Session;
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::{Publisher, Subscriber};
use zenoh::sample::Sample;

use crate::messages::AngleSnapshot;
use crate::robot::ChannelAngles;

/// Publishes one snapshot per control tick
pub struct AnglePublisher {
    session: Session,
    publisher: Publisher<'static>,
    topic: String,
    seq: u64,
}

impl AnglePublisher {
    pub async fn open(topic: &str) -> zenoh::Result<Self> {
        info!("Opening Zenoh session...");
        let session = zenoh::open(zenoh::Config::default()).await?;
        let publisher = session.declare_publisher(topic.to_string()).await?;
        info!("Publishing to: {}", topic);

        Ok(Self {
            session,
            publisher,
            topic: topic.to_string(),
            seq: 0,
        })
    }

    /// Sequence number the next successful publish will carry
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Publish `angles` at controller time `t`; returns false if it was dropped
    pub async fn publish(&mut self, t: f64, angles: &ChannelAngles) -> bool {
        let json = match AngleSnapshot::new(self.seq, t, angles).to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize snapshot: {}", e);
                return false;
            }
        };

        match self.publisher.put(json).await {
            Ok(()) => {
                self.seq += 1;
                true
            }
            Err(e) => {
                warn!("Publish on {} failed: {}", self.topic, e);
                false
            }
        }
    }

    pub async fn close(self) -> zenoh::Result<()> {
        drop(self.publisher);
        self.session.close().await?;
        debug!("Publisher session on {} closed", self.topic);
        Ok(())
    }
}

/// Decode one payload, logging and dropping anything malformed
pub fn parse_snapshot(payload: &[u8]) -> Option<AngleSnapshot> {
    match AngleSnapshot::from_json(payload) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!("Failed to parse snapshot: {}", e);
            None
        }
    }
}

/// Receives snapshots published by a controller
pub struct AngleSubscriber {
    session: Session,
    subscriber: Subscriber<FifoChannelHandler<Sample>>,
}

impl AngleSubscriber {
    pub async fn open(topic: &str) -> zenoh::Result<Self> {
        info!("Opening Zenoh session...");
        let session = zenoh::open(zenoh::Config::default()).await?;
        let subscriber = session.declare_subscriber(topic.to_string()).await?;
        info!("Subscribed to: {}", topic);
        Ok(Self {
            session,
            subscriber,
        })
    }

    /// Drain all pending samples (non-blocking) and keep the newest valid one
    pub fn drain_latest(&self) -> Option<AngleSnapshot> {
        let mut latest = None;
        while let Ok(Some(sample)) = self.subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            if let Some(snapshot) = parse_snapshot(&payload) {
                latest = Some(snapshot);
            }
        }
        latest
    }

    /// Wait for the next valid snapshot; None once the subscription ends
    pub async fn recv(&self) -> Option<AngleSnapshot> {
        while let Ok(sample) = self.subscriber.recv_async().await {
            let payload = sample.payload().to_bytes();
            if let Some(snapshot) = parse_snapshot(&payload) {
                return Some(snapshot);
            }
        }
        None
    }

    pub async fn close(self) -> zenoh::Result<()> {
        drop(self.subscriber);
        self.session.close().await?;
        Ok(())
    }
}
