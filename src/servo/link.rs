// Periodic frame transmission to the servo board
//
// `ServoCommander` is the producer side: it owns the commanded-angle table and
// posts full snapshots into a single-slot mailbox. `ServoLink` runs the
// transmit task which, every period, takes the newest snapshot (or the table
// if nothing new arrived), encodes one frame and writes it. A failed write
// drops the channel; it is reopened on the next tick.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::mailbox::Mailbox;
use super::port::{Connector, FrameSink};
use super::protocol::{MAX_ANGLE_DEG, ServoError, ServoFrame};
use crate::config::SerialConfig;
use crate::pacer::{InvalidRate, Pacer, period_from_hz};
use crate::robot::{CHANNEL_COUNT, Channel, ChannelAngles};

/// Settings for the transmit task
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    pub transmit_hz: f64,
    pub send_order: Vec<Channel>,
    pub default_angle: f64,
}

impl From<&SerialConfig> for LinkConfig {
    fn from(serial: &SerialConfig) -> Self {
        Self {
            transmit_hz: serial.transmit_hz,
            send_order: serial.send_order.clone(),
            default_angle: serial.default_angle,
        }
    }
}

fn clamp_angle(channel: Channel, deg: f64) -> Result<f64, ServoError> {
    if !deg.is_finite() {
        return Err(ServoError::InvalidAngle {
            channel,
            value: deg,
        });
    }
    Ok(deg.clamp(0.0, MAX_ANGLE_DEG))
}

struct CommandState {
    table: Mutex<ChannelAngles>,
    mailbox: Mailbox<ChannelAngles>,
    defaults: ChannelAngles,
}

/// Cloneable handle for commanding servo angles
#[derive(Clone)]
pub struct ServoCommander {
    state: Arc<CommandState>,
}

impl ServoCommander {
    pub fn new(default_angle: f64) -> Self {
        let defaults = ChannelAngles::splat(default_angle.clamp(0.0, MAX_ANGLE_DEG));
        Self {
            state: Arc::new(CommandState {
                table: Mutex::new(defaults),
                mailbox: Mailbox::new(),
                defaults,
            }),
        }
    }

    fn table(&self) -> MutexGuard<'_, ChannelAngles> {
        self.state.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Update one channel in the table, clamped to the servo travel.
    ///
    /// The change goes out with the next frame built from the table; it does
    /// not displace a snapshot already waiting in the mailbox.
    pub fn set_angle(&self, channel: Channel, deg: f64) -> Result<f64, ServoError> {
        let angle = clamp_angle(channel, deg)?;
        self.table().set(channel, angle);
        Ok(angle)
    }

    /// Update several channels and post the resulting full table.
    ///
    /// Non-finite values are skipped with a warning; the rest still apply.
    /// The post happens under the table lock, so concurrent callers reach the
    /// mailbox in the same order they updated the table.
    pub fn set_all_angles<I>(&self, angles: I) -> ChannelAngles
    where
        I: IntoIterator<Item = (Channel, f64)>,
    {
        let mut table = self.table();
        for (channel, deg) in angles {
            match clamp_angle(channel, deg) {
                Ok(angle) => table.set(channel, angle),
                Err(e) => warn!("Ignoring command: {}", e),
            }
        }

        let snapshot = *table;
        if self.state.mailbox.post(snapshot) {
            debug!("Unsent snapshot replaced by a newer one");
        }
        snapshot
    }

    pub fn set_outputs(&self, outputs: &ChannelAngles) -> ChannelAngles {
        self.set_all_angles(outputs.iter())
    }

    pub fn read_joint_angles(&self) -> ChannelAngles {
        *self.table()
    }

    /// Restore every channel to the configured default and post it
    pub fn reset_joint_angles(&self) -> ChannelAngles {
        let defaults = self.state.defaults;
        self.set_outputs(&defaults)
    }

    /// Newest posted snapshot, else the current table
    pub fn latest(&self) -> ChannelAngles {
        self.state
            .mailbox
            .take()
            .unwrap_or_else(|| self.read_joint_angles())
    }
}

/// State owned by the transmit task; handed back when it stops
struct Transmitter {
    connector: Box<dyn Connector>,
    sink: Option<Box<dyn FrameSink>>,
    commander: ServoCommander,
    send_order: Vec<Channel>,
    default_angle: f64,
    seq: u16,
    failing: bool,
}

impl Transmitter {
    fn new(config: &LinkConfig, connector: Box<dyn Connector>, commander: ServoCommander) -> Self {
        Self {
            connector,
            sink: None,
            commander,
            send_order: config.send_order.clone(),
            default_angle: config.default_angle,
            seq: 0,
            failing: false,
        }
    }

    fn report_failure(&mut self, action: &str, error: &ServoError) {
        if self.failing {
            debug!("Serial {} still failing on {}: {}", action, self.connector.describe(), error);
        } else {
            warn!("Serial {} failed on {}: {}", action, self.connector.describe(), error);
            self.failing = true;
        }
    }

    fn ensure_open(&mut self) {
        if self.sink.is_some() {
            return;
        }
        match self.connector.open() {
            Ok(sink) => {
                if self.failing {
                    info!("Serial channel {} restored", self.connector.describe());
                    self.failing = false;
                }
                self.sink = Some(sink);
            }
            Err(e) => self.report_failure("open", &e),
        }
    }

    fn next_frame(&mut self) -> ServoFrame {
        let angles = self.commander.latest();
        let mut degrees = [self.default_angle; CHANNEL_COUNT];
        for (slot, &channel) in degrees.iter_mut().zip(&self.send_order) {
            *slot = angles.get(channel);
        }

        let frame = ServoFrame::from_degrees(self.seq, &degrees);
        self.seq = self.seq.wrapping_add(1);
        frame
    }

    /// One transmit period: build a frame and write it if the channel is open
    fn tick(&mut self) -> ServoFrame {
        self.ensure_open();
        let frame = self.next_frame();

        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.write_frame(&frame.encode()) {
                self.sink = None;
                self.report_failure("write", &e);
            }
        }
        frame
    }

    async fn run(mut self, period: Duration, mut stop: watch::Receiver<bool>) -> Self {
        let mut pacer = Pacer::new(period, Instant::now());

        while !*stop.borrow() {
            self.tick();

            let deadline = pacer.advance(Instant::now());
            tokio::select! {
                _ = tokio::time::sleep_until(deadline.into()) => {}
                _ = stop.changed() => break,
            }
        }

        // Release the port before handing state back
        self.sink = None;
        self
    }
}

struct LinkTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<Transmitter>,
}

/// Owner of the transmit task
pub struct ServoLink {
    commander: ServoCommander,
    period: Duration,
    transmitter: Option<Transmitter>,
    task: Option<LinkTask>,
}

impl ServoLink {
    pub fn new(config: LinkConfig, connector: Box<dyn Connector>) -> Result<Self, InvalidRate> {
        let period = period_from_hz(config.transmit_hz)?;
        let commander = ServoCommander::new(config.default_angle);
        Ok(Self {
            period,
            transmitter: Some(Transmitter::new(&config, connector, commander.clone())),
            commander,
            task: None,
        })
    }

    pub fn commander(&self) -> ServoCommander {
        self.commander.clone()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Spawn the transmit task; no-op if it is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        let Some(transmitter) = self.transmitter.take() else {
            warn!("Transmit task state was lost, cannot restart");
            return;
        };

        let (stop, stop_rx) = watch::channel(false);
        info!("Servo transmit loop started at {:?} per frame", self.period);
        let handle = tokio::spawn(transmitter.run(self.period, stop_rx));
        self.task = Some(LinkTask { stop, handle });
    }

    /// Signal the task and wait for it; the serial port is closed on return
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let _ = task.stop.send(true);
        match task.handle.await {
            Ok(transmitter) => self.transmitter = Some(transmitter),
            Err(e) => warn!("Transmit task ended abnormally: {}", e),
        }
        info!("Servo transmit loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::{Joint, LegId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory connector that records every written frame
    #[derive(Clone, Default)]
    struct RecordingConnector {
        frames: Arc<Mutex<Vec<Vec<u8>>>>,
        fail_opens: Arc<AtomicUsize>,
        fail_writes: Arc<AtomicUsize>,
        opens: Arc<AtomicUsize>,
        open_sinks: Arc<AtomicUsize>,
    }

    impl RecordingConnector {
        fn frames(&self) -> Vec<Vec<u8>> {
            self.frames.lock().unwrap().clone()
        }
    }

    struct RecordingSink {
        connector: RecordingConnector,
    }

    impl FrameSink for RecordingSink {
        fn write_frame(&mut self, frame: &[u8]) -> Result<(), ServoError> {
            let failures = &self.connector.fail_writes;
            if failures.load(Ordering::SeqCst) > 0 {
                failures.fetch_sub(1, Ordering::SeqCst);
                return Err(std::io::Error::other("unplugged").into());
            }
            self.connector.frames.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
    }

    impl Drop for RecordingSink {
        fn drop(&mut self) {
            self.connector.open_sinks.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl Connector for RecordingConnector {
        fn open(&mut self) -> Result<Box<dyn FrameSink>, ServoError> {
            if self.fail_opens.load(Ordering::SeqCst) > 0 {
                self.fail_opens.fetch_sub(1, Ordering::SeqCst);
                return Err(ServoError::NotConnected);
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.open_sinks.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(RecordingSink {
                connector: self.clone(),
            }))
        }

        fn describe(&self) -> String {
            "recorder".to_string()
        }
    }

    fn link_config() -> LinkConfig {
        LinkConfig::from(&SerialConfig::default())
    }

    fn transmitter(connector: &RecordingConnector) -> Transmitter {
        let config = link_config();
        Transmitter::new(
            &config,
            Box::new(connector.clone()),
            ServoCommander::new(config.default_angle),
        )
    }

    #[test]
    fn test_set_angle_clamps() {
        let commander = ServoCommander::new(90.0);
        let channel = Channel::new(LegId::L1, Joint::Coxa);

        assert_eq!(commander.set_angle(channel, -20.0).unwrap(), 0.0);
        assert_eq!(commander.read_joint_angles().get(channel), 0.0);
        assert_eq!(commander.set_angle(channel, 200.0).unwrap(), 180.0);
        assert_eq!(commander.read_joint_angles().get(channel), 180.0);
        assert!(matches!(
            commander.set_angle(channel, f64::NAN),
            Err(ServoError::InvalidAngle { .. })
        ));
        assert_eq!(commander.read_joint_angles().get(channel), 180.0);
    }

    #[test]
    fn test_set_all_angles_posts_snapshot() {
        let commander = ServoCommander::new(90.0);
        let femur = Channel::new(LegId::R2, Joint::Femur);
        let tibia = Channel::new(LegId::R2, Joint::Tibia);

        let snapshot = commander.set_all_angles([(femur, 45.0), (tibia, f64::INFINITY)]);
        assert_eq!(snapshot.get(femur), 45.0);
        assert_eq!(snapshot.get(tibia), 90.0);

        // A later single-channel update does not alter the posted snapshot
        commander.set_angle(femur, 10.0).unwrap();
        assert_eq!(commander.latest().get(femur), 45.0);
        // Mailbox drained: fall back to the table
        assert_eq!(commander.latest().get(femur), 10.0);
    }

    #[test]
    fn test_concurrent_producers_post_in_table_order() {
        let commander = ServoCommander::new(90.0);
        let producers: Vec<_> = [30.0, 150.0]
            .into_iter()
            .map(|value| {
                let commander = commander.clone();
                std::thread::spawn(move || {
                    for _ in 0..2000 {
                        commander.set_all_angles(Channel::all().map(|c| (c, value)));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        // The last snapshot posted is the last table written
        assert_eq!(commander.latest(), commander.read_joint_angles());
    }

    #[test]
    fn test_unusable_transmit_rate_is_rejected() {
        let mut config = link_config();
        config.transmit_hz = 0.0;
        let connector = RecordingConnector::default();
        assert!(ServoLink::new(config, Box::new(connector)).is_err());
    }

    #[test]
    fn test_reset_joint_angles() {
        let commander = ServoCommander::new(90.0);
        commander.set_all_angles(Channel::all().map(|c| (c, 12.0)));
        let reset = commander.reset_joint_angles();
        assert_eq!(reset, ChannelAngles::splat(90.0));
        assert_eq!(commander.latest(), ChannelAngles::splat(90.0));
    }

    #[test]
    fn test_tick_follows_send_order() {
        let connector = RecordingConnector::default();
        let mut tx = transmitter(&connector);
        let mut config = link_config();
        config.send_order.reverse();
        tx.send_order = config.send_order;

        tx.commander
            .set_angle(Channel::new(LegId::R3, Joint::Tibia), 12.3)
            .unwrap();
        let frame = tx.tick();
        assert_eq!(frame.angles[0], 123);
        assert_eq!(frame.angles[17], 900);

        let written = connector.frames();
        assert_eq!(written.len(), 1);
        assert_eq!(ServoFrame::decode(&written[0]).unwrap(), frame);
    }

    #[test]
    fn test_sequence_increments_and_wraps() {
        let connector = RecordingConnector::default();
        let mut tx = transmitter(&connector);
        assert_eq!(tx.tick().seq, 0);
        assert_eq!(tx.tick().seq, 1);

        tx.seq = u16::MAX;
        assert_eq!(tx.tick().seq, u16::MAX);
        assert_eq!(tx.tick().seq, 0);
    }

    #[test]
    fn test_write_failure_reopens_next_tick() {
        let connector = RecordingConnector::default();
        connector.fail_writes.store(1, Ordering::SeqCst);
        let mut tx = transmitter(&connector);

        tx.tick();
        assert!(tx.sink.is_none());
        assert!(tx.failing);
        assert_eq!(connector.open_sinks.load(Ordering::SeqCst), 0);

        tx.tick();
        assert!(!tx.failing);
        assert_eq!(connector.opens.load(Ordering::SeqCst), 2);

        let written = connector.frames();
        assert_eq!(written.len(), 1);
        assert_eq!(ServoFrame::decode(&written[0]).unwrap().seq, 1);
    }

    #[test]
    fn test_open_failure_skips_frames() {
        let connector = RecordingConnector::default();
        connector.fail_opens.store(2, Ordering::SeqCst);
        let mut tx = transmitter(&connector);

        for _ in 0..3 {
            tx.tick();
        }
        let written = connector.frames();
        assert_eq!(written.len(), 1);
        assert_eq!(ServoFrame::decode(&written[0]).unwrap().seq, 2);
    }

    #[tokio::test]
    async fn test_start_stop_releases_port() {
        let connector = RecordingConnector::default();
        let mut link = ServoLink::new(link_config(), Box::new(connector.clone())).unwrap();

        link.start();
        link.start();
        assert!(link.is_running());
        tokio::time::sleep(Duration::from_millis(60)).await;
        link.stop().await;
        link.stop().await;

        assert!(!link.is_running());
        assert_eq!(connector.open_sinks.load(Ordering::SeqCst), 0);
        assert_eq!(connector.opens.load(Ordering::SeqCst), 1);
        let sent = connector.frames().len();
        assert!(sent >= 2, "only {} frames sent", sent);

        // Stopped: nothing more goes out
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(connector.frames().len(), sent);

        // Restart continues the sequence
        link.start();
        tokio::time::sleep(Duration::from_millis(20)).await;
        link.stop().await;
        let frames = connector.frames();
        let first_after = ServoFrame::decode(&frames[sent]).unwrap();
        assert_eq!(usize::from(first_after.seq), sent);
    }
}
