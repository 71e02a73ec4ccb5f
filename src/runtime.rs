// Wiring for the walk / bridge / monitor commands
//
// walk:    gait controller -> transmit loop -> serial (optionally also zenoh)
// bridge:  zenoh snapshots -> transmit loop -> serial
// monitor: zenoh snapshots -> terminal table

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::bridge::AngleSubscriber;
use crate::config::HexapodConfig;
use crate::controller::{GaitController, GaitEngine};
use crate::gait::TripodGait;
use crate::messages::AngleSnapshot;
use crate::monitor;
use crate::pacer::{InvalidRate, Pacer, period_from_hz};
use crate::robot::Robot;
use crate::servo::{LinkConfig, SerialConnector, ServoCommander, ServoLink};

pub type RunResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

fn servo_link(config: &HexapodConfig) -> Result<ServoLink, InvalidRate> {
    let connector = SerialConnector::new(&config.serial.port, config.serial.baud);
    ServoLink::new(LinkConfig::from(&config.serial), Box::new(connector))
}

/// Push a received snapshot into the command table; unknown channels are skipped
pub fn apply_snapshot(commander: &ServoCommander, snapshot: &AngleSnapshot) -> usize {
    let (known, unknown) = snapshot.channels();
    if !unknown.is_empty() {
        warn!("Ignoring unknown channels in snapshot {}: {:?}", snapshot.seq, unknown);
    }
    if known.is_empty() {
        return 0;
    }
    let applied = known.len();
    commander.set_all_angles(known);
    applied
}

pub async fn walk(config: HexapodConfig, publish: bool) -> RunResult {
    let robot = Arc::new(Robot::from_config(&config)?);
    let mut link = servo_link(&config)?;
    let engine = GaitEngine::new(TripodGait::new(&config.gait), robot).with_commander(link.commander());

    let topic = (publish || config.control.publish).then(|| config.control.topic.clone());
    let mut controller = GaitController::new(engine, config.control.control_hz, topic)?;

    link.start();
    if let Err(e) = controller.start().await {
        link.stop().await;
        return Err(e);
    }

    info!(
        "Walking: {}Hz control, {}Hz transmit on {}",
        config.control.control_hz, config.serial.transmit_hz, config.serial.port
    );
    info!("Press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    controller.stop().await;
    link.stop().await;
    Ok(())
}

/// Every `period`, apply the newest snapshot from `source` until `shutdown`
/// resolves. A late tick is followed by a full period, never a burst.
pub async fn forward_snapshots<F, S>(
    commander: &ServoCommander,
    period: Duration,
    mut source: F,
    shutdown: S,
) -> io::Result<()>
where
    F: FnMut() -> Option<AngleSnapshot>,
    S: Future<Output = io::Result<()>>,
{
    tokio::pin!(shutdown);
    let mut pacer = Pacer::new(period, Instant::now());

    loop {
        if let Some(snapshot) = source() {
            apply_snapshot(commander, &snapshot);
        }

        let deadline = pacer.advance(Instant::now());
        tokio::select! {
            result = &mut shutdown => return result,
            _ = tokio::time::sleep_until(deadline.into()) => {}
        }
    }
}

pub async fn bridge(config: HexapodConfig) -> RunResult {
    let period = period_from_hz(config.control.control_hz)?;
    let subscriber = AngleSubscriber::open(&config.control.topic).await?;
    let mut link = servo_link(&config)?;
    let commander = link.commander();
    link.start();

    info!(
        "Bridging {} -> {} @ {} baud. Press Ctrl+C to stop",
        config.control.topic, config.serial.port, config.serial.baud
    );

    // Drain all pending snapshots each tick, act on the newest
    let result = forward_snapshots(
        &commander,
        period,
        || subscriber.drain_latest(),
        tokio::signal::ctrl_c(),
    )
    .await;
    if let Err(e) = &result {
        warn!("Ctrl+C handler failed: {}", e);
    }

    // Park the legs before closing the port
    commander.reset_joint_angles();
    tokio::time::sleep(link.period() * 2).await;
    link.stop().await;
    subscriber.close().await?;
    result?;
    Ok(())
}

pub async fn monitor(config: HexapodConfig, refresh_hz: f64) -> RunResult {
    let period = period_from_hz(refresh_hz)?;
    let subscriber = AngleSubscriber::open(&config.control.topic).await?;
    let order = config.serial.send_order.clone();

    let (result, subscriber) = tokio::task::spawn_blocking(move || {
        let result = monitor::run(period, &order, || subscriber.drain_latest());
        (result, subscriber)
    })
    .await?;

    subscriber.close().await?;
    result?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_snapshot_skips_unknown_channels() {
        let commander = ServoCommander::new(90.0);
        let snapshot = AngleSnapshot::from_json(
            br#"{"seq": 4, "t": 0.1, "angles": {"L3_tibia": 200.0, "L7_tibia": 1.0}}"#,
        )
        .unwrap();

        assert_eq!(apply_snapshot(&commander, &snapshot), 1);
        let latest = commander.latest();
        assert_eq!(latest.get("L3_tibia".parse().unwrap()), 180.0);
        assert_eq!(latest.get("L1_coxa".parse().unwrap()), 90.0);
    }

    #[tokio::test]
    async fn test_forward_snapshots_does_not_burst_after_stall() {
        let commander = ServoCommander::new(90.0);
        let period = Duration::from_millis(20);
        let mut calls: Vec<Instant> = Vec::new();

        let source = || {
            calls.push(Instant::now());
            if calls.len() == 1 {
                // Stall well past several periods
                std::thread::sleep(Duration::from_millis(70));
            }
            None
        };
        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        };
        forward_snapshots(&commander, period, source, shutdown).await.unwrap();

        assert!(calls.len() >= 3, "only {} ticks", calls.len());
        // No catch-up burst after the stall
        let after_stall = calls[1] - calls[0];
        assert!(after_stall >= Duration::from_millis(70) + period, "{:?}", after_stall);
        for pair in calls[1..].windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(2), "{:?}", pair[1] - pair[0]);
        }
    }

    #[tokio::test]
    async fn test_forward_snapshots_applies_newest() {
        let commander = ServoCommander::new(90.0);
        let mut pending = vec![AngleSnapshot::from_json(
            br#"{"seq": 9, "t": 0.2, "angles": {"R2_femur": 45.0}}"#,
        )
        .unwrap()];
        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(())
        };
        forward_snapshots(&commander, Duration::from_millis(5), || pending.pop(), shutdown)
            .await
            .unwrap();
        assert_eq!(commander.read_joint_angles().get("R2_femur".parse().unwrap()), 45.0);
    }

    #[test]
    fn test_apply_empty_snapshot_posts_nothing() {
        let commander = ServoCommander::new(90.0);
        let snapshot = AngleSnapshot::from_json(br#"{"seq": 0, "t": 0.0, "angles": {}}"#).unwrap();
        assert_eq!(apply_snapshot(&commander, &snapshot), 0);
    }
}
