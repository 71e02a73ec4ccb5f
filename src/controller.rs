// Gait orchestration
//
// Each control tick samples the tripod gait, writes every foot target into the
// robot model and forwards the resulting servo outputs to the transmit loop
// and/or zenoh. A leg whose target fails keeps its last valid pose; the other
// legs are unaffected.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bridge::AnglePublisher;
use crate::gait::TripodGait;
use crate::pacer::{InvalidRate, Pacer, period_from_hz};
use crate::robot::{ChannelAngles, Robot, RobotError};
use crate::servo::ServoCommander;

/// Outcome of one control tick
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub outputs: ChannelAngles,
    /// Legs that held their previous pose this tick
    pub faults: Vec<RobotError>,
}

/// Gait + robot model + output, advanced one tick at a time
pub struct GaitEngine {
    gait: TripodGait,
    robot: Arc<Robot>,
    commander: Option<ServoCommander>,
}

impl GaitEngine {
    pub fn new(gait: TripodGait, robot: Arc<Robot>) -> Self {
        Self {
            gait,
            robot,
            commander: None,
        }
    }

    /// Forward every tick's outputs to a transmit loop
    pub fn with_commander(mut self, commander: ServoCommander) -> Self {
        self.commander = Some(commander);
        self
    }

    pub fn robot(&self) -> &Arc<Robot> {
        &self.robot
    }

    pub fn gait(&self) -> &TripodGait {
        &self.gait
    }

    pub fn gait_mut(&mut self) -> &mut TripodGait {
        &mut self.gait
    }

    pub fn step(&mut self, time_s: f64) -> StepReport {
        let mut faults = Vec::new();
        for (leg, target) in self.gait.sample(time_s) {
            if let Err(e) = self.robot.write_end_coordinate(leg, target) {
                warn!("Holding {} at its last pose: {}", leg, e);
                faults.push(e);
            }
        }

        let outputs = self.robot.read_servo_outputs();
        if let Some(commander) = &self.commander {
            commander.set_outputs(&outputs);
        }
        StepReport { outputs, faults }
    }
}

struct ControllerTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<GaitEngine>,
}

/// Runs a `GaitEngine` on its own periodic task
pub struct GaitController {
    engine: Option<GaitEngine>,
    robot: Arc<Robot>,
    period: Duration,
    topic: Option<String>,
    task: Option<ControllerTask>,
}

impl GaitController {
    /// `topic`: also publish each tick's snapshot on this zenoh key
    pub fn new(engine: GaitEngine, control_hz: f64, topic: Option<String>) -> Result<Self, InvalidRate> {
        let period = period_from_hz(control_hz)?;
        Ok(Self {
            robot: engine.robot().clone(),
            engine: Some(engine),
            period,
            topic,
            task: None,
        })
    }

    pub fn robot(&self) -> Arc<Robot> {
        self.robot.clone()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Engine access while the loop is stopped
    pub fn engine_mut(&mut self) -> Option<&mut GaitEngine> {
        self.engine.as_mut()
    }

    /// Open the publisher (if configured) and spawn the control loop; no-op
    /// if already running
    pub async fn start(&mut self) -> zenoh::Result<()> {
        if self.task.is_some() {
            return Ok(());
        }
        let Some(engine) = self.engine.take() else {
            warn!("Gait engine was lost, cannot restart");
            return Ok(());
        };

        let publisher = match &self.topic {
            Some(topic) => match AnglePublisher::open(topic).await {
                Ok(publisher) => Some(publisher),
                Err(e) => {
                    self.engine = Some(engine);
                    return Err(e);
                }
            },
            None => None,
        };

        let (stop, stop_rx) = watch::channel(false);
        info!("Gait controller started: {:?} per tick", self.period);
        let handle = tokio::spawn(control_loop(engine, publisher, self.period, stop_rx));
        self.task = Some(ControllerTask { stop, handle });
        Ok(())
    }

    /// Signal the loop and wait for it; the publisher is closed on return
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let _ = task.stop.send(true);
        match task.handle.await {
            Ok(engine) => self.engine = Some(engine),
            Err(e) => warn!("Control loop ended abnormally: {}", e),
        }
        info!("Gait controller stopped");
    }
}

async fn control_loop(
    mut engine: GaitEngine,
    mut publisher: Option<AnglePublisher>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) -> GaitEngine {
    let base = Instant::now();
    let mut pacer = Pacer::new(period, base);

    while !*stop.borrow() {
        let t = base.elapsed().as_secs_f64();
        let report = engine.step(t);
        if let Some(publisher) = publisher.as_mut() {
            publisher.publish(t, &report.outputs).await;
        }

        let deadline = pacer.advance(Instant::now());
        tokio::select! {
            _ = tokio::time::sleep_until(deadline.into()) => {}
            _ = stop.changed() => break,
        }
    }

    if let Some(publisher) = publisher {
        if let Err(e) = publisher.close().await {
            warn!("Failed to close publisher: {}", e);
        }
    }
    engine
}
