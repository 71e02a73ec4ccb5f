// One leg: geometry, current pose and servo outputs
//
// All mutable state sits behind a per-leg mutex. A write computes the new pose
// outside the lock and swaps it in only when every check passed, so a failed
// target leaves the previous valid pose untouched.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::warn;

use super::kinematics;
use super::linkage;
use super::{
    Envelope, Joint, JointAngles, LegGeometry, LegId, LimitCheck, Point3, RobotError,
    ServoEnvelope, Side,
};

/// Servo outputs a leg reports before its first successful write
const INITIAL_SERVO_OUTPUT: f64 = 90.0;

/// Consistent copy of a leg's pose
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegState {
    pub end: Point3,
    pub joints: JointAngles,
    pub servo: JointAngles,
}

pub struct Leg {
    id: LegId,
    geometry: LegGeometry,
    crank_offset_deg: f64,
    envelope: ServoEnvelope,
    state: Mutex<LegState>,
}

impl Leg {
    /// Create a leg and move it to `default_pose`
    ///
    /// The tibia envelope is the intersection of `default_envelope.tibia` with the
    /// crank range the linkage can physically reach.
    pub fn new(
        id: LegId,
        geometry: LegGeometry,
        default_pose: JointAngles,
        default_envelope: &ServoEnvelope,
    ) -> Result<Self, RobotError> {
        let side = id.side();
        let crank_offset_deg = linkage::crank_offset_deg(&geometry.linkage);

        let tibia = linkage::geometric_envelope(&geometry.linkage, side, crank_offset_deg)
            .map(|reachable| default_envelope.tibia.intersect(reachable))
            .filter(|envelope| !envelope.is_empty())
            .ok_or(RobotError::InvalidLinkage { leg: id })?;
        let envelope = ServoEnvelope {
            tibia,
            ..*default_envelope
        };

        let end = kinematics::forward(&geometry, &default_pose);
        let leg = Self {
            id,
            geometry,
            crank_offset_deg,
            envelope,
            state: Mutex::new(LegState {
                end,
                joints: default_pose,
                servo: JointAngles::new(
                    INITIAL_SERVO_OUTPUT,
                    INITIAL_SERVO_OUTPUT,
                    INITIAL_SERVO_OUTPUT,
                ),
            }),
        };
        leg.write_end_coordinate(end)?;

        Ok(leg)
    }

    pub fn id(&self) -> LegId {
        self.id
    }

    pub fn side(&self) -> Side {
        self.id.side()
    }

    pub fn geometry(&self) -> &LegGeometry {
        &self.geometry
    }

    pub fn envelope(&self) -> &ServoEnvelope {
        &self.envelope
    }

    pub fn crank_offset_deg(&self) -> f64 {
        self.crank_offset_deg
    }

    fn state(&self) -> MutexGuard<'_, LegState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the foot to `target`
    ///
    /// Solves inverse kinematics, converts to servo outputs and checks them
    /// against the envelope. On success the coordinate, joint angles and servo
    /// outputs are replaced together and the new servo outputs returned.
    pub fn write_end_coordinate(&self, target: Point3) -> Result<JointAngles, RobotError> {
        let joints = kinematics::inverse(&self.geometry, target).map_err(|e| {
            RobotError::Unreachable {
                leg: self.id,
                target,
                distance: e.distance,
                min: e.min,
                max: e.max,
            }
        })?;
        let servo = self.servo_outputs(&joints)?;

        let mut state = self.state();
        *state = LegState {
            end: target,
            joints,
            servo,
        };
        Ok(servo)
    }

    /// Convert joint angles to servo outputs and enforce the envelope
    pub fn servo_outputs(&self, joints: &JointAngles) -> Result<JointAngles, RobotError> {
        let side = self.side();
        let knee = joints.femur + joints.tibia;
        let tibia = linkage::tibia_servo_angle(&self.geometry.linkage, side, self.crank_offset_deg, knee)
            .ok_or(RobotError::LinkageUnsolvable {
                leg: self.id,
                angle: knee,
            })?;

        // The femur servos on the right are mounted mirrored
        let femur = match side {
            Side::Left => joints.femur,
            Side::Right => 180.0 - joints.femur,
        };
        let servo = JointAngles::new(joints.coxa, femur, tibia);

        for joint in Joint::ALL {
            self.check_limit(joint, servo.get(joint), self.envelope.get(joint))?;
        }
        Ok(servo)
    }

    fn check_limit(&self, joint: Joint, value: f64, envelope: Envelope) -> Result<(), RobotError> {
        match envelope.check(value) {
            LimitCheck::Within => Ok(()),
            LimitCheck::NearLimit => {
                warn!(
                    "{} {} servo output {:.2}° close to limitation [{:.2}, {:.2}]",
                    self.id, joint, value, envelope.min, envelope.max
                );
                Ok(())
            }
            LimitCheck::Exceeded => Err(RobotError::LimitExceeded {
                leg: self.id,
                joint,
                value,
                min: envelope.min,
                max: envelope.max,
            }),
        }
    }

    pub fn read_end_coordinate(&self) -> Point3 {
        self.state().end
    }

    pub fn read_joint_angle(&self, joint: Joint) -> f64 {
        self.state().joints.get(joint)
    }

    pub fn read_all_joints(&self) -> JointAngles {
        self.state().joints
    }

    pub fn read_servo_output(&self) -> JointAngles {
        self.state().servo
    }

    pub fn snapshot(&self) -> LegState {
        *self.state()
    }
}
