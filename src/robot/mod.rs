// Hexapod body model
//
// Provides:
// - Leg identity, side and joint enums plus the 18 servo channels they form
// - Closed-form leg kinematics (forward/inverse)
// - Four-bar linkage conversion for the tibia servo
// - Per-leg state with servo-output limit enforcement

pub mod kinematics;
mod leg;
pub mod linkage;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub use leg::{Leg, LegState};

/// Servo outputs within this many degrees of an envelope bound raise a warning
pub const NEAR_LIMIT_MARGIN_DEG: f64 = 2.0;

/// Number of servo channels on the robot (6 legs x 3 joints)
pub const CHANNEL_COUNT: usize = 18;

/// Which side of the body a leg is mounted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

/// Leg position, front to back on each side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LegId {
    L1,
    L2,
    L3,
    R1,
    R2,
    R3,
}

impl LegId {
    pub const ALL: [LegId; 6] = [
        LegId::L1,
        LegId::L2,
        LegId::L3,
        LegId::R1,
        LegId::R2,
        LegId::R3,
    ];

    pub fn side(self) -> Side {
        match self {
            LegId::L1 | LegId::L2 | LegId::L3 => Side::Left,
            LegId::R1 | LegId::R2 | LegId::R3 => Side::Right,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LegId::L1 => "L1",
            LegId::L2 => "L2",
            LegId::L3 => "L3",
            LegId::R1 => "R1",
            LegId::R2 => "R2",
            LegId::R3 => "R3",
        }
    }
}

impl fmt::Display for LegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LegId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LegId::ALL
            .into_iter()
            .find(|leg| leg.as_str() == s)
            .ok_or_else(|| format!("unknown leg '{}'", s))
    }
}

/// The three rotational joints of a leg, hip to foot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Coxa,
    Femur,
    Tibia,
}

impl Joint {
    pub const ALL: [Joint; 3] = [Joint::Coxa, Joint::Femur, Joint::Tibia];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Joint::Coxa => "coxa",
            Joint::Femur => "femur",
            Joint::Tibia => "tibia",
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One servo channel, named "<leg>_<joint>" on the wire (e.g. "L1_coxa")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Channel {
    pub leg: LegId,
    pub joint: Joint,
}

impl Channel {
    pub fn new(leg: LegId, joint: Joint) -> Self {
        Self { leg, joint }
    }

    /// Position in the canonical L1..R3 / coxa..tibia ordering
    pub fn index(self) -> usize {
        self.leg.index() * 3 + self.joint.index()
    }

    /// All channels in canonical order
    pub fn all() -> impl Iterator<Item = Channel> {
        LegId::ALL
            .into_iter()
            .flat_map(|leg| Joint::ALL.into_iter().map(move |joint| Channel::new(leg, joint)))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.leg, self.joint)
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (leg, joint) = s
            .split_once('_')
            .ok_or_else(|| format!("invalid channel name '{}'", s))?;
        let leg = leg.parse()?;
        let joint = Joint::ALL
            .into_iter()
            .find(|j| j.as_str() == joint)
            .ok_or_else(|| format!("unknown joint in channel '{}'", s))?;
        Ok(Channel::new(leg, joint))
    }
}

impl TryFrom<String> for Channel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.to_string()
    }
}

/// Cartesian point in the leg frame (mm)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn midpoint(self, other: Point3) -> Point3 {
        Point3::new(
            (self.x + other.x) * 0.5,
            (self.y + other.y) * 0.5,
            (self.z + other.z) * 0.5,
        )
    }
}

impl fmt::Display for Point3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}, {:.2}, {:.2}", self.x, self.y, self.z)
    }
}

/// Coxa/femur/tibia triple in degrees.
///
/// Used both for logical joint angles and for the servo outputs derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointAngles {
    pub coxa: f64,
    pub femur: f64,
    pub tibia: f64,
}

impl JointAngles {
    pub const fn new(coxa: f64, femur: f64, tibia: f64) -> Self {
        Self { coxa, femur, tibia }
    }

    pub fn get(&self, joint: Joint) -> f64 {
        match joint {
            Joint::Coxa => self.coxa,
            Joint::Femur => self.femur,
            Joint::Tibia => self.tibia,
        }
    }
}

/// Outcome of checking a servo output against its envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitCheck {
    Within,
    NearLimit,
    Exceeded,
}

/// Allowed [min, max] servo output range (degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min: f64,
    pub max: f64,
}

impl Envelope {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn intersect(self, other: Envelope) -> Envelope {
        Envelope::new(self.min.max(other.min), self.max.min(other.max))
    }

    pub fn is_empty(&self) -> bool {
        !(self.min <= self.max)
    }

    /// NaN is never inside an envelope
    pub fn check(&self, value: f64) -> LimitCheck {
        if !(self.min <= value && value <= self.max) {
            LimitCheck::Exceeded
        } else if value < self.min + NEAR_LIMIT_MARGIN_DEG || value > self.max - NEAR_LIMIT_MARGIN_DEG {
            LimitCheck::NearLimit
        } else {
            LimitCheck::Within
        }
    }
}

/// Per-joint servo output envelopes for one leg
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServoEnvelope {
    pub coxa: Envelope,
    pub femur: Envelope,
    pub tibia: Envelope,
}

impl ServoEnvelope {
    pub fn get(&self, joint: Joint) -> Envelope {
        match joint {
            Joint::Coxa => self.coxa,
            Joint::Femur => self.femur,
            Joint::Tibia => self.tibia,
        }
    }
}

/// Four-bar linkage driving the tibia (mm)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkageGeometry {
    pub ground: f64,
    pub crank: f64,
    pub coupler: f64,
    pub rocker: f64,
}

/// Link lengths of one leg (mm)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegGeometry {
    pub coxa: f64,
    pub femur: f64,
    pub tibia: f64,
    pub linkage: LinkageGeometry,
}

/// Angle table for all 18 channels, indexed by [`Channel::index`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelAngles([f64; CHANNEL_COUNT]);

impl ChannelAngles {
    pub fn splat(value: f64) -> Self {
        Self([value; CHANNEL_COUNT])
    }

    pub fn get(&self, channel: Channel) -> f64 {
        self.0[channel.index()]
    }

    pub fn set(&mut self, channel: Channel, value: f64) {
        self.0[channel.index()] = value;
    }

    pub fn set_leg(&mut self, leg: LegId, angles: &JointAngles) {
        for joint in Joint::ALL {
            self.set(Channel::new(leg, joint), angles.get(joint));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, f64)> + '_ {
        Channel::all().map(move |channel| (channel, self.get(channel)))
    }

    /// Values arranged in the given channel order
    pub fn ordered(&self, order: &[Channel]) -> Vec<f64> {
        order.iter().map(|&channel| self.get(channel)).collect()
    }

    pub fn to_named(&self) -> BTreeMap<String, f64> {
        self.iter()
            .map(|(channel, value)| (channel.to_string(), value))
            .collect()
    }
}

/// Errors raised when commanding a leg
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RobotError {
    #[error("{leg} target ({target}) has no inverse kinematic solution: distance {distance:.2} mm outside [{min:.2}, {max:.2}]")]
    Unreachable {
        leg: LegId,
        target: Point3,
        distance: f64,
        min: f64,
        max: f64,
    },

    #[error("{leg} tibia linkage cannot realize femur+tibia angle {angle:.2}°")]
    LinkageUnsolvable { leg: LegId, angle: f64 },

    #[error("{leg} {joint} servo output {value:.2}° exceeds limitation [{min:.2}, {max:.2}]")]
    LimitExceeded {
        leg: LegId,
        joint: Joint,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{leg} linkage geometry yields no valid tibia servo envelope")]
    InvalidLinkage { leg: LegId },
}

/// The six legs of the robot, keyed by position
pub struct Robot {
    legs: Vec<Leg>,
}

impl Robot {
    /// Build all six legs in their default pose
    pub fn new(
        geometry: &LegGeometry,
        default_pose: JointAngles,
        left_envelope: &ServoEnvelope,
        right_envelope: &ServoEnvelope,
    ) -> Result<Self, RobotError> {
        let legs = LegId::ALL
            .into_iter()
            .map(|id| {
                let envelope = match id.side() {
                    Side::Left => left_envelope,
                    Side::Right => right_envelope,
                };
                Leg::new(id, *geometry, default_pose, envelope)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { legs })
    }

    pub fn from_config(config: &crate::config::HexapodConfig) -> Result<Self, RobotError> {
        Self::new(
            &config.geometry,
            config.pose,
            config.limits.for_side(Side::Left),
            config.limits.for_side(Side::Right),
        )
    }

    pub fn leg(&self, id: LegId) -> &Leg {
        &self.legs[id.index()]
    }

    pub fn legs(&self) -> impl Iterator<Item = &Leg> {
        self.legs.iter()
    }

    pub fn write_end_coordinate(&self, id: LegId, target: Point3) -> Result<JointAngles, RobotError> {
        self.leg(id).write_end_coordinate(target)
    }

    pub fn read_all_end_coordinates(&self) -> BTreeMap<LegId, Point3> {
        self.legs
            .iter()
            .map(|leg| (leg.id(), leg.read_end_coordinate()))
            .collect()
    }

    pub fn read_all_joints_angle(&self) -> ChannelAngles {
        let mut angles = ChannelAngles::splat(0.0);
        for leg in &self.legs {
            angles.set_leg(leg.id(), &leg.read_all_joints());
        }
        angles
    }

    pub fn read_servo_outputs(&self) -> ChannelAngles {
        let mut outputs = ChannelAngles::splat(0.0);
        for leg in &self.legs {
            outputs.set_leg(leg.id(), &leg.read_servo_output());
        }
        outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HexapodConfig;

    #[test]
    fn test_channel_names_round_trip() {
        for channel in Channel::all() {
            let name = channel.to_string();
            assert_eq!(name.parse::<Channel>().unwrap(), channel);
        }
        assert_eq!(Channel::new(LegId::R2, Joint::Femur).to_string(), "R2_femur");
        assert!("L7_coxa".parse::<Channel>().is_err());
        assert!("L1_knee".parse::<Channel>().is_err());
        assert!("L1coxa".parse::<Channel>().is_err());
    }

    #[test]
    fn test_channel_indices_are_dense() {
        let indices: Vec<usize> = Channel::all().map(Channel::index).collect();
        assert_eq!(indices, (0..CHANNEL_COUNT).collect::<Vec<_>>());
    }

    #[test]
    fn test_leg_sides() {
        assert_eq!(LegId::L3.side(), Side::Left);
        assert_eq!(LegId::R1.side(), Side::Right);
    }

    #[test]
    fn test_envelope_check() {
        let env = Envelope::new(0.0, 180.0);
        assert_eq!(env.check(90.0), LimitCheck::Within);
        assert_eq!(env.check(1.0), LimitCheck::NearLimit);
        assert_eq!(env.check(179.5), LimitCheck::NearLimit);
        assert_eq!(env.check(0.0), LimitCheck::NearLimit);
        assert_eq!(env.check(-0.1), LimitCheck::Exceeded);
        assert_eq!(env.check(180.1), LimitCheck::Exceeded);
        assert_eq!(env.check(f64::NAN), LimitCheck::Exceeded);
    }

    #[test]
    fn test_robot_default_servo_outputs() {
        let robot = Robot::from_config(&HexapodConfig::default()).unwrap();
        let outputs = robot.read_servo_outputs();
        for (channel, value) in outputs.iter() {
            assert!(
                (value - 90.0).abs() < 1e-6,
                "{} default output {} != 90",
                channel,
                value
            );
        }
        assert_eq!(robot.read_all_end_coordinates().len(), 6);
    }

    #[test]
    fn test_legs_do_not_share_state() {
        let robot = Robot::from_config(&HexapodConfig::default()).unwrap();
        let before = robot.leg(LegId::L2).read_all_joints();

        let target = kinematics::forward(
            &HexapodConfig::default().geometry,
            &JointAngles::new(80.0, 85.0, 10.0),
        );
        robot.write_end_coordinate(LegId::L1, target).unwrap();

        assert_eq!(robot.leg(LegId::L2).read_all_joints(), before);
        assert!((robot.leg(LegId::L1).read_joint_angle(Joint::Coxa) - 80.0).abs() < 1e-6);
    }
}
