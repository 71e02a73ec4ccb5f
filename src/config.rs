// Geometry, gait, control-rate and serial defaults
//
// The constants are the built-in configuration. `HexapodConfig` groups them and
// can be overridden from a JSON file; every section falls back to these values.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::gait::{LegTrajectory, Tripod};
use crate::robot::{
    Channel, Envelope, JointAngles, LegGeometry, LegId, LinkageGeometry, Point3, ServoEnvelope,
    Side, CHANNEL_COUNT,
};

// Leg link lengths (mm)
pub const COXA_LENGTH: f64 = 30.1;
pub const FEMUR_LENGTH: f64 = 60.91;
pub const TIBIA_LENGTH: f64 = 152.32;

// Tibia four-bar linkage (mm)
pub const LINK_GROUND_LENGTH: f64 = 35.94;
pub const LINK_CRANK_LENGTH: f64 = 22.36; // input link, on the servo
pub const LINK_COUPLER_LENGTH: f64 = 24.0;
pub const LINK_ROCKER_LENGTH: f64 = 27.0; // output link, on the tibia

// Default pose (degrees)
pub const DEFAULT_COXA_ANGLE: f64 = 90.0;
pub const DEFAULT_FEMUR_ANGLE: f64 = 90.0;
pub const DEFAULT_TIBIA_ANGLE: f64 = 0.0;

// Servo travel, before the linkage narrows the tibia range (degrees)
pub const SERVO_MIN_OUTPUT: f64 = 0.0;
pub const SERVO_MAX_OUTPUT: f64 = 180.0;

// Tripod gait
pub const INITIAL_PHASES: [f64; 2] = [0.0, std::f64::consts::PI];
pub const GAIT_FREQUENCY_HZ: f64 = 1.0;
pub const GAIT_COUPLING: f64 = 2.0;
pub const Z_LIFT: f64 = 25.0; // foot clearance during swing
pub const Z_DOWN: f64 = -3.0; // press into the ground during stance
pub const STEP_LENGTH: f64 = 20.0;
pub const STANCE_CENTER: Point3 = Point3::new(0.0, 135.0, -150.0);

// Gait controller loop frequency
pub const CONTROL_HZ: f64 = 50.0;

// Zenoh topic carrying angle snapshots
pub const TOPIC_RT_ANGLES: &str = "hexapod/rt/angles";

// Serial link to the servo board
pub const SERIAL_PORT: &str = "/dev/ttyUSB0";
pub const SERIAL_BAUD: u32 = 460_800;
pub const TRANSMIT_HZ: f64 = 200.0;
pub const DEFAULT_JOINT_ANGLE: f64 = 90.0;

/// Error types for loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HexapodConfig {
    pub geometry: LegGeometry,
    pub limits: LimitsConfig,
    pub pose: JointAngles,
    pub gait: GaitConfig,
    pub control: ControlConfig,
    pub serial: SerialConfig,
}

/// Default servo envelopes per body side
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub left: ServoEnvelope,
    pub right: ServoEnvelope,
}

impl LimitsConfig {
    pub fn for_side(&self, side: Side) -> &ServoEnvelope {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaitConfig {
    pub initial_phases: [f64; 2],
    pub frequency_hz: f64,
    pub coupling: f64,
    pub z_lift: f64,
    pub z_down: f64,
    pub legs: BTreeMap<LegId, LegTrajectory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub control_hz: f64,
    /// Publish each snapshot on `topic`
    pub publish: bool,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud: u32,
    pub transmit_hz: f64,
    pub send_order: Vec<Channel>,
    pub default_angle: f64,
}

impl Default for LegGeometry {
    fn default() -> Self {
        Self {
            coxa: COXA_LENGTH,
            femur: FEMUR_LENGTH,
            tibia: TIBIA_LENGTH,
            linkage: LinkageGeometry {
                ground: LINK_GROUND_LENGTH,
                crank: LINK_CRANK_LENGTH,
                coupler: LINK_COUPLER_LENGTH,
                rocker: LINK_ROCKER_LENGTH,
            },
        }
    }
}

impl Default for ServoEnvelope {
    fn default() -> Self {
        let full = Envelope::new(SERVO_MIN_OUTPUT, SERVO_MAX_OUTPUT);
        Self {
            coxa: full,
            femur: full,
            tibia: full,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            left: ServoEnvelope::default(),
            right: ServoEnvelope::default(),
        }
    }
}

impl Default for HexapodConfig {
    fn default() -> Self {
        Self {
            geometry: LegGeometry::default(),
            limits: LimitsConfig::default(),
            pose: JointAngles::new(DEFAULT_COXA_ANGLE, DEFAULT_FEMUR_ANGLE, DEFAULT_TIBIA_ANGLE),
            gait: GaitConfig::default(),
            control: ControlConfig::default(),
            serial: SerialConfig::default(),
        }
    }
}

impl Default for GaitConfig {
    fn default() -> Self {
        Self {
            initial_phases: INITIAL_PHASES,
            frequency_hz: GAIT_FREQUENCY_HZ,
            coupling: GAIT_COUPLING,
            z_lift: Z_LIFT,
            z_down: Z_DOWN,
            legs: forward_tripod(STANCE_CENTER, STEP_LENGTH),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            control_hz: CONTROL_HZ,
            publish: false,
            topic: TOPIC_RT_ANGLES.to_string(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: SERIAL_PORT.to_string(),
            baud: SERIAL_BAUD,
            transmit_hz: TRANSMIT_HZ,
            send_order: Channel::all().collect(),
            default_angle: DEFAULT_JOINT_ANGLE,
        }
    }
}

/// Straight-ahead tripod: L2/R1/R3 share one oscillator, R2/L1/L3 the other.
///
/// Middle legs stride along x, front and rear legs along the 60° diagonals.
pub fn forward_tripod(center: Point3, step: f64) -> BTreeMap<LegId, LegTrajectory> {
    let diag = step * 3f64.sqrt();
    let at = |dx: f64, dy: f64| Point3::new(center.x + dx, center.y + dy, center.z);

    BTreeMap::from([
        (LegId::L2, LegTrajectory::new(Tripod::First, at(2.0 * step, 0.0), at(-2.0 * step, 0.0))),
        (LegId::R3, LegTrajectory::new(Tripod::First, at(-step, -diag), at(step, diag))),
        (LegId::R1, LegTrajectory::new(Tripod::First, at(-step, diag), at(step, -diag))),
        (LegId::R2, LegTrajectory::new(Tripod::Second, at(-2.0 * step, 0.0), at(2.0 * step, 0.0))),
        (LegId::L3, LegTrajectory::new(Tripod::Second, at(step, -diag), at(-step, diag))),
        (LegId::L1, LegTrajectory::new(Tripod::Second, at(step, diag), at(-step, -diag))),
    ])
}

/// Sideways tripod: same leg grouping as `forward_tripod`, strides mirrored
/// so the body crabs along x.
pub fn sidle_tripod(center: Point3, step: f64) -> BTreeMap<LegId, LegTrajectory> {
    let diag = step * 3f64.sqrt();
    let at = |dx: f64, dy: f64| Point3::new(center.x + dx, center.y + dy, center.z);

    BTreeMap::from([
        (LegId::L2, LegTrajectory::new(Tripod::First, at(-2.0 * step, 0.0), at(2.0 * step, 0.0))),
        (LegId::R1, LegTrajectory::new(Tripod::First, at(step, -diag), at(-step, diag))),
        (LegId::R3, LegTrajectory::new(Tripod::First, at(step, diag), at(-step, -diag))),
        (LegId::R2, LegTrajectory::new(Tripod::Second, at(2.0 * step, 0.0), at(-2.0 * step, 0.0))),
        (LegId::L1, LegTrajectory::new(Tripod::Second, at(-step, diag), at(step, -diag))),
        (LegId::L3, LegTrajectory::new(Tripod::Second, at(-step, -diag), at(step, diag))),
    ])
}

/// Built-in stride presets, selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum GaitPattern {
    Forward,
    Sidle,
}

impl GaitPattern {
    pub fn legs(self, center: Point3, step: f64) -> BTreeMap<LegId, LegTrajectory> {
        match self {
            GaitPattern::Forward => forward_tripod(center, step),
            GaitPattern::Sidle => sidle_tripod(center, step),
        }
    }
}

impl HexapodConfig {
    /// Load a JSON configuration file; missing fields keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.geometry;
        let l = &g.linkage;
        for (name, value) in [
            ("coxa", g.coxa),
            ("femur", g.femur),
            ("tibia", g.tibia),
            ("link ground", l.ground),
            ("link crank", l.crank),
            ("link coupler", l.coupler),
            ("link rocker", l.rocker),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::Invalid(format!("{} length must be positive, got {}", name, value)));
            }
        }

        for (name, hz) in [
            ("control_hz", self.control.control_hz),
            ("transmit_hz", self.serial.transmit_hz),
        ] {
            if !(hz > 0.0) || !hz.is_finite() {
                return Err(ConfigError::Invalid(format!("{} must be positive, got {}", name, hz)));
            }
        }
        if !(self.gait.frequency_hz >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "gait frequency must not be negative, got {}",
                self.gait.frequency_hz
            )));
        }

        for (side, envelope) in [(Side::Left, &self.limits.left), (Side::Right, &self.limits.right)] {
            for (joint, env) in [("coxa", envelope.coxa), ("femur", envelope.femur), ("tibia", envelope.tibia)] {
                if env.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "{:?} {} envelope is empty: [{}, {}]",
                        side, joint, env.min, env.max
                    )));
                }
            }
        }

        let unique: BTreeSet<Channel> = self.serial.send_order.iter().copied().collect();
        if self.serial.send_order.len() != CHANNEL_COUNT || unique.len() != CHANNEL_COUNT {
            return Err(ConfigError::Invalid(format!(
                "send_order must list all {} channels exactly once, got {} entries ({} distinct)",
                CHANNEL_COUNT,
                self.serial.send_order.len(),
                unique.len()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        HexapodConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = HexapodConfig::from_json(
            r#"{ "serial": { "port": "/dev/ttyACM1", "transmit_hz": 100.0 }, "gait": { "z_lift": 30.0 } }"#,
        )
        .unwrap();

        assert_eq!(config.serial.port, "/dev/ttyACM1");
        assert_eq!(config.serial.transmit_hz, 100.0);
        assert_eq!(config.serial.baud, SERIAL_BAUD);
        assert_eq!(config.gait.z_lift, 30.0);
        assert_eq!(config.gait.legs.len(), 6);
        assert_eq!(config.geometry, LegGeometry::default());
    }

    #[test]
    fn test_send_order_by_name() {
        let mut names: Vec<String> = Channel::all().map(|c| c.to_string()).collect();
        names.reverse();
        let json = serde_json::json!({ "serial": { "send_order": names } }).to_string();
        let config = HexapodConfig::from_json(&json).unwrap();
        assert_eq!(config.serial.send_order[0].to_string(), "R3_tibia");
    }

    #[test]
    fn test_incomplete_send_order_rejected() {
        let json = r#"{ "serial": { "send_order": ["L1_coxa", "L1_femur"] } }"#;
        assert!(matches!(
            HexapodConfig::from_json(json),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_unknown_channel_rejected() {
        let json = r#"{ "serial": { "send_order": ["L9_coxa"] } }"#;
        assert!(matches!(
            HexapodConfig::from_json(json),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_non_positive_rate_rejected() {
        let json = r#"{ "control": { "control_hz": 0.0 } }"#;
        assert!(matches!(
            HexapodConfig::from_json(json),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("hexapod-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "control": { "publish": true } }"#).unwrap();
        let config = HexapodConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(config.control.publish);
        assert_eq!(config.control.topic, TOPIC_RT_ANGLES);
    }

    #[test]
    fn test_forward_tripod_assignment() {
        let legs = forward_tripod(STANCE_CENTER, STEP_LENGTH);
        let first: Vec<LegId> = legs
            .iter()
            .filter(|(_, t)| t.tripod == Tripod::First)
            .map(|(id, _)| *id)
            .collect();
        assert_eq!(first, vec![LegId::L2, LegId::R1, LegId::R3]);
    }

    #[test]
    fn test_sidle_tripod_assignment() {
        let legs = sidle_tripod(STANCE_CENTER, STEP_LENGTH);
        let first: Vec<LegId> = legs
            .iter()
            .filter(|(_, t)| t.tripod == Tripod::First)
            .map(|(id, _)| *id)
            .collect();
        assert_eq!(first, vec![LegId::L2, LegId::R1, LegId::R3]);

        let l2 = &legs[&LegId::L2];
        assert_eq!(l2.p1.x, STANCE_CENTER.x - 2.0 * STEP_LENGTH);
        assert_eq!(l2.p3.x, STANCE_CENTER.x + 2.0 * STEP_LENGTH);

        // Each sidle stride runs the opposite way to its forward counterpart
        let forward = forward_tripod(STANCE_CENTER, STEP_LENGTH);
        for (id, t) in &legs {
            assert_eq!(t.tripod, forward[id].tripod, "{}", id);
            let dx = t.p3.x - t.p1.x;
            let forward_dx = forward[id].p3.x - forward[id].p1.x;
            assert!((dx + forward_dx).abs() < 1e-9, "{}: {} vs {}", id, dx, forward_dx);
            assert_eq!(t.p1.z, STANCE_CENTER.z);
        }
    }

    #[test]
    fn test_gait_pattern_selects_preset() {
        assert_eq!(
            GaitPattern::Sidle.legs(STANCE_CENTER, STEP_LENGTH),
            sidle_tripod(STANCE_CENTER, STEP_LENGTH)
        );
        assert_eq!(
            GaitPattern::Forward.legs(STANCE_CENTER, STEP_LENGTH),
            forward_tripod(STANCE_CENTER, STEP_LENGTH)
        );
    }
}
