// Closed-form kinematics for one 3-DOF leg
// Converts between joint angles (degrees) and the foot coordinate (mm) in the leg frame.

use super::{JointAngles, LegGeometry, Point3};

/// Slack allowed on the reachability bounds so a fully extended or fully
/// folded leg still solves despite rounding
const REACH_EPSILON: f64 = 1e-9;

/// Target lies outside the annulus the femur and tibia can sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unreachable {
    pub distance: f64,
    pub min: f64,
    pub max: f64,
}

/// `acos` that tolerates rounding just outside [-1, 1] and rejects anything further
pub(crate) fn acos_checked(cosine: f64) -> Option<f64> {
    if cosine.is_nan() || cosine.abs() > 1.0 + REACH_EPSILON {
        None
    } else {
        Some(cosine.clamp(-1.0, 1.0).acos())
    }
}

/// Foot position for the given joint angles
pub fn forward(geometry: &LegGeometry, joints: &JointAngles) -> Point3 {
    let coxa = joints.coxa.to_radians();
    let femur = joints.femur.to_radians();
    let tibia = joints.tibia.to_radians();

    let r = geometry.femur * femur.sin() + geometry.tibia * tibia.sin();
    let big_r = geometry.coxa + r;

    Point3::new(
        big_r * coxa.cos(),
        big_r * coxa.sin(),
        geometry.femur * femur.cos() - geometry.tibia * tibia.cos(),
    )
}

/// Joint angles that place the foot at `target`
///
/// # Returns
/// `Unreachable` when the distance from the femur joint to the target is longer
/// than the stretched leg or shorter than the folded one
pub fn inverse(geometry: &LegGeometry, target: Point3) -> Result<JointAngles, Unreachable> {
    let Point3 { x, y, z } = target;
    let femur = geometry.femur;
    let tibia = geometry.tibia;

    let theta1 = y.atan2(x);

    // Distance from the femur joint to the foot
    let r = x.hypot(y) - geometry.coxa;
    let distance = r.hypot(z);

    let max = femur + tibia;
    let min = (femur - tibia).abs();
    let unreachable = Unreachable { distance, min, max };
    if distance > max + REACH_EPSILON || distance < min - REACH_EPSILON {
        return Err(unreachable);
    }

    let alpha = r.atan2(-z);
    let beta = acos_checked(
        (distance.powi(2) + femur.powi(2) - tibia.powi(2)) / (2.0 * distance * femur),
    )
    .ok_or(unreachable)?;
    let theta2 = std::f64::consts::PI - beta - alpha;

    let knee = acos_checked(
        (tibia.powi(2) + femur.powi(2) - distance.powi(2)) / (2.0 * tibia * femur),
    )
    .ok_or(unreachable)?;
    let theta3 = knee - theta2;

    Ok(JointAngles::new(
        theta1.to_degrees(),
        theta2.to_degrees(),
        theta3.to_degrees(),
    ))
}
