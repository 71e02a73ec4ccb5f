// Four-bar linkage between the knee and the tibia servo
//
// The tibia is not driven directly: the servo turns a crank that pushes the
// tibia through a coupler and rocker. These functions solve the linkage
// triangles (cosine law) to map the combined femur+tibia angle onto the crank
// angle, and derive the crank range in which the linkage can close at all.

use std::f64::consts::{FRAC_PI_2, PI};

use super::kinematics::acos_checked;
use super::{Envelope, LinkageGeometry, Side};

/// Calibration offset (degrees) that makes a right-angled knee map to a 90°
/// crank. Computed once per robot from the link lengths.
pub fn crank_offset_deg(link: &LinkageGeometry) -> f64 {
    let distance = link.rocker.hypot(link.ground);
    let alpha = (link.ground / distance).acos();
    let beta = ((distance.powi(2) + link.crank.powi(2) - link.coupler.powi(2))
        / (2.0 * distance * link.crank))
        .acos();
    (FRAC_PI_2 - alpha - beta).to_degrees()
}

/// Crank angle (degrees) commanded to the tibia servo for a knee angle of
/// `knee_deg` = femur + tibia joint angles.
///
/// Returns `None` when the linkage cannot close for that knee angle.
pub fn tibia_servo_angle(
    link: &LinkageGeometry,
    side: Side,
    offset_deg: f64,
    knee_deg: f64,
) -> Option<f64> {
    let knee = knee_deg.to_radians();
    let offset = offset_deg.to_radians();

    // Both sides see the rocker at the same physical angle; only the crank
    // direction is mirrored.
    let rocker_angle = PI - knee;

    let distance = (link.rocker.powi(2) + link.ground.powi(2)
        - 2.0 * link.rocker * link.ground * rocker_angle.cos())
    .sqrt();
    let alpha = acos_checked(
        (link.ground.powi(2) + distance.powi(2) - link.rocker.powi(2))
            / (2.0 * link.ground * distance),
    )?;
    let beta = acos_checked(
        (link.crank.powi(2) + distance.powi(2) - link.coupler.powi(2))
            / (2.0 * distance * link.crank),
    )?;

    let crank = match side {
        Side::Left => alpha + beta + offset,
        Side::Right => PI - alpha - beta - offset,
    };
    Some(crank.to_degrees())
}

/// Crank range (degrees) reachable before the linkage folds flat, mirrored per side.
///
/// Returns `None` for link lengths that cannot form a closed linkage.
pub fn geometric_envelope(link: &LinkageGeometry, side: Side, offset_deg: f64) -> Option<Envelope> {
    // Coupler and rocker stretched into one line
    let open = acos_checked(
        (link.ground.powi(2) + link.crank.powi(2) - (link.rocker + link.coupler).powi(2))
            / (2.0 * link.ground * link.crank),
    )?
    .to_degrees();
    // Crank and coupler stretched into one line
    let folded = acos_checked(
        (link.ground.powi(2) + (link.crank + link.coupler).powi(2) - link.rocker.powi(2))
            / (2.0 * link.ground * (link.crank + link.coupler)),
    )?
    .to_degrees();

    let envelope = match side {
        Side::Left => Envelope::new(folded + offset_deg, open + offset_deg),
        Side::Right => Envelope::new(180.0 - open - offset_deg, 180.0 - folded - offset_deg),
    };
    Some(envelope)
}
