// Closed foot trajectory between two stride endpoints
//
// The first half-cycle (stance) drags the foot from P1 to P3 while pressing
// down by `z_down`; the second half-cycle (swing) carries it back with
// `z_lift` of clearance. Each axis is a quartic Bernstein-style blend of the
// endpoints and the raised/lowered midpoint.

use std::f64::consts::{PI, TAU};

use crate::robot::Point3;

fn blend(c0: f64, c2: f64, c3: f64, s: f64) -> f64 {
    let t = 1.0 - s;
    (t.powi(4) + 4.0 * t.powi(3) * s) * c0
        + 6.0 * t.powi(2) * s.powi(2) * c2
        + (4.0 * t * s.powi(3) + s.powi(4)) * c3
}

/// Foot target for phase `theta` (radians, any value; wrapped into [0, 2pi))
pub fn foot_position(p1: Point3, p3: Point3, theta: f64, z_lift: f64, z_down: f64) -> Point3 {
    let theta = theta.rem_euclid(TAU);
    let mut p2 = p1.midpoint(p3);

    let (s_xy, s_z) = if theta <= PI {
        p2.z += z_down;
        (theta / PI, theta / PI)
    } else {
        p2.z += z_lift;
        ((TAU - theta) / PI, (theta - PI) / PI)
    };

    Point3::new(
        blend(p1.x, p2.x, p3.x, s_xy),
        blend(p1.y, p2.y, p3.y, s_xy),
        blend(p1.z, p2.z, p3.z, s_z),
    )
}
