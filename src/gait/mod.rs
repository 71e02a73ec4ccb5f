// Tripod gait generator
//
// Provides:
// - A pair of coupled oscillators producing the gait timing
// - The closed foot trajectory sampled from an oscillator phase
// - `TripodGait`, which maps both to per-leg foot targets

pub mod bezier;
mod oscillator;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::TAU;

use crate::config::GaitConfig;
use crate::robot::{LegId, Point3};

pub use oscillator::Oscillators;

/// Which oscillator drives a leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tripod {
    First,
    Second,
}

impl Tripod {
    pub fn index(self) -> usize {
        match self {
            Tripod::First => 0,
            Tripod::Second => 1,
        }
    }
}

/// Stride of one leg: the foot loops from `p1` to `p3` and back
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegTrajectory {
    pub tripod: Tripod,
    pub p1: Point3,
    pub p3: Point3,
}

impl LegTrajectory {
    pub fn new(tripod: Tripod, p1: Point3, p3: Point3) -> Self {
        Self { tripod, p1, p3 }
    }
}

/// Foot targets for every configured leg, driven by coupled oscillators
#[derive(Debug, Clone)]
pub struct TripodGait {
    legs: BTreeMap<LegId, LegTrajectory>,
    oscillators: Oscillators,
    initial_phases: [f64; 2],
    z_lift: f64,
    z_down: f64,
}

impl TripodGait {
    pub fn new(config: &GaitConfig) -> Self {
        Self {
            legs: config.legs.clone(),
            oscillators: Oscillators::new(config.initial_phases, config.frequency_hz, config.coupling),
            initial_phases: config.initial_phases,
            z_lift: config.z_lift,
            z_down: config.z_down,
        }
    }

    /// Restart from the configured phases (or `phases`) with no time reference
    pub fn reset(&mut self, phases: Option<[f64; 2]>) {
        self.oscillators
            .reset(phases.unwrap_or(self.initial_phases), None);
    }

    pub fn phases(&self) -> [f64; 2] {
        self.oscillators.phases()
    }

    pub fn set_frequency(&mut self, frequency_hz: f64) {
        self.oscillators.set_frequency(frequency_hz);
    }

    pub fn legs(&self) -> &BTreeMap<LegId, LegTrajectory> {
        &self.legs
    }

    /// Advance the oscillators to `time_s` and return the foot target of each leg
    pub fn sample(&mut self, time_s: f64) -> Vec<(LegId, Point3)> {
        self.oscillators.sample(time_s);
        self.foot_positions()
    }

    /// Foot targets at the current phases, without advancing time
    pub fn foot_positions(&self) -> Vec<(LegId, Point3)> {
        let phases = self.oscillators.phases();
        self.legs
            .iter()
            .map(|(&leg, trajectory)| {
                let theta = phases[trajectory.tripod.index()].rem_euclid(TAU);
                let target = bezier::foot_position(
                    trajectory.p1,
                    trajectory.p3,
                    theta,
                    self.z_lift,
                    self.z_down,
                );
                (leg, target)
            })
            .collect()
    }
}
