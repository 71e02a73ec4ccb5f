// Two coupled phase oscillators driving the tripod gait
//
// Kuramoto-style coupling pulls the pair towards a half-cycle offset:
//   dphi_i/dt = 2*pi*f + K * sin(phi_j - phi_i - pi)
// The difference psi = phi_2 - phi_1 then follows dpsi/dt = 2K*sin(psi),
// which has its stable fixed point at psi = pi for K > 0.

use std::f64::consts::{PI, TAU};

#[derive(Debug, Clone)]
pub struct Oscillators {
    phases: [f64; 2],
    last_time: Option<f64>,
    frequency_hz: f64,
    coupling: f64,
}

impl Oscillators {
    pub fn new(initial_phases: [f64; 2], frequency_hz: f64, coupling: f64) -> Self {
        Self {
            phases: initial_phases,
            last_time: None,
            frequency_hz,
            coupling,
        }
    }

    /// Re-seed the phases; the next sample establishes a new time reference
    /// unless `time_reference` is given.
    pub fn reset(&mut self, phases: [f64; 2], time_reference: Option<f64>) {
        self.phases = phases;
        self.last_time = time_reference;
    }

    /// Unwrapped phases (radians)
    pub fn phases(&self) -> [f64; 2] {
        self.phases
    }

    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    pub fn set_frequency(&mut self, frequency_hz: f64) {
        self.frequency_hz = frequency_hz.max(0.0);
    }

    /// Phase offset of the second oscillator, wrapped into [0, 2pi)
    pub fn phase_difference(&self) -> f64 {
        (self.phases[1] - self.phases[0]).rem_euclid(TAU)
    }

    pub fn derivatives(&self) -> [f64; 2] {
        let omega = TAU * self.frequency_hz;
        let [a, b] = self.phases;
        [
            omega + self.coupling * (b - a - PI).sin(),
            omega + self.coupling * (a - b - PI).sin(),
        ]
    }

    /// Advance to `time_s` with one forward-Euler step and return the phases.
    ///
    /// The first call only records the time reference. Time going backwards
    /// counts as no elapsed time.
    pub fn sample(&mut self, time_s: f64) -> [f64; 2] {
        let dt = self
            .last_time
            .map(|last| (time_s - last).max(0.0))
            .unwrap_or(0.0);

        if dt > 0.0 {
            let derivatives = self.derivatives();
            for (phase, rate) in self.phases.iter_mut().zip(derivatives) {
                *phase += rate * dt;
            }
        }
        self.last_time = Some(time_s);
        self.phases
    }
}
