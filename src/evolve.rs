/*
    aeon, planetary system evolution over Gyr timescales
    Copyright (C) 2023-onwards Aeon Contributors

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

//! The evolution engine: adaptive timestep selection from per-variable
//! characteristic times, a fourth-order Runge-Kutta stepper over the update
//! matrix, post-step forcing, halt checking, and the main loop.
//!
//! Single-threaded and synchronous: every phase runs to completion before the
//! next begins, bodies in index order, module hooks in registration order.
//! The scratch bodies and the four derivative slices are allocated once at
//! construction and reused for every step.

use log::{debug, info};
use std::sync::Arc;

use crate::body::{body_copy_general, props_aux_general, Body, System, World};
use crate::consts::HUGE_TIME;
use crate::errors::AeonError;
use crate::matrix::{BodyMatrix, PolarParent, Quantity, VarKind};
use crate::module::{HaltFn, HaltPolicy, Module};

/// Consecutive sub-floor steps tolerated before the collapse guard trips.
const COLLAPSE_STRIKES: u32 = 100;

/// Integration scheme for one step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepMethod {
    Euler,
    RungeKutta4,
}

/// Integrator options: stop time, output cadence, and the step policy.
///
/// A variable step selects dt from the smallest characteristic timescale in
/// the matrix, scaled by the safety factor eta; a fixed step uses the seed
/// dTimeStep for every step. Either way dt never overshoots the next output.
#[derive(Clone, Copy, Debug)]
pub struct EvolveOpts {
    pub stop_time: f64,
    pub output_time: f64,
    pub eta: f64,
    pub init_dt: f64,
    pub var_dt: bool,
    pub do_forward: bool,
    pub method: StepMethod,
    /// Floor for the collapse guard, seconds.
    pub min_dt: f64,
}

impl EvolveOpts {
    /// Adaptive stepping with the given safety factor and seed step.
    pub fn with_variable_step(stop_time: f64, output_time: f64, eta: f64, init_dt: f64) -> Self {
        EvolveOpts {
            stop_time,
            output_time,
            eta,
            init_dt,
            var_dt: true,
            do_forward: true,
            method: StepMethod::RungeKutta4,
            min_dt: 1.0e-2,
        }
    }

    /// Fixed stepping: every step is exactly `dt`.
    pub fn with_fixed_step(stop_time: f64, output_time: f64, dt: f64) -> Self {
        EvolveOpts {
            stop_time,
            output_time,
            eta: 1.0,
            init_dt: dt,
            var_dt: false,
            do_forward: true,
            method: StepMethod::RungeKutta4,
            min_dt: 1.0e-2,
        }
    }
}

/// Details of the previous step, kept for logging and invariant checks.
#[derive(Clone, Debug, Default)]
pub struct StepDetails {
    /// Step size used, seconds.
    pub dt: f64,
    /// Smallest characteristic timescale seen by the selector.
    pub min_timescale: f64,
    /// The variable that set it.
    pub limiter: Option<Quantity>,
    /// Interval to the next output when the step was chosen.
    pub to_next_output: f64,
}

/// Why an evolution run returned.
#[derive(Clone, Debug, PartialEq)]
pub struct EvolveOutcome {
    pub steps: u64,
    pub end_time: f64,
    /// Body whose halt predicate fired, if any.
    pub halted: Option<usize>,
}

/// Receiver for periodic snapshots.
pub trait OutputSink {
    fn snapshot(
        &mut self,
        world: &World,
        matrix: &[BodyMatrix],
        time: f64,
        dt: f64,
    ) -> Result<(), AeonError>;
}

/// Discards every snapshot; handy for tests.
pub struct NullSink;

impl OutputSink for NullSink {
    fn snapshot(
        &mut self,
        _world: &World,
        _matrix: &[BodyMatrix],
        _time: f64,
        _dt: f64,
    ) -> Result<(), AeonError> {
        Ok(())
    }
}

/// Time of the next output after `time` on a fixed cadence.
pub fn next_output_time(time: f64, output_interval: f64) -> f64 {
    let past = (time / output_interval) as u64;
    (past + 1) as f64 * output_interval
}

/// Apply the safety factor and the output cap to a raw timescale.
pub fn assign_dt(min_timescale: f64, to_next_output: f64, eta: f64) -> f64 {
    let dt = eta * min_timescale;
    if to_next_output < dt {
        to_next_output
    } else {
        dt
    }
}

/// Walk the matrix and reduce every variable's characteristic time to the
/// smallest one. Must run after an evaluation pass filled the scratch
/// storage. Derived and value-driven variables never constrain the step; a
/// variable sitting at zero with a zero net rate reports no timescale at
/// all. Multiple contributors are measured against their sum, so
/// near-cancellation between modules naturally enlarges the step.
pub fn min_timescale(
    bodies: &[Body],
    matrix: &[BodyMatrix],
    to_next_output: f64,
) -> (f64, Option<Quantity>) {
    let mut min = HUGE_TIME;
    let mut limiter = None;

    for (i, m) in matrix.iter().enumerate() {
        for slot in &m.vars {
            let tau = match slot.kind {
                VarKind::Value | VarKind::Derived => continue,
                VarKind::Explicit => to_next_output,
                VarKind::Rate => {
                    let x = slot.quantity.get(&bodies[i]);
                    let rate = slot.sum();
                    if rate == 0.0 || x == 0.0 {
                        continue;
                    }
                    (x / rate).abs()
                }
                VarKind::Polar => {
                    let rate = slot.sum();
                    if rate == 0.0 {
                        continue;
                    }
                    match slot.polar_parent {
                        Some(PolarParent::Obliquity) => {
                            if bodies[i].obliquity == 0.0 {
                                continue;
                            }
                            (bodies[i].obliquity.sin() / rate).abs()
                        }
                        Some(PolarParent::Eccentricity) => {
                            if bodies[i].ecc == 0.0 {
                                continue;
                            }
                            (bodies[i].ecc / rate).abs()
                        }
                        None => (1.0 / rate).abs(),
                    }
                }
                VarKind::Floor => {
                    let x = slot.quantity.get(&bodies[i]);
                    let rate = slot.sum();
                    if rate == 0.0 || x == 0.0 {
                        continue;
                    }
                    (x / rate).abs().max(slot.dt_floor)
                }
                VarKind::NBody => {
                    let r2: f64 = bodies[i].position.iter().map(|p| p * p).sum();
                    let v2: f64 = bodies[i].velocity.iter().map(|v| v * v).sum();
                    if v2 == 0.0 {
                        continue;
                    }
                    (r2 / v2).sqrt()
                }
            };
            if tau < min {
                min = tau;
                limiter = Some(slot.quantity);
            }
        }
    }
    (min, limiter)
}

fn eval_pass(bodies: &[Body], system: &System, matrix: &mut [BodyMatrix]) {
    for m in matrix.iter_mut() {
        m.eval(bodies, system);
    }
}

fn aux_pass(bodies: &mut [Body], system: &System, modules: &[Vec<Arc<dyn Module>>]) {
    props_aux_general(bodies);
    for i in 0..bodies.len() {
        for module in &modules[i] {
            module.props_aux(bodies, system, i);
        }
    }
}

/// Sum each variable's contributor results into one derivative slice.
fn gather_substep(matrix: &[BodyMatrix], da: &mut [Vec<f64>], dir: f64) {
    for (i, m) in matrix.iter().enumerate() {
        for (v, slot) in m.vars.iter().enumerate() {
            da[i][v] = dir * slot.sum();
        }
    }
}

/// Move the scratch bodies to a trial point: value-driven variables are
/// assigned outright (the slice holds the new value, not a rate), the rest
/// advance from the committed state by `dt_frac` times their slice entry.
fn advance_tmp(
    matrix: &[BodyMatrix],
    da: &[Vec<f64>],
    real: &[Body],
    tmp: &mut [Body],
    dt_frac: f64,
) {
    for (i, m) in matrix.iter().enumerate() {
        for (v, slot) in m.vars.iter().enumerate() {
            match slot.kind {
                VarKind::Value | VarKind::Explicit => slot.quantity.set(&mut tmp[i], da[i][v]),
                _ => {
                    let base = slot.quantity.get(&real[i]);
                    slot.quantity.set(&mut tmp[i], base + dt_frac * da[i][v]);
                }
            }
        }
    }
}

/// The evolution engine. Owns the world, the matrix, the per-body module
/// lists, the halt predicates, and all integrator scratch storage.
impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("time", &self.time)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

pub struct Engine {
    pub world: World,
    pub matrix: Vec<BodyMatrix>,
    modules: Vec<Vec<Arc<dyn Module>>>,
    halts: Vec<Vec<HaltFn>>,
    pub opts: EvolveOpts,
    details: StepDetails,
    tmp_bodies: Vec<Body>,
    /// The four Runge-Kutta derivative slices, indexed [substep][body][var].
    da_deriv: [Vec<Vec<f64>>; 4],
    pub time: f64,
    pub steps: u64,
    first_step: bool,
    dir: f64,
    collapse_strikes: u32,
}

impl Engine {
    /// Verify every module on every body, install the derivative callbacks
    /// and halt predicates, and allocate the integrator scratch. Fails on
    /// conflicting variable ownership or any module-level misconfiguration.
    pub fn new(
        mut world: World,
        modules: Vec<Vec<Arc<dyn Module>>>,
        halt_policies: Vec<HaltPolicy>,
        opts: EvolveOpts,
    ) -> Result<Self, AeonError> {
        let n = world.num_bodies();
        assert_eq!(modules.len(), n);
        assert_eq!(halt_policies.len(), n);

        if !opts.do_forward {
            return Err(AeonError::Verify(
                "backward integration is not supported".to_string(),
            ));
        }
        if opts.var_dt && !(opts.eta > 0.0 && opts.eta <= 1.0) {
            return Err(AeonError::Verify(format!(
                "dEta must lie in (0, 1], got {}",
                opts.eta
            )));
        }
        if opts.init_dt <= 0.0 {
            return Err(AeonError::Verify("dTimeStep must be positive".to_string()));
        }

        let mut matrix: Vec<BodyMatrix> = (0..n).map(|_| BodyMatrix::new()).collect();
        for i in 0..n {
            for module in &modules[i] {
                module.verify(&mut world, &mut matrix, i)?;
            }
        }
        for i in 0..n {
            for module in &modules[i] {
                module.assign_derivatives(&world.bodies[i], &mut matrix[i]);
            }
        }

        let mut halts: Vec<Vec<HaltFn>> = Vec::with_capacity(n);
        for i in 0..n {
            let mut body_halts = Vec::with_capacity(
                modules[i]
                    .iter()
                    .map(|m| m.count_halts(&halt_policies[i]))
                    .sum(),
            );
            for module in &modules[i] {
                module.verify_halt(&halt_policies[i], &mut body_halts);
            }
            halts.push(body_halts);
        }

        let shape: Vec<Vec<f64>> = matrix.iter().map(|m| vec![0.0; m.vars.len()]).collect();
        let da_deriv = [shape.clone(), shape.clone(), shape.clone(), shape];
        let tmp_bodies = world.bodies.clone();

        Ok(Engine {
            world,
            matrix,
            modules,
            halts,
            opts,
            details: StepDetails::default(),
            tmp_bodies,
            da_deriv,
            time: 0.0,
            steps: 0,
            first_step: true,
            dir: 1.0,
            collapse_strikes: 0,
        })
    }

    pub fn latest_details(&self) -> &StepDetails {
        &self.details
    }

    /// The per-body module lists, in registration order.
    pub fn modules(&self) -> &[Vec<Arc<dyn Module>>] {
        &self.modules
    }

    /// Refresh every auxiliary on the committed bodies.
    pub fn refresh_aux(&mut self) {
        aux_pass(&mut self.world.bodies, &self.world.system, &self.modules);
    }

    /// Refresh the matrix scratch against the committed bodies, so logged
    /// derivatives are self-consistent with the logged state.
    pub fn refresh_derivatives(&mut self) {
        eval_pass(&self.world.bodies, &self.world.system, &mut self.matrix);
    }

    fn copy_bodies(&mut self) {
        for i in 0..self.world.bodies.len() {
            let src = &self.world.bodies[i];
            let dst = &mut self.tmp_bodies[i];
            body_copy_general(dst, src);
            for module in &self.modules[i] {
                module.body_copy(dst, src);
            }
        }
    }

    /// Choose dt for this step from the freshly evaluated matrix. On the
    /// very first step the seed dTimeStep short-circuits the selection;
    /// the safety factor and the output cap still apply.
    fn select_dt(&mut self) -> f64 {
        if !self.opts.var_dt {
            self.details = StepDetails {
                dt: self.opts.init_dt,
                min_timescale: self.opts.init_dt,
                limiter: None,
                to_next_output: next_output_time(self.time, self.opts.output_time) - self.time,
            };
            return self.opts.init_dt;
        }
        let to_next = next_output_time(self.time, self.opts.output_time) - self.time;
        let (mut min, limiter) = min_timescale(&self.world.bodies, &self.matrix, to_next);
        if self.first_step {
            min = self.opts.init_dt;
        }
        let dt = assign_dt(min, to_next, self.opts.eta);
        self.details = StepDetails {
            dt,
            min_timescale: min,
            limiter,
            to_next_output: to_next,
        };
        dt
    }

    /// One fourth-order Runge-Kutta step: four derivative evaluations on the
    /// scratch bodies with auxiliary recomputation before each, then the
    /// weighted write-back onto the committed state. Value-driven variables
    /// are assigned from the first evaluation; their trial values still feed
    /// the substeps so dependent equations see consistent state.
    fn rk4_step(&mut self) -> f64 {
        self.copy_bodies();

        eval_pass(&self.world.bodies, &self.world.system, &mut self.matrix);
        let dt = self.select_dt();
        let dir = self.dir;

        gather_substep(&self.matrix, &mut self.da_deriv[0], dir);
        advance_tmp(
            &self.matrix,
            &self.da_deriv[0],
            &self.world.bodies,
            &mut self.tmp_bodies,
            0.5 * dt,
        );

        aux_pass(&mut self.tmp_bodies, &self.world.system, &self.modules);
        eval_pass(&self.tmp_bodies, &self.world.system, &mut self.matrix);
        gather_substep(&self.matrix, &mut self.da_deriv[1], dir);
        advance_tmp(
            &self.matrix,
            &self.da_deriv[1],
            &self.world.bodies,
            &mut self.tmp_bodies,
            0.5 * dt,
        );

        aux_pass(&mut self.tmp_bodies, &self.world.system, &self.modules);
        eval_pass(&self.tmp_bodies, &self.world.system, &mut self.matrix);
        gather_substep(&self.matrix, &mut self.da_deriv[2], dir);
        advance_tmp(
            &self.matrix,
            &self.da_deriv[2],
            &self.world.bodies,
            &mut self.tmp_bodies,
            dt,
        );

        aux_pass(&mut self.tmp_bodies, &self.world.system, &self.modules);
        eval_pass(&self.tmp_bodies, &self.world.system, &mut self.matrix);
        gather_substep(&self.matrix, &mut self.da_deriv[3], dir);

        // Weighted write-back. Value-driven variables take the step-start
        // evaluation: they are explicit functions of age, and age has not
        // advanced yet.
        for (i, m) in self.matrix.iter_mut().enumerate() {
            for (v, slot) in m.vars.iter_mut().enumerate() {
                let weighted = (self.da_deriv[0][i][v]
                    + 2.0 * self.da_deriv[1][i][v]
                    + 2.0 * self.da_deriv[2][i][v]
                    + self.da_deriv[3][i][v])
                    / 6.0;
                slot.deriv_total = weighted;
                match slot.kind {
                    VarKind::Value | VarKind::Explicit => {
                        slot.quantity
                            .set(&mut self.world.bodies[i], self.da_deriv[0][i][v]);
                    }
                    _ => {
                        let cur = slot.quantity.get(&self.world.bodies[i]);
                        slot.quantity.set(&mut self.world.bodies[i], cur + weighted * dt);
                    }
                }
            }
        }
        dt
    }

    /// One forward-Euler step over the same matrix machinery.
    fn euler_step(&mut self) -> f64 {
        eval_pass(&self.world.bodies, &self.world.system, &mut self.matrix);
        let dt = self.select_dt();
        let dir = self.dir;

        for (i, m) in self.matrix.iter_mut().enumerate() {
            for slot in m.vars.iter_mut() {
                let sum = dir * slot.sum();
                slot.deriv_total = sum;
                match slot.kind {
                    VarKind::Value | VarKind::Explicit => {
                        slot.quantity.set(&mut self.world.bodies[i], sum);
                    }
                    _ => {
                        let cur = slot.quantity.get(&self.world.bodies[i]);
                        slot.quantity.set(&mut self.world.bodies[i], cur + sum * dt);
                    }
                }
            }
        }
        dt
    }

    fn check_halts(&self) -> Option<usize> {
        for (i, body_halts) in self.halts.iter().enumerate() {
            for halt in body_halts {
                if halt(&self.world.bodies, &self.world.system, i) {
                    return Some(i);
                }
            }
        }
        None
    }

    /// Take one full step: integrate, run the force-behavior hooks, refresh
    /// the logged derivatives, check halts, then commit time and ages.
    /// Returns the halted body index if a predicate fired; in that case time
    /// is not advanced, matching the committed state of the final snapshot.
    pub fn advance_one(&mut self) -> Result<Option<usize>, AeonError> {
        let dt = match self.opts.method {
            StepMethod::RungeKutta4 => self.rk4_step(),
            StepMethod::Euler => self.euler_step(),
        };

        for i in 0..self.world.bodies.len() {
            for module in &self.modules[i] {
                module.force_behavior(&mut self.world.bodies, &mut self.matrix, i);
            }
        }

        self.refresh_derivatives();

        if let Some(halted) = self.check_halts() {
            return Ok(Some(halted));
        }

        for body in self.world.bodies.iter_mut() {
            body.age += self.dir * dt;
        }
        self.time += dt;
        self.steps += 1;
        self.first_step = false;

        if dt < self.opts.min_dt {
            self.collapse_strikes += 1;
            if self.collapse_strikes >= COLLAPSE_STRIKES {
                return Err(AeonError::StepCollapse {
                    floor: self.opts.min_dt,
                    strikes: self.collapse_strikes,
                });
            }
        } else {
            self.collapse_strikes = 0;
        }

        self.refresh_aux();
        Ok(None)
    }

    /// Run the evolution to the stop time or the first halt, emitting the
    /// initial snapshot, one snapshot per output cadence, and a terminal
    /// snapshot on halt.
    pub fn evolve(&mut self, sink: &mut dyn OutputSink) -> Result<EvolveOutcome, AeonError> {
        self.refresh_aux();
        self.refresh_derivatives();
        let dt0 = self.select_dt();
        sink.snapshot(&self.world, &self.matrix, self.time, dt0)?;

        let mut time_out = next_output_time(self.time, self.opts.output_time);
        let mut steps_since_output: u64 = 0;

        while self.time < self.opts.stop_time {
            match self.advance_one()? {
                Some(halted) => {
                    // Final derivative pass already ran; emit the terminal
                    // snapshot so the run ends self-consistently.
                    let dt = self.details.dt;
                    sink.snapshot(&self.world, &self.matrix, self.time, dt)?;
                    info!(
                        "evolution halted by {} after {} steps",
                        self.world.bodies[halted].name, self.steps
                    );
                    return Ok(EvolveOutcome {
                        steps: self.steps,
                        end_time: self.time,
                        halted: Some(halted),
                    });
                }
                None => {
                    steps_since_output += 1;
                }
            }

            if self.time >= time_out {
                let avg_dt = self.opts.output_time / steps_since_output.max(1) as f64;
                sink.snapshot(&self.world, &self.matrix, self.time, avg_dt)?;
                time_out = next_output_time(self.time, self.opts.output_time);
                debug!(
                    "output at t = {:.6e} s after {} steps (dt = {:.3e} s)",
                    self.time, self.steps, self.details.dt
                );
                steps_since_output = 0;
            }
        }

        info!("evolution completed after {} steps", self.steps);
        Ok(EvolveOutcome {
            steps: self.steps,
            end_time: self.time,
            halted: None,
        })
    }
}
