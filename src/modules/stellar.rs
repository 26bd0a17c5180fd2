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

//! Stellar evolution: tabulated luminosity, radius, temperature and radius
//! of gyration, XUV luminosity decay, rotational spin-down under magnetic
//! braking, and bookkeeping of the angular momentum and energy the star
//! sheds along the way.

use log::{info, warn};
use std::f64::consts::PI;
use std::fmt::Write as _;

use crate::body::{Body, MagBrakingModel, StellarModel, System, WindModel, World, XuvModel};
use crate::consts::*;
use crate::errors::AeonError;
use crate::io::options::BodyFile;
use crate::matrix::{stub_tiny, BodyMatrix, Quantity, VarKind};
use crate::module::{HaltFn, HaltPolicy, Module, ModuleId};
use crate::modules::tracks::{self, TrackError, TrackField};
use crate::units::Units;

/// The stellar evolution module. A unit struct: all state lives on the body.
pub struct Stellar;

/// Convective turnover timescale in seconds from Cranmer & Saar (2011),
/// eqn. 36. Valid for 3300 K <= Teff <= 7000 K, which brackets the grid.
pub fn cranmer_saar_tau_cz(teff: f64) -> f64 {
    let tau = 314.24 * (-(teff / 1952.5) - (teff / 6250.0).powi(18)).exp() + 0.002;
    tau * DAYSEC
}

/// Rossby number of the star.
pub fn rossby_number(b: &Body) -> f64 {
    b.rot_per / cranmer_saar_tau_cz(b.temperature)
}

fn track_or_current(field: TrackField, b: &Body, current: f64) -> f64 {
    match b.stellar_model {
        StellarModel::Baraffe => tracks::lookup(field, b.age, b.mass).unwrap_or(current),
        _ => current,
    }
}

/// New luminosity; the matrix assigns rather than integrates this.
fn luminosity_value(bodies: &[Body], _s: &System, ia: &[usize]) -> f64 {
    let b = &bodies[ia[0]];
    track_or_current(TrackField::Luminosity, b, b.luminosity)
}

fn radius_value(bodies: &[Body], _s: &System, ia: &[usize]) -> f64 {
    let b = &bodies[ia[0]];
    track_or_current(TrackField::Radius, b, b.radius)
}

fn temperature_value(bodies: &[Body], _s: &System, ia: &[usize]) -> f64 {
    let b = &bodies[ia[0]];
    track_or_current(TrackField::Temperature, b, b.temperature)
}

fn rad_gyra_value(bodies: &[Body], _s: &System, ia: &[usize]) -> f64 {
    let b = &bodies[ia[0]];
    if !b.evolve_rg {
        return b.rad_gyra;
    }
    track_or_current(TrackField::RadGyra, b, b.rad_gyra)
}

/// Instantaneous dR/dt on the track by centered finite difference, +/- 10
/// years. The matrix scratch is never consulted here: the radius is
/// value-driven and carries no rate of its own.
fn radius_rate_on_track(b: &Body) -> f64 {
    if b.stellar_model != StellarModel::Baraffe {
        return TINY_RATE;
    }
    let eps = 10.0 * YEARSEC;
    let lo = tracks::lookup(TrackField::Radius, b.age - eps, b.mass).unwrap_or(b.radius);
    let hi = tracks::lookup(TrackField::Radius, b.age + eps, b.mass).unwrap_or(b.radius);
    (hi - lo) / (2.0 * eps)
}

fn rad_gyra_rate_on_track(b: &Body) -> f64 {
    if b.stellar_model != StellarModel::Baraffe || !b.evolve_rg {
        return TINY_RATE;
    }
    let eps = 10.0 * YEARSEC;
    let lo = tracks::lookup(TrackField::RadGyra, b.age - eps, b.mass).unwrap_or(b.rad_gyra);
    let hi = tracks::lookup(TrackField::RadGyra, b.age + eps, b.mass).unwrap_or(b.rad_gyra);
    (hi - lo) / (2.0 * eps)
}

/// Magnetic braking torque, returned as the positive rate of angular
/// momentum loss. Selectable per body; the Rossby cut zeroes every law once
/// the star spins down past the van Saders threshold.
pub fn braking_torque(b: &Body) -> f64 {
    if b.rossby_cut && rossby_number(b) > ROSSBY_CRIT {
        return TINY_RATE;
    }

    match b.mag_braking_model {
        MagBrakingModel::None => TINY_RATE,
        MagBrakingModel::Rm12 => {
            let omega_crit = if b.mass > 0.35 * MSUN {
                RM12_OMEGA_CRIT
            } else {
                RM12_OMEGA_CRIT_FULLY_CONVEC
            };
            let djdt = if b.rot_rate >= omega_crit {
                -RM12_CONST * b.rot_rate * b.radius.powf(16.0 / 3.0) * b.mass.powf(-2.0 / 3.0)
            } else {
                -RM12_CONST
                    * (b.rot_rate / omega_crit).powi(4)
                    * b.rot_rate
                    * b.radius.powf(16.0 / 3.0)
                    * b.mass.powf(-2.0 / 3.0)
            };
            -djdt
        }
        MagBrakingModel::Sk72 => {
            SK72_CONST
                * b.mass
                * b.radius.powi(4)
                * b.rad_gyra
                * b.rad_gyra
                * b.rot_rate.powi(3)
        }
        MagBrakingModel::Matt15 => {
            let tau_cz = cranmer_saar_tau_cz(b.temperature);
            let rossby = b.rot_per / tau_cz;
            let t0 = MATT15_T0 * (b.radius / RSUN).powf(3.1) * (b.mass / MSUN).sqrt();
            let djdt = if rossby <= MATT15_R0SUN / MATT15_X {
                -t0 * MATT15_X * MATT15_X * (b.rot_rate / MATT15_OMEGA_SUN)
            } else {
                -t0 * (tau_cz / MATT15_TAUCZ).powi(2) * (b.rot_rate / MATT15_OMEGA_SUN).powi(3)
            };
            -djdt
        }
    }
}

/// dJ/dt contributor for the cumulative lost angular momentum.
fn lost_ang_mom_deriv(bodies: &[Body], _s: &System, ia: &[usize]) -> f64 {
    braking_torque(&bodies[ia[0]])
}

/// Spin-up from contraction: dw/dt = -2 w (dR/dt) / R.
fn rot_rate_contraction(b: &Body) -> f64 {
    if b.stellar_model != StellarModel::Baraffe {
        return TINY_RATE;
    }
    -2.0 * radius_rate_on_track(b) * b.rot_rate / b.radius
}

/// Spin change from the shifting mass distribution: dw/dt = -2 w (dRg/dt) / Rg.
fn rot_rate_rad_gyra(b: &Body) -> f64 {
    if b.stellar_model != StellarModel::Baraffe {
        return TINY_RATE;
    }
    -2.0 * rad_gyra_rate_on_track(b) * b.rot_rate / b.rad_gyra
}

/// Spin-down from braking: dw/dt = dJ/dt / (M Rg^2 R^2).
fn rot_rate_braking(b: &Body) -> f64 {
    let djdt = -braking_torque(b);
    let mom_inertia = b.mass * b.rad_gyra * b.rad_gyra * b.radius * b.radius;
    djdt / mom_inertia
}

/// Net dw/dt: contraction, braking and radius-of-gyration terms.
fn rot_rate_deriv(bodies: &[Body], _s: &System, ia: &[usize]) -> f64 {
    let b = &bodies[ia[0]];
    rot_rate_contraction(b) + rot_rate_braking(b) + rot_rate_rad_gyra(b)
}

/// Gravitational contraction release; stored positive when energy leaves.
fn de_dt_contraction(b: &Body) -> f64 {
    let de = ALPHA_STRUCT * BIGG * b.mass * b.mass * radius_rate_on_track(b)
        / (b.radius * b.radius);
    -de
}

/// Rotational kinetic energy change from contraction at fixed J.
fn de_dt_rot_contraction(b: &Body) -> f64 {
    let de = -b.mass
        * b.rad_gyra
        * b.rad_gyra
        * b.radius
        * radius_rate_on_track(b)
        * b.rot_rate
        * b.rot_rate;
    -de
}

/// Rotational kinetic energy change from the evolving radius of gyration.
fn de_dt_rot_rad_gyra(b: &Body) -> f64 {
    let de = -b.mass
        * b.rad_gyra
        * b.radius
        * b.radius
        * rad_gyra_rate_on_track(b)
        * b.rot_rate
        * b.rot_rate;
    -de
}

/// Rotational energy carried off by the braking wind.
fn de_dt_braking(b: &Body) -> f64 {
    let djdt = -braking_torque(b);
    -(b.rot_rate * djdt)
}

/// Total energy shed by the star; integrated for bookkeeping only.
fn lost_eng_deriv(bodies: &[Body], _s: &System, ia: &[usize]) -> f64 {
    let b = &bodies[ia[0]];
    de_dt_braking(b) + de_dt_rot_contraction(b) + de_dt_contraction(b) + de_dt_rot_rad_gyra(b)
}

fn halt_end_of_grid(bodies: &[Body], _s: &System, i: usize) -> bool {
    if bodies[i].stellar_model == StellarModel::Const {
        info!(
            "HALT: {} reached the edge of the stellar grid at {:.5e} years",
            bodies[i].name,
            bodies[i].age / YEARSEC
        );
        return true;
    }
    false
}

impl Stellar {
    fn seed_from_track(body: &mut Body) -> Result<(), AeonError> {
        let report = |e: TrackError, b: &Body| {
            AeonError::Numerical(format!(
                "stellar grid rejected {}: {} (age {:.3e} yr, mass {:.3} Msun)",
                b.name,
                e,
                b.age / YEARSEC,
                b.mass / MSUN
            ))
        };
        body.luminosity = tracks::lookup(TrackField::Luminosity, body.age, body.mass)
            .map_err(|e| report(e, body))?;
        body.radius =
            tracks::lookup(TrackField::Radius, body.age, body.mass).map_err(|e| report(e, body))?;
        body.temperature = tracks::lookup(TrackField::Temperature, body.age, body.mass)
            .map_err(|e| report(e, body))?;
        if body.evolve_rg {
            body.rad_gyra = tracks::lookup(TrackField::RadGyra, body.age, body.mass)
                .map_err(|e| report(e, body))?;
        }
        Ok(())
    }
}

impl Module for Stellar {
    fn id(&self) -> ModuleId {
        ModuleId::Stellar
    }

    fn read_options(
        &self,
        body: &mut Body,
        halt: &mut HaltPolicy,
        file: &mut BodyFile,
        units: &Units,
    ) -> Result<(), AeonError> {
        if let Some(v) = file.real("dSatXUVFrac")? {
            body.sat_xuv_frac = v;
        }
        if let Some(v) = file.time("dSatXUVTime", units, 1.0e9 * YEARSEC)? {
            body.sat_xuv_time = v;
        }
        if let Some(v) = file.real("dXUVBeta")? {
            body.xuv_beta = v;
        }
        if let Some(v) = file.real_neg("dTemperature", TSUN)? {
            body.temperature = v;
        }
        if let Some(s) = file.string("sStellarModel")? {
            body.stellar_model = match s.to_lowercase().get(..2) {
                Some("ba") => StellarModel::Baraffe,
                Some("no") => StellarModel::None,
                Some("pr") => StellarModel::ProximaCen,
                _ => {
                    return Err(file.bad_value(
                        "sStellarModel",
                        &s,
                        "options are BARAFFE, PROXIMACEN, or NONE",
                    ))
                }
            };
        }
        if let Some(s) = file.string("sMagBrakingModel")? {
            body.mag_braking_model = match s.to_lowercase().get(..2) {
                Some("re") => MagBrakingModel::Rm12,
                Some("sk") => MagBrakingModel::Sk72,
                Some("ma") => MagBrakingModel::Matt15,
                Some("no") => MagBrakingModel::None,
                _ => {
                    return Err(file.bad_value(
                        "sMagBrakingModel",
                        &s,
                        "options are REINERS, SKUMANICH, MATT, or NONE",
                    ))
                }
            };
        }
        if let Some(s) = file.string("sWindModel")? {
            body.wind_model = match s.to_lowercase().get(..2) {
                Some("re") => WindModel::Reiners,
                Some("no") => WindModel::None,
                _ => return Err(file.bad_value("sWindModel", &s, "options are REINERS or NONE")),
            };
        }
        if let Some(s) = file.string("sXUVModel")? {
            body.xuv_model = match s.to_lowercase().get(..2) {
                Some("ri") => XuvModel::Ribas,
                Some("no") => XuvModel::None,
                Some("re") => {
                    warn!(
                        "the REINERS XUV model carries known EUV issues; only its X-ray branch is used"
                    );
                    XuvModel::Reiners
                }
                _ => {
                    return Err(file.bad_value(
                        "sXUVModel",
                        &s,
                        "options are RIBAS, REINERS, or NONE",
                    ))
                }
            };
        }
        if let Some(v) = file.boolean("bRossbyCut")? {
            body.rossby_cut = v;
        }
        if let Some(v) = file.boolean("bEvolveRG")? {
            body.evolve_rg = v;
        }
        if let Some(v) = file.boolean("bHaltEndBaraffeGrid")? {
            halt.end_of_grid = v;
        }
        Ok(())
    }

    fn verify(
        &self,
        world: &mut World,
        matrix: &mut [BodyMatrix],
        i: usize,
    ) -> Result<(), AeonError> {
        let body = &mut world.bodies[i];

        if body.stellar_model == StellarModel::ProximaCen {
            return Err(AeonError::Verify(format!(
                "{}: the PROXIMACEN track is not bundled; use BARAFFE or NONE",
                body.name
            )));
        }
        if body.mag_braking_model == MagBrakingModel::Rm12
            && body.wind_model != WindModel::Reiners
        {
            return Err(AeonError::Verify(format!(
                "{}: sMagBrakingModel REINERS requires sWindModel REINERS",
                body.name
            )));
        }
        if body.stellar_model == StellarModel::Baraffe {
            Stellar::seed_from_track(body)?;
        } else if body.evolve_rg && body.rad_gyra <= 0.0 {
            return Err(AeonError::Verify(format!(
                "{}: dRadGyra must be set when bEvolveRG is on without a stellar track",
                body.name
            )));
        }
        if !body.evolve_rg && body.rad_gyra <= 0.0 {
            return Err(AeonError::Verify(format!(
                "{}: dRadGyra must be set when bEvolveRG = 0",
                body.name
            )));
        }

        let m = &mut matrix[i];
        m.claim_value(Quantity::Luminosity, ModuleId::Stellar, i, vec![i])?;
        if body.radius > 0.0 {
            m.claim_value(Quantity::Radius, ModuleId::Stellar, i, vec![i])?;
        }
        if body.temperature > 0.0 {
            m.claim_value(Quantity::Temperature, ModuleId::Stellar, i, vec![i])?;
        }
        if body.evolve_rg && body.rad_gyra > 0.0 {
            m.claim_value(Quantity::RadGyra, ModuleId::Stellar, i, vec![i])?;
        }
        // Rotation is always tracked, along with the shed angular momentum
        // and energy reservoirs.
        m.claim_rate(Quantity::RotRate, VarKind::Rate, ModuleId::Stellar, i, vec![i])?;
        m.claim_rate(
            Quantity::LostAngMom,
            VarKind::Rate,
            ModuleId::Stellar,
            i,
            vec![i],
        )?;
        m.claim_rate(
            Quantity::LostEng,
            VarKind::Derived,
            ModuleId::Stellar,
            i,
            vec![i],
        )?;
        Ok(())
    }

    fn assign_derivatives(&self, body: &Body, matrix: &mut BodyMatrix) {
        matrix.set_compute(Quantity::Luminosity, ModuleId::Stellar, luminosity_value);
        matrix.set_compute(Quantity::Radius, ModuleId::Stellar, radius_value);
        matrix.set_compute(Quantity::Temperature, ModuleId::Stellar, temperature_value);
        if body.evolve_rg {
            matrix.set_compute(Quantity::RadGyra, ModuleId::Stellar, rad_gyra_value);
        }
        matrix.set_compute(Quantity::RotRate, ModuleId::Stellar, rot_rate_deriv);
        matrix.set_compute(Quantity::LostAngMom, ModuleId::Stellar, lost_ang_mom_deriv);
        matrix.set_compute(Quantity::LostEng, ModuleId::Stellar, lost_eng_deriv);
    }

    fn null_derivatives(&self, body: &Body, matrix: &mut BodyMatrix) {
        matrix.set_compute(Quantity::Luminosity, ModuleId::Stellar, stub_tiny);
        matrix.set_compute(Quantity::Radius, ModuleId::Stellar, stub_tiny);
        matrix.set_compute(Quantity::Temperature, ModuleId::Stellar, stub_tiny);
        if body.evolve_rg {
            matrix.set_compute(Quantity::RadGyra, ModuleId::Stellar, stub_tiny);
        }
        matrix.set_compute(Quantity::RotRate, ModuleId::Stellar, stub_tiny);
        matrix.set_compute(Quantity::LostAngMom, ModuleId::Stellar, stub_tiny);
        matrix.set_compute(Quantity::LostEng, ModuleId::Stellar, stub_tiny);
    }

    fn props_aux(&self, bodies: &mut [Body], _system: &System, i: usize) {
        let b = &mut bodies[i];

        b.rot_per = 2.0 * PI / b.rot_rate;

        // Latch to constant values once the track runs off its high end.
        // The value contributors then keep returning the frozen state.
        if b.stellar_model == StellarModel::Baraffe
            && tracks::lookup(TrackField::Luminosity, b.age, b.mass)
                == Err(TrackError::AgeAboveGrid)
        {
            b.stellar_model = StellarModel::Const;
            if !b.grid_message {
                info!(
                    "{} ran off the stellar grid at {:.5e} years; values frozen",
                    b.name,
                    b.age / YEARSEC
                );
                b.grid_message = true;
            }
        }

        match b.xuv_model {
            XuvModel::Reiners => {
                let per_days = (2.0 * PI / b.rot_rate) / DAYSEC;
                // Unsaturated X-ray regime, Reiners et al. (2014) eqn. 11.
                let lx = 1.0e-7 * 10f64.powf(30.71 - 2.01 * per_days.log10());
                // Saturated regime.
                let lx_sat = b.luminosity * 10f64.powf(-3.12 - 0.11 * per_days.log10());
                // The EUV extension of this relation is unrealistic for M
                // dwarfs, so the X-ray luminosity stands in for the XUV.
                b.lxuv = lx.min(lx_sat);
            }
            XuvModel::Ribas => {
                let age_gyr = b.age / (1.0e9 * YEARSEC);
                let t_sat_gyr = b.sat_xuv_time / (1.0e9 * YEARSEC);
                if age_gyr >= t_sat_gyr {
                    b.lxuv = b.sat_xuv_frac
                        * b.luminosity
                        * (age_gyr / t_sat_gyr).powf(-b.xuv_beta);
                } else {
                    b.lxuv = b.sat_xuv_frac * b.luminosity;
                }
            }
            XuvModel::None => {
                b.lxuv = b.sat_xuv_frac * b.luminosity;
            }
        }
    }

    fn force_behavior(&self, _bodies: &mut [Body], _matrix: &mut [BodyMatrix], _i: usize) {
        // Nothing: the grid latch lives in the auxiliary pass.
    }

    fn body_copy(&self, dest: &mut Body, src: &Body) {
        dest.luminosity = src.luminosity;
        dest.temperature = src.temperature;
        dest.rad_gyra = src.rad_gyra;
        dest.sat_xuv_frac = src.sat_xuv_frac;
        dest.sat_xuv_time = src.sat_xuv_time;
        dest.xuv_beta = src.xuv_beta;
        dest.stellar_model = src.stellar_model;
        dest.wind_model = src.wind_model;
        dest.xuv_model = src.xuv_model;
        dest.mag_braking_model = src.mag_braking_model;
        dest.lxuv = src.lxuv;
        dest.rossby_cut = src.rossby_cut;
        dest.evolve_rg = src.evolve_rg;
        dest.rot_per = src.rot_per;
        dest.grid_message = src.grid_message;
    }

    fn count_halts(&self, halt: &HaltPolicy) -> usize {
        usize::from(halt.end_of_grid)
    }

    fn verify_halt(&self, halt: &HaltPolicy, halts: &mut Vec<HaltFn>) {
        if halt.end_of_grid {
            halts.push(halt_end_of_grid);
        }
    }

    fn log_body(&self, world: &World, i: usize, out: &mut String) {
        let b = &world.bodies[i];
        let _ = writeln!(
            out,
            "(TrackMode) Stellar track state: {:?}",
            b.stellar_model
        );
    }
}
