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

//! Atmospheric escape under XUV irradiation: energy-limited and
//! diffusion-limited loss of steam atmospheres with oxygen buildup, and
//! hydrodynamic erosion of hydrogen envelopes, following Luger & Barnes
//! (2015), Luger et al. (2015) and Lehmer & Catling (2017).

use log::{info, warn};
use std::f64::consts::PI;
use std::fmt::Write as _;

use crate::body::{Body, EscapeRegime, PlanetRadiusModel, System, WaterLossModel, World, XuvEffModel};
use crate::consts::*;
use crate::errors::AeonError;
use crate::hz;
use crate::io::options::BodyFile;
use crate::matrix::{stub_tiny, BodyMatrix, Quantity, VarKind};
use crate::module::{HaltFn, HaltPolicy, Module, ModuleId};
use crate::units::Units;

/// The atmospheric escape module. A unit struct: all state lives on the body.
pub struct AtmEsc;

/// Solid-planet mass-radius relation of Sotin et al. (2007).
pub fn sotin07_radius(mass: f64) -> f64 {
    if mass >= MEARTH {
        REARTH * (mass / MEARTH).powf(0.274)
    } else {
        REARTH * (mass / MEARTH).powf(0.306)
    }
}

/// Envelope-inflated radius from the Lopez & Fortney power-law fit: a rocky
/// core plus an envelope term scaling with mass, envelope fraction and age.
pub fn lopez12_radius(mass: f64, fenv: f64, age: f64) -> f64 {
    let rocky = sotin07_radius(mass * (1.0 - fenv));
    if fenv <= 0.0 {
        return rocky;
    }
    // The fit diverges at zero age; the grids start at 1 Myr.
    let age_capped = age.max(1.0e6 * YEARSEC);
    let renv = 2.06
        * REARTH
        * (mass / MEARTH).powf(-0.21)
        * (fenv / 0.05).powf(0.59)
        * (age_capped / (5.0e9 * YEARSEC)).powf(-0.18);
    rocky + renv
}

/// Empirical radius anchored on Proxima Centauri b (1.27 Earth masses,
/// 1.07 Earth radii), with the same envelope inflation term as the gaseous
/// fit.
pub fn proxcenb_radius(fenv: f64, age: f64, mass: f64) -> f64 {
    let rocky = 1.07 * REARTH * (mass / (1.27 * MEARTH)).powf(0.3);
    if fenv <= 0.0 {
        return rocky;
    }
    let age_capped = age.max(1.0e6 * YEARSEC);
    let renv = 2.06
        * REARTH
        * (mass / MEARTH).powf(-0.21)
        * (fenv / 0.05).powf(0.59)
        * (age_capped / (5.0e9 * YEARSEC)).powf(-0.18);
    rocky + renv
}

/// Surface pressure under the weight of an isothermal envelope.
pub fn lehmer_pres(envelope_mass: f64, grav_accel: f64, rad_solid: f64) -> f64 {
    grav_accel * envelope_mass / (4.0 * PI * rad_solid * rad_solid)
}

/// XUV absorption radius from the scale-height law: the level where the
/// pressure drops to the XUV absorption pressure.
pub fn lehmer_radius(rad_solid: f64, pres_xuv: f64, scale_height: f64, pres_surf: f64) -> f64 {
    if pres_surf > pres_xuv {
        rad_solid + scale_height * (pres_surf / pres_xuv).ln()
    } else {
        rad_solid
    }
}

/// XUV absorption efficiency for a steam atmosphere: piecewise polynomial
/// fit to Bolmont et al. (2017), as a function of the incident flux in
/// W/m^2.
pub fn xuv_eff_bolmont16(fxuv: f64) -> f64 {
    let a0 = 1.49202;
    let a1 = 5.57875;
    let a2 = 2.27482;
    let b0 = 0.59182134;
    let b1 = -0.36140798;
    let b2 = -0.04011933;
    let b3 = -0.8988;
    let c0 = -0.00441536;
    let c1 = -0.03068399;
    let c2 = 0.04946948;
    let c3 = -0.89880083;

    // The fit is expressed against log10 flux in erg/cm^2/s.
    let x = (fxuv * 1.0e3).log10();
    if (-2.0..-1.0).contains(&x) {
        10f64.powf(a0 * x * x + a1 * x + a2)
    } else if (-1.0..0.0).contains(&x) {
        10f64.powf(b0 * x * x * x + b1 * x * x + b2 * x + b3)
    } else if (0.0..=5.0).contains(&x) {
        10f64.powf(c0 * x * x * x + c1 * x * x + c2 * x + c3)
    } else {
        0.0
    }
}

/// Mixing ratio of atomic oxygen at the base of the hydrodynamic wind,
/// assuming the atmosphere is well mixed up to the photolysis layer.
pub fn oxygen_mixing_ratio(surface_water_mass: f64, oxygen_mass: f64) -> f64 {
    let n_o2 = oxygen_mass / (32.0 * ATOMMASS);
    let n_h2o = surface_water_mass / (18.0 * ATOMMASS);
    if n_h2o > 0.0 {
        1.0 / (1.0 + 1.0 / (0.5 + n_o2 / n_h2o))
    } else if n_o2 > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Binary diffusion coefficient of atomic O through hot H.
fn bdiff(flow_temp: f64) -> f64 {
    4.8e19 * flow_temp.powf(0.75)
}

/// Is water escaping right now? Latches the runaway greenhouse duration the
/// first time the planet is seen outside the runaway limit.
fn does_water_escape(b: &mut Body, instell: f64, rg_flux: f64) -> bool {
    // Hydrogen goes first: while an envelope remains, water sits tight.
    if b.envelope_mass > 0.0 {
        if b.rg_duration == 0.0 && instell < rg_flux {
            b.rg_duration = b.age;
        }
        return false;
    }
    // Inside the cold trap no water reaches the thermosphere.
    if instell < rg_flux {
        if b.rg_duration == 0.0 {
            b.rg_duration = b.age;
        }
        return false;
    }
    if b.surface_water_mass <= 0.0 {
        return false;
    }
    // Past the Jeans transition the flow is ballistic and loss shuts off.
    if b.age > b.jeans_time {
        return false;
    }
    true
}

/// Rate of change of the surface water mass. Valid for both the
/// energy-limited and the diffusion-limited regimes.
fn surface_water_deriv(bodies: &[Body], _s: &System, ia: &[usize]) -> f64 {
    let b = &bodies[ia[0]];
    if b.runaway && b.surface_water_mass > 0.0 {
        -(9.0 / (1.0 + 8.0 * b.oxygen_eta)) * b.mdot_water
    } else {
        0.0
    }
}

fn oxygen_buildup_rate(b: &Body) -> f64 {
    if b.water_loss_model == WaterLossModel::Lb15 && b.crossover_mass >= 16.0 * ATOMMASS {
        // Oxygen is dragged along: its retention saturates at the rate set
        // by diffusion through the dominant species.
        (320.0 * PI * BIGG * ATOMMASS * ATOMMASS * bdiff(b.flow_temp) * b.mass)
            / (KBOLTZ * b.flow_temp)
    } else {
        (8.0 - 8.0 * b.oxygen_eta) / (1.0 + 8.0 * b.oxygen_eta) * b.mdot_water
    }
}

/// Rate of change of the atmospheric oxygen reservoir.
fn oxygen_deriv(bodies: &[Body], _s: &System, ia: &[usize]) -> f64 {
    let b = &bodies[ia[0]];
    if b.runaway && !b.instant_o2_sink && b.surface_water_mass > 0.0 {
        oxygen_buildup_rate(b)
    } else {
        0.0
    }
}

/// Rate of change of the mantle oxygen reservoir; active when the surface
/// sink is instantaneous.
fn oxygen_mantle_deriv(bodies: &[Body], _s: &System, ia: &[usize]) -> f64 {
    let b = &bodies[ia[0]];
    if b.runaway && b.instant_o2_sink && b.surface_water_mass > 0.0 {
        oxygen_buildup_rate(b)
    } else {
        0.0
    }
}

/// Rate of change of the hydrogen envelope; also drives the planet mass.
fn envelope_deriv(bodies: &[Body], _s: &System, ia: &[usize]) -> f64 {
    let b = &bodies[ia[0]];
    if b.envelope_mass <= 0.0 || b.age > b.jeans_time {
        return TINY_RATE;
    }
    if b.planet_radius_model == PlanetRadiusModel::Lehmer17 {
        -b.eps_h * PI * b.fxuv * b.rad_xuv.powi(3) / (BIGG * (b.mass - b.envelope_mass))
    } else {
        -b.fh_ref
            * (b.eps_h / b.eps_h2o)
            * (4.0 * ATOMMASS * PI * b.radius * b.radius * b.x_frac * b.x_frac)
    }
}

/// New planet radius; the matrix assigns rather than integrates this.
fn planet_radius_value(bodies: &[Body], _s: &System, ia: &[usize]) -> f64 {
    let b = &bodies[ia[0]];
    match b.planet_radius_model {
        PlanetRadiusModel::Lopez12 => {
            let r = if b.envelope_mass <= b.min_envelope_mass {
                sotin07_radius(b.mass)
            } else {
                lopez12_radius(b.mass, b.envelope_frac(), b.age)
            };
            if r.is_nan() {
                b.radius
            } else {
                r
            }
        }
        PlanetRadiusModel::ProxCenB => proxcenb_radius(b.envelope_frac(), b.age, b.mass),
        // The scale-height model carries the evolution in its auxiliaries.
        PlanetRadiusModel::Lehmer17 | PlanetRadiusModel::None => b.radius,
    }
}

fn halt_surface_desiccated(bodies: &[Body], _s: &System, i: usize) -> bool {
    let b = &bodies[i];
    if b.surface_water_mass <= b.min_surface_water_mass {
        info!(
            "HALT: {}'s surface water mass = {:.5e} TO",
            b.name,
            b.surface_water_mass / TOMASS
        );
        return true;
    }
    false
}

fn halt_envelope_gone(bodies: &[Body], _s: &System, i: usize) -> bool {
    let b = &bodies[i];
    if b.envelope_mass <= b.min_envelope_mass {
        info!(
            "HALT: {}'s envelope mass = {:.5e} Earth masses",
            b.name,
            b.envelope_mass / MEARTH
        );
        return true;
    }
    false
}

impl AtmEsc {
    fn seed_lehmer_aux(body: &mut Body) {
        body.rad_solid = 1.3 * (body.mass - body.envelope_mass).powf(0.27);
        body.grav_accel =
            BIGG * (body.mass - body.envelope_mass) / (body.rad_solid * body.rad_solid);
        body.scale_height = body.atm_gas_const * body.therm_temp / body.grav_accel;
        body.pres_surf = lehmer_pres(body.envelope_mass, body.grav_accel, body.rad_solid);
        body.rad_xuv = lehmer_radius(
            body.rad_solid,
            body.pres_xuv,
            body.scale_height,
            body.pres_surf,
        );
    }
}

impl Module for AtmEsc {
    fn id(&self) -> ModuleId {
        ModuleId::AtmEsc
    }

    fn read_options(
        &self,
        body: &mut Body,
        halt: &mut HaltPolicy,
        file: &mut BodyFile,
        units: &Units,
    ) -> Result<(), AeonError> {
        if let Some(v) = file.real("dXFrac")? {
            body.x_frac = v;
        }
        if let Some(v) = file.real("dAtmXAbsEffH")? {
            body.eps_h = v;
        }
        if let Some(v) = file.real("dAtmXAbsEffH2O")? {
            body.eps_h2o = v;
        }
        if let Some(s) = file.string("sAtmXAbsEffH2OModel")? {
            body.xuv_eff_model = match s.to_lowercase().get(..4) {
                Some("bolm") => XuvEffModel::Bolmont16,
                Some("none") => XuvEffModel::None,
                _ => {
                    return Err(file.bad_value(
                        "sAtmXAbsEffH2OModel",
                        &s,
                        "options are BOLMONT16 or NONE",
                    ))
                }
            };
        }
        if let Some(v) = file.mass("dSurfaceWaterMass", units, TOMASS)? {
            body.surface_water_mass = v;
        }
        if let Some(v) = file.mass("dMinSurfaceWaterMass", units, TOMASS)? {
            body.min_surface_water_mass = v;
        }
        if let Some(v) = file.mass("dOxygenMass", units, 1.0)? {
            body.oxygen_mass = v;
        }
        if let Some(v) = file.mass("dOxygenMantleMass", units, 1.0)? {
            body.oxygen_mantle_mass = v;
        }
        if let Some(v) = file.mass("dEnvelopeMass", units, MEARTH)? {
            body.envelope_mass = v;
        }
        if let Some(v) = file.mass("dMinEnvelopeMass", units, MEARTH)? {
            body.min_envelope_mass = v;
        }
        if let Some(s) = file.string("sWaterLossModel")? {
            body.water_loss_model = match s.to_lowercase().get(..4) {
                Some("lb15") => WaterLossModel::Lb15,
                Some("lbex") => WaterLossModel::LbExact,
                Some("tian") => WaterLossModel::Tian,
                _ => {
                    return Err(file.bad_value(
                        "sWaterLossModel",
                        &s,
                        "options are LB15, LBEXACT, or TIAN",
                    ))
                }
            };
        }
        if let Some(s) = file.string("sPlanetRadiusModel")? {
            body.planet_radius_model = match s.to_lowercase().get(..2) {
                Some("lo") => PlanetRadiusModel::Lopez12,
                Some("le") => PlanetRadiusModel::Lehmer17,
                Some("pr") => PlanetRadiusModel::ProxCenB,
                Some("no") => PlanetRadiusModel::None,
                _ => {
                    return Err(file.bad_value(
                        "sPlanetRadiusModel",
                        &s,
                        "options are LOPEZ12, PROXCENB, LEHMER17 or NONE",
                    ))
                }
            };
        }
        if let Some(v) = file.boolean("bInstantO2Sink")? {
            body.instant_o2_sink = v;
        }
        if let Some(v) = file.boolean("bHaltSurfaceDesiccated")? {
            halt.surface_desiccated = v;
        }
        if let Some(v) = file.boolean("bHaltEnvelopeGone")? {
            halt.envelope_gone = v;
        }
        if let Some(v) = file.real_neg("dThermTemp", 1.0)? {
            body.therm_temp = v;
        }
        if let Some(v) = file.real_neg("dFlowTemp", 1.0)? {
            body.flow_temp = v;
        }
        if let Some(v) = file.real_neg("dAtmGasConst", 1.0)? {
            body.atm_gas_const = v;
        }
        if let Some(v) = file.real_neg("dPresXUV", 1.0)? {
            body.pres_xuv = v;
        }
        if let Some(v) = file.time("dJeansTime", units, 1.0e9 * YEARSEC)? {
            body.jeans_time = v;
        }
        if let Some(v) = file.real_neg("dFXUV", 1.0e-3)? {
            body.fxuv = v;
            body.calc_fxuv = false;
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
        body.envelope_lost_message = false;
        body.roche_message = false;
        body.rg_duration = 0.0;

        if body.envelope_mass > body.mass {
            return Err(AeonError::Verify(format!(
                "{}: dEnvelopeMass cannot exceed dMass",
                body.name
            )));
        }

        if body.planet_radius_model == PlanetRadiusModel::Lehmer17 {
            AtmEsc::seed_lehmer_aux(body);
        }

        // Seed the radius from the selected gaseous model.
        match body.planet_radius_model {
            PlanetRadiusModel::Lopez12 => {
                if body.envelope_mass <= body.min_envelope_mass {
                    info!(
                        "{}: gaseous radius model selected with no envelope; using the solid mass-radius relation",
                        body.name
                    );
                    body.radius = sotin07_radius(body.mass);
                } else {
                    body.radius = lopez12_radius(body.mass, body.envelope_frac(), body.age);
                }
            }
            PlanetRadiusModel::ProxCenB => {
                body.radius = proxcenb_radius(body.envelope_frac(), body.age, body.mass);
            }
            _ => {}
        }

        let mut active = false;
        let m = &mut matrix[i];
        if body.surface_water_mass > 0.0 {
            m.claim_rate(
                Quantity::SurfaceWaterMass,
                VarKind::Rate,
                ModuleId::AtmEsc,
                i,
                vec![i],
            )?;
            m.claim_rate(Quantity::OxygenMass, VarKind::Rate, ModuleId::AtmEsc, i, vec![i])?;
            m.claim_rate(
                Quantity::OxygenMantleMass,
                VarKind::Rate,
                ModuleId::AtmEsc,
                i,
                vec![i],
            )?;
            active = true;
        }
        if body.envelope_mass > 0.0 {
            m.claim_rate(
                Quantity::EnvelopeMass,
                VarKind::Rate,
                ModuleId::AtmEsc,
                i,
                vec![i],
            )?;
            m.claim_rate(Quantity::Mass, VarKind::Rate, ModuleId::AtmEsc, i, vec![i])?;
            active = true;
        }
        if body.radius > 0.0 {
            m.claim_value(Quantity::Radius, ModuleId::AtmEsc, i, vec![i])?;
        }

        if !active {
            warn!(
                "atmesc active for {}, but no atmosphere or water present",
                body.name
            );
        }
        Ok(())
    }

    fn assign_derivatives(&self, body: &Body, matrix: &mut BodyMatrix) {
        if body.surface_water_mass > 0.0 {
            matrix.set_compute(Quantity::SurfaceWaterMass, ModuleId::AtmEsc, surface_water_deriv);
            matrix.set_compute(Quantity::OxygenMass, ModuleId::AtmEsc, oxygen_deriv);
            matrix.set_compute(Quantity::OxygenMantleMass, ModuleId::AtmEsc, oxygen_mantle_deriv);
        }
        if body.envelope_mass > 0.0 {
            matrix.set_compute(Quantity::EnvelopeMass, ModuleId::AtmEsc, envelope_deriv);
            matrix.set_compute(Quantity::Mass, ModuleId::AtmEsc, envelope_deriv);
        }
        matrix.set_compute(Quantity::Radius, ModuleId::AtmEsc, planet_radius_value);
    }

    fn null_derivatives(&self, body: &Body, matrix: &mut BodyMatrix) {
        if body.surface_water_mass > 0.0 {
            matrix.set_compute(Quantity::SurfaceWaterMass, ModuleId::AtmEsc, stub_tiny);
            matrix.set_compute(Quantity::OxygenMass, ModuleId::AtmEsc, stub_tiny);
            matrix.set_compute(Quantity::OxygenMantleMass, ModuleId::AtmEsc, stub_tiny);
        }
        if body.envelope_mass > 0.0 {
            matrix.set_compute(Quantity::EnvelopeMass, ModuleId::AtmEsc, stub_tiny);
            matrix.set_compute(Quantity::Mass, ModuleId::AtmEsc, stub_tiny);
        }
        matrix.set_compute(Quantity::Radius, ModuleId::AtmEsc, stub_tiny);
    }

    fn props_aux(&self, bodies: &mut [Body], _system: &System, i: usize) {
        let star_mass = bodies[0].mass;
        let star_age = bodies[0].age;
        let star_lxuv = bodies[0].lxuv;
        let instell = hz::instellation(bodies, i);
        let rg_flux = hz::runaway_greenhouse_flux(bodies, i);

        let b = &mut bodies[i];
        b.age = star_age;

        if b.planet_radius_model == PlanetRadiusModel::Lehmer17 {
            AtmEsc::seed_lehmer_aux(b);
        }

        // Roche-lobe enhancement from the star only; circumbinary planets
        // are exempt.
        let xi = ((b.mass / (3.0 * star_mass)).powf(1.0 / 3.0) * b.semi_major)
            / (b.radius * b.x_frac);
        if b.circumbinary {
            b.ktide = 1.0;
        } else {
            if xi > 1.0 {
                b.ktide = 1.0 - 3.0 / (2.0 * xi) + 1.0 / (2.0 * xi.powi(3));
            } else if !b.roche_message {
                warn!(
                    "Roche lobe radius is larger than the XUV radius for {}, evolution may not be accurate",
                    b.name
                );
                b.roche_message = true;
            }
            b.ktide = 1.0;
        }

        if b.calc_fxuv {
            b.fxuv = star_lxuv
                / (4.0 * PI * b.semi_major * b.semi_major * (1.0 - b.ecc * b.ecc).sqrt());
        }

        if b.xuv_eff_model == XuvEffModel::Bolmont16 {
            b.eps_h2o = xuv_eff_bolmont16(b.fxuv);
        }

        // Energy-limited reference hydrogen flux for water loss.
        b.fh_ref =
            (b.eps_h2o * b.fxuv * b.radius) / (4.0 * BIGG * b.mass * b.ktide * ATOMMASS);

        let g = BIGG * b.mass / (b.radius * b.radius);
        let xo = oxygen_mixing_ratio(b.surface_water_mass, b.oxygen_mass);
        let bd = bdiff(b.flow_temp);
        b.fh_diff_lim =
            bd * g * ATOMMASS * (QOH - 1.0) / (KBOLTZ * b.flow_temp * (1.0 + xo / (1.0 - xo)));

        if !does_water_escape(b, instell, rg_flux) {
            b.oxygen_eta = 0.0;
            b.crossover_mass = 0.0;
            b.runaway = false;
            b.escape_regime = EscapeRegime::None;
            b.mdot_water = 0.0;
            return;
        }

        b.runaway = true;

        match b.water_loss_model {
            WaterLossModel::Lb15 => {
                let x = (KBOLTZ * b.flow_temp * b.fh_ref) / (10.0 * bd * g * ATOMMASS);
                if x < 1.0 {
                    b.oxygen_eta = 0.0;
                    b.crossover_mass = ATOMMASS + 1.5 * KBOLTZ * b.flow_temp * b.fh_ref / (bd * g);
                } else {
                    b.oxygen_eta = (x - 1.0) / (x + 8.0);
                    b.crossover_mass =
                        43.0 / 3.0 * ATOMMASS + KBOLTZ * b.flow_temp * b.fh_ref / (6.0 * bd * g);
                }
            }
            WaterLossModel::LbExact | WaterLossModel::Tian => {
                let threshold = (QOH - 1.0) * (1.0 - xo) * (bd * g * ATOMMASS)
                    / (KBOLTZ * b.flow_temp);
                if b.fh_ref < threshold {
                    // Crossover mass below the oxygen mass: O stays behind.
                    b.crossover_mass = ATOMMASS
                        + (1.0 / (1.0 - xo)) * (KBOLTZ * b.flow_temp * b.fh_ref) / (bd * g);
                    b.oxygen_eta = 0.0;
                } else {
                    let num = 1.0 + (xo / (1.0 - xo)) * QOH * QOH;
                    let den = 1.0 + (xo / (1.0 - xo)) * QOH;
                    b.crossover_mass = ATOMMASS * num / den
                        + (KBOLTZ * b.flow_temp * b.fh_ref) / ((1.0 + xo * (QOH - 1.0)) * bd * g);
                    let rat = (b.crossover_mass / ATOMMASS - QOH)
                        / (b.crossover_mass / ATOMMASS - 1.0);
                    b.oxygen_eta = 2.0 * xo / (1.0 - xo) * rat;
                }
            }
        }

        if xo > 0.6 && b.water_loss_model == WaterLossModel::LbExact {
            // Oxygen-dominated flow drops into the diffusion limit
            // (Schaefer et al. 2016, section 2.2).
            b.escape_regime = EscapeRegime::DiffusionLimited;
            b.oxygen_eta = 0.0;
            b.mdot_water = b.fh_diff_lim
                * (4.0 * ATOMMASS * PI * b.radius * b.radius * b.x_frac * b.x_frac);
        } else {
            b.escape_regime = EscapeRegime::EnergyLimited;
            b.mdot_water =
                b.fh_ref * (4.0 * ATOMMASS * PI * b.radius * b.radius * b.x_frac * b.x_frac);
        }
    }

    fn force_behavior(&self, bodies: &mut [Body], matrix: &mut [BodyMatrix], i: usize) {
        let b = &mut bodies[i];

        if b.surface_water_mass <= b.min_surface_water_mass && b.surface_water_mass > 0.0 {
            // Desiccated: snap to zero and stay there.
            b.surface_water_mass = 0.0;
        }

        if b.envelope_mass <= b.min_envelope_mass && b.envelope_mass > 0.0 {
            // The envelope is gone: retire its equation.
            b.envelope_mass = 0.0;
            matrix[i].set_compute(Quantity::EnvelopeMass, ModuleId::AtmEsc, stub_tiny);

            if b.planet_radius_model == PlanetRadiusModel::Lopez12 {
                if !b.envelope_lost_message {
                    info!(
                        "{}'s envelope removed; switching to the solid mass-radius relation",
                        b.name
                    );
                    b.envelope_lost_message = true;
                }
                b.radius = sotin07_radius(b.mass);
            }
        }
    }

    fn body_copy(&self, dest: &mut Body, src: &Body) {
        dest.surface_water_mass = src.surface_water_mass;
        dest.oxygen_mass = src.oxygen_mass;
        dest.oxygen_mantle_mass = src.oxygen_mantle_mass;
        dest.envelope_mass = src.envelope_mass;
        dest.x_frac = src.x_frac;
        dest.eps_h = src.eps_h;
        dest.eps_h2o = src.eps_h2o;
        dest.min_surface_water_mass = src.min_surface_water_mass;
        dest.min_envelope_mass = src.min_envelope_mass;
        dest.water_loss_model = src.water_loss_model;
        dest.xuv_eff_model = src.xuv_eff_model;
        dest.ktide = src.ktide;
        dest.mdot_water = src.mdot_water;
        dest.fh_ref = src.fh_ref;
        dest.oxygen_eta = src.oxygen_eta;
        dest.crossover_mass = src.crossover_mass;
        dest.runaway = src.runaway;
        dest.escape_regime = src.escape_regime;
        dest.fh_diff_lim = src.fh_diff_lim;
        dest.planet_radius_model = src.planet_radius_model;
        dest.instant_o2_sink = src.instant_o2_sink;
        dest.rg_duration = src.rg_duration;
        dest.rad_xuv = src.rad_xuv;
        dest.rad_solid = src.rad_solid;
        dest.pres_xuv = src.pres_xuv;
        dest.pres_surf = src.pres_surf;
        dest.scale_height = src.scale_height;
        dest.grav_accel = src.grav_accel;
        dest.therm_temp = src.therm_temp;
        dest.flow_temp = src.flow_temp;
        dest.atm_gas_const = src.atm_gas_const;
        dest.fxuv = src.fxuv;
        dest.calc_fxuv = src.calc_fxuv;
        dest.jeans_time = src.jeans_time;
        dest.roche_message = src.roche_message;
        dest.envelope_lost_message = src.envelope_lost_message;
    }

    fn count_halts(&self, halt: &HaltPolicy) -> usize {
        usize::from(halt.surface_desiccated) + usize::from(halt.envelope_gone)
    }

    fn verify_halt(&self, halt: &HaltPolicy, halts: &mut Vec<HaltFn>) {
        if halt.surface_desiccated {
            halts.push(halt_surface_desiccated);
        }
        if halt.envelope_gone {
            halts.push(halt_envelope_gone);
        }
    }

    fn log_body(&self, world: &World, i: usize, out: &mut String) {
        let b = &world.bodies[i];
        let _ = writeln!(
            out,
            "(RGDuration) Runaway Greenhouse Duration [years]: {:.5e}",
            b.rg_duration / YEARSEC
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn earthlike(water_oceans: f64) -> Vec<Body> {
        let mut star = Body::named("star");
        star.mass = MSUN;
        star.luminosity = LSUN;
        star.temperature = TSUN;
        star.lxuv = 1.0e-3 * LSUN;
        star.age = 1.0e8 * YEARSEC;
        star.stellar_model = crate::body::StellarModel::None;

        let mut planet = Body::named("planet");
        planet.mass = MEARTH;
        planet.radius = REARTH;
        planet.semi_major = 0.05 * AUM;
        planet.surface_water_mass = water_oceans * TOMASS;
        planet.age = star.age;
        vec![star, planet]
    }

    #[test]
    fn mixing_ratio_bounds_and_edge_cases() {
        assert_eq!(oxygen_mixing_ratio(0.0, 0.0), 0.0);
        assert_eq!(oxygen_mixing_ratio(0.0, 1.0e19), 1.0);
        // Pure water: X_O = 1/3.
        assert_relative_eq!(oxygen_mixing_ratio(1.0e21, 0.0), 1.0 / 3.0, epsilon = 1e-12);
        for o2 in [0.0, 1.0e18, 1.0e20, 1.0e22] {
            let xo = oxygen_mixing_ratio(1.0e21, o2);
            assert!((0.0..=1.0).contains(&xo));
        }
    }

    #[rstest]
    #[case(1.0e-4)]
    #[case(1.0)]
    #[case(1.0e2)]
    #[case(1.0e4)]
    fn bolmont_efficiency_stays_physical(#[case] fxuv: f64) {
        let eps = xuv_eff_bolmont16(fxuv);
        assert!((0.0..1.0).contains(&eps));
    }

    #[test]
    fn bolmont_efficiency_vanishes_off_the_fit() {
        assert_eq!(xuv_eff_bolmont16(1.0e-8), 0.0);
        assert_eq!(xuv_eff_bolmont16(1.0e9), 0.0);
    }

    #[test]
    fn sotin_is_continuous_at_one_earth_mass() {
        let below = sotin07_radius(MEARTH * (1.0 - 1e-9));
        let above = sotin07_radius(MEARTH * (1.0 + 1e-9));
        assert_relative_eq!(below, above, max_relative = 1e-6);
        assert_relative_eq!(sotin07_radius(MEARTH), REARTH, max_relative = 1e-12);
    }

    #[test]
    fn lopez_radius_shrinks_with_envelope_loss() {
        let with_env = lopez12_radius(MEARTH, 0.01, 1.0e9 * YEARSEC);
        let without = lopez12_radius(MEARTH, 0.0, 1.0e9 * YEARSEC);
        assert!(with_env > without);
    }

    #[test]
    fn lehmer_radius_collapses_to_solid_surface_at_low_pressure() {
        let r = lehmer_radius(REARTH, 5.0, 1.0e5, 1.0);
        assert_eq!(r, REARTH);
        let inflated = lehmer_radius(REARTH, 5.0, 1.0e5, 500.0);
        assert!(inflated > REARTH);
    }

    #[test]
    fn ktide_is_overwritten_to_unity() {
        // EXPECTED_QUIRK: the Roche enhancement is computed for xi > 1 and
        // then unconditionally replaced by 1.0, matching the behavior the
        // reference runs were published with.
        let mut bodies = earthlike(1.0);
        let s = System::default();
        AtmEsc.props_aux(&mut bodies, &s, 1);
        assert_eq!(bodies[1].ktide, 1.0);
        assert!(!bodies[1].roche_message);
    }

    #[test]
    fn roche_warning_is_one_shot() {
        let mut bodies = earthlike(1.0);
        // Force xi <= 1 with an absurdly inflated radius.
        bodies[1].radius = 100.0 * REARTH;
        let s = System::default();
        AtmEsc.props_aux(&mut bodies, &s, 1);
        assert!(bodies[1].roche_message);
        assert_eq!(bodies[1].ktide, 1.0);
        AtmEsc.props_aux(&mut bodies, &s, 1);
        assert!(bodies[1].roche_message);
    }

    #[test]
    fn close_in_planet_enters_energy_limited_runaway() {
        let mut bodies = earthlike(1.0);
        let s = System::default();
        AtmEsc.props_aux(&mut bodies, &s, 1);
        let b = &bodies[1];
        assert!(b.runaway);
        assert_eq!(b.escape_regime, EscapeRegime::EnergyLimited);
        assert!(b.mdot_water > 0.0);
        assert!(surface_water_deriv(&bodies, &s, &[1]) < 0.0);
    }

    #[test]
    fn distant_planet_keeps_its_water() {
        let mut bodies = earthlike(1.0);
        bodies[1].semi_major = 2.0 * AUM;
        let s = System::default();
        AtmEsc.props_aux(&mut bodies, &s, 1);
        let b = &bodies[1];
        assert!(!b.runaway);
        assert_eq!(b.escape_regime, EscapeRegime::None);
        // Outside the runaway limit the greenhouse phase is over at once.
        assert_relative_eq!(b.rg_duration, b.age, max_relative = 1e-12);
        assert_eq!(surface_water_deriv(&bodies, &s, &[1]), 0.0);
    }

    #[test]
    fn oxygen_rich_flow_switches_to_diffusion_limit() {
        let mut bodies = earthlike(1.0);
        // Load the atmosphere with O2 so X_O > 0.6.
        bodies[1].oxygen_mass = 20.0 * bodies[1].surface_water_mass;
        let s = System::default();
        AtmEsc.props_aux(&mut bodies, &s, 1);
        let b = &bodies[1];
        assert!(oxygen_mixing_ratio(b.surface_water_mass, b.oxygen_mass) > 0.6);
        assert_eq!(b.escape_regime, EscapeRegime::DiffusionLimited);
        assert_eq!(b.oxygen_eta, 0.0);
    }

    #[test]
    fn jeans_transition_stops_water_loss() {
        let mut bodies = earthlike(1.0);
        bodies[1].jeans_time = 1.0e9 * YEARSEC;
        bodies[0].age = 2.0e9 * YEARSEC;
        let s = System::default();
        AtmEsc.props_aux(&mut bodies, &s, 1);
        assert!(!bodies[1].runaway);
        assert_eq!(surface_water_deriv(&bodies, &s, &[1]), 0.0);
    }

    #[test]
    fn envelope_shields_water_and_rg_duration_latches() {
        let mut bodies = earthlike(1.0);
        bodies[1].envelope_mass = 0.01 * MEARTH;
        bodies[1].semi_major = 2.0 * AUM; // outside the runaway limit
        let s = System::default();
        AtmEsc.props_aux(&mut bodies, &s, 1);
        assert!(!bodies[1].runaway);
        assert_relative_eq!(bodies[1].rg_duration, bodies[1].age, max_relative = 1e-12);
    }

    #[test]
    fn force_behavior_desiccates_and_retires_envelope_once() {
        let mut bodies = earthlike(1.0);
        bodies[1].surface_water_mass = 0.5 * bodies[1].min_surface_water_mass;
        bodies[1].envelope_mass = 0.5 * bodies[1].min_envelope_mass;
        bodies[1].planet_radius_model = PlanetRadiusModel::Lopez12;
        let mut matrix = vec![BodyMatrix::new(), BodyMatrix::new()];
        matrix[1]
            .claim_rate(Quantity::EnvelopeMass, VarKind::Rate, ModuleId::AtmEsc, 1, vec![1])
            .unwrap();
        matrix[1].set_compute(Quantity::EnvelopeMass, ModuleId::AtmEsc, envelope_deriv);

        AtmEsc.force_behavior(&mut bodies, &mut matrix, 1);
        assert_eq!(bodies[1].surface_water_mass, 0.0);
        assert_eq!(bodies[1].envelope_mass, 0.0);
        assert!(bodies[1].envelope_lost_message);
        assert_relative_eq!(
            bodies[1].radius,
            sotin07_radius(bodies[1].mass),
            max_relative = 1e-12
        );

        // Second invocation is a no-op: the message already fired and the
        // primaries sit exactly at zero.
        let msg_state = bodies[1].envelope_lost_message;
        AtmEsc.force_behavior(&mut bodies, &mut matrix, 1);
        assert_eq!(bodies[1].envelope_lost_message, msg_state);
    }

    #[test]
    fn desiccated_planet_contributes_zero_water_rate() {
        let mut bodies = earthlike(1.0);
        let s = System::default();
        AtmEsc.props_aux(&mut bodies, &s, 1);
        assert!(bodies[1].runaway);
        bodies[1].surface_water_mass = 0.0;
        assert_eq!(surface_water_deriv(&bodies, &s, &[1]), 0.0);
    }

    #[test]
    fn instant_sink_routes_oxygen_to_the_mantle() {
        let mut bodies = earthlike(1.0);
        let s = System::default();
        AtmEsc.props_aux(&mut bodies, &s, 1);

        bodies[1].instant_o2_sink = false;
        let atm = oxygen_deriv(&bodies, &s, &[1]);
        let mantle = oxygen_mantle_deriv(&bodies, &s, &[1]);
        assert!(atm > 0.0);
        assert_eq!(mantle, 0.0);

        bodies[1].instant_o2_sink = true;
        let atm2 = oxygen_deriv(&bodies, &s, &[1]);
        let mantle2 = oxygen_mantle_deriv(&bodies, &s, &[1]);
        assert_eq!(atm2, 0.0);
        assert_relative_eq!(mantle2, atm, max_relative = 1e-12);
    }
}
