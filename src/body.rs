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

use crate::consts::*;

/// Water loss and oxygen buildup sub-models for hydrodynamic escape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaterLossModel {
    /// Luger & Barnes (2015), approximate crossover mass.
    Lb15,
    /// Exact crossover-mass solution.
    LbExact,
    /// Tian (2015) variant of the exact solution.
    Tian,
}

/// Evolution model for the XUV absorption efficiency of a steam atmosphere.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XuvEffModel {
    /// Constant, user-supplied efficiency.
    None,
    /// Piecewise polynomial fit to Bolmont et al. (2017).
    Bolmont16,
}

/// Gaseous planet radius sub-models.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanetRadiusModel {
    /// Radius is whatever the user supplied; no evolution.
    None,
    /// Lopez & Fortney (2012) envelope radius, Sotin et al. (2007) once the
    /// envelope is gone.
    Lopez12,
    /// Isothermal scale-height law of Lehmer & Catling (2017).
    Lehmer17,
    /// Empirical relation anchored on Proxima Centauri b.
    ProxCenB,
}

/// Which regime carries the escaping water flux, if any.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscapeRegime {
    None,
    EnergyLimited,
    DiffusionLimited,
}

/// Stellar evolution track selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StellarModel {
    /// No evolution; values stay at their inputs.
    None,
    /// Tabulated pre-main-sequence grid (Baraffe et al. 2015).
    Baraffe,
    /// Bespoke Proxima Centauri fit.
    ProximaCen,
    /// Latched: the track ran off its high end and values are now frozen.
    Const,
}

/// XUV luminosity evolution models.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XuvModel {
    /// Constant saturated fraction of the bolometric luminosity.
    None,
    /// Ribas et al. (2005) saturated power-law decay.
    Ribas,
    /// Reiners, Schussler & Passegger (2014) rotation-activity relation,
    /// X-ray branch only.
    Reiners,
}

/// Wind angular momentum loss models.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindModel {
    None,
    Reiners,
}

/// Magnetic braking torque laws.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MagBrakingModel {
    None,
    /// Reiners & Mohanty (2012).
    Rm12,
    /// Skumanich (1972).
    Sk72,
    /// Matt et al. (2015).
    Matt15,
}

/// A single body: the star (index 0 by convention) or a planet.
///
/// Every physical attribute any module might need lives here. Primary
/// variables are advanced by the integrator through the update matrix;
/// auxiliary quantities are recomputed from primaries before every derivative
/// evaluation; policy fields select sub-models and never change after
/// verification.
#[derive(Clone, Debug, PartialEq)]
pub struct Body {
    pub name: String,

    // Bulk and orbital state.
    pub mass: f64,
    pub radius: f64,
    pub age: f64,
    pub semi_major: f64,
    pub ecc: f64,
    pub obliquity: f64,
    pub mean_motion: f64,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    /// Circumbinary planets skip the Roche-lobe enhancement.
    pub circumbinary: bool,

    // Atmospheric escape: primaries.
    pub surface_water_mass: f64,
    pub oxygen_mass: f64,
    pub oxygen_mantle_mass: f64,
    pub envelope_mass: f64,

    // Atmospheric escape: configuration.
    pub x_frac: f64,
    pub eps_h: f64,
    pub eps_h2o: f64,
    pub min_surface_water_mass: f64,
    pub min_envelope_mass: f64,
    pub water_loss_model: WaterLossModel,
    pub xuv_eff_model: XuvEffModel,
    pub planet_radius_model: PlanetRadiusModel,
    pub instant_o2_sink: bool,
    pub jeans_time: f64,
    pub therm_temp: f64,
    pub flow_temp: f64,
    pub atm_gas_const: f64,
    pub pres_xuv: f64,
    /// False when the user pinned the incident XUV flux in the input file.
    pub calc_fxuv: bool,

    // Atmospheric escape: auxiliaries.
    pub ktide: f64,
    pub fxuv: f64,
    pub fh_ref: f64,
    pub oxygen_eta: f64,
    pub crossover_mass: f64,
    pub runaway: bool,
    pub escape_regime: EscapeRegime,
    pub fh_diff_lim: f64,
    pub mdot_water: f64,
    pub rg_duration: f64,
    pub rad_xuv: f64,
    pub rad_solid: f64,
    pub pres_surf: f64,
    pub scale_height: f64,
    pub grav_accel: f64,

    // One-shot message latches.
    pub roche_message: bool,
    pub envelope_lost_message: bool,
    pub grid_message: bool,

    // Stellar evolution: primaries.
    pub luminosity: f64,
    pub temperature: f64,
    pub rad_gyra: f64,
    pub rot_rate: f64,
    pub lost_ang_mom: f64,
    pub lost_eng: f64,

    // Stellar evolution: configuration.
    pub stellar_model: StellarModel,
    pub xuv_model: XuvModel,
    pub wind_model: WindModel,
    pub mag_braking_model: MagBrakingModel,
    pub sat_xuv_frac: f64,
    pub sat_xuv_time: f64,
    pub xuv_beta: f64,
    pub rossby_cut: bool,
    pub evolve_rg: bool,

    // Stellar evolution: auxiliaries.
    pub lxuv: f64,
    pub rot_per: f64,
}

impl Default for Body {
    fn default() -> Self {
        Body {
            name: String::new(),
            mass: 0.0,
            radius: 0.0,
            age: 0.0,
            semi_major: 0.0,
            ecc: 0.0,
            obliquity: 0.0,
            mean_motion: 0.0,
            position: [0.0; 3],
            velocity: [0.0; 3],
            circumbinary: false,

            surface_water_mass: 0.0,
            oxygen_mass: 0.0,
            oxygen_mantle_mass: 0.0,
            envelope_mass: 0.0,

            x_frac: 1.0,
            eps_h: 0.15,
            eps_h2o: 0.15,
            min_surface_water_mass: 1.0e-5 * TOMASS,
            min_envelope_mass: 1.0e-8 * MEARTH,
            water_loss_model: WaterLossModel::LbExact,
            xuv_eff_model: XuvEffModel::None,
            planet_radius_model: PlanetRadiusModel::None,
            instant_o2_sink: false,
            jeans_time: 1.0e9 * YEARSEC,
            therm_temp: 880.0,
            flow_temp: 400.0,
            atm_gas_const: 4124.0,
            pres_xuv: 5.0,
            calc_fxuv: true,

            ktide: 1.0,
            fxuv: 0.0,
            fh_ref: 0.0,
            oxygen_eta: 0.0,
            crossover_mass: 0.0,
            runaway: false,
            escape_regime: EscapeRegime::None,
            fh_diff_lim: 0.0,
            mdot_water: 0.0,
            rg_duration: 0.0,
            rad_xuv: -1.0,
            rad_solid: -1.0,
            pres_surf: -1.0,
            scale_height: -1.0,
            grav_accel: -1.0,

            roche_message: false,
            envelope_lost_message: false,
            grid_message: false,

            luminosity: 0.0,
            temperature: TSUN,
            rad_gyra: 0.0,
            rot_rate: 2.0 * std::f64::consts::PI / (30.0 * DAYSEC),
            lost_ang_mom: 0.0,
            lost_eng: 0.0,

            stellar_model: StellarModel::Baraffe,
            xuv_model: XuvModel::Ribas,
            wind_model: WindModel::Reiners,
            mag_braking_model: MagBrakingModel::Rm12,
            sat_xuv_frac: 1.0e-3,
            sat_xuv_time: 1.0e8 * YEARSEC,
            xuv_beta: 1.23,
            rossby_cut: false,
            evolve_rg: true,

            lxuv: 0.0,
            rot_per: 30.0 * DAYSEC,
        }
    }
}

impl Body {
    /// A body with just a name; everything else at defaults.
    pub fn named(name: &str) -> Self {
        Body {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Envelope mass fraction, guarded against a zero total mass.
    pub fn envelope_frac(&self) -> f64 {
        if self.mass > 0.0 {
            self.envelope_mass / self.mass
        } else {
            0.0
        }
    }
}

/// System-wide data shared across bodies.
#[derive(Clone, Debug, Default)]
pub struct System {
    pub name: String,
}

/// The full mutable state of one simulation: the system record plus the body
/// vector. Body 0 is the star; planets reference it for flux and habitable
/// zone calculations.
#[derive(Clone, Debug, Default)]
pub struct World {
    pub system: System,
    pub bodies: Vec<Body>,
}

impl World {
    pub fn new(system: System, bodies: Vec<Body>) -> Self {
        World { system, bodies }
    }

    pub fn num_bodies(&self) -> usize {
        self.bodies.len()
    }
}

/// Mean motion from the semi-major axis and the total mass of the pair.
pub fn semi_to_mean_motion(semi: f64, total_mass: f64) -> f64 {
    (BIGG * total_mass / semi.powi(3)).sqrt()
}

/// Module-independent auxiliary recomputation: every planet's mean motion
/// follows its semi-major axis. Runs before the per-module hooks.
pub fn props_aux_general(bodies: &mut [Body]) {
    let star_mass = bodies[0].mass;
    for body in bodies.iter_mut().skip(1) {
        if !body.circumbinary && body.semi_major > 0.0 {
            body.mean_motion = semi_to_mean_motion(body.semi_major, star_mass + body.mass);
        }
    }
}

/// Copies the module-independent fields of `src` onto `dest`. Module hooks
/// are responsible for every field they touch; together with this function
/// they must reconstruct the body exactly.
pub fn body_copy_general(dest: &mut Body, src: &Body) {
    dest.mass = src.mass;
    dest.radius = src.radius;
    dest.age = src.age;
    dest.semi_major = src.semi_major;
    dest.ecc = src.ecc;
    dest.obliquity = src.obliquity;
    dest.mean_motion = src.mean_motion;
    dest.position = src.position;
    dest.velocity = src.velocity;
    dest.rot_rate = src.rot_rate;
    dest.lost_ang_mom = src.lost_ang_mom;
    dest.lost_eng = src.lost_eng;
}
