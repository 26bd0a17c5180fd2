#![allow(dead_code)]

use std::sync::Arc;

use aeon::body::{Body, MagBrakingModel, StellarModel, System, WindModel, World};
use aeon::consts::*;
use aeon::errors::AeonError;
use aeon::evolve::{Engine, EvolveOpts, OutputSink};
use aeon::matrix::BodyMatrix;
use aeon::module::{modules_from_names, HaltPolicy, Module};

/// A star frozen at present-day solar values: no track, no braking. Keeps
/// planet-focused runs free of stellar timescales.
pub fn constant_sun() -> Body {
    let mut star = Body::named("sun");
    star.mass = MSUN;
    star.radius = RSUN;
    star.luminosity = LSUN;
    star.temperature = TSUN;
    star.rad_gyra = 0.27;
    star.age = 5.0e6 * YEARSEC;
    star.stellar_model = StellarModel::None;
    star.mag_braking_model = MagBrakingModel::None;
    star.wind_model = WindModel::None;
    star
}

/// A star evolving on the bundled grid.
pub fn grid_star(mass_solar: f64, age_yr: f64, rot_per_days: f64) -> Body {
    let mut star = Body::named("star");
    star.mass = mass_solar * MSUN;
    star.age = age_yr * YEARSEC;
    star.rot_per = rot_per_days * DAYSEC;
    star.rot_rate = 2.0 * std::f64::consts::PI / star.rot_per;
    star.stellar_model = StellarModel::Baraffe;
    star
}

/// An ocean-bearing rocky planet.
pub fn ocean_planet(mass_earth: f64, semi_au: f64, oceans: f64) -> Body {
    let mut planet = Body::named("b");
    planet.mass = mass_earth * MEARTH;
    planet.radius = REARTH * mass_earth.powf(0.274);
    planet.semi_major = semi_au * AUM;
    planet.surface_water_mass = oceans * TOMASS;
    planet.age = 5.0e6 * YEARSEC;
    planet
}

/// Assemble an engine from bodies and per-body module name lists.
pub fn build_engine(
    bodies: Vec<Body>,
    module_names: &[&[&str]],
    halt_policies: Vec<HaltPolicy>,
    opts: EvolveOpts,
) -> Result<Engine, AeonError> {
    let world = World::new(
        System {
            name: "test".to_string(),
        },
        bodies,
    );
    let mut modules: Vec<Vec<Arc<dyn Module>>> = Vec::new();
    for names in module_names {
        let owned: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        modules.push(modules_from_names(&owned).unwrap());
    }
    Engine::new(world, modules, halt_policies, opts)
}

pub fn no_halts(n: usize) -> Vec<HaltPolicy> {
    vec![HaltPolicy::default(); n]
}

/// Captures a deep copy of the bodies at every snapshot.
#[derive(Default)]
pub struct Recorder {
    pub times: Vec<f64>,
    pub frames: Vec<Vec<Body>>,
}

impl OutputSink for Recorder {
    fn snapshot(
        &mut self,
        world: &World,
        _matrix: &[BodyMatrix],
        time: f64,
        _dt: f64,
    ) -> Result<(), AeonError> {
        self.times.push(time);
        self.frames.push(world.bodies.clone());
        Ok(())
    }
}
