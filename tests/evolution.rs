//! End-to-end evolution scenarios: full runs of the engine with both physics
//! modules, checked against the qualitative behavior the published models
//! predict.

extern crate aeon;
extern crate pretty_env_logger;

mod common;

use aeon::body::{EscapeRegime, PlanetRadiusModel, StellarModel};
use aeon::consts::*;
use aeon::evolve::{EvolveOpts, NullSink};
use aeon::module::HaltPolicy;
use aeon::modules::atmesc::{oxygen_mixing_ratio, sotin07_radius};
use common::{build_engine, constant_sun, grid_star, no_halts, ocean_planet, Recorder};

fn init_logs() {
    if pretty_env_logger::try_init().is_err() {
        println!("could not init env_logger");
    }
}

/// An Earth twin at one au of a constant sun keeps its ocean: the cold trap
/// holds and neither water loss nor oxygen buildup gets going.
#[test]
fn earth_at_one_au_keeps_its_water() {
    init_logs();
    let star = constant_sun();
    let planet = ocean_planet(1.0, 1.0, 1.0);
    let opts = EvolveOpts::with_variable_step(
        5.0e9 * YEARSEC,
        5.0e8 * YEARSEC,
        0.1,
        1.0e3 * YEARSEC,
    );
    let mut engine = build_engine(
        vec![star, planet],
        &[&["stellar"], &["atmesc"]],
        no_halts(2),
        opts,
    )
    .unwrap();

    let outcome = engine.evolve(&mut NullSink).unwrap();
    assert_eq!(outcome.halted, None);
    assert!(outcome.end_time >= 5.0e9 * YEARSEC);

    let planet = &engine.world.bodies[1];
    // Well under the 10% loss bound; with the cold trap closed the loss is
    // exactly zero.
    assert!(planet.surface_water_mass >= 0.9 * TOMASS);
    let bars =
        planet.oxygen_mass * 1.0e-5 * BIGG * planet.mass / (4.0 * std::f64::consts::PI * planet.radius.powi(4));
    assert!(bars < 100.0);
}

fn envelope_planet() -> aeon::body::Body {
    let mut planet = ocean_planet(2.0, 0.02, 0.0);
    planet.envelope_mass = 0.01 * MEARTH;
    planet.planet_radius_model = PlanetRadiusModel::Lopez12;
    planet
}

/// A sub-Neptune loses its envelope: the mass drops monotonically, the
/// radius shrinks monotonically, and the switch to the solid mass-radius
/// relation announces itself exactly once.
#[test]
fn envelope_erosion_is_monotonic_and_switches_radius_model_once() {
    init_logs();
    let star = grid_star(0.3, 1.0e6, 5.0);
    let opts = EvolveOpts::with_variable_step(
        1.0e9 * YEARSEC,
        1.0e7 * YEARSEC,
        0.1,
        1.0e3 * YEARSEC,
    );
    let mut engine = build_engine(
        vec![star, envelope_planet()],
        &[&["stellar"], &["atmesc"]],
        no_halts(2),
        opts,
    )
    .unwrap();

    let mut rec = Recorder::default();
    let outcome = engine.evolve(&mut rec).unwrap();
    assert_eq!(outcome.halted, None);

    let mut last_env = f64::MAX;
    let mut last_radius = f64::MAX;
    for frame in &rec.frames {
        let p = &frame[1];
        assert!(p.envelope_mass <= last_env + 1.0e-6);
        assert!(p.radius <= last_radius * (1.0 + 1.0e-12));
        last_env = p.envelope_mass;
        last_radius = p.radius;
    }

    let planet = &engine.world.bodies[1];
    assert_eq!(planet.envelope_mass, 0.0);
    assert!(planet.envelope_lost_message);
    assert!(
        (planet.radius - sotin07_radius(planet.mass)).abs() < 1.0e-6 * planet.radius,
        "post-evaporation radius should follow the solid relation"
    );

    // Once at the floor, the envelope stays there.
    let gone_since = rec
        .frames
        .iter()
        .position(|f| f[1].envelope_mass == 0.0)
        .expect("the envelope never reached its floor");
    for frame in &rec.frames[gone_since..] {
        assert_eq!(frame[1].envelope_mass, 0.0);
    }
}

/// The same configuration with bHaltEnvelopeGone stops at the step the
/// envelope reaches its floor, emits the terminal snapshot, and takes no
/// more steps than the free-running twin needed to get there.
#[test]
fn envelope_halt_stops_at_the_floor() {
    init_logs();
    let opts = EvolveOpts::with_variable_step(
        1.0e9 * YEARSEC,
        1.0e7 * YEARSEC,
        0.1,
        1.0e3 * YEARSEC,
    );

    let mut free = build_engine(
        vec![grid_star(0.3, 1.0e6, 5.0), envelope_planet()],
        &[&["stellar"], &["atmesc"]],
        no_halts(2),
        opts,
    )
    .unwrap();
    let free_outcome = free.evolve(&mut NullSink).unwrap();

    let halts = vec![
        HaltPolicy::default(),
        HaltPolicy {
            envelope_gone: true,
            ..Default::default()
        },
    ];
    let mut halting = build_engine(
        vec![grid_star(0.3, 1.0e6, 5.0), envelope_planet()],
        &[&["stellar"], &["atmesc"]],
        halts,
        opts,
    )
    .unwrap();
    let mut rec = Recorder::default();
    let outcome = halting.evolve(&mut rec).unwrap();

    assert_eq!(outcome.halted, Some(1));
    assert!(outcome.end_time < 1.0e9 * YEARSEC);
    assert!(outcome.steps <= free_outcome.steps);
    // Terminal snapshot present and consistent with the halted state.
    let last = rec.frames.last().unwrap();
    assert!(last[1].envelope_mass <= last[1].min_envelope_mass);
}

/// A fully convective star spun at one day brakes onto the slow-rotator
/// sequence over 10 Gyr, shedding angular momentum monotonically.
#[test]
fn low_mass_star_spins_down_onto_the_slow_sequence() {
    init_logs();
    let star = grid_star(0.1, 1.0e6, 1.0);
    let opts = EvolveOpts::with_variable_step(
        1.0e10 * YEARSEC,
        5.0e8 * YEARSEC,
        0.1,
        1.0e4 * YEARSEC,
    );
    let mut engine = build_engine(vec![star], &[&["stellar"]], no_halts(1), opts).unwrap();

    let mut rec = Recorder::default();
    let outcome = engine.evolve(&mut rec).unwrap();
    assert_eq!(outcome.halted, None);

    let star = &engine.world.bodies[0];
    let final_days = star.rot_per / DAYSEC;
    assert!(
        (80.0..=200.0).contains(&final_days),
        "final rotation period {final_days:.1} days off the slow sequence"
    );

    let mut last_j = -1.0;
    for frame in &rec.frames {
        assert!(frame[0].lost_ang_mom >= last_j);
        last_j = frame[0].lost_ang_mom;
    }
    assert!(last_j > 0.0);
}

/// Ten Gyr runs the bundled grid off its high end: the star latches to
/// constant values and the end-of-grid halt fires when requested.
#[test]
fn grid_end_latches_and_halts() {
    init_logs();
    let star = grid_star(0.5, 1.0e6, 3.0);
    let opts = EvolveOpts::with_variable_step(
        1.2e10 * YEARSEC,
        1.0e9 * YEARSEC,
        0.1,
        1.0e4 * YEARSEC,
    );
    let halts = vec![HaltPolicy {
        end_of_grid: true,
        ..Default::default()
    }];
    let mut engine = build_engine(vec![star], &[&["stellar"]], halts, opts).unwrap();
    let outcome = engine.evolve(&mut NullSink).unwrap();

    assert_eq!(outcome.halted, Some(0));
    assert_eq!(engine.world.bodies[0].stellar_model, StellarModel::Const);
    assert!(engine.world.bodies[0].grid_message);
}

/// Oxygen accumulates in a weak-XUV steam atmosphere until atomic oxygen
/// dominates the flow; the escape regime then switches from energy-limited
/// to diffusion-limited exactly at the X_O = 0.6 crossing.
#[test]
fn escape_regime_switches_at_the_oxygen_crossing() {
    init_logs();
    let star = constant_sun();
    let mut planet = ocean_planet(1.0, 0.05, 1.0);
    // Pin a weak XUV flux so the crossover mass sits below oxygen and the
    // O2 reservoir actually grows.
    planet.fxuv = 0.2;
    planet.calc_fxuv = false;

    let opts = EvolveOpts::with_variable_step(
        5.0e8 * YEARSEC,
        1.0e7 * YEARSEC,
        0.1,
        1.0e3 * YEARSEC,
    );
    let mut engine = build_engine(
        vec![star, planet],
        &[&["stellar"], &["atmesc"]],
        no_halts(2),
        opts,
    )
    .unwrap();

    engine.refresh_aux();
    engine.refresh_derivatives();

    let mut saw_energy_limited = false;
    let mut flip: Option<(f64, f64)> = None; // X_O before and after
    let mut prev_xo = 0.0;
    for _ in 0..5000 {
        let b = &engine.world.bodies[1];
        assert_eq!(b.rg_duration, 0.0, "always inside the runaway limit");
        match b.escape_regime {
            EscapeRegime::EnergyLimited => {
                saw_energy_limited = true;
                assert!(
                    oxygen_mixing_ratio(b.surface_water_mass, b.oxygen_mass) <= 0.6 + 1.0e-9
                );
            }
            EscapeRegime::DiffusionLimited => {
                let xo = oxygen_mixing_ratio(b.surface_water_mass, b.oxygen_mass);
                flip = Some((prev_xo, xo));
                assert_eq!(b.oxygen_eta, 0.0);
                break;
            }
            EscapeRegime::None => {}
        }
        prev_xo = oxygen_mixing_ratio(b.surface_water_mass, b.oxygen_mass);
        if engine.advance_one().unwrap().is_some() {
            break;
        }
    }

    assert!(saw_energy_limited);
    let (before, after) = flip.expect("the diffusion-limited regime never engaged");
    assert!(before <= 0.6 + 1.0e-9);
    assert!(after > 0.6);
}

/// Past the Jeans transition the flow goes ballistic and the ocean freezes
/// in place, bit for bit.
#[test]
fn jeans_time_shuts_water_loss_off() {
    init_logs();
    let star = constant_sun();
    let mut planet = ocean_planet(1.0, 0.05, 20.0);
    planet.fxuv = 0.2;
    planet.calc_fxuv = false;
    planet.jeans_time = 3.0e8 * YEARSEC;

    let opts = EvolveOpts::with_variable_step(
        6.0e8 * YEARSEC,
        2.0e7 * YEARSEC,
        0.1,
        1.0e3 * YEARSEC,
    );
    let mut engine = build_engine(
        vec![star, planet],
        &[&["stellar"], &["atmesc"]],
        no_halts(2),
        opts,
    )
    .unwrap();

    let mut rec = Recorder::default();
    engine.evolve(&mut rec).unwrap();

    let initial = 20.0 * TOMASS;
    let at_jeans = rec
        .times
        .iter()
        .position(|t| *t >= 3.0e8 * YEARSEC)
        .expect("no snapshot after the Jeans transition");
    assert!(
        rec.frames[at_jeans][1].surface_water_mass < initial,
        "water should escape during the hydrodynamic phase"
    );
    let frozen = rec.frames[at_jeans][1].surface_water_mass;
    for frame in &rec.frames[at_jeans..] {
        assert_eq!(frame[1].surface_water_mass, frozen);
    }
}
