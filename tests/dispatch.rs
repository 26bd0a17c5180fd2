//! Dispatch-matrix contracts: scratch-body reconstruction, exclusive
//! ownership of value-driven variables, and the timestep bound.

extern crate aeon;
extern crate pretty_env_logger;

mod common;

use aeon::body::{body_copy_general, Body, EscapeRegime, StellarModel};
use aeon::consts::*;
use aeon::errors::AeonError;
use aeon::evolve::EvolveOpts;
use aeon::module::Module;
use aeon::modules::{AtmEsc, Stellar};
use common::{build_engine, constant_sun, grid_star, no_halts, ocean_planet};

fn init_logs() {
    if pretty_env_logger::try_init().is_err() {
        println!("could not init env_logger");
    }
}

/// Scramble every field the integrator or the auxiliary passes may touch.
fn scramble(b: &mut Body) {
    b.mass *= 1.1;
    b.radius *= 0.9;
    b.age += 1.0e6;
    b.semi_major *= 1.01;
    b.ecc += 0.01;
    b.obliquity += 0.1;
    b.mean_motion += 1.0e-9;
    b.position = [1.0, 2.0, 3.0];
    b.velocity = [4.0, 5.0, 6.0];
    b.rot_rate *= 2.0;
    b.lost_ang_mom += 1.0e30;
    b.lost_eng += 1.0e30;

    b.surface_water_mass += 1.0e19;
    b.oxygen_mass += 1.0e18;
    b.oxygen_mantle_mass += 1.0e18;
    b.envelope_mass += 1.0e20;
    b.ktide = 0.5;
    b.fxuv += 10.0;
    b.fh_ref += 1.0e10;
    b.oxygen_eta = 0.7;
    b.crossover_mass = 1.0e-26;
    b.runaway = !b.runaway;
    b.escape_regime = EscapeRegime::DiffusionLimited;
    b.fh_diff_lim += 1.0e10;
    b.mdot_water += 1.0e5;
    b.rg_duration += 1.0e12;
    b.rad_xuv = 1.0e7;
    b.rad_solid = 5.0e6;
    b.pres_surf = 1.0e4;
    b.scale_height = 2.0e5;
    b.grav_accel = 11.0;
    b.eps_h2o *= 0.5;
    b.roche_message = !b.roche_message;
    b.envelope_lost_message = !b.envelope_lost_message;

    b.luminosity *= 1.5;
    b.temperature += 100.0;
    b.rad_gyra *= 0.8;
    b.lxuv += 1.0e20;
    b.rot_per *= 3.0;
    b.stellar_model = StellarModel::Const;
    b.grid_message = !b.grid_message;
}

/// The general copy composed with every active module's copy rebuilds the
/// scratch body field-for-field, no matter how badly the substeps mangled
/// it.
#[test]
fn composed_body_copies_restore_the_scratch_body() {
    init_logs();
    let mut reference = ocean_planet(1.0, 0.05, 1.0);
    reference.envelope_mass = 0.01 * MEARTH;
    reference.oxygen_mass = 1.0e18;

    let mut scratch = reference.clone();
    scramble(&mut scratch);
    assert_ne!(scratch, reference);

    body_copy_general(&mut scratch, &reference);
    AtmEsc.body_copy(&mut scratch, &reference);
    Stellar.body_copy(&mut scratch, &reference);
    assert_eq!(scratch, reference);
}

/// Two modules claiming the same value-driven variable is a verification
/// error, not a silent overwrite: with both modules active on the star they
/// contend for its radius.
#[test]
fn duplicate_value_ownership_is_fatal() {
    init_logs();
    let star = constant_sun();
    let opts = EvolveOpts::with_variable_step(1.0e9 * YEARSEC, 1.0e8 * YEARSEC, 0.1, YEARSEC);
    let err = build_engine(vec![star], &[&["stellar", "atmesc"]], no_halts(1), opts)
        .expect_err("conflicting radius ownership went unnoticed");
    match err {
        AeonError::DuplicateOwnership {
            quantity, first, second, ..
        } => {
            assert_eq!(quantity, "Radius");
            assert_eq!(first, "stellar");
            assert_eq!(second, "atmesc");
        }
        other => panic!("expected an ownership error, got {other:?}"),
    }
}

/// Every committed step obeys both selector bounds: never past the next
/// output, never more than eta times the smallest characteristic time.
#[test]
fn dt_respects_both_selector_bounds() {
    init_logs();
    let star = grid_star(0.3, 1.0e6, 5.0);
    let mut planet = ocean_planet(1.0, 0.05, 1.0);
    planet.envelope_mass = 1.0e-3 * MEARTH;
    let opts = EvolveOpts::with_variable_step(
        1.0e9 * YEARSEC,
        1.0e6 * YEARSEC,
        0.05,
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

    for _ in 0..200 {
        if engine.advance_one().unwrap().is_some() {
            break;
        }
        let details = engine.latest_details();
        assert!(details.dt > 0.0);
        assert!(details.dt <= details.to_next_output * (1.0 + 1.0e-12));
        assert!(details.dt <= 0.05 * details.min_timescale * (1.0 + 1.0e-12));
    }
}

/// The matrix shape is fixed at verification: retiring the envelope swaps a
/// compute function but neither adds nor removes variables.
#[test]
fn matrix_shape_never_changes() {
    init_logs();
    let star = grid_star(0.3, 1.0e6, 5.0);
    let mut planet = ocean_planet(2.0, 0.02, 0.0);
    planet.envelope_mass = 1.0e-4 * MEARTH;
    planet.planet_radius_model = aeon::body::PlanetRadiusModel::Lopez12;
    let opts =
        EvolveOpts::with_variable_step(1.0e8 * YEARSEC, 1.0e6 * YEARSEC, 0.1, 1.0e2 * YEARSEC);
    let mut engine = build_engine(
        vec![star, planet],
        &[&["stellar"], &["atmesc"]],
        no_halts(2),
        opts,
    )
    .unwrap();
    engine.refresh_aux();
    engine.refresh_derivatives();

    let shape: Vec<usize> = engine.matrix.iter().map(|m| m.vars.len()).collect();
    for _ in 0..400 {
        if engine.advance_one().unwrap().is_some() {
            break;
        }
        let now: Vec<usize> = engine.matrix.iter().map(|m| m.vars.len()).collect();
        assert_eq!(now, shape);
        if engine.world.bodies[1].envelope_mass == 0.0 {
            break;
        }
    }
    assert_eq!(engine.world.bodies[1].envelope_mass, 0.0);
}

/// EXPECTED_QUIRK: the Roche-lobe enhancement is computed and then
/// unconditionally overwritten with unity, reproducing the behavior the
/// reference histories were published with. A physically complete treatment
/// would keep the computed factor; this suite pins the published one.
#[test]
fn ktide_expected_quirk_is_replicated() {
    init_logs();
    let star = constant_sun();
    let planet = ocean_planet(1.0, 0.05, 1.0);
    let opts =
        EvolveOpts::with_variable_step(1.0e6 * YEARSEC, 1.0e5 * YEARSEC, 0.1, 1.0e2 * YEARSEC);
    let mut engine = build_engine(
        vec![star, planet],
        &[&["stellar"], &["atmesc"]],
        no_halts(2),
        opts,
    )
    .unwrap();
    engine.refresh_aux();

    // xi > 1 here, so a faithful Roche treatment would set ktide < 1; the
    // replicated behavior pins it to exactly one.
    let b = &engine.world.bodies[1];
    let xi = (b.mass / (3.0 * engine.world.bodies[0].mass)).powf(1.0 / 3.0) * b.semi_major
        / (b.radius * b.x_frac);
    assert!(xi > 1.0);
    assert_eq!(b.ktide, 1.0);
    assert!(!b.roche_message);
}

/// Cross-body reads flow downstream: the planet's XUV flux follows the
/// star's XUV luminosity computed earlier in the same auxiliary pass.
#[test]
fn planets_read_the_star_in_index_order() {
    init_logs();
    let star = grid_star(0.3, 1.0e6, 5.0);
    let planet = ocean_planet(1.0, 0.05, 1.0);
    let opts =
        EvolveOpts::with_variable_step(1.0e9 * YEARSEC, 1.0e8 * YEARSEC, 0.1, 1.0e3 * YEARSEC);
    let mut engine = build_engine(
        vec![star, planet],
        &[&["stellar"], &["atmesc"]],
        no_halts(2),
        opts,
    )
    .unwrap();
    engine.refresh_aux();

    let star = &engine.world.bodies[0];
    let planet = &engine.world.bodies[1];
    let expected = star.lxuv
        / (4.0
            * std::f64::consts::PI
            * planet.semi_major
            * planet.semi_major
            * (1.0 - planet.ecc * planet.ecc).sqrt());
    assert!(star.lxuv > 0.0);
    assert!((planet.fxuv - expected).abs() <= 1.0e-9 * expected);
    // The planet's age was synced to the star's during the same pass.
    assert_eq!(planet.age, star.age);
}
