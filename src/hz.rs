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

//! Habitable zone limits and instellation.
//!
//! The five classical limits follow the Kopparapu et al. (2013) effective
//! flux polynomials; the runaway greenhouse threshold used by the escape
//! regime gate is the mass-dependent Kopparapu et al. (2014) fit, reduced to
//! a log-linear relation in planet mass.

use crate::body::Body;
use crate::consts::{AUM, LSUN, MEARTH};
use std::f64::consts::PI;

/// Habitable zone limit indices for [`kopparapu13_limits`].
pub const HZ_RECENT_VENUS: usize = 0;
pub const HZ_RUNAWAY_GREENHOUSE: usize = 1;
pub const HZ_MOIST_GREENHOUSE: usize = 2;
pub const HZ_MAX_GREENHOUSE: usize = 3;
pub const HZ_EARLY_MARS: usize = 4;

/// Orbit-averaged stellar flux at the planet's orbit, W/m^2.
pub fn instellation(bodies: &[Body], i: usize) -> f64 {
    let b = &bodies[i];
    if b.semi_major <= 0.0 {
        return 0.0;
    }
    bodies[0].luminosity
        / (4.0 * PI * b.semi_major * b.semi_major * (1.0 - b.ecc * b.ecc).sqrt())
}

/// The Kopparapu et al. (2013) habitable zone limits, in meters, for a star
/// of the given bolometric luminosity (W) and effective temperature (K).
///
/// Index order: recent Venus, runaway greenhouse, moist greenhouse, maximum
/// greenhouse, early Mars, and the 2 AU cloud limit.
pub fn kopparapu13_limits(luminosity: f64, teff: f64) -> [f64; 6] {
    let seffsun = [1.7763, 1.0385, 1.0146, 0.3507, 0.2946, 0.2484];
    let a = [1.4335e-4, 1.2456e-4, 8.1884e-5, 5.9578e-5, 4.9952e-5, 4.2588e-5];
    let b = [3.3954e-9, 1.4612e-8, 1.9394e-9, 1.6707e-9, 1.3893e-9, 1.1963e-9];
    let c = [
        -7.6364e-12,
        -7.6345e-12,
        -4.3618e-12,
        -3.0058e-12,
        -2.5331e-12,
        -2.1709e-12,
    ];
    let d = [
        -1.1950e-15,
        -1.7511e-15,
        -6.8260e-16,
        -5.1925e-16,
        -4.3896e-16,
        -3.8282e-16,
    ];

    let lum = luminosity / LSUN;
    let tstar = teff - 5700.0;

    let mut limits = [0.0; 6];
    for i in 0..6 {
        let seff = seffsun[i]
            + a[i] * tstar
            + b[i] * tstar * tstar
            + c[i] * tstar.powi(3)
            + d[i] * tstar.powi(4);
        limits[i] = (lum / seff).sqrt() * AUM;
    }
    limits
}

/// Simple least-squares linear regression, y(x) = m x + b. Returns the slope
/// and intercept.
pub fn linear_fit(x: &[f64], y: &[f64]) -> (f64, f64) {
    debug_assert_eq!(x.len(), y.len());
    let n = x.len() as f64;
    let xavg = x.iter().sum::<f64>() / n;
    let yavg = y.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        num += (xi - xavg) * (yi - yavg);
        den += (xi - xavg) * (xi - xavg);
    }
    let slope = num / den;
    (slope, yavg - slope * xavg)
}

/// Mass-dependent runaway greenhouse flux limit for body `i`, W/m^2, from a
/// log-linear fit to the three tabulated planet masses of Kopparapu et al.
/// (2014). Computed against the spectrum of body 0; for a binary this is only
/// valid when body 0 dominates the flux.
pub fn runaway_greenhouse_flux(bodies: &[Body], i: usize) -> f64 {
    let tstar = bodies[0].temperature - 5780.0;

    let log_mp = [-1.0, 0.0, 0.69897];
    let seffsun = [0.99, 1.107, 1.188];
    let a = [1.209e-4, 1.332e-4, 1.433e-4];
    let b = [1.404e-8, 1.58e-8, 1.707e-8];
    let c = [-7.418e-12, -8.308e-12, -8.968e-12];
    let d = [-1.713e-15, -1.931e-15, -2.084e-15];

    let mut seff = [0.0; 3];
    for j in 0..3 {
        seff[j] = seffsun[j]
            + a[j] * tstar
            + b[j] * tstar * tstar
            + c[j] * tstar.powi(3)
            + d[j] * tstar.powi(4);
    }

    let (slope, intercept) = linear_fit(&log_mp, &seff);
    (slope * (bodies[i].mass / MEARTH).log10() + intercept) * LSUN / (4.0 * PI * AUM * AUM)
}
