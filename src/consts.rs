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

//! Physical and numerical constants, all in SI unless stated otherwise.

/// Gravitational constant, m^3 kg^-1 s^-2.
pub const BIGG: f64 = 6.672e-11;

/// Boltzmann constant, J/K.
pub const KBOLTZ: f64 = 1.38064852e-23;

/// Atomic mass unit, kg. Doubles as the hydrogen atom mass in the escape
/// formulae, as in the published derivations.
pub const ATOMMASS: f64 = 1.660538921e-27;

/// Mass ratio of atomic oxygen to atomic hydrogen.
pub const QOH: f64 = 16.0;

/// Solar mass, kg.
pub const MSUN: f64 = 1.988416e30;

/// Solar radius, m.
pub const RSUN: f64 = 6.957e8;

/// Solar luminosity, W.
pub const LSUN: f64 = 3.846e26;

/// Solar effective temperature, K.
pub const TSUN: f64 = 5778.0;

/// Earth mass, kg.
pub const MEARTH: f64 = 5.972186e24;

/// Earth radius, m.
pub const REARTH: f64 = 6.3781e6;

/// Astronomical unit, m.
pub const AUM: f64 = 1.49598e11;

/// Julian year, s.
pub const YEARSEC: f64 = 3.15576e7;

/// Day, s.
pub const DAYSEC: f64 = 86400.0;

/// Mass of one terrestrial ocean of water, kg.
pub const TOMASS: f64 = 1.39e21;

/// Largest representable timescale; variables that cannot constrain the
/// timestep report this.
pub const HUGE_TIME: f64 = f64::MAX;

/// Smallest meaningful rate. Disabled derivative slots return this instead of
/// an exact zero so that downstream divisions remain finite.
pub const TINY_RATE: f64 = 1.0 / f64::MAX;

/// Rossby number above which magnetic braking ceases (van Saders et al. 2018).
pub const ROSSBY_CRIT: f64 = 2.08;

/// Reiners & Mohanty (2012) braking normalization, calibrated so a
/// saturated fully convective star spins down on a ~100 Myr timescale.
pub const RM12_CONST: f64 = 1.1e6;

/// Reiners & Mohanty (2012) saturation rotation rate, rad/s.
pub const RM12_OMEGA_CRIT: f64 = 8.56e-6;

/// Saturation rotation rate for fully convective stars, rad/s.
pub const RM12_OMEGA_CRIT_FULLY_CONVEC: f64 = 1.82e-6;

/// Skumanich (1972) braking constant, calibrated to the present-day solar
/// wind torque.
pub const SK72_CONST: f64 = 1.7e-25;

/// Matt et al. (2015) solar-calibrated torque, N m.
pub const MATT15_T0: f64 = 6.3e23;

/// Matt et al. (2015) saturation parameter chi.
pub const MATT15_X: f64 = 10.0;

/// Matt et al. (2015) solar Rossby number.
pub const MATT15_R0SUN: f64 = 2.16;

/// Matt et al. (2015) solar convective turnover time, s.
pub const MATT15_TAUCZ: f64 = 12.9 * DAYSEC;

/// Matt et al. (2015) solar rotation rate, rad/s.
pub const MATT15_OMEGA_SUN: f64 = 2.6e-6;

/// Effective structure constant relating gravitational binding energy to
/// GM^2/R for a contracting pre-main-sequence star.
pub const ALPHA_STRUCT: f64 = 0.6;
