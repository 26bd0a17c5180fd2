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

//! Tabulated pre-main-sequence stellar evolution grid.
//!
//! A coarse distillation of the Baraffe et al. (2015) models: luminosity,
//! radius, effective temperature and radius of gyration on a (mass, log-age)
//! grid, interpolated bilinearly inside each cell. Interpolation is exact at
//! the grid nodes. Ages above the grid are reported as [`TrackError::AgeAboveGrid`]
//! so the caller can latch the star; ages below the grid and masses outside
//! the tabulated range are unrecoverable.

use crate::consts::{LSUN, RSUN, YEARSEC};
use lazy_static::lazy_static;
use std::fmt;

/// Which field of the track to interpolate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackField {
    Luminosity,
    Radius,
    Temperature,
    RadGyra,
}

/// Lookup failure taxonomy. Only `AgeAboveGrid` is recoverable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackError {
    AgeBelowGrid,
    AgeAboveGrid,
    MassOutOfRange,
    NotANumber,
}

impl fmt::Display for TrackError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TrackError::AgeBelowGrid => write!(f, "age below the stellar grid"),
            TrackError::AgeAboveGrid => write!(f, "age above the stellar grid"),
            TrackError::MassOutOfRange => write!(f, "mass outside the stellar grid"),
            TrackError::NotANumber => write!(f, "stellar grid interpolation returned NaN"),
        }
    }
}

/// Tabulated masses, solar masses.
const GRID_MASSES: [f64; 5] = [0.10, 0.30, 0.50, 0.80, 1.00];

/// Tabulated ages, log10 years.
const GRID_LOG_AGES: [f64; 9] = [6.0, 6.5, 7.0, 7.5, 8.0, 8.5, 9.0, 9.5, 10.0];

/// log10(L / Lsun), rows follow GRID_MASSES, columns GRID_LOG_AGES.
const GRID_LOG_LUM: [[f64; 9]; 5] = [
    [-1.44, -1.84, -2.19, -2.53, -2.83, -2.97, -3.02, -3.03, -3.04],
    [-0.88, -1.25, -1.60, -1.91, -2.10, -2.17, -2.19, -2.20, -2.20],
    [-0.60, -0.95, -1.28, -1.55, -1.71, -1.77, -1.79, -1.80, -1.80],
    [-0.26, -0.58, -0.89, -1.12, -1.21, -1.22, -1.20, -1.17, -1.10],
    [0.36, -0.06, -0.26, -0.23, -0.10, -0.07, -0.03, 0.04, 0.18],
];

/// R / Rsun.
const GRID_RADIUS: [[f64; 9]; 5] = [
    [0.84, 0.60, 0.42, 0.29, 0.20, 0.16, 0.14, 0.13, 0.13],
    [1.47, 1.03, 0.72, 0.52, 0.41, 0.37, 0.35, 0.35, 0.34],
    [1.86, 1.30, 0.92, 0.68, 0.56, 0.52, 0.50, 0.49, 0.49],
    [2.31, 1.66, 1.18, 0.90, 0.76, 0.72, 0.71, 0.71, 0.73],
    [2.60, 1.85, 1.30, 1.02, 0.92, 0.91, 0.94, 1.00, 1.18],
];

/// Effective temperature, K.
const GRID_TEFF: [[f64; 9]; 5] = [
    [2910.0, 2920.0, 2930.0, 2940.0, 2950.0, 2960.0, 2960.0, 2960.0, 2960.0],
    [3320.0, 3350.0, 3380.0, 3400.0, 3410.0, 3420.0, 3420.0, 3420.0, 3420.0],
    [3620.0, 3650.0, 3690.0, 3720.0, 3760.0, 3780.0, 3790.0, 3800.0, 3800.0],
    [4010.0, 4070.0, 4160.0, 4310.0, 4550.0, 4680.0, 4730.0, 4750.0, 4780.0],
    [4270.0, 4320.0, 4470.0, 5070.0, 5620.0, 5720.0, 5770.0, 5820.0, 5900.0],
];

/// Radius of gyration, dimensionless.
const GRID_RAD_GYRA: [[f64; 9]; 5] = [
    [0.465, 0.462, 0.459, 0.457, 0.455, 0.453, 0.452, 0.451, 0.451],
    [0.463, 0.460, 0.456, 0.452, 0.448, 0.446, 0.445, 0.444, 0.444],
    [0.461, 0.456, 0.450, 0.442, 0.434, 0.428, 0.425, 0.424, 0.423],
    [0.455, 0.446, 0.432, 0.408, 0.377, 0.352, 0.340, 0.335, 0.332],
    [0.449, 0.436, 0.410, 0.365, 0.310, 0.285, 0.276, 0.272, 0.270],
];

/// The assembled grid with per-field tables in SI.
struct StellarGrid {
    masses: Vec<f64>,
    log_ages: Vec<f64>,
    /// [field][mass][age], SI units (W, m, K, dimensionless).
    tables: [Vec<Vec<f64>>; 4],
}

impl StellarGrid {
    fn embedded() -> Self {
        let masses = GRID_MASSES.to_vec();
        let log_ages = GRID_LOG_AGES.to_vec();
        let lum = GRID_LOG_LUM
            .iter()
            .map(|row| row.iter().map(|l| 10f64.powf(*l) * LSUN).collect())
            .collect();
        let rad = GRID_RADIUS
            .iter()
            .map(|row| row.iter().map(|r| r * RSUN).collect())
            .collect();
        let teff = GRID_TEFF.iter().map(|row| row.to_vec()).collect();
        let rg = GRID_RAD_GYRA.iter().map(|row| row.to_vec()).collect();
        StellarGrid {
            masses,
            log_ages,
            tables: [lum, rad, teff, rg],
        }
    }

    /// Index of the cell containing `x`, such that axis[j] <= x <= axis[j+1].
    /// The top node belongs to the last cell so node lookups stay in range.
    fn cell(axis: &[f64], x: f64) -> usize {
        let mut j = match axis.iter().position(|edge| x < *edge) {
            Some(0) => 0,
            Some(p) => p - 1,
            None => axis.len() - 1,
        };
        if j == axis.len() - 1 {
            j -= 1;
        }
        j
    }

    fn lookup(&self, field: TrackField, age: f64, mass_solar: f64) -> Result<f64, TrackError> {
        if !(age.is_finite() && mass_solar.is_finite()) {
            return Err(TrackError::NotANumber);
        }
        // Unit round-trips can land a boundary value one ulp outside the
        // grid; snap within a relative 1e-9 before rejecting.
        let snap = |x: f64, lo: f64, hi: f64| {
            if x < lo && lo - x < 1.0e-9 * lo.abs() {
                lo
            } else if x > hi && x - hi < 1.0e-9 * hi.abs() {
                hi
            } else {
                x
            }
        };
        let mass_solar = snap(
            mass_solar,
            self.masses[0],
            *self.masses.last().unwrap(),
        );
        if mass_solar < self.masses[0] || mass_solar > *self.masses.last().unwrap() {
            return Err(TrackError::MassOutOfRange);
        }
        let log_age = snap(
            (age / YEARSEC).log10(),
            self.log_ages[0],
            *self.log_ages.last().unwrap(),
        );
        if log_age < self.log_ages[0] {
            return Err(TrackError::AgeBelowGrid);
        }
        if log_age > *self.log_ages.last().unwrap() {
            return Err(TrackError::AgeAboveGrid);
        }

        let table = &self.tables[match field {
            TrackField::Luminosity => 0,
            TrackField::Radius => 1,
            TrackField::Temperature => 2,
            TrackField::RadGyra => 3,
        }];

        let im = Self::cell(&self.masses, mass_solar);
        let ia = Self::cell(&self.log_ages, log_age);
        let tm = (mass_solar - self.masses[im]) / (self.masses[im + 1] - self.masses[im]);
        let ta = (log_age - self.log_ages[ia]) / (self.log_ages[ia + 1] - self.log_ages[ia]);

        let v00 = table[im][ia];
        let v01 = table[im][ia + 1];
        let v10 = table[im + 1][ia];
        let v11 = table[im + 1][ia + 1];
        let v = (1.0 - tm) * ((1.0 - ta) * v00 + ta * v01) + tm * ((1.0 - ta) * v10 + ta * v11);
        if v.is_nan() {
            Err(TrackError::NotANumber)
        } else {
            Ok(v)
        }
    }
}

lazy_static! {
    static ref GRID: StellarGrid = StellarGrid::embedded();
}

/// Interpolate one field of the track. `age` in seconds, `mass` in kg.
pub fn lookup(field: TrackField, age: f64, mass: f64) -> Result<f64, TrackError> {
    GRID.lookup(field, age, mass / crate::consts::MSUN)
}

/// Age of the last grid node, seconds. Ages beyond this latch the star.
pub fn max_age() -> f64 {
    10f64.powf(*GRID.log_ages.last().unwrap()) * YEARSEC
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::MSUN;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case(1, 2)]
    #[case(0, 0)]
    #[case(4, 8)]
    #[case(3, 5)]
    fn node_lookups_are_exact(#[case] im: usize, #[case] ia: usize) {
        let mass = GRID_MASSES[im] * MSUN;
        let age = 10f64.powf(GRID_LOG_AGES[ia]) * YEARSEC;
        assert_relative_eq!(
            lookup(TrackField::Luminosity, age, mass).unwrap(),
            10f64.powf(GRID_LOG_LUM[im][ia]) * LSUN,
            max_relative = 1e-12
        );
        assert_relative_eq!(
            lookup(TrackField::Radius, age, mass).unwrap(),
            GRID_RADIUS[im][ia] * RSUN,
            max_relative = 1e-12
        );
        assert_relative_eq!(
            lookup(TrackField::Temperature, age, mass).unwrap(),
            GRID_TEFF[im][ia],
            max_relative = 1e-12
        );
        assert_relative_eq!(
            lookup(TrackField::RadGyra, age, mass).unwrap(),
            GRID_RAD_GYRA[im][ia],
            max_relative = 1e-12
        );
    }

    #[test]
    fn bounds_taxonomy() {
        let mass = 0.5 * MSUN;
        assert_eq!(
            lookup(TrackField::Radius, 1.0e5 * YEARSEC, mass).unwrap_err(),
            TrackError::AgeBelowGrid
        );
        assert_eq!(
            lookup(TrackField::Radius, 2.0e10 * YEARSEC, mass).unwrap_err(),
            TrackError::AgeAboveGrid
        );
        assert_eq!(
            lookup(TrackField::Radius, 1.0e9 * YEARSEC, 3.0 * MSUN).unwrap_err(),
            TrackError::MassOutOfRange
        );
        assert_eq!(
            lookup(TrackField::Radius, f64::NAN, mass).unwrap_err(),
            TrackError::NotANumber
        );
    }

    #[test]
    fn interior_lookup_brackets_its_cell() {
        // 0.4 Msun at 20 Myr sits between the 0.3 and 0.5 Msun columns.
        let v = lookup(TrackField::Radius, 2.0e7 * YEARSEC, 0.4 * MSUN).unwrap();
        let lo = lookup(TrackField::Radius, 2.0e7 * YEARSEC, 0.3 * MSUN).unwrap();
        let hi = lookup(TrackField::Radius, 2.0e7 * YEARSEC, 0.5 * MSUN).unwrap();
        assert!(v > lo && v < hi);
    }

    #[test]
    fn contraction_is_monotone_for_low_mass() {
        let mass = 0.1 * MSUN;
        let mut last = f64::MAX;
        for log_age in [6.0, 6.5, 7.0, 7.5, 8.0, 8.5, 9.0] {
            let r = lookup(TrackField::Radius, 10f64.powf(log_age) * YEARSEC, mass).unwrap();
            assert!(r <= last);
            last = r;
        }
    }
}
