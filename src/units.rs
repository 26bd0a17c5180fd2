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

//! Problem units. All internal state is SI; these tags govern how input
//! values are scaled on the way in and how standard output columns are
//! scaled on the way out. Negative-unit aliases on individual options and
//! columns bypass the problem units entirely.

use crate::consts::{AUM, DAYSEC, MEARTH, MSUN, REARTH, RSUN, YEARSEC};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TimeUnit {
    #[default]
    Second,
    Day,
    Year,
    Myr,
    Gyr,
}

impl TimeUnit {
    /// Seconds per unit.
    pub fn factor(&self) -> f64 {
        match self {
            TimeUnit::Second => 1.0,
            TimeUnit::Day => DAYSEC,
            TimeUnit::Year => YEARSEC,
            TimeUnit::Myr => 1.0e6 * YEARSEC,
            TimeUnit::Gyr => 1.0e9 * YEARSEC,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeUnit::Second => "sec",
            TimeUnit::Day => "day",
            TimeUnit::Year => "year",
            TimeUnit::Myr => "Myr",
            TimeUnit::Gyr => "Gyr",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "s" | "sec" | "seconds" => Some(TimeUnit::Second),
            "d" | "day" | "days" => Some(TimeUnit::Day),
            "y" | "yr" | "year" | "years" => Some(TimeUnit::Year),
            "myr" => Some(TimeUnit::Myr),
            "gyr" => Some(TimeUnit::Gyr),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LengthUnit {
    #[default]
    Meter,
    Kilometer,
    SolarRadius,
    EarthRadius,
    Au,
}

impl LengthUnit {
    /// Meters per unit.
    pub fn factor(&self) -> f64 {
        match self {
            LengthUnit::Meter => 1.0,
            LengthUnit::Kilometer => 1.0e3,
            LengthUnit::SolarRadius => RSUN,
            LengthUnit::EarthRadius => REARTH,
            LengthUnit::Au => AUM,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LengthUnit::Meter => "m",
            LengthUnit::Kilometer => "km",
            LengthUnit::SolarRadius => "Rsun",
            LengthUnit::EarthRadius => "Rearth",
            LengthUnit::Au => "AU",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "m" | "meter" | "meters" => Some(LengthUnit::Meter),
            "km" | "kilometer" => Some(LengthUnit::Kilometer),
            "solar" | "rsun" => Some(LengthUnit::SolarRadius),
            "earth" | "rearth" => Some(LengthUnit::EarthRadius),
            "au" => Some(LengthUnit::Au),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MassUnit {
    #[default]
    Kilogram,
    Gram,
    SolarMass,
    EarthMass,
}

impl MassUnit {
    /// Kilograms per unit.
    pub fn factor(&self) -> f64 {
        match self {
            MassUnit::Kilogram => 1.0,
            MassUnit::Gram => 1.0e-3,
            MassUnit::SolarMass => MSUN,
            MassUnit::EarthMass => MEARTH,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MassUnit::Kilogram => "kg",
            MassUnit::Gram => "g",
            MassUnit::SolarMass => "Msun",
            MassUnit::EarthMass => "Mearth",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "kg" | "kilogram" => Some(MassUnit::Kilogram),
            "g" | "gram" | "grams" => Some(MassUnit::Gram),
            "solar" | "msun" => Some(MassUnit::SolarMass),
            "earth" | "mearth" => Some(MassUnit::EarthMass),
            _ => None,
        }
    }
}

/// The problem units for one run, shared by every input file.
#[derive(Clone, Copy, Debug, Default)]
pub struct Units {
    pub time: TimeUnit,
    pub length: LengthUnit,
    pub mass: MassUnit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips() {
        assert_eq!(TimeUnit::parse("Gyr"), Some(TimeUnit::Gyr));
        assert_eq!(TimeUnit::parse("fortnight"), None);
        assert_eq!(LengthUnit::parse("AU").unwrap().factor(), AUM);
        assert_eq!(MassUnit::parse("Earth").unwrap().factor(), MEARTH);
    }
}
