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

//! The output column table and the forward-file writer.
//!
//! Every physical quantity the user can request carries a name, a dimension
//! resolved against the problem units, and optionally a "negative unit"
//! alias (`-PlanetRadius` in `saOutputOrder` reports Earth radii regardless
//! of the problem length unit). One columnar file is written per body, one
//! row per output cadence.

use enum_iterator::{all, Sequence};
use std::f64::consts::PI;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::body::{Body, World};
use crate::consts::*;
use crate::errors::AeonError;
use crate::evolve::OutputSink;
use crate::hz;
use crate::matrix::{BodyMatrix, Quantity};
use crate::module::ModuleId;
use crate::modules::atmesc::oxygen_mixing_ratio;
use crate::modules::stellar::rossby_number;
use crate::units::Units;

/// Physical dimension of a column, for conversion to the problem units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dim {
    Dimensionless,
    Time,
    Length,
    Mass,
    Power,
    Flux,
    Temperature,
    Pressure,
    MassRate,
    AngMomentum,
    Energy,
    Frequency,
}

impl Dim {
    /// Factor dividing an SI value into the problem units, and its label.
    pub fn si_convert(&self, units: &Units) -> (f64, &'static str) {
        match self {
            Dim::Dimensionless => (1.0, ""),
            Dim::Time => (units.time.factor(), units.time.label()),
            Dim::Length => (units.length.factor(), units.length.label()),
            Dim::Mass => (units.mass.factor(), units.mass.label()),
            Dim::Power => (1.0, "W"),
            Dim::Flux => (1.0, "W/m^2"),
            Dim::Temperature => (1.0, "K"),
            Dim::Pressure => (1.0, "Pa"),
            Dim::MassRate => (1.0, "kg/s"),
            Dim::AngMomentum => (1.0, "kg m^2/s"),
            Dim::Energy => (1.0, "J"),
            Dim::Frequency => (1.0, "/s"),
        }
    }
}

/// The negative-unit alias of a column, where one exists.
#[derive(Clone, Copy, Debug)]
pub struct NegUnit {
    pub label: &'static str,
    factor: NegFactor,
}

#[derive(Clone, Copy, Debug)]
enum NegFactor {
    Const(f64),
    /// Oxygen mass to equivalent surface pressure in bars: the column
    /// weight of the reservoir on this particular body.
    OxygenBars,
}

impl NegUnit {
    const fn of(label: &'static str, factor: f64) -> Self {
        NegUnit {
            label,
            factor: NegFactor::Const(factor),
        }
    }

    pub fn factor(&self, body: &Body) -> f64 {
        match self.factor {
            NegFactor::Const(f) => f,
            NegFactor::OxygenBars => {
                1.0e-5 * (BIGG * body.mass) / (4.0 * PI * body.radius.powi(4))
            }
        }
    }
}

/// Every output column the engine knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Sequence)]
pub enum OutputColumn {
    Time,
    Age,
    Mass,
    Radius,
    SurfWaterMass,
    OxygenMass,
    OxygenMantleMass,
    EnvelopeMass,
    RGLimit,
    OxygenMixingRatio,
    OxygenEta,
    AtmXAbsEffH2O,
    Fxuv,
    RadXuv,
    RadSolid,
    ScaleHeight,
    PresSurf,
    DEnvMassDt,
    Instellation,
    JeansTime,
    KTide,
    Luminosity,
    Temperature,
    LxuvStellar,
    LxuvFrac,
    RossbyNumber,
    RotPer,
    RotRate,
    DRotPerDtStellar,
    LostAngMom,
    LostEng,
    HzLimRecVenus,
    HzLimRunaway,
    HzLimMoistGreenhouse,
    HzLimMaxGreenhouse,
    HzLimEarlyMars,
}

impl OutputColumn {
    pub fn name(&self) -> &'static str {
        match self {
            OutputColumn::Time => "Time",
            OutputColumn::Age => "Age",
            OutputColumn::Mass => "Mass",
            OutputColumn::Radius => "Radius",
            OutputColumn::SurfWaterMass => "SurfWaterMass",
            OutputColumn::OxygenMass => "OxygenMass",
            OutputColumn::OxygenMantleMass => "OxygenMantleMass",
            OutputColumn::EnvelopeMass => "EnvelopeMass",
            OutputColumn::RGLimit => "RGLimit",
            OutputColumn::OxygenMixingRatio => "XO",
            OutputColumn::OxygenEta => "EtaO",
            OutputColumn::AtmXAbsEffH2O => "AtmXAbsEffH2O",
            OutputColumn::Fxuv => "FXUV",
            OutputColumn::RadXuv => "RadXUV",
            OutputColumn::RadSolid => "RadSolid",
            OutputColumn::ScaleHeight => "ScaleHeight",
            OutputColumn::PresSurf => "PresSurf",
            OutputColumn::DEnvMassDt => "DEnvMassDt",
            OutputColumn::Instellation => "Instellation",
            OutputColumn::JeansTime => "JeansTime",
            OutputColumn::KTide => "KTide",
            OutputColumn::Luminosity => "Luminosity",
            OutputColumn::Temperature => "Temperature",
            OutputColumn::LxuvStellar => "LXUVStellar",
            OutputColumn::LxuvFrac => "LXUVFrac",
            OutputColumn::RossbyNumber => "RossbyNumber",
            OutputColumn::RotPer => "RotPer",
            OutputColumn::RotRate => "RotRate",
            OutputColumn::DRotPerDtStellar => "DRotPerDtStellar",
            OutputColumn::LostAngMom => "LostAngMom",
            OutputColumn::LostEng => "LostEng",
            OutputColumn::HzLimRecVenus => "HZLimRecVenus",
            OutputColumn::HzLimRunaway => "HZLimRunaway",
            OutputColumn::HzLimMoistGreenhouse => "HZLimMoistGreenhouse",
            OutputColumn::HzLimMaxGreenhouse => "HZLimMaxGreenhouse",
            OutputColumn::HzLimEarlyMars => "HZLimEarlyMars",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            OutputColumn::Time => "Simulation Time",
            OutputColumn::Age => "Body Age",
            OutputColumn::Mass => "Body Mass",
            OutputColumn::Radius => "Body Radius",
            OutputColumn::SurfWaterMass => "Surface Water Mass",
            OutputColumn::OxygenMass => "Atmospheric Oxygen Mass",
            OutputColumn::OxygenMantleMass => "Mantle Oxygen Mass",
            OutputColumn::EnvelopeMass => "Hydrogen Envelope Mass",
            OutputColumn::RGLimit => "Runaway Greenhouse Semi-Major Axis",
            OutputColumn::OxygenMixingRatio => "Atomic Oxygen Mixing Ratio in the Flow",
            OutputColumn::OxygenEta => "Oxygen Drag Efficiency",
            OutputColumn::AtmXAbsEffH2O => "XUV Absorption Efficiency for Water",
            OutputColumn::Fxuv => "XUV Flux Incident on the Body",
            OutputColumn::RadXuv => "XUV Absorption Radius",
            OutputColumn::RadSolid => "Solid Surface Radius",
            OutputColumn::ScaleHeight => "Isothermal Atmospheric Scale Height",
            OutputColumn::PresSurf => "Surface Pressure of the Envelope",
            OutputColumn::DEnvMassDt => "Envelope Mass Loss Rate",
            OutputColumn::Instellation => "Orbit-Averaged Incident Flux",
            OutputColumn::JeansTime => "Hydrodynamic-to-Ballistic Transition Time",
            OutputColumn::KTide => "Roche Lobe Enhancement Factor",
            OutputColumn::Luminosity => "Bolometric Luminosity",
            OutputColumn::Temperature => "Effective Temperature",
            OutputColumn::LxuvStellar => "XUV Luminosity",
            OutputColumn::LxuvFrac => "XUV Luminosity Fraction",
            OutputColumn::RossbyNumber => "Rossby Number",
            OutputColumn::RotPer => "Rotation Period",
            OutputColumn::RotRate => "Rotation Rate",
            OutputColumn::DRotPerDtStellar => "Rate of Change of the Rotation Period",
            OutputColumn::LostAngMom => "Cumulative Angular Momentum Lost to the Wind",
            OutputColumn::LostEng => "Cumulative Energy Shed by the Star",
            OutputColumn::HzLimRecVenus => "Recent Venus Habitable Zone Limit",
            OutputColumn::HzLimRunaway => "Runaway Greenhouse Habitable Zone Limit",
            OutputColumn::HzLimMoistGreenhouse => "Moist Greenhouse Habitable Zone Limit",
            OutputColumn::HzLimMaxGreenhouse => "Maximum Greenhouse Habitable Zone Limit",
            OutputColumn::HzLimEarlyMars => "Early Mars Habitable Zone Limit",
        }
    }

    /// The module whose state this column exposes, if any.
    pub fn module(&self) -> Option<ModuleId> {
        use OutputColumn::*;
        match self {
            SurfWaterMass | OxygenMass | OxygenMantleMass | EnvelopeMass | RGLimit
            | OxygenMixingRatio | OxygenEta | AtmXAbsEffH2O | Fxuv | RadXuv | RadSolid
            | ScaleHeight | PresSurf | DEnvMassDt | JeansTime | KTide => Some(ModuleId::AtmEsc),
            Luminosity | Temperature | LxuvStellar | LxuvFrac | RossbyNumber | RotPer
            | RotRate | DRotPerDtStellar | LostAngMom | LostEng | HzLimRecVenus
            | HzLimRunaway | HzLimMoistGreenhouse | HzLimMaxGreenhouse | HzLimEarlyMars => {
                Some(ModuleId::Stellar)
            }
            Time | Age | Mass | Radius | Instellation => None,
        }
    }

    /// Columns that only make sense under the scale-height radius model.
    pub fn requires_scale_height_model(&self) -> bool {
        matches!(
            self,
            OutputColumn::RadXuv
                | OutputColumn::RadSolid
                | OutputColumn::ScaleHeight
                | OutputColumn::PresSurf
        )
    }

    pub fn dimension(&self) -> Dim {
        use OutputColumn::*;
        match self {
            Time | Age | JeansTime | RotPer => Dim::Time,
            Radius | RGLimit | RadXuv | RadSolid | ScaleHeight | HzLimRecVenus | HzLimRunaway
            | HzLimMoistGreenhouse | HzLimMaxGreenhouse | HzLimEarlyMars => Dim::Length,
            Mass | SurfWaterMass | OxygenMass | OxygenMantleMass | EnvelopeMass => Dim::Mass,
            Luminosity | LxuvStellar => Dim::Power,
            Fxuv | Instellation => Dim::Flux,
            Temperature => Dim::Temperature,
            PresSurf => Dim::Pressure,
            DEnvMassDt => Dim::MassRate,
            LostAngMom => Dim::AngMomentum,
            LostEng => Dim::Energy,
            RotRate => Dim::Frequency,
            OxygenMixingRatio | OxygenEta | AtmXAbsEffH2O | LxuvFrac | RossbyNumber | KTide
            | DRotPerDtStellar => Dim::Dimensionless,
        }
    }

    pub fn neg_unit(&self) -> Option<NegUnit> {
        use OutputColumn::*;
        match self {
            Time | Age | JeansTime => Some(NegUnit::of("Gyr", 1.0 / (1.0e9 * YEARSEC))),
            Mass | EnvelopeMass => Some(NegUnit::of("Mearth", 1.0 / MEARTH)),
            Radius | RadXuv | RadSolid => Some(NegUnit::of("Rearth", 1.0 / REARTH)),
            SurfWaterMass => Some(NegUnit::of("TO", 1.0 / TOMASS)),
            OxygenMass | OxygenMantleMass => Some(NegUnit {
                label: "bars",
                factor: NegFactor::OxygenBars,
            }),
            RGLimit => Some(NegUnit::of("AU", 1.0 / AUM)),
            Fxuv => Some(NegUnit::of("erg/cm^2/s", 1.0e3)),
            Luminosity | LxuvStellar => Some(NegUnit::of("LSUN", 1.0 / LSUN)),
            RotPer => Some(NegUnit::of("days", 1.0 / DAYSEC)),
            DRotPerDtStellar => {
                Some(NegUnit::of("days/Myr", 1.0e6 * YEARSEC / DAYSEC))
            }
            LostEng => Some(NegUnit::of("ergs", 1.0e7)),
            HzLimRecVenus | HzLimRunaway | HzLimMoistGreenhouse | HzLimMaxGreenhouse
            | HzLimEarlyMars => Some(NegUnit::of("AU", 1.0 / AUM)),
            _ => None,
        }
    }

    /// The raw SI value of this column for body `i`.
    pub fn value(&self, world: &World, matrix: &[BodyMatrix], time: f64, i: usize) -> f64 {
        let bodies = &world.bodies;
        let b = &bodies[i];
        match self {
            OutputColumn::Time => time,
            OutputColumn::Age => b.age,
            OutputColumn::Mass => b.mass,
            OutputColumn::Radius => b.radius,
            OutputColumn::SurfWaterMass => b.surface_water_mass,
            OutputColumn::OxygenMass => b.oxygen_mass,
            OutputColumn::OxygenMantleMass => b.oxygen_mantle_mass,
            OutputColumn::EnvelopeMass => b.envelope_mass,
            OutputColumn::RGLimit => {
                let flux = hz::runaway_greenhouse_flux(bodies, i);
                (4.0 * PI * flux
                    / (bodies[0].luminosity * (1.0 - b.ecc * b.ecc).sqrt()))
                .powf(-0.5)
            }
            OutputColumn::OxygenMixingRatio => {
                oxygen_mixing_ratio(b.surface_water_mass, b.oxygen_mass)
            }
            OutputColumn::OxygenEta => b.oxygen_eta,
            OutputColumn::AtmXAbsEffH2O => b.eps_h2o,
            OutputColumn::Fxuv => b.fxuv,
            OutputColumn::RadXuv => b.rad_xuv,
            OutputColumn::RadSolid => b.rad_solid,
            OutputColumn::ScaleHeight => b.scale_height,
            OutputColumn::PresSurf => b.pres_surf,
            OutputColumn::DEnvMassDt => matrix[i]
                .slot(Quantity::EnvelopeMass)
                .map(|s| s.deriv_total)
                .unwrap_or(0.0),
            OutputColumn::Instellation => hz::instellation(bodies, i),
            OutputColumn::JeansTime => b.jeans_time,
            OutputColumn::KTide => b.ktide,
            OutputColumn::Luminosity => b.luminosity,
            OutputColumn::Temperature => b.temperature,
            OutputColumn::LxuvStellar => b.lxuv,
            OutputColumn::LxuvFrac => {
                if b.luminosity > 0.0 {
                    b.lxuv / b.luminosity
                } else {
                    0.0
                }
            }
            OutputColumn::RossbyNumber => rossby_number(b),
            OutputColumn::RotPer => b.rot_per,
            OutputColumn::RotRate => b.rot_rate,
            OutputColumn::DRotPerDtStellar => {
                // dP/dt from the instantaneous dw/dt through dP/dw.
                let dwdt = matrix[i]
                    .slot(Quantity::RotRate)
                    .map(|s| s.sum())
                    .unwrap_or(0.0);
                dwdt * (-2.0 * PI / (b.rot_rate * b.rot_rate))
            }
            OutputColumn::LostAngMom => b.lost_ang_mom,
            OutputColumn::LostEng => b.lost_eng,
            OutputColumn::HzLimRecVenus => self.hz_limit(bodies, hz::HZ_RECENT_VENUS),
            OutputColumn::HzLimRunaway => self.hz_limit(bodies, hz::HZ_RUNAWAY_GREENHOUSE),
            OutputColumn::HzLimMoistGreenhouse => self.hz_limit(bodies, hz::HZ_MOIST_GREENHOUSE),
            OutputColumn::HzLimMaxGreenhouse => self.hz_limit(bodies, hz::HZ_MAX_GREENHOUSE),
            OutputColumn::HzLimEarlyMars => self.hz_limit(bodies, hz::HZ_EARLY_MARS),
        }
    }

    fn hz_limit(&self, bodies: &[Body], index: usize) -> f64 {
        hz::kopparapu13_limits(bodies[0].luminosity, bodies[0].temperature)[index]
    }

    /// Match a column by its user-facing name.
    pub fn by_name(name: &str) -> Option<Self> {
        all::<OutputColumn>().find(|c| c.name().eq_ignore_ascii_case(name))
    }
}

/// One requested column: which quantity, and whether the negative-unit alias
/// applies.
#[derive(Clone, Copy, Debug)]
pub struct ColumnSel {
    pub column: OutputColumn,
    pub neg: bool,
}

impl ColumnSel {
    /// `-Name` selects the negative unit. Unknown names, and negative
    /// selections on columns without an alias, are rejected.
    pub fn parse(token: &str) -> Option<Self> {
        let (neg, name) = match token.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        let column = OutputColumn::by_name(name)?;
        if neg && column.neg_unit().is_none() {
            return None;
        }
        Some(ColumnSel { column, neg })
    }

    /// The value converted for output, with its unit label.
    pub fn converted(
        &self,
        world: &World,
        matrix: &[BodyMatrix],
        units: &Units,
        time: f64,
        i: usize,
    ) -> (f64, String) {
        let raw = self.column.value(world, matrix, time, i);
        if self.neg {
            let neg = self.column.neg_unit().unwrap();
            (raw * neg.factor(&world.bodies[i]), neg.label.to_string())
        } else {
            let (factor, label) = self.column.dimension().si_convert(units);
            (raw / factor, label.to_string())
        }
    }
}

/// Writes one forward file per body at the output cadence.
pub struct OutputDriver {
    files: Vec<Option<File>>,
    columns: Vec<Vec<ColumnSel>>,
    units: Units,
    digits: usize,
}

impl OutputDriver {
    /// Open `<system>.<body>.forward` for every body with requested columns.
    /// Existing files are refused unless overwriting was requested.
    pub fn create(
        dir: &Path,
        system_name: &str,
        world: &World,
        columns: Vec<Vec<ColumnSel>>,
        units: Units,
        digits: usize,
        overwrite: bool,
    ) -> Result<Self, AeonError> {
        let mut files = Vec::with_capacity(world.bodies.len());
        for (i, body) in world.bodies.iter().enumerate() {
            if columns[i].is_empty() {
                files.push(None);
                continue;
            }
            let path: PathBuf = dir.join(format!("{system_name}.{}.forward", body.name));
            if path.exists() && !overwrite {
                return Err(AeonError::FileExists(path.to_string_lossy().to_string()));
            }
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?;
            files.push(Some(file));
        }
        Ok(OutputDriver {
            files,
            columns,
            units,
            digits,
        })
    }

    /// Remove a stale forward file so a fresh run can recreate it.
    pub fn remove_stale(dir: &Path, system_name: &str, body_name: &str) -> Result<(), AeonError> {
        let path = dir.join(format!("{system_name}.{body_name}.forward"));
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

impl OutputSink for OutputDriver {
    fn snapshot(
        &mut self,
        world: &World,
        matrix: &[BodyMatrix],
        time: f64,
        _dt: f64,
    ) -> Result<(), AeonError> {
        for (i, file) in self.files.iter_mut().enumerate() {
            let Some(file) = file else { continue };
            let mut row = String::new();
            for (k, sel) in self.columns[i].iter().enumerate() {
                if k > 0 {
                    row.push(' ');
                }
                let (v, _) = sel.converted(world, matrix, &self.units, time, i);
                row.push_str(&format!("{:.prec$e}", v, prec = self.digits));
            }
            row.push('\n');
            file.write_all(row.as_bytes())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::System;

    #[test]
    fn column_names_resolve_case_insensitively() {
        assert_eq!(
            OutputColumn::by_name("surfwatermass"),
            Some(OutputColumn::SurfWaterMass)
        );
        assert_eq!(OutputColumn::by_name("NoSuchColumn"), None);
    }

    #[test]
    fn negative_selection_needs_an_alias() {
        assert!(ColumnSel::parse("-SurfWaterMass").unwrap().neg);
        // The mixing ratio is dimensionless and carries no alias.
        assert!(ColumnSel::parse("-XO").is_none());
        assert!(!ColumnSel::parse("XO").unwrap().neg);
    }

    #[test]
    fn oxygen_bars_conversion_tracks_the_body() {
        let mut world = World::new(System::default(), vec![Body::named("b")]);
        world.bodies[0].mass = MEARTH;
        world.bodies[0].radius = REARTH;
        world.bodies[0].oxygen_mass = 1.0e18;
        let neg = OutputColumn::OxygenMass.neg_unit().unwrap();
        let bars = 1.0e18 * neg.factor(&world.bodies[0]);
        // One bar of O2 on Earth is roughly 2e18 kg.
        assert!(bars > 0.2 && bars < 1.0);
    }

    #[test]
    fn every_column_has_a_distinct_name() {
        let names: Vec<&str> = all::<OutputColumn>().map(|c| c.name()).collect();
        let mut dedup = names.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(names.len(), dedup.len());
    }

    #[test]
    fn converted_values_honor_problem_units() {
        let mut world = World::new(System::default(), vec![Body::named("b")]);
        world.bodies[0].age = 1.0e9 * YEARSEC;
        let matrix = vec![BodyMatrix::new()];
        let units = Units {
            time: crate::units::TimeUnit::Year,
            ..Default::default()
        };
        let sel = ColumnSel::parse("Age").unwrap();
        let (v, label) = sel.converted(&world, &matrix, &units, 0.0, 0);
        assert_eq!(label, "year");
        assert!((v - 1.0e9).abs() < 1.0);

        let neg = ColumnSel::parse("-Age").unwrap();
        let (v, label) = neg.converted(&world, &matrix, &units, 0.0, 0);
        assert_eq!(label, "Gyr");
        assert!((v - 1.0).abs() < 1e-9);
    }
}
