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

//! The input deck: a primary file of global options pointing at one file per
//! body. Plain text, one `key value...` pair per line, `#` comments. A
//! negative real selects the option's "negative unit" (so `dJeansTime -1`
//! reads as one Gyr); positive dimensioned values follow the problem units.
//! Unrecognized options are fatal, as is a primary-only option in a body
//! file.

use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::body::{Body, PlanetRadiusModel, System, World};
use crate::consts::{AUM, DAYSEC, MEARTH, REARTH, YEARSEC};
use crate::errors::AeonError;
use crate::evolve::{EvolveOpts, StepMethod};
use crate::io::output::ColumnSel;
use crate::module::{modules_from_names, HaltPolicy, Module};
use crate::units::{LengthUnit, MassUnit, TimeUnit, Units};

/// Options that may only appear in the primary file.
const PRIMARY_ONLY: &[&str] = &[
    "sSystemName",
    "saBodyFiles",
    "bOverwrite",
    "bDoLog",
    "iDigits",
    "bDoForward",
    "bDoBackward",
    "dStopTime",
    "dOutputTime",
    "dEta",
    "dTimeStep",
    "bVarDt",
    "sIntegrationMethod",
];

struct RawLine {
    line_no: usize,
    tokens: Vec<String>,
    consumed: bool,
}

/// One parsed input file with typed, consuming accessors. Every accessor
/// marks its line as used; whatever is left at [`InputFile::finish`] is an
/// unrecognized option and kills the run.
pub struct InputFile {
    path: String,
    lines: Vec<RawLine>,
}

/// Body files share the exact reader the primary file uses.
pub type BodyFile = InputFile;

impl InputFile {
    pub fn read(path: &Path) -> Result<Self, AeonError> {
        let content = fs::read_to_string(path)?;
        Ok(Self::from_str_named(&path.to_string_lossy(), &content))
    }

    /// Parse from an in-memory string; the label stands in for the path in
    /// error messages.
    pub fn from_str_named(label: &str, content: &str) -> Self {
        let mut lines = Vec::new();
        for (idx, raw) in content.lines().enumerate() {
            let stripped = match raw.find('#') {
                Some(pos) => &raw[..pos],
                None => raw,
            };
            let tokens: Vec<String> = stripped.split_whitespace().map(str::to_string).collect();
            if tokens.is_empty() {
                continue;
            }
            lines.push(RawLine {
                line_no: idx + 1,
                tokens,
                consumed: false,
            });
        }
        InputFile {
            path: label.to_string(),
            lines,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn input_err(&self, line: usize, details: String) -> AeonError {
        AeonError::Input {
            file: self.path.clone(),
            line,
            details,
        }
    }

    /// Error for a recognized option with a nonsensical value.
    pub fn bad_value(&self, key: &str, value: &str, expect: &str) -> AeonError {
        let line = self
            .lines
            .iter()
            .find(|l| l.tokens[0].eq_ignore_ascii_case(key))
            .map(|l| l.line_no)
            .unwrap_or(0);
        self.input_err(line, format!("unknown argument to {key}: {value}; {expect}"))
    }

    /// Consume the line for `key`, returning its line number and value
    /// tokens. Duplicate assignments are fatal.
    fn take(&mut self, key: &str) -> Result<Option<(usize, Vec<String>)>, AeonError> {
        let mut found: Option<usize> = None;
        for (idx, line) in self.lines.iter().enumerate() {
            if line.tokens[0].eq_ignore_ascii_case(key) {
                if let Some(first) = found {
                    let first_no = self.lines[first].line_no;
                    let dup_no = line.line_no;
                    return Err(self.input_err(
                        dup_no,
                        format!("option {key} already assigned on line {first_no}"),
                    ));
                }
                found = Some(idx);
            }
        }
        Ok(found.map(|idx| {
            let line = &mut self.lines[idx];
            line.consumed = true;
            (line.line_no, line.tokens[1..].to_vec())
        }))
    }

    fn one_value(&mut self, key: &str) -> Result<Option<(usize, String)>, AeonError> {
        match self.take(key)? {
            None => Ok(None),
            Some((line, vals)) => {
                if vals.len() != 1 {
                    return Err(
                        self.input_err(line, format!("option {key} takes exactly one value"))
                    );
                }
                Ok(Some((line, vals.into_iter().next().unwrap())))
            }
        }
    }

    fn raw_f64(&mut self, key: &str) -> Result<Option<(usize, f64)>, AeonError> {
        match self.one_value(key)? {
            None => Ok(None),
            Some((line, val)) => match val.parse::<f64>() {
                Ok(v) => Ok(Some((line, v))),
                Err(_) => Err(self.input_err(line, format!("cannot parse '{val}' as a real"))),
            },
        }
    }

    /// A plain non-negative real; this option has no negative unit.
    pub fn real(&mut self, key: &str) -> Result<Option<f64>, AeonError> {
        match self.raw_f64(key)? {
            None => Ok(None),
            Some((line, v)) => {
                if v < 0.0 {
                    return Err(self.input_err(line, format!("{key} must be >= 0")));
                }
                Ok(Some(v))
            }
        }
    }

    /// A real whose negative values select the alternate unit: `-x` reads as
    /// `|x| * neg_factor`.
    pub fn real_neg(&mut self, key: &str, neg_factor: f64) -> Result<Option<f64>, AeonError> {
        match self.raw_f64(key)? {
            None => Ok(None),
            Some((_, v)) => {
                if v < 0.0 {
                    Ok(Some(-v * neg_factor))
                } else {
                    Ok(Some(v))
                }
            }
        }
    }

    /// A duration: positive values follow the problem time unit, negative
    /// values the option's alias.
    pub fn time(
        &mut self,
        key: &str,
        units: &Units,
        neg_factor: f64,
    ) -> Result<Option<f64>, AeonError> {
        match self.raw_f64(key)? {
            None => Ok(None),
            Some((_, v)) => {
                if v < 0.0 {
                    Ok(Some(-v * neg_factor))
                } else {
                    Ok(Some(v * units.time.factor()))
                }
            }
        }
    }

    /// A mass: positive values follow the problem mass unit.
    pub fn mass(
        &mut self,
        key: &str,
        units: &Units,
        neg_factor: f64,
    ) -> Result<Option<f64>, AeonError> {
        match self.raw_f64(key)? {
            None => Ok(None),
            Some((_, v)) => {
                if v < 0.0 {
                    Ok(Some(-v * neg_factor))
                } else {
                    Ok(Some(v * units.mass.factor()))
                }
            }
        }
    }

    /// A length: positive values follow the problem length unit.
    pub fn length(
        &mut self,
        key: &str,
        units: &Units,
        neg_factor: f64,
    ) -> Result<Option<f64>, AeonError> {
        match self.raw_f64(key)? {
            None => Ok(None),
            Some((_, v)) => {
                if v < 0.0 {
                    Ok(Some(-v * neg_factor))
                } else {
                    Ok(Some(v * units.length.factor()))
                }
            }
        }
    }

    pub fn integer(&mut self, key: &str) -> Result<Option<i64>, AeonError> {
        match self.one_value(key)? {
            None => Ok(None),
            Some((line, val)) => match val.parse::<i64>() {
                Ok(v) => Ok(Some(v)),
                Err(_) => {
                    Err(self.input_err(line, format!("cannot parse '{val}' as an integer")))
                }
            },
        }
    }

    pub fn boolean(&mut self, key: &str) -> Result<Option<bool>, AeonError> {
        match self.one_value(key)? {
            None => Ok(None),
            Some((line, val)) => match val.as_str() {
                "0" => Ok(Some(false)),
                "1" => Ok(Some(true)),
                _ => Err(self.input_err(line, format!("cannot parse '{val}' as a boolean (0/1)"))),
            },
        }
    }

    pub fn string(&mut self, key: &str) -> Result<Option<String>, AeonError> {
        Ok(self.one_value(key)?.map(|(_, v)| v))
    }

    pub fn string_list(&mut self, key: &str) -> Result<Option<Vec<String>>, AeonError> {
        match self.take(key)? {
            None => Ok(None),
            Some((line, vals)) => {
                if vals.is_empty() {
                    return Err(self.input_err(line, format!("option {key} needs a value list")));
                }
                Ok(Some(vals))
            }
        }
    }

    /// Reject primary-only options showing up here.
    fn reject_primary_only(&self) -> Result<(), AeonError> {
        for line in &self.lines {
            if PRIMARY_ONLY
                .iter()
                .any(|k| line.tokens[0].eq_ignore_ascii_case(k))
            {
                return Err(self.input_err(
                    line.line_no,
                    format!("{} may only be set in the primary file", line.tokens[0]),
                ));
            }
        }
        Ok(())
    }

    /// Every line must have been consumed by now; the first leftover is an
    /// unrecognized option.
    pub fn finish(&self) -> Result<(), AeonError> {
        for line in &self.lines {
            if !line.consumed {
                return Err(self.input_err(
                    line.line_no,
                    format!("unrecognized or unused option {}", line.tokens[0]),
                ));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation").finish_non_exhaustive()
    }
}

/// A fully parsed and module-resolved run, ready for the engine.
pub struct Simulation {
    pub world: World,
    pub modules: Vec<Vec<Arc<dyn Module>>>,
    pub halt_policies: Vec<HaltPolicy>,
    pub opts: EvolveOpts,
    pub units: Units,
    /// Per-body output column selections, in the user's order.
    pub columns: Vec<Vec<ColumnSel>>,
    pub system_name: String,
    pub do_log: bool,
    pub overwrite: bool,
    pub digits: usize,
}

/// Read the primary file and every body file it names.
pub fn read_config(primary_path: &Path) -> Result<Simulation, AeonError> {
    let primary = InputFile::read(primary_path)?;
    let dir = primary_path.parent().map(PathBuf::from).unwrap_or_default();

    // Peek at the body file list before the full primary pass so the files
    // can be loaded in one sweep.
    let mut primary = primary;
    let names = primary
        .string_list("saBodyFiles")?
        .ok_or_else(|| AeonError::Verify("saBodyFiles is required".to_string()))?;
    let mut body_files = Vec::with_capacity(names.len());
    for name in &names {
        body_files.push(InputFile::read(&dir.join(name))?);
    }
    read_from_sources(primary, body_files)
}

/// Assemble a simulation from pre-parsed sources. The body file order is the
/// body index order: the first file is the star.
pub fn read_from_sources(
    mut primary: InputFile,
    mut body_files: Vec<InputFile>,
) -> Result<Simulation, AeonError> {
    // Already honored by read_config; consumed here so a pre-parsed primary
    // passes the leftover check.
    let _ = primary.string_list("saBodyFiles")?;

    let mut units = Units::default();
    if let Some(s) = primary.string("sUnitTime")? {
        units.time = TimeUnit::parse(&s)
            .ok_or_else(|| primary.bad_value("sUnitTime", &s, "try sec, day, year, Myr, Gyr"))?;
    }
    if let Some(s) = primary.string("sUnitLength")? {
        units.length = LengthUnit::parse(&s)
            .ok_or_else(|| primary.bad_value("sUnitLength", &s, "try m, km, Rsun, Rearth, AU"))?;
    }
    if let Some(s) = primary.string("sUnitMass")? {
        units.mass = MassUnit::parse(&s)
            .ok_or_else(|| primary.bad_value("sUnitMass", &s, "try kg, g, Msun, Mearth"))?;
    }

    let system_name = primary
        .string("sSystemName")?
        .ok_or_else(|| AeonError::Verify("sSystemName is required".to_string()))?;

    let do_log = primary.boolean("bDoLog")?.unwrap_or(true);
    let overwrite = primary.boolean("bOverwrite")?.unwrap_or(false);
    let digits = primary.integer("iDigits")?.unwrap_or(6).clamp(1, 16) as usize;

    let do_forward = primary.boolean("bDoForward")?.unwrap_or(true);
    let do_backward = primary.boolean("bDoBackward")?.unwrap_or(false);
    if do_backward {
        return Err(AeonError::Verify(
            "bDoBackward is not supported; only forward evolution is available".to_string(),
        ));
    }

    let stop_time = primary
        .time("dStopTime", &units, 1.0e9 * YEARSEC)?
        .ok_or_else(|| AeonError::Verify("dStopTime is required".to_string()))?;
    let output_time = primary
        .time("dOutputTime", &units, 1.0e9 * YEARSEC)?
        .ok_or_else(|| AeonError::Verify("dOutputTime is required".to_string()))?;
    let eta = primary.real("dEta")?.unwrap_or(0.01);
    let init_dt = primary
        .time("dTimeStep", &units, 1.0e9 * YEARSEC)?
        .unwrap_or(YEARSEC);
    let var_dt = primary.boolean("bVarDt")?.unwrap_or(true);
    let method = match primary.string("sIntegrationMethod")? {
        None => StepMethod::RungeKutta4,
        Some(s) => match s.to_lowercase().get(..1) {
            Some("r") => StepMethod::RungeKutta4,
            Some("e") => StepMethod::Euler,
            _ => {
                return Err(primary.bad_value(
                    "sIntegrationMethod",
                    &s,
                    "options are RUNGEKUTTA4 or EULER",
                ))
            }
        },
    };
    primary.finish()?;

    let opts = EvolveOpts {
        stop_time,
        output_time,
        eta,
        init_dt,
        var_dt,
        do_forward,
        method,
        min_dt: 1.0e-2,
    };

    let mut world = World::new(
        System {
            name: system_name.clone(),
        },
        Vec::with_capacity(body_files.len()),
    );
    let mut modules = Vec::with_capacity(body_files.len());
    let mut halt_policies = Vec::with_capacity(body_files.len());
    let mut columns = Vec::with_capacity(body_files.len());

    for (i, file) in body_files.iter_mut().enumerate() {
        file.reject_primary_only()?;

        let mut body = Body::default();
        body.name = file
            .string("sName")?
            .unwrap_or_else(|| format!("body{i}"));

        if let Some(v) = file.mass("dMass", &units, MEARTH)? {
            body.mass = v;
        }
        if let Some(v) = file.length("dRadius", &units, REARTH)? {
            body.radius = v;
        }
        if let Some(v) = file.length("dSemi", &units, AUM)? {
            body.semi_major = v;
        }
        if let Some(v) = file.real("dEcc")? {
            body.ecc = v;
        }
        if let Some(v) = file.real("dObliquity")? {
            body.obliquity = v;
        }
        if let Some(v) = file.time("dAge", &units, 1.0e9 * YEARSEC)? {
            body.age = v;
        }
        if let Some(v) = file.time("dRotPeriod", &units, DAYSEC)? {
            body.rot_rate = 2.0 * PI / v;
            body.rot_per = v;
        }
        if let Some(v) = file.real("dRadGyra")? {
            body.rad_gyra = v;
        }

        let module_names = file.string_list("saModules")?.unwrap_or_default();
        let body_modules = modules_from_names(&module_names)?;

        let mut halt = HaltPolicy::default();
        for module in &body_modules {
            module.read_options(&mut body, &mut halt, file, &units)?;
        }

        let mut sels = Vec::new();
        if let Some(names) = file.string_list("saOutputOrder")? {
            for name in &names {
                let sel = ColumnSel::parse(name)
                    .ok_or_else(|| file.bad_value("saOutputOrder", name, "unknown column"))?;
                if sel.column.requires_scale_height_model()
                    && body.planet_radius_model != PlanetRadiusModel::Lehmer17
                {
                    return Err(file.bad_value(
                        "saOutputOrder",
                        name,
                        "this column needs sPlanetRadiusModel LEHMER17",
                    ));
                }
                sels.push(sel);
            }
        }

        file.finish()?;

        world.bodies.push(body);
        modules.push(body_modules);
        halt_policies.push(halt);
        columns.push(sels);
    }

    // Planets inherit the system age when none was given; module auxiliary
    // passes keep them in lockstep with the star afterwards.
    if !world.bodies.is_empty() {
        let star_age = world.bodies[0].age;
        for body in world.bodies.iter_mut().skip(1) {
            if body.age == 0.0 {
                body.age = star_age;
            }
        }
    }

    Ok(Simulation {
        world,
        modules,
        halt_policies,
        opts,
        units,
        columns,
        system_name,
        do_log,
        overwrite,
        digits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::MSUN;
    use approx::assert_relative_eq;

    fn primary(extra: &str) -> InputFile {
        InputFile::from_str_named(
            "vpl.in",
            &format!(
                "sSystemName test\nsaBodyFiles star.in planet.in\ndStopTime -1\ndOutputTime -0.1\n{extra}"
            ),
        )
    }

    fn star() -> InputFile {
        InputFile::from_str_named(
            "star.in",
            "sName sun\nsaModules stellar\ndMass -333000 # about a solar mass\ndAge -0.005\nsStellarModel baraffe\ndRotPeriod -1\n",
        )
    }

    fn planet() -> InputFile {
        InputFile::from_str_named(
            "planet.in",
            "sName b\nsaModules atmesc\ndMass -1\ndRadius -1\ndSemi -0.05\ndSurfaceWaterMass -1\ndJeansTime -1\n",
        )
    }

    #[test]
    fn negative_units_scale_as_documented() {
        let sim = read_from_sources(primary(""), vec![star(), planet()]).unwrap();
        assert_relative_eq!(sim.opts.stop_time, 1.0e9 * YEARSEC);
        assert_relative_eq!(sim.opts.output_time, 1.0e8 * YEARSEC);
        assert_relative_eq!(sim.world.bodies[0].mass, 333000.0 * MEARTH);
        assert_relative_eq!(sim.world.bodies[0].mass / MSUN, 1.0, max_relative = 2e-3);
        assert_relative_eq!(sim.world.bodies[1].semi_major, 0.05 * AUM);
        assert_relative_eq!(
            sim.world.bodies[1].surface_water_mass,
            crate::consts::TOMASS
        );
        assert_relative_eq!(sim.world.bodies[1].jeans_time, 1.0e9 * YEARSEC);
    }

    #[test]
    fn unknown_option_is_fatal_with_location() {
        let bad = InputFile::from_str_named("planet.in", "sName b\nsFlurble yes\n");
        let err = read_from_sources(primary(""), vec![star(), bad]).unwrap_err();
        match err {
            AeonError::Input { file, line, .. } => {
                assert_eq!(file, "planet.in");
                assert_eq!(line, 2);
            }
            other => panic!("expected an input error, got {other:?}"),
        }
    }

    #[test]
    fn primary_only_option_in_body_file_is_fatal() {
        let bad = InputFile::from_str_named("star.in", "sName sun\ndStopTime 5\n");
        let err = read_from_sources(primary(""), vec![bad, planet()]).unwrap_err();
        assert!(matches!(err, AeonError::Input { .. }));
    }

    #[test]
    fn duplicate_option_is_fatal() {
        let bad = InputFile::from_str_named("star.in", "sName sun\nsName moon\n");
        let err = read_from_sources(primary(""), vec![bad, planet()]).unwrap_err();
        assert!(matches!(err, AeonError::Input { .. }));
    }

    #[test]
    fn module_options_reach_the_halt_policy() {
        let p = InputFile::from_str_named(
            "planet.in",
            "sName b\nsaModules atmesc\ndMass -1\ndRadius -1\ndSemi -0.05\ndEnvelopeMass -0.01\nbHaltEnvelopeGone 1\n",
        );
        let sim = read_from_sources(primary(""), vec![star(), p]).unwrap();
        assert!(sim.halt_policies[1].envelope_gone);
        assert!(!sim.halt_policies[1].surface_desiccated);
        assert_relative_eq!(sim.world.bodies[1].envelope_mass, 0.01 * MEARTH);
    }

    #[test]
    fn backward_runs_are_rejected() {
        let err =
            read_from_sources(primary("bDoBackward 1\n"), vec![star(), planet()]).unwrap_err();
        assert!(matches!(err, AeonError::Verify(_)));
    }

    #[test]
    fn comments_and_blank_lines_are_ignored()  {
        let f = InputFile::from_str_named("x.in", "# header\n\nsName b # trailing\n");
        let mut f = f;
        assert_eq!(f.string("sName").unwrap().unwrap(), "b");
        f.finish().unwrap();
    }
}
