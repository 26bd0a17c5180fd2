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

//! The run log: a header plus a full system dump, written once before the
//! evolution starts and appended once after it ends.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use enum_iterator::all;

use crate::errors::AeonError;
use crate::evolve::Engine;
use crate::io::output::{ColumnSel, OutputColumn};
use crate::module::Module;
use crate::units::Units;

/// Path of the log file for a system.
pub fn log_path(dir: &Path, system_name: &str) -> PathBuf {
    dir.join(format!("{system_name}.log"))
}

fn system_section(engine: &Engine, units: &Units, digits: usize, heading: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "---- {heading} SYSTEM PROPERTIES ----");
    let _ = writeln!(out);
    let _ = writeln!(out, "(Steps) Integration steps taken: {}", engine.steps);
    let _ = writeln!(
        out,
        "(Time) Simulation Time [{}]: {:.prec$e}",
        units.time.label(),
        engine.time / units.time.factor(),
        prec = digits
    );
    let _ = writeln!(out);

    for i in 0..engine.world.bodies.len() {
        let body = &engine.world.bodies[i];
        let _ = writeln!(out, "---- BODY: {} ----", body.name);
        let active: Vec<&str> = engine.modules()[i].iter().map(|m| m.name()).collect();
        let _ = writeln!(
            out,
            "Active Modules: {}",
            if active.is_empty() {
                "none".to_string()
            } else {
                active.join(" ")
            }
        );

        let module_ids: Vec<_> = engine.modules()[i].iter().map(|m| m.id()).collect();
        for column in all::<OutputColumn>() {
            // Only log columns belonging to this body's modules; the
            // scale-height diagnostics stay out unless that model is active.
            match column.module() {
                Some(id) if !module_ids.contains(&id) => continue,
                _ => {}
            }
            if column.requires_scale_height_model()
                && body.planet_radius_model != crate::body::PlanetRadiusModel::Lehmer17
            {
                continue;
            }
            let sel = ColumnSel { column, neg: false };
            let (v, label) =
                sel.converted(&engine.world, &engine.matrix, units, engine.time, i);
            let unit = if label.is_empty() {
                String::new()
            } else {
                format!(" [{label}]")
            };
            let _ = writeln!(
                out,
                "({}) {}{}: {:.prec$e}",
                column.name(),
                column.description(),
                unit,
                v,
                prec = digits
            );
        }

        for module in &engine.modules()[i] {
            module.log_body(&engine.world, i, &mut out);
        }
        let _ = writeln!(out);
    }
    out
}

/// Write the log header and the initial dump. Refuses to clobber an existing
/// log unless overwriting was requested.
pub fn write_initial(
    dir: &Path,
    system_name: &str,
    engine: &Engine,
    units: &Units,
    digits: usize,
    overwrite: bool,
) -> Result<(), AeonError> {
    let path = log_path(dir, system_name);
    if path.exists() && !overwrite {
        return Err(AeonError::FileExists(path.to_string_lossy().to_string()));
    }
    let mut out = String::new();
    let _ = writeln!(out, "Aeon Log File, version {}", env!("CARGO_PKG_VERSION"));
    let _ = writeln!(out);
    let _ = writeln!(out, "System Name: {system_name}");
    let _ = writeln!(out, "Bodies: {}", engine.world.bodies.len());
    let _ = writeln!(out);
    out.push_str(&system_section(engine, units, digits, "INITIAL"));

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)?;
    file.write_all(out.as_bytes())?;
    Ok(())
}

/// Append the final dump after the evolution returned.
pub fn write_final(
    dir: &Path,
    system_name: &str,
    engine: &Engine,
    units: &Units,
    digits: usize,
) -> Result<(), AeonError> {
    let path = log_path(dir, system_name);
    let out = system_section(engine, units, digits, "FINAL");
    let mut file = OpenOptions::new().append(true).create(true).open(&path)?;
    file.write_all(out.as_bytes())?;
    Ok(())
}
