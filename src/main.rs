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

//! The command line driver: parse the input deck, evolve, write outputs.

use std::path::{Path, PathBuf};
use std::process::exit;

use enum_iterator::all;
use log::{info, LevelFilter};

use aeon::errors::AeonError;
use aeon::evolve::Engine;
use aeon::io::logfile;
use aeon::io::options::read_config;
use aeon::io::output::{OutputColumn, OutputDriver};

const EXIT_USAGE: i32 = 1;

fn short_help(exe: &str) {
    println!("Usage: {exe} [-v|-q] [-f] [-h|-H] <primary input file>");
    println!("  -v  verbose progress output");
    println!("  -q  quiet: errors only");
    println!("  -f  overwrite existing output files");
    println!("  -h  this summary");
    println!("  -H  long help, including the output column table");
}

fn long_help(exe: &str) {
    short_help(exe);
    println!();
    println!("Output columns available in saOutputOrder (prefix with '-' for");
    println!("the alternate unit where one is listed):");
    for column in all::<OutputColumn>() {
        match column.neg_unit() {
            Some(neg) => println!(
                "  {:<22} {} [-: {}]",
                column.name(),
                column.description(),
                neg.label
            ),
            None => println!("  {:<22} {}", column.name(), column.description()),
        }
    }
}

fn run(infile: &Path, overwrite_flag: bool) -> Result<(), AeonError> {
    let mut sim = read_config(infile)?;
    if overwrite_flag {
        sim.overwrite = true;
    }
    let dir = infile.parent().map(PathBuf::from).unwrap_or_default();

    let mut engine = Engine::new(sim.world, sim.modules, sim.halt_policies, sim.opts)?;
    engine.refresh_aux();
    engine.refresh_derivatives();

    let mut driver = OutputDriver::create(
        &dir,
        &sim.system_name,
        &engine.world,
        sim.columns,
        sim.units,
        sim.digits,
        sim.overwrite,
    )?;

    if sim.do_log {
        logfile::write_initial(
            &dir,
            &sim.system_name,
            &engine,
            &sim.units,
            sim.digits,
            sim.overwrite,
        )?;
        info!("log file written");
    }

    let outcome = engine.evolve(&mut driver)?;
    info!(
        "simulation finished at t = {:.6e} s after {} steps",
        outcome.end_time, outcome.steps
    );

    if sim.do_log {
        logfile::write_final(&dir, &sim.system_name, &engine, &sim.units, sim.digits)?;
        info!("log file updated");
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let exe = args[0].clone();

    let mut verbose = false;
    let mut quiet = false;
    let mut overwrite = false;
    let mut infile: Option<PathBuf> = None;

    for arg in &args[1..] {
        match arg.as_str() {
            "-v" => verbose = true,
            "-q" => quiet = true,
            "-f" => overwrite = true,
            "-h" => {
                short_help(&exe);
                return;
            }
            "-H" => {
                long_help(&exe);
                return;
            }
            other if other.starts_with('-') => {
                eprintln!("ERROR: unknown flag {other}");
                short_help(&exe);
                exit(EXIT_USAGE);
            }
            other => infile = Some(PathBuf::from(other)),
        }
    }

    if verbose && quiet {
        eprintln!("ERROR: -v and -q cannot be set simultaneously.");
        exit(EXIT_USAGE);
    }

    let level = if verbose {
        LevelFilter::Debug
    } else if quiet {
        LevelFilter::Error
    } else {
        LevelFilter::Info
    };
    pretty_env_logger::formatted_builder()
        .filter_level(level)
        .init();

    let Some(infile) = infile else {
        eprintln!("ERROR: no input file. Usage: {exe} [-v|-q] [-f] <primary file>");
        exit(EXIT_USAGE);
    };

    if let Err(err) = run(&infile, overwrite) {
        eprintln!("ERROR: {err}");
        exit(err.exit_code());
    }
}
