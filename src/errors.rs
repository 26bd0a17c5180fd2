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

use std::io;
use thiserror::Error;

/// Crate-wide error type.
///
/// Input errors carry the offending file and line so a misconfigured run
/// points straight back at the input deck. Numerical errors abort the
/// integration; regime changes (grid latching, envelope exhaustion) are not
/// errors and are reported through the log facade instead.
#[derive(Error, Debug)]
pub enum AeonError {
    /// Malformed, missing, out-of-range or misplaced option.
    #[error("input error in {file}:{line}: {details}")]
    Input {
        file: String,
        line: usize,
        details: String,
    },

    /// Configuration rejected after all files were read consistently.
    #[error("verify error: {0}")]
    Verify(String),

    /// Two modules both claimed ownership of a value-driven variable.
    #[error("both {first} and {second} claim the value of {quantity} on body {body}")]
    DuplicateOwnership {
        quantity: &'static str,
        body: usize,
        first: &'static str,
        second: &'static str,
    },

    /// A tabulated lookup returned NaN or fell off the low end of the grid.
    #[error("numerical error: {0}")]
    Numerical(String),

    /// The adaptive step collapsed, almost certainly a misconfiguration.
    #[error("timestep fell below {floor:.3e} s for {strikes} consecutive steps")]
    StepCollapse { floor: f64, strikes: u32 },

    /// Output file already exists and overwriting was not requested.
    #[error("{0} exists: remove it, rename it, or set bOverwrite / pass -f")]
    FileExists(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl AeonError {
    /// Process exit code for the CLI, per error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            AeonError::Input { .. } | AeonError::Verify(_) | AeonError::DuplicateOwnership { .. } => 2,
            AeonError::Io(_) | AeonError::FileExists(_) => 3,
            AeonError::Numerical(_) | AeonError::StepCollapse { .. } => 4,
        }
    }
}
