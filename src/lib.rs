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

//! # aeon
//!
//! A multi-module planetary system evolution engine. Given a star, its
//! planets, and a set of physics modules, aeon integrates the coupled
//! differential equations those modules contribute over billions of years,
//! writing periodic snapshots along the way.
//!
//! The moving parts:
//!
//! - a per-body, per-variable **update matrix** of derivative contributors,
//!   composed at runtime from the active modules ([`matrix`]);
//! - an **adaptive fourth-order Runge-Kutta integrator** whose step follows
//!   the smallest characteristic timescale in the matrix ([`evolve`]);
//! - physics **modules** behind one capability trait ([`module`]): currently
//!   atmospheric escape and stellar evolution ([`modules`]).
//!
//! Bodies are indexed with the star at zero; planets read stellar state
//! through the shared body slice. Everything runs single-threaded and in
//! SI units internally.

/// Physical and numerical constants.
pub mod consts;

/// Crate-wide error type.
pub mod errors;

/// Bodies, the system record, and the world.
pub mod body;

/// The update matrix of derivative contributors.
pub mod matrix;

/// The module capability trait and registry.
pub mod module;

/// Timestep selection, steppers, and the evolution loop.
pub mod evolve;

/// The bundled physics modules.
pub mod modules;

/// Habitable zone limits and instellation.
pub mod hz;

/// Problem units.
pub mod units;

/// Input decks, forward files, and the run log.
pub mod io;

pub use crate::body::{Body, System, World};
pub use crate::errors::AeonError;
pub use crate::evolve::{Engine, EvolveOpts, EvolveOutcome, NullSink, OutputSink, StepMethod};
pub use crate::matrix::{BodyMatrix, Quantity, VarKind};
pub use crate::module::{Module, ModuleId};
