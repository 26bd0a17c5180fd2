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

//! The module capability trait.
//!
//! A physics module is a named set of hooks: it reads its options, claims
//! variables in the update matrix at verification, installs derivative
//! callbacks, recomputes its auxiliaries before every derivative evaluation,
//! applies post-step forcing, copies its fields into the integrator scratch
//! body, and registers halt predicates. The evolution loop only ever talks to
//! this trait, so new physics drops in without touching the integrator.

use std::sync::Arc;

use crate::body::{Body, System, World};
use crate::errors::AeonError;
use crate::io::options::BodyFile;
use crate::matrix::BodyMatrix;
use crate::units::Units;

/// Identifies a module inside the update matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleId {
    AtmEsc,
    Stellar,
}

impl ModuleId {
    pub fn name(&self) -> &'static str {
        match self {
            ModuleId::AtmEsc => "atmesc",
            ModuleId::Stellar => "stellar",
        }
    }
}

/// A halt predicate: true means stop the evolution after this step. The
/// predicate logs its own reason.
pub type HaltFn = fn(&[Body], &System, usize) -> bool;

/// Per-body halt configuration, populated from the input deck.
#[derive(Clone, Debug, Default)]
pub struct HaltPolicy {
    /// Stop when the surface water mass reaches its minimum.
    pub surface_desiccated: bool,
    /// Stop when the gaseous envelope is fully evaporated.
    pub envelope_gone: bool,
    /// Stop when the stellar track runs off the high end of its grid.
    pub end_of_grid: bool,
}

/// The capability set every physics module provides.
pub trait Module {
    fn id(&self) -> ModuleId;

    fn name(&self) -> &'static str {
        self.id().name()
    }

    /// Populate body fields and the halt policy from a parsed body file.
    fn read_options(
        &self,
        body: &mut Body,
        halt: &mut HaltPolicy,
        file: &mut BodyFile,
        units: &Units,
    ) -> Result<(), AeonError>;

    /// Validate the configuration, seed derived state, and claim this
    /// module's variable slots on body `i`. Fatal on conflicting ownership or
    /// out-of-range values.
    fn verify(
        &self,
        world: &mut World,
        matrix: &mut [BodyMatrix],
        i: usize,
    ) -> Result<(), AeonError>;

    /// Install the live derivative callbacks for body `i`.
    fn assign_derivatives(&self, body: &Body, matrix: &mut BodyMatrix);

    /// Install zero stubs on every slot this module claimed; used for
    /// disabled configurations.
    fn null_derivatives(&self, body: &Body, matrix: &mut BodyMatrix);

    /// Recompute auxiliary quantities on body `i` from primary state. Runs
    /// in registration order after the general pass; may read other bodies
    /// (planets read the star) but writes only to its own body.
    fn props_aux(&self, bodies: &mut [Body], system: &System, i: usize);

    /// Post-step forcing: clamp primaries to floors, retire expired
    /// equations, emit one-shot messages. Must not touch dt and must not
    /// introduce variables.
    fn force_behavior(&self, bodies: &mut [Body], matrix: &mut [BodyMatrix], i: usize);

    /// Copy every field this module touches from `src` onto `dest`. The
    /// composition of all active modules' copies plus the general copy must
    /// reproduce the body exactly; the integrator scratch body depends on it.
    fn body_copy(&self, dest: &mut Body, src: &Body);

    /// How many halt predicates this module will register under `halt`.
    fn count_halts(&self, halt: &HaltPolicy) -> usize;

    /// Append this module's halt predicates, in order.
    fn verify_halt(&self, halt: &HaltPolicy, halts: &mut Vec<HaltFn>);

    /// Module-specific lines for the start/end log, beyond the standard
    /// output columns.
    fn log_body(&self, world: &World, i: usize, out: &mut String);
}

/// Resolve a `saModules` list into module instances, preserving order.
/// Registration order matters: auxiliary hooks run in it.
pub fn modules_from_names(names: &[String]) -> Result<Vec<Arc<dyn Module>>, AeonError> {
    let mut out: Vec<Arc<dyn Module>> = Vec::with_capacity(names.len());
    for name in names {
        match name.to_lowercase().as_str() {
            "atmesc" => out.push(Arc::new(crate::modules::atmesc::AtmEsc)),
            "stellar" => out.push(Arc::new(crate::modules::stellar::Stellar)),
            other => {
                return Err(AeonError::Verify(format!(
                    "unknown module '{other}': available modules are atmesc, stellar"
                )))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_resolution_is_case_insensitive_and_ordered() {
        let mods =
            modules_from_names(&["STELLAR".to_string(), "AtmEsc".to_string()]).unwrap();
        assert_eq!(mods.len(), 2);
        assert_eq!(mods[0].id(), ModuleId::Stellar);
        assert_eq!(mods[1].id(), ModuleId::AtmEsc);
    }

    #[test]
    fn unknown_module_is_fatal() {
        assert!(modules_from_names(&["distorb".to_string()]).is_err());
    }
}
