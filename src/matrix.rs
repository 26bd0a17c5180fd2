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

//! The update matrix: for every body, the ordered list of primary variables
//! and, for each variable, the modules contributing to it.
//!
//! Rate-driven variables accept any number of contributors whose results sum;
//! value-driven variables accept exactly one owner, enforced at claim time.
//! The matrix shape is fixed after verification; the only permitted runtime
//! mutation is swapping a contributor's compute function for the zero stub
//! once its equation has expired.

use crate::body::{Body, System};
use crate::consts::TINY_RATE;
use crate::errors::AeonError;
use crate::module::ModuleId;

/// A derivative (or value) contributor. Reads the full body slice plus the
/// index slice describing which bodies this equation cares about; index 0 is
/// always the body being updated.
pub type DerivFn = fn(&[Body], &System, &[usize]) -> f64;

/// Stand-in for an expired equation. Returns a sub-denormal rate rather than
/// an exact zero so timescale divisions stay finite.
pub fn stub_tiny(_bodies: &[Body], _system: &System, _ia: &[usize]) -> f64 {
    TINY_RATE
}

/// How a variable participates in timestep selection and in the Runge-Kutta
/// substeps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
    /// The contributor returns the new value directly; assigned, never
    /// incremented, and excluded from timestep selection.
    Value,
    /// The contributor returns dx/dt; the characteristic time is |x / sum|.
    Rate,
    /// Sinusoidal component; the characteristic time is |1 / sum|, measured
    /// against the parent angle near the poles of the parameterization.
    Polar,
    /// Integrated for bookkeeping only; never constrains the timestep.
    Derived,
    /// Closed-form function of time; the characteristic time is the interval
    /// to the next output.
    Explicit,
    /// Rate-driven with an enforced minimum step.
    Floor,
    /// Cartesian position/velocity component; the characteristic time is
    /// |r| / |v|.
    NBody,
}

/// The parent angle a Polar component is measured against when the component
/// itself passes through zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolarParent {
    Obliquity,
    Eccentricity,
}

/// The primary variables the matrix can address on a body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quantity {
    SurfaceWaterMass,
    OxygenMass,
    OxygenMantleMass,
    EnvelopeMass,
    Mass,
    Radius,
    Luminosity,
    Temperature,
    RadGyra,
    RotRate,
    LostAngMom,
    LostEng,
}

impl Quantity {
    pub fn name(&self) -> &'static str {
        match self {
            Quantity::SurfaceWaterMass => "SurfWaterMass",
            Quantity::OxygenMass => "OxygenMass",
            Quantity::OxygenMantleMass => "OxygenMantleMass",
            Quantity::EnvelopeMass => "EnvelopeMass",
            Quantity::Mass => "Mass",
            Quantity::Radius => "Radius",
            Quantity::Luminosity => "Luminosity",
            Quantity::Temperature => "Temperature",
            Quantity::RadGyra => "RadGyra",
            Quantity::RotRate => "RotRate",
            Quantity::LostAngMom => "LostAngMom",
            Quantity::LostEng => "LostEng",
        }
    }

    pub fn get(&self, b: &Body) -> f64 {
        match self {
            Quantity::SurfaceWaterMass => b.surface_water_mass,
            Quantity::OxygenMass => b.oxygen_mass,
            Quantity::OxygenMantleMass => b.oxygen_mantle_mass,
            Quantity::EnvelopeMass => b.envelope_mass,
            Quantity::Mass => b.mass,
            Quantity::Radius => b.radius,
            Quantity::Luminosity => b.luminosity,
            Quantity::Temperature => b.temperature,
            Quantity::RadGyra => b.rad_gyra,
            Quantity::RotRate => b.rot_rate,
            Quantity::LostAngMom => b.lost_ang_mom,
            Quantity::LostEng => b.lost_eng,
        }
    }

    pub fn set(&self, b: &mut Body, v: f64) {
        match self {
            Quantity::SurfaceWaterMass => b.surface_water_mass = v,
            Quantity::OxygenMass => b.oxygen_mass = v,
            Quantity::OxygenMantleMass => b.oxygen_mantle_mass = v,
            Quantity::EnvelopeMass => b.envelope_mass = v,
            Quantity::Mass => b.mass = v,
            Quantity::Radius => b.radius = v,
            Quantity::Luminosity => b.luminosity = v,
            Quantity::Temperature => b.temperature = v,
            Quantity::RadGyra => b.rad_gyra = v,
            Quantity::RotRate => b.rot_rate = v,
            Quantity::LostAngMom => b.lost_ang_mom = v,
            Quantity::LostEng => b.lost_eng = v,
        }
    }
}

/// One module's entry for one variable.
#[derive(Clone, Debug)]
pub struct Contributor {
    pub module: ModuleId,
    /// Index slice handed to `compute`; entry 0 is the updated body.
    pub bodies: Vec<usize>,
    pub compute: DerivFn,
}

/// One primary variable of one body, with all its contributors and the
/// scratch storage their results land in.
#[derive(Clone, Debug)]
pub struct VarSlot {
    pub quantity: Quantity,
    pub kind: VarKind,
    pub contribs: Vec<Contributor>,
    /// Latest per-contributor result, refreshed by `eval`.
    pub scratch: Vec<f64>,
    /// Weighted derivative of the last committed step, for logging.
    pub deriv_total: f64,
    pub polar_parent: Option<PolarParent>,
    /// Minimum characteristic time for Floor-kind variables, seconds.
    pub dt_floor: f64,
}

impl VarSlot {
    /// Sum of the latest contributor results.
    pub fn sum(&self) -> f64 {
        self.scratch.iter().sum()
    }
}

/// The per-body update matrix.
#[derive(Clone, Debug, Default)]
pub struct BodyMatrix {
    pub vars: Vec<VarSlot>,
}

impl BodyMatrix {
    pub fn new() -> Self {
        BodyMatrix { vars: Vec::new() }
    }

    pub fn slot(&self, q: Quantity) -> Option<&VarSlot> {
        self.vars.iter().find(|s| s.quantity == q)
    }

    pub fn slot_mut(&mut self, q: Quantity) -> Option<&mut VarSlot> {
        self.vars.iter_mut().find(|s| s.quantity == q)
    }

    /// Whether any module has claimed `q` on this body.
    pub fn contains(&self, q: Quantity) -> bool {
        self.slot(q).is_some()
    }

    /// Claim exclusive, value-driven ownership of `q`. Fails if any other
    /// module already touches the variable; a value-driven variable has
    /// exactly one owner.
    pub fn claim_value(
        &mut self,
        q: Quantity,
        module: ModuleId,
        body: usize,
        bodies: Vec<usize>,
    ) -> Result<(), AeonError> {
        if let Some(slot) = self.slot(q) {
            return Err(AeonError::DuplicateOwnership {
                quantity: q.name(),
                body,
                first: slot.contribs[0].module.name(),
                second: module.name(),
            });
        }
        self.vars.push(VarSlot {
            quantity: q,
            kind: VarKind::Value,
            contribs: vec![Contributor {
                module,
                bodies,
                compute: stub_tiny,
            }],
            scratch: vec![0.0],
            deriv_total: 0.0,
            polar_parent: None,
            dt_floor: 0.0,
        });
        Ok(())
    }

    /// Claim a rate-driven contribution to `q` with the given kind. Multiple
    /// modules may stack contributions; claiming over a value-driven slot is
    /// an ownership conflict.
    pub fn claim_rate(
        &mut self,
        q: Quantity,
        kind: VarKind,
        module: ModuleId,
        body: usize,
        bodies: Vec<usize>,
    ) -> Result<(), AeonError> {
        debug_assert!(kind != VarKind::Value);
        if let Some(slot) = self.slot_mut(q) {
            if slot.kind == VarKind::Value {
                return Err(AeonError::DuplicateOwnership {
                    quantity: q.name(),
                    body,
                    first: slot.contribs[0].module.name(),
                    second: module.name(),
                });
            }
            slot.contribs.push(Contributor {
                module,
                bodies,
                compute: stub_tiny,
            });
            slot.scratch.push(0.0);
            return Ok(());
        }
        self.vars.push(VarSlot {
            quantity: q,
            kind,
            contribs: vec![Contributor {
                module,
                bodies,
                compute: stub_tiny,
            }],
            scratch: vec![0.0],
            deriv_total: 0.0,
            polar_parent: None,
            dt_floor: 0.0,
        });
        Ok(())
    }

    /// Install (or swap) the compute function for `module`'s contribution to
    /// `q`. Returns false when the slot was never claimed, which callers
    /// treat as "variable not in the matrix for this configuration".
    pub fn set_compute(&mut self, q: Quantity, module: ModuleId, f: DerivFn) -> bool {
        if let Some(slot) = self.slot_mut(q) {
            for c in slot.contribs.iter_mut() {
                if c.module == module {
                    c.compute = f;
                    return true;
                }
            }
        }
        false
    }

    /// Run every contributor against `bodies`, storing the results in the
    /// scratch matrix. No allocation happens here; the shape was fixed at
    /// verification.
    pub fn eval(&mut self, bodies: &[Body], system: &System) {
        for slot in self.vars.iter_mut() {
            for k in 0..slot.contribs.len() {
                let c = &slot.contribs[k];
                let v = (c.compute)(bodies, system, &c.bodies);
                slot.scratch[k] = v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_rate(_b: &[Body], _s: &System, _ia: &[usize]) -> f64 {
        2.5
    }

    #[test]
    fn value_ownership_is_exclusive() {
        let mut m = BodyMatrix::new();
        m.claim_value(Quantity::Radius, ModuleId::AtmEsc, 1, vec![1])
            .unwrap();
        let err = m
            .claim_value(Quantity::Radius, ModuleId::Stellar, 1, vec![1])
            .unwrap_err();
        assert!(matches!(err, AeonError::DuplicateOwnership { .. }));
        // A rate claim over a value slot is just as illegal.
        let err = m
            .claim_rate(Quantity::Radius, VarKind::Rate, ModuleId::Stellar, 1, vec![1])
            .unwrap_err();
        assert!(matches!(err, AeonError::DuplicateOwnership { .. }));
    }

    #[test]
    fn rate_contributions_stack_and_sum() {
        let mut m = BodyMatrix::new();
        m.claim_rate(Quantity::RotRate, VarKind::Rate, ModuleId::Stellar, 0, vec![0])
            .unwrap();
        m.claim_rate(Quantity::RotRate, VarKind::Rate, ModuleId::AtmEsc, 0, vec![0])
            .unwrap();
        assert!(m.set_compute(Quantity::RotRate, ModuleId::Stellar, unit_rate));
        assert!(m.set_compute(Quantity::RotRate, ModuleId::AtmEsc, unit_rate));

        let bodies = vec![Body::default()];
        let system = System::default();
        m.eval(&bodies, &system);
        let slot = m.slot(Quantity::RotRate).unwrap();
        assert_eq!(slot.contribs.len(), 2);
        assert_eq!(slot.sum(), 5.0);
    }

    #[test]
    fn swapping_to_the_stub_disables_an_equation() {
        let mut m = BodyMatrix::new();
        m.claim_rate(
            Quantity::EnvelopeMass,
            VarKind::Rate,
            ModuleId::AtmEsc,
            1,
            vec![1],
        )
        .unwrap();
        m.set_compute(Quantity::EnvelopeMass, ModuleId::AtmEsc, unit_rate);
        m.set_compute(Quantity::EnvelopeMass, ModuleId::AtmEsc, stub_tiny);

        let bodies = vec![Body::default()];
        let system = System::default();
        m.eval(&bodies, &system);
        assert!(m.slot(Quantity::EnvelopeMass).unwrap().sum() < 1e-300);
    }

    #[test]
    fn set_compute_on_unclaimed_slot_reports_absence() {
        let mut m = BodyMatrix::new();
        assert!(!m.set_compute(Quantity::Luminosity, ModuleId::Stellar, unit_rate));
    }
}
