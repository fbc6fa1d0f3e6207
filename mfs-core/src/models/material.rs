use crate::models::{CompPtr, Composition, NucId, ObjId, ResourceIds, EPS_RSRC, UNPACKAGED};
use crate::ports::DecayDynamics;
use crate::{Error, Map, Result};
use std::sync::Arc;

/// A quantity of matter with an isotopic composition, in kilograms.
///
/// Materials are the conserved currency of a simulation: every absorb and
/// extract preserves total mass within [`EPS_RSRC`]. The composition handle is
/// shared-immutable; mutation replaces the handle and bumps the state id.
#[derive(Clone, Debug)]
pub struct Material {
    obj: ObjId,
    state: u64,
    qty: f64,
    comp: CompPtr,
    package: String,
    prev_decay_time: i32,
    parent1: u64,
    parent2: u64,
}

impl Material {
    /// Create a new material object with a fresh object id.
    pub fn new(ids: &mut ResourceIds, qty: f64, comp: CompPtr) -> Result<Self> {
        if !qty.is_finite() || qty < 0.0 {
            return Err(Error::Value(format!("invalid material quantity {qty}")));
        }
        Ok(Self {
            obj: ids.next_obj(),
            state: 1,
            qty,
            comp,
            package: UNPACKAGED.to_string(),
            prev_decay_time: 0,
            parent1: 0,
            parent2: 0,
        })
    }

    /// Lineage: the object this one was extracted from and the object most
    /// recently absorbed into it (zero when not applicable).
    pub fn parents(&self) -> (u64, u64) {
        (self.parent1, self.parent2)
    }

    /// The unique object id.
    pub fn obj_id(&self) -> ObjId {
        self.obj
    }

    /// The state id, strictly increasing across mutations of this object.
    pub fn state_id(&self) -> u64 {
        self.state
    }

    /// Current mass in kilograms.
    pub fn quantity(&self) -> f64 {
        self.qty
    }

    /// The shared composition handle.
    pub fn comp(&self) -> &CompPtr {
        &self.comp
    }

    /// The name of the package this material is held under.
    pub fn package_name(&self) -> &str {
        &self.package
    }

    /// The mass of a single nuclide within this material, in kilograms.
    pub fn mass_of(&self, nuc: NucId) -> f64 {
        self.qty * self.comp.mass_frac(nuc)
    }

    pub(crate) fn set_package_name(&mut self, name: &str) {
        self.package = name.to_string();
        self.bump();
    }

    pub(crate) fn cloned(&self, ids: &mut ResourceIds) -> Material {
        Material {
            obj: ids.next_obj(),
            state: 1,
            ..self.clone()
        }
    }

    fn bump(&mut self) {
        self.state += 1;
    }

    /// Fold `other` into this material.
    ///
    /// The result's composition is the mass-weighted blend; `other` is left
    /// with zero quantity (its object id stays valid, its state id bumps).
    pub fn absorb(&mut self, other: &mut Material) -> Result<()> {
        if other.qty > 0.0 {
            self.comp = Arc::new(self.comp.blend(self.qty, &other.comp, other.qty)?);
            self.qty += other.qty;
            other.qty = 0.0;
            self.parent2 = other.obj.0;
        }
        self.bump();
        other.bump();
        Ok(())
    }

    /// Split off `qty` kilograms with this material's composition.
    pub fn extract_qty(&mut self, qty: f64, ids: &mut ResourceIds) -> Result<Material> {
        if !qty.is_finite() || qty < 0.0 {
            return Err(Error::Value(format!("invalid extraction quantity {qty}")));
        }
        if qty > self.qty + EPS_RSRC {
            return Err(Error::Value(format!(
                "extraction of {qty} kg exceeds material quantity {}",
                self.qty
            )));
        }
        self.qty = (self.qty - qty).max(0.0);
        self.bump();
        let mut extracted = Material::new(ids, qty, Arc::clone(&self.comp))?;
        extracted.package = self.package.clone();
        extracted.parent1 = self.obj.0;
        Ok(extracted)
    }

    /// Split off `qty` kilograms of the given composition.
    ///
    /// Each nuclide of `comp` is deducted componentwise; the call fails when
    /// any component is under-represented beyond [`EPS_RSRC`], leaving this
    /// material untouched. The residual composition is rebuilt from the
    /// remaining mass map.
    pub fn extract_comp(
        &mut self,
        qty: f64,
        comp: &CompPtr,
        ids: &mut ResourceIds,
    ) -> Result<Material> {
        if !qty.is_finite() || qty < 0.0 {
            return Err(Error::Value(format!("invalid extraction quantity {qty}")));
        }
        let mut residual: Map<NucId, f64> =
            self.comp.iter().map(|(nuc, frac)| (nuc, frac * self.qty)).collect();
        for (nuc, frac) in comp.iter() {
            let want = frac * qty;
            let have = residual.get(&nuc).copied().unwrap_or(0.0);
            if have < want - EPS_RSRC {
                return Err(Error::Value(format!(
                    "insufficient nuclide {nuc}: have {have} kg, want {want} kg"
                )));
            }
            residual.insert(nuc, (have - want).max(0.0));
        }

        let residual_mass: f64 = residual.values().sum();
        if residual_mass > EPS_RSRC {
            self.comp = Arc::new(Composition::from_mass(residual)?);
        }
        self.qty = residual_mass.max(0.0);
        self.bump();

        let mut extracted = Material::new(ids, qty, Arc::clone(comp))?;
        extracted.package = self.package.clone();
        extracted.parent1 = self.obj.0;
        Ok(extracted)
    }

    /// Advance this material's composition through the decay port.
    ///
    /// Quantity is untouched: decay is a composition change at the resource
    /// level. No-op when no time has elapsed since the last update.
    pub fn apply_decay(&mut self, dynamics: &dyn DecayDynamics, now: i32) {
        let dt = now - self.prev_decay_time;
        if dt > 0 {
            self.comp = Arc::new(dynamics.decay(&self.comp, dt));
            self.prev_decay_time = now;
            self.bump();
        }
    }
}
