use crate::models::{CompId, EPS_RSRC};
use crate::{Error, Map, Result};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Canonical nuclide identifier, e.g. `92235` for U-235.
///
/// Both the short `zzaaa` form and the long `zzzaaammmm` form are accepted;
/// [`mass_number`] understands either.
pub type NucId = u32;

/// Shared handle to an immutable composition.
///
/// Compositions never change after creation; operations that would modify one
/// (blending, decay) produce a new composition instead. Sharing is by
/// reference count so a recipe used by a thousand materials is stored once.
pub type CompPtr = Arc<Composition>;

/// The basis a set of nuclide fractions was expressed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Basis {
    /// Fractions are atom (mole) fractions.
    Atom,
    /// Fractions are mass fractions.
    Mass,
}

/// Extract the mass number from a nuclide id.
///
/// `92235` (zzaaa) and `922350000` (zzzaaammmm) both yield 235. The mass
/// number doubles as the atomic mass in the basis conversion; exact masses
/// are a loader concern and arrive via recipes already on a mass basis when
/// that fidelity matters.
pub fn mass_number(nuc: NucId) -> u32 {
    if nuc >= 10_000_000 {
        (nuc / 10_000) % 1000
    } else {
        nuc % 1000
    }
}

/// An immutable, normalized nuclide composition.
///
/// Internally everything is kept as normalized mass fractions. Two
/// compositions constructed from proportional inputs hash and compare equal,
/// which is what lets the context intern them.
#[derive(Clone, Debug)]
pub struct Composition {
    comps: Map<NucId, f64>,
}

impl Composition {
    /// Build a composition from mass fractions (any positive scale).
    ///
    /// Fails with a value error when a fraction is negative or non-finite, or
    /// when the total is not positive.
    pub fn from_mass<I: IntoIterator<Item = (NucId, f64)>>(comps: I) -> Result<Self> {
        let mut map: Map<NucId, f64> = Map::default();
        for (nuc, frac) in comps {
            if !frac.is_finite() || frac < 0.0 {
                return Err(Error::Value(format!(
                    "invalid fraction {frac} for nuclide {nuc}"
                )));
            }
            if frac > 0.0 {
                *map.entry(nuc).or_insert(0.0) += frac;
            }
        }
        map.sort_unstable_keys();
        let total: f64 = map.values().sum();
        if total <= 0.0 {
            return Err(Error::Value("composition has no positive mass".to_string()));
        }
        for frac in map.values_mut() {
            *frac /= total;
        }
        Ok(Self { comps: map })
    }

    /// Build a composition from atom fractions, converting to the internal
    /// mass basis with each nuclide's mass number.
    pub fn from_atom<I: IntoIterator<Item = (NucId, f64)>>(comps: I) -> Result<Self> {
        Self::from_mass(
            comps
                .into_iter()
                .map(|(nuc, frac)| (nuc, frac * f64::from(mass_number(nuc)))),
        )
    }

    /// Build from either basis.
    pub fn new<I: IntoIterator<Item = (NucId, f64)>>(basis: Basis, comps: I) -> Result<Self> {
        match basis {
            Basis::Atom => Self::from_atom(comps),
            Basis::Mass => Self::from_mass(comps),
        }
    }

    /// The empty composition.
    ///
    /// Used for request targets that constrain only quantity, not isotopics;
    /// a vacuum never contributes nuclides when blended.
    pub fn vacuum() -> Self {
        Self {
            comps: Map::default(),
        }
    }

    /// The normalized mass fraction of `nuc`, zero when absent.
    pub fn mass_frac(&self, nuc: NucId) -> f64 {
        self.comps.get(&nuc).copied().unwrap_or(0.0)
    }

    /// The atom fraction of `nuc`, derived on access from the mass basis.
    pub fn atom_frac(&self, nuc: NucId) -> f64 {
        let denom: f64 = self
            .comps
            .iter()
            .map(|(&n, &frac)| frac / f64::from(mass_number(n)))
            .sum();
        if denom <= 0.0 {
            return 0.0;
        }
        self.mass_frac(nuc) / f64::from(mass_number(nuc)) / denom
    }

    /// Iterate `(nuclide, mass fraction)` pairs in nuclide order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (NucId, f64)> + '_ {
        self.comps.iter().map(|(&nuc, &frac)| (nuc, frac))
    }

    /// Number of nuclides with positive fraction.
    pub fn len(&self) -> usize {
        self.comps.len()
    }

    /// True when the composition is empty (only possible for the default).
    pub fn is_empty(&self) -> bool {
        self.comps.is_empty()
    }

    /// A content hash suitable for interning: proportional inputs collide.
    ///
    /// Fractions are quantized well below `EPS_RSRC` before hashing so that
    /// float noise from normalization does not split identical compositions.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = rustc_hash::FxHasher::default();
        for (&nuc, &frac) in &self.comps {
            nuc.hash(&mut hasher);
            ((frac / (EPS_RSRC * 1e-6)).round() as i64).hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Blend `other` into `self` with the given mass weights, producing the
    /// composition of the combined material.
    pub fn blend(&self, self_mass: f64, other: &Composition, other_mass: f64) -> Result<Self> {
        let total = self_mass + other_mass;
        if total <= 0.0 {
            return Err(Error::Value("cannot blend zero total mass".to_string()));
        }
        let mut map: Map<NucId, f64> = Map::default();
        for (nuc, frac) in self.iter() {
            *map.entry(nuc).or_insert(0.0) += frac * self_mass;
        }
        for (nuc, frac) in other.iter() {
            *map.entry(nuc).or_insert(0.0) += frac * other_mass;
        }
        if map.values().all(|&m| m <= 0.0) {
            return Ok(Self::vacuum());
        }
        Self::from_mass(map)
    }
}

impl PartialEq for Composition {
    fn eq(&self, other: &Self) -> bool {
        self.content_hash() == other.content_hash()
    }
}

impl Eq for Composition {}

/// The context-level interning table for compositions.
///
/// Identical compositions (by content hash) share a single `CompId` and a
/// single allocation. The bank reports whether an intern was new so the owner
/// can record the composition exactly once.
#[derive(Debug, Default)]
pub struct CompBank {
    by_hash: Map<u64, CompId>,
    comps: Vec<CompPtr>,
}

impl CompBank {
    /// Create an empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a composition, returning its id and whether it was new.
    pub fn intern(&mut self, comp: &CompPtr) -> (CompId, bool) {
        let hash = comp.content_hash();
        if let Some(&id) = self.by_hash.get(&hash) {
            return (id, false);
        }
        let id = CompId(self.comps.len() as u64 + 1);
        self.by_hash.insert(hash, id);
        self.comps.push(Arc::clone(comp));
        (id, true)
    }

    /// Look up an interned composition.
    pub fn get(&self, id: CompId) -> Option<&CompPtr> {
        self.comps.get(id.0.checked_sub(1)? as usize)
    }

    /// Number of distinct interned compositions.
    pub fn len(&self) -> usize {
        self.comps.len()
    }

    /// True when nothing has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.comps.is_empty()
    }
}
