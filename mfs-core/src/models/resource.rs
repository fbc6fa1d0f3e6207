use crate::models::{Material, ObjId, Package, Product, ResourceIds};
use crate::{Error, Result};

/// Relative tolerance for resource quantity comparisons.
///
/// Conservation checks, capacity checks, and extraction underflow checks all
/// compare against this rather than zero.
pub const EPS_RSRC: f64 = 1e-6;

/// The largest quantity that survives a round trip through an integer count.
pub const MAX_INT_QTY: f64 = 9_007_199_254_740_992.0; // 2^53

/// The resource kind tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ResourceKind {
    /// Isotopic material, conserved in kilograms.
    Material,
    /// Bulk product with a quality tag.
    Product,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Material => write!(f, "Material"),
            ResourceKind::Product => write!(f, "Product"),
        }
    }
}

/// The transacted unit: either a [`Material`] or a [`Product`].
///
/// A closed enum rather than a trait object: the set of resource kinds is
/// fixed, and the exchange needs to pattern-match on it to decide
/// compatibility. Common operations are forwarded to the underlying kind.
#[derive(Clone, Debug)]
pub enum Resource {
    /// An isotopic material.
    Material(Material),
    /// A bulk product.
    Product(Product),
}

impl From<Material> for Resource {
    fn from(value: Material) -> Self {
        Resource::Material(value)
    }
}

impl From<Product> for Resource {
    fn from(value: Product) -> Self {
        Resource::Product(value)
    }
}

impl Resource {
    /// The kind tag.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Material(_) => ResourceKind::Material,
            Resource::Product(_) => ResourceKind::Product,
        }
    }

    /// The unique object id.
    pub fn obj_id(&self) -> ObjId {
        match self {
            Resource::Material(m) => m.obj_id(),
            Resource::Product(p) => p.obj_id(),
        }
    }

    /// The state id, strictly increasing across mutations of this object.
    pub fn state_id(&self) -> u64 {
        match self {
            Resource::Material(m) => m.state_id(),
            Resource::Product(p) => p.state_id(),
        }
    }

    /// Current quantity in kind-defined units.
    pub fn quantity(&self) -> f64 {
        match self {
            Resource::Material(m) => m.quantity(),
            Resource::Product(p) => p.quantity(),
        }
    }

    /// Kind-defined units: kilograms for materials, the quality tag for
    /// products.
    pub fn units(&self) -> &str {
        match self {
            Resource::Material(_) => "kg",
            Resource::Product(p) => p.quality(),
        }
    }

    /// The name of the package this resource is held under.
    pub fn package_name(&self) -> &str {
        match self {
            Resource::Material(m) => m.package_name(),
            Resource::Product(p) => p.package_name(),
        }
    }

    /// Lineage object ids `(parent1, parent2)`; zero when not applicable.
    pub fn parents(&self) -> (u64, u64) {
        match self {
            Resource::Material(m) => m.parents(),
            Resource::Product(p) => p.parents(),
        }
    }

    /// An untracked copy with a fresh object id. Emits nothing.
    pub fn clone_with_id(&self, ids: &mut ResourceIds) -> Resource {
        match self {
            Resource::Material(m) => Resource::Material(m.cloned(ids)),
            Resource::Product(p) => Resource::Product(p.cloned(ids)),
        }
    }

    /// Remove `qty` from this resource, returning it as a new object.
    ///
    /// Composition and quality are inherited; both this resource and the
    /// returned one bump their state ids.
    pub fn extract_res(&mut self, qty: f64, ids: &mut ResourceIds) -> Result<Resource> {
        match self {
            Resource::Material(m) => Ok(Resource::Material(m.extract_qty(qty, ids)?)),
            Resource::Product(p) => Ok(Resource::Product(p.extract_qty(qty, ids)?)),
        }
    }

    /// Fold a compatible resource into this one.
    ///
    /// Material absorbs material (blending compositions); product absorbs
    /// product of equal quality. Anything else is a value error.
    pub fn absorb(&mut self, other: &mut Resource) -> Result<()> {
        match (self, other) {
            (Resource::Material(a), Resource::Material(b)) => a.absorb(b),
            (Resource::Product(a), Resource::Product(b)) => a.absorb(b),
            _ => Err(Error::Value(
                "cannot absorb across resource kinds".to_string(),
            )),
        }
    }

    /// True when an offered resource can satisfy a request targeting `self`.
    ///
    /// Materials accept any composition under the current quality predicate;
    /// products require quality equality.
    pub fn accepts_offer(&self, offer: &Resource) -> bool {
        match (self, offer) {
            (Resource::Material(_), Resource::Material(_)) => true,
            (Resource::Product(a), Resource::Product(b)) => a.quality() == b.quality(),
            _ => false,
        }
    }

    /// Subdivide this resource into package-sized draws.
    ///
    /// Draws continue while the remaining quantity exceeds the package's fill
    /// minimum; each draw is `min(remaining, fill mass)` and is tagged with
    /// the package name. The residual stays behind under the original
    /// package name. Fails when a draw would not be integer-representable.
    pub fn package<R: rand::Rng>(
        &mut self,
        pkg: &Package,
        ids: &mut ResourceIds,
        rng: &mut R,
    ) -> Result<Vec<Resource>> {
        let mut packaged = Vec::new();
        while self.quantity() > pkg.fill_min() {
            let fill = pkg.get_fill_mass(self.quantity(), rng);
            if fill <= 0.0 {
                break;
            }
            let draw = fill.min(self.quantity());
            if draw > MAX_INT_QTY {
                return Err(Error::Value(format!(
                    "package draw of {draw} is not integer-representable"
                )));
            }
            let mut drawn = self.extract_res(draw, ids)?;
            match &mut drawn {
                Resource::Material(m) => m.set_package_name(pkg.name()),
                Resource::Product(p) => p.set_package_name(pkg.name()),
            }
            packaged.push(drawn);
        }
        Ok(packaged)
    }
}
