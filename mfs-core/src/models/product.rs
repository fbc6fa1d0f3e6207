use crate::models::{ObjId, ResourceIds, EPS_RSRC, UNPACKAGED};
use crate::{Error, Result};

/// A bulk quantity of some good distinguished only by a quality label.
///
/// Unlike [`Material`](crate::models::Material), products carry no internal
/// structure; two products are mixable exactly when their qualities match.
/// Units are whatever the quality implies (kg, m^3, count).
#[derive(Clone, Debug)]
pub struct Product {
    obj: ObjId,
    state: u64,
    qty: f64,
    quality: String,
    package: String,
    parent1: u64,
    parent2: u64,
}

impl Product {
    /// Create a new product object with a fresh object id.
    pub fn new(ids: &mut ResourceIds, qty: f64, quality: impl Into<String>) -> Result<Self> {
        if !qty.is_finite() || qty < 0.0 {
            return Err(Error::Value(format!("invalid product quantity {qty}")));
        }
        Ok(Self {
            obj: ids.next_obj(),
            state: 1,
            qty,
            quality: quality.into(),
            package: UNPACKAGED.to_string(),
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

    /// Current quantity.
    pub fn quantity(&self) -> f64 {
        self.qty
    }

    /// The quality tag.
    pub fn quality(&self) -> &str {
        &self.quality
    }

    /// The name of the package this product is held under.
    pub fn package_name(&self) -> &str {
        &self.package
    }

    pub(crate) fn set_package_name(&mut self, name: &str) {
        self.package = name.to_string();
        self.bump();
    }

    pub(crate) fn cloned(&self, ids: &mut ResourceIds) -> Product {
        Product {
            obj: ids.next_obj(),
            state: 1,
            ..self.clone()
        }
    }

    fn bump(&mut self) {
        self.state += 1;
    }

    /// Fold `other` into this product. Fails unless qualities match.
    pub fn absorb(&mut self, other: &mut Product) -> Result<()> {
        if self.quality != other.quality {
            return Err(Error::Value(format!(
                "cannot absorb product of quality '{}' into '{}'",
                other.quality, self.quality
            )));
        }
        self.qty += other.qty;
        other.qty = 0.0;
        self.parent2 = other.obj.0;
        self.bump();
        other.bump();
        Ok(())
    }

    /// Split off `qty` with the same quality.
    pub fn extract_qty(&mut self, qty: f64, ids: &mut ResourceIds) -> Result<Product> {
        if !qty.is_finite() || qty < 0.0 {
            return Err(Error::Value(format!("invalid extraction quantity {qty}")));
        }
        if qty > self.qty + EPS_RSRC {
            return Err(Error::Value(format!(
                "extraction of {qty} exceeds product quantity {}",
                self.qty
            )));
        }
        self.qty = (self.qty - qty).max(0.0);
        self.bump();
        let mut extracted = Product::new(ids, qty, self.quality.clone())?;
        extracted.package = self.package.clone();
        extracted.parent1 = self.obj.0;
        Ok(extracted)
    }
}
