use crate::models::{ObjId, Resource, ResourceIds, EPS_RSRC};
use crate::{Error, Result, Set};
use std::collections::VecDeque;

/// Which end of the buffer a pop draws from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessDir {
    /// Oldest push first (FIFO). The default.
    Front,
    /// Newest push first (LIFO).
    Back,
}

/// Compensated summation, used to keep the running buffer total stable
/// against float drift as resources churn through.
pub fn kahan_sum<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let mut sum = 0.0;
    let mut carry = 0.0;
    for value in values {
        let y = value - carry;
        let t = sum + y;
        carry = (t - sum) - y;
        sum = t;
    }
    sum
}

/// A bounded, ordered multiset of resources.
///
/// The workhorse container for agent stocks and inventories. Resources are
/// stored as distinct objects and never merged in place; popping retrieves
/// them in push order unless directed otherwise. A default-constructed
/// buffer has infinite capacity.
#[derive(Debug)]
pub struct ResBuf {
    capacity: f64,
    qty: f64,
    rs: VecDeque<Resource>,
    present: Set<ObjId>,
}

impl Default for ResBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl ResBuf {
    /// An empty buffer with infinite capacity.
    pub fn new() -> Self {
        Self {
            capacity: f64::INFINITY,
            qty: 0.0,
            rs: VecDeque::new(),
            present: Set::default(),
        }
    }

    /// An empty buffer bounded by `capacity`.
    pub fn with_capacity(capacity: f64) -> Self {
        let mut buf = Self::new();
        buf.capacity = capacity.max(0.0);
        buf
    }

    /// The maximum total quantity this buffer can hold.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Lower the capacity. Fails when the buffer already holds more than the
    /// new limit (beyond [`EPS_RSRC`]).
    pub fn set_capacity(&mut self, capacity: f64) -> Result<()> {
        if self.qty - capacity > EPS_RSRC {
            return Err(Error::Value(format!(
                "new capacity {capacity} lower than existing quantity {}",
                self.qty
            )));
        }
        self.capacity = capacity;
        Ok(())
    }

    /// Number of constituent resource objects.
    pub fn count(&self) -> usize {
        self.rs.len()
    }

    /// Total quantity of all constituent resources.
    pub fn quantity(&self) -> f64 {
        self.qty
    }

    /// Remaining room: `capacity - quantity`.
    pub fn space(&self) -> f64 {
        self.capacity - self.qty
    }

    /// True when the buffer holds no resources.
    pub fn is_empty(&self) -> bool {
        self.rs.is_empty()
    }

    /// Iterate the members in front-to-back order without removing them.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.rs.iter()
    }

    /// Advance every held material through the decay port.
    ///
    /// Quantities are unchanged (decay is a composition transform), so the
    /// buffer total is untouched.
    pub fn decay_all(&mut self, dynamics: &dyn crate::ports::DecayDynamics, now: i32) {
        for r in &mut self.rs {
            if let Resource::Material(m) = r {
                m.apply_decay(dynamics, now);
            }
        }
    }

    fn resum(&mut self) {
        self.qty = kahan_sum(self.rs.iter().map(Resource::quantity));
    }

    /// Push a single resource.
    ///
    /// Fails with a value error when it would overfill the buffer and a key
    /// error when the same object is already present.
    pub fn push(&mut self, r: Resource) -> Result<()> {
        if r.quantity() - self.space() > EPS_RSRC {
            return Err(Error::Value(format!(
                "resource push breaks capacity limit: space={}, quantity={}",
                self.space(),
                r.quantity()
            )));
        }
        if self.present.contains(&r.obj_id()) {
            return Err(Error::Key("duplicate resource push attempted".to_string()));
        }
        self.qty += r.quantity();
        self.present.insert(r.obj_id());
        self.rs.push_back(r);
        Ok(())
    }

    /// Push several resources atomically: either all fit and none is a
    /// duplicate, or the buffer is left untouched.
    pub fn push_all(&mut self, rs: Vec<Resource>) -> Result<()> {
        let total: f64 = kahan_sum(rs.iter().map(Resource::quantity));
        if total - self.space() > EPS_RSRC {
            return Err(Error::Value(format!(
                "resource push breaks capacity limit: space={}, total={total}",
                self.space()
            )));
        }
        let mut seen = Set::default();
        for r in &rs {
            if self.present.contains(&r.obj_id()) || !seen.insert(r.obj_id()) {
                return Err(Error::Key("duplicate resource push attempted".to_string()));
            }
        }
        for r in rs {
            self.qty += r.quantity();
            self.present.insert(r.obj_id());
            self.rs.push_back(r);
        }
        Ok(())
    }

    /// Pop one resource object, from the front by default.
    pub fn pop(&mut self, dir: AccessDir) -> Result<Resource> {
        let r = match dir {
            AccessDir::Front => self.rs.pop_front(),
            AccessDir::Back => self.rs.pop_back(),
        }
        .ok_or_else(|| Error::Value("cannot pop resource from an empty buffer".to_string()))?;
        self.present.swap_remove(&r.obj_id());
        self.resum();
        Ok(r)
    }

    /// Pop `n` resource objects in front order, without splitting.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Resource>> {
        if n > self.count() {
            return Err(Error::Value(format!(
                "remove count {n} larger than buffer count {}",
                self.count()
            )));
        }
        let mut manifest = Vec::with_capacity(n);
        for _ in 0..n {
            // Count was checked above; the buffer cannot run dry mid-loop.
            manifest.push(self.pop(AccessDir::Front)?);
        }
        Ok(manifest)
    }

    /// Pop exactly `qty`, splitting the final resource when needed.
    ///
    /// Resources come out in push order; the returned quantities total `qty`
    /// within [`EPS_RSRC`]. Fails (without mutation) when `qty` exceeds the
    /// buffer total by more than the tolerance.
    pub fn pop_qty(&mut self, qty: f64, ids: &mut ResourceIds) -> Result<Vec<Resource>> {
        if qty > self.qty + EPS_RSRC {
            return Err(Error::Value(format!(
                "removal quantity {qty} larger than buffer quantity {}",
                self.qty
            )));
        }
        let mut manifest = Vec::new();
        let mut left = qty;
        while left > EPS_RSRC && !self.rs.is_empty() {
            // Direct deque ops here; the total is re-summed once at the end.
            let mut r = match self.rs.pop_front() {
                Some(r) => r,
                None => break,
            };
            let quan = r.quantity();
            if quan > left {
                // Too big: split the resource and put the remainder back.
                let drawn = r.extract_res(left, ids)?;
                self.rs.push_front(r);
                manifest.push(drawn);
                left = 0.0;
            } else {
                self.present.swap_remove(&r.obj_id());
                manifest.push(r);
                left -= quan;
            }
        }
        self.resum();
        Ok(manifest)
    }

    /// As [`pop_qty`](Self::pop_qty), but a request within `slack` of the
    /// buffer total drains the buffer completely.
    pub fn pop_qty_slack(
        &mut self,
        qty: f64,
        slack: f64,
        ids: &mut ResourceIds,
    ) -> Result<Vec<Resource>> {
        if qty > self.qty + slack {
            return Err(Error::Value(format!(
                "removal quantity {qty} larger than buffer quantity {}",
                self.qty
            )));
        }
        if qty >= self.qty {
            return self.pop_n(self.count());
        }
        self.pop_qty(qty, ids)
    }
}
